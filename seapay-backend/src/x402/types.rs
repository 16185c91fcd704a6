//! x402 wire types: the 402 body, the `X-PAYMENT` payload and the settlement header

use crate::models::PaymentDetails;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Body of an HTTP 402 response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    #[serde(default = "default_version")]
    pub x402_version: u32,
    #[serde(default)]
    pub accepts: Vec<PaymentRequirements>,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_version() -> u32 {
    1
}

/// One acceptable way to pay for a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: String,
    /// Amount in token atomic units (USDC has 6 decimals)
    #[serde(alias = "amount", deserialize_with = "string_or_number")]
    pub max_amount_required: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mime_type: String,
    pub pay_to: String,
    #[serde(default = "default_timeout")]
    pub max_timeout_seconds: u64,
    pub asset: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

fn default_timeout() -> u64 {
    60
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected amount as string or number, got {}",
            other
        ))),
    }
}

impl PaymentRequirements {
    /// EIP-712 domain name of the asset contract
    pub fn asset_name(&self) -> String {
        self.extra
            .as_ref()
            .and_then(|e| e.get("name"))
            .and_then(|v| v.as_str())
            .unwrap_or("USD Coin")
            .to_string()
    }

    /// EIP-712 domain version of the asset contract
    pub fn asset_version(&self) -> String {
        self.extra
            .as_ref()
            .and_then(|e| e.get("version"))
            .and_then(|v| v.as_str())
            .unwrap_or("2")
            .to_string()
    }

    pub fn to_payment_details(&self) -> PaymentDetails {
        PaymentDetails {
            amount: Some(self.max_amount_required.clone()),
            amount_formatted: Some(super::format_usdc(&self.max_amount_required)),
            asset: Some(self.asset.clone()),
            network: Some(self.network.clone()),
            pay_to: Some(self.pay_to.clone()),
            description: if self.description.is_empty() {
                None
            } else {
                Some(self.description.clone())
            },
        }
    }
}

/// EIP-3009 `TransferWithAuthorization` message, all numbers as decimal strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferAuthorization {
    pub from: String,
    pub to: String,
    pub value: String,
    pub valid_after: String,
    pub valid_before: String,
    /// 32 random bytes, 0x-prefixed hex
    pub nonce: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExactEvmPayload {
    pub signature: String,
    pub authorization: TransferAuthorization,
}

/// Decoded `X-PAYMENT` header
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: u32,
    pub scheme: String,
    pub network: String,
    pub payload: ExactEvmPayload,
}

/// Decoded `X-PAYMENT-RESPONSE` header
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub transaction: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub payer: Option<String>,
    #[serde(default)]
    pub error_reason: Option<String>,
}

/// Summary of a payment made while fulfilling a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct X402PaymentInfo {
    pub amount: String,
    pub amount_formatted: String,
    pub asset: String,
    pub pay_to: String,
    pub network: String,
    pub payer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
}
