//! x402 payment client
//!
//! Sends a request; if the server answers 402 with payment requirements, signs
//! an EIP-3009 transfer authorization for the first supported requirement and
//! resends the request once with the `X-PAYMENT` header.

pub mod eip3009;
pub mod types;

pub use eip3009::chain_id_for_network;
pub use types::{
    PaymentPayload, PaymentRequired, PaymentRequirements, SettlementResponse, X402PaymentInfo,
};

use base64::{engine::general_purpose::STANDARD, Engine};
use ethers::signers::{LocalWallet, Signer};
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

pub const PAYMENT_HEADER: &str = "X-PAYMENT";
pub const PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

const USDC_DECIMALS: u32 = 6;

/// Response of a possibly-paid request
pub struct X402Response {
    pub response: Response,
    /// Set when a payment was attached and the server accepted it
    pub payment: Option<X402PaymentInfo>,
}

pub struct X402Client {
    http: Client,
    wallet: LocalWallet,
    max_payment_atomic: Option<u128>,
}

impl X402Client {
    /// Create a client from a hex private key, with or without `0x`
    pub fn new(private_key: &str) -> Result<Self, String> {
        let key = private_key.trim();
        let key = key.strip_prefix("0x").unwrap_or(key);
        let wallet: LocalWallet = key
            .parse()
            .map_err(|e| format!("Invalid private key: {}", e))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            http,
            wallet,
            max_payment_atomic: None,
        })
    }

    /// Refuse to pay more than `cap` atomic units for a single request
    pub fn with_max_payment(mut self, cap: Option<u128>) -> Self {
        self.max_payment_atomic = cap;
        self
    }

    pub fn wallet_address(&self) -> String {
        format!("{:?}", self.wallet.address())
    }

    /// POST `body` as JSON, paying once if the server asks for it
    pub async fn post_with_payment<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<X402Response, String> {
        let first = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("Request to {} failed: {}", url, e))?;

        if first.status() != StatusCode::PAYMENT_REQUIRED {
            return Ok(X402Response {
                response: first,
                payment: None,
            });
        }

        let text = first
            .text()
            .await
            .map_err(|e| format!("Failed to read 402 response: {}", e))?;
        let required: PaymentRequired = serde_json::from_str(&text).map_err(|e| {
            format!("402 response from {} did not contain payment requirements: {}", url, e)
        })?;

        let requirement = select_requirement(&required)?;
        self.check_spend_cap(requirement)?;

        let payload = eip3009::sign_payment(&self.wallet, requirement, required.x402_version).await?;
        let header = encode_payment_header(&payload)?;

        let amount_formatted = format_usdc(&requirement.max_amount_required);
        log::info!(
            "[X402] Paying {} USDC to {} on {} from {} for {}",
            amount_formatted,
            requirement.pay_to,
            requirement.network,
            self.wallet_address(),
            url
        );

        let second = self
            .http
            .post(url)
            .header(PAYMENT_HEADER, header)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("Paid request to {} failed: {}", url, e))?;

        if second.status() == StatusCode::PAYMENT_REQUIRED {
            log::warn!("[X402] Payment was not accepted by {}", url);
            return Ok(X402Response {
                response: second,
                payment: None,
            });
        }

        let settlement = second
            .headers()
            .get(PAYMENT_RESPONSE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(decode_settlement_header);

        if let Some(ref s) = settlement {
            log::info!(
                "[X402] Settlement success={} tx={:?}",
                s.success,
                s.transaction
            );
        }

        let payment = X402PaymentInfo {
            amount: requirement.max_amount_required.clone(),
            amount_formatted,
            asset: requirement.asset.clone(),
            pay_to: requirement.pay_to.clone(),
            network: requirement.network.clone(),
            payer: self.wallet_address(),
            resource: if requirement.resource.is_empty() {
                None
            } else {
                Some(requirement.resource.clone())
            },
            transaction: settlement.and_then(|s| s.transaction),
        };

        Ok(X402Response {
            response: second,
            payment: Some(payment),
        })
    }

    fn check_spend_cap(&self, requirement: &PaymentRequirements) -> Result<(), String> {
        let Some(cap) = self.max_payment_atomic else {
            return Ok(());
        };
        let amount: u128 = requirement
            .max_amount_required
            .parse()
            .map_err(|_| format!("Invalid payment amount: {}", requirement.max_amount_required))?;
        if amount > cap {
            return Err(format!(
                "Payment of {} USDC exceeds the configured limit of {} USDC",
                format_usdc(&requirement.max_amount_required),
                format_usdc(&cap.to_string())
            ));
        }
        Ok(())
    }
}

/// First `exact` requirement on a network we can sign for
pub fn select_requirement(required: &PaymentRequired) -> Result<&PaymentRequirements, String> {
    required
        .accepts
        .iter()
        .find(|r| r.scheme == "exact" && chain_id_for_network(&r.network).is_some())
        .ok_or_else(|| {
            let offered: Vec<String> = required
                .accepts
                .iter()
                .map(|r| format!("{}/{}", r.scheme, r.network))
                .collect();
            match required.error {
                Some(ref e) if offered.is_empty() => format!("Payment required but no options offered: {}", e),
                _ => format!("No supported payment option offered (got: [{}])", offered.join(", ")),
            }
        })
}

/// Interpret a JSON value as a 402 body, if it looks like one
pub fn parse_payment_required(value: &Value) -> Option<PaymentRequired> {
    if !value.get("accepts").map(|a| a.is_array()).unwrap_or(false) {
        return None;
    }
    serde_json::from_value(value.clone()).ok()
}

pub fn encode_payment_header(payload: &PaymentPayload) -> Result<String, String> {
    let json = serde_json::to_vec(payload)
        .map_err(|e| format!("Failed to serialize payment payload: {}", e))?;
    Ok(STANDARD.encode(json))
}

pub fn decode_settlement_header(header: &str) -> Option<SettlementResponse> {
    let bytes = STANDARD.decode(header.trim()).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Format USDC atomic units, e.g. `1500000` -> `1.5`
pub fn format_usdc(atomic: &str) -> String {
    format_atomic(atomic, USDC_DECIMALS)
}

fn format_atomic(atomic: &str, decimals: u32) -> String {
    let Ok(value) = atomic.trim().parse::<u128>() else {
        return atomic.to_string();
    };
    let unit = 10u128.pow(decimals);
    let whole = value / unit;
    let fraction = value % unit;
    if fraction == 0 {
        return whole.to_string();
    }
    let fraction = format!("{:0width$}", fraction, width = decimals as usize);
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
    use ethers::types::transaction::eip712::Eip712;
    use ethers::types::{Signature, H256};
    use serde_json::json;
    use std::str::FromStr;

    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn requirements_body() -> Value {
        json!({
            "x402Version": 1,
            "error": "X-PAYMENT header is required",
            "accepts": [
                {
                    "scheme": "exact",
                    "network": "base-sepolia",
                    "maxAmountRequired": "2500000",
                    "resource": "http://127.0.0.1/reserve",
                    "description": "Hotel reservation",
                    "mimeType": "application/json",
                    "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                    "maxTimeoutSeconds": 300,
                    "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
                    "extra": { "name": "USDC", "version": "2" }
                }
            ]
        })
    }

    async fn paid_reserve(req: HttpRequest, body: web::Json<Value>) -> HttpResponse {
        let Some(header) = req.headers().get(PAYMENT_HEADER) else {
            return HttpResponse::PaymentRequired().json(requirements_body());
        };

        let decoded = STANDARD.decode(header.to_str().unwrap()).unwrap();
        let payload: PaymentPayload = serde_json::from_slice(&decoded).unwrap();
        let required: PaymentRequired = serde_json::from_value(requirements_body()).unwrap();
        let typed =
            eip3009::transfer_typed_data(&required.accepts[0], &payload.payload.authorization).unwrap();
        let hash = H256::from(typed.encode_eip712().unwrap());
        let signer = Signature::from_str(&payload.payload.signature)
            .unwrap()
            .recover(hash)
            .unwrap();
        if format!("{:?}", signer) != payload.payload.authorization.from {
            return HttpResponse::PaymentRequired().json(requirements_body());
        }

        let settlement = json!({
            "success": true,
            "transaction": "0xfeed",
            "network": "base-sepolia",
            "payer": payload.payload.authorization.from,
        });
        HttpResponse::Ok()
            .insert_header((PAYMENT_RESPONSE_HEADER, STANDARD.encode(settlement.to_string())))
            .json(json!({ "confirmation": "SEA-42", "hotelName": body["hotelName"] }))
    }

    async fn free_endpoint() -> HttpResponse {
        HttpResponse::Ok().json(json!({ "free": true }))
    }

    fn spawn_server() -> String {
        let server = HttpServer::new(|| {
            App::new()
                .route("/reserve", web::post().to(paid_reserve))
                .route("/free", web::post().to(free_endpoint))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        format!("http://{}", addr)
    }

    #[test]
    fn test_format_usdc() {
        assert_eq!(format_usdc("1500000"), "1.5");
        assert_eq!(format_usdc("1000000"), "1");
        assert_eq!(format_usdc("10000"), "0.01");
        assert_eq!(format_usdc("123"), "0.000123");
        assert_eq!(format_usdc("abc"), "abc");
    }

    #[test]
    fn test_select_requirement_skips_unsupported() {
        let mut body = requirements_body();
        body["accepts"] = json!([
            {"scheme": "exact", "network": "solana", "maxAmountRequired": "1", "payTo": "x", "asset": "y"},
            {"scheme": "upto", "network": "base", "maxAmountRequired": "1", "payTo": "x", "asset": "y"},
            {"scheme": "exact", "network": "base", "amount": 5, "payTo": "0x1", "asset": "0x2"}
        ]);
        let required = parse_payment_required(&body).unwrap();
        let chosen = select_requirement(&required).unwrap();
        assert_eq!(chosen.network, "base");
        assert_eq!(chosen.max_amount_required, "5");

        body["accepts"] = json!([]);
        let required = parse_payment_required(&body).unwrap();
        let err = select_requirement(&required).unwrap_err();
        assert!(err.contains("X-PAYMENT header is required"));

        assert!(parse_payment_required(&json!({"error": "nope"})).is_none());
    }

    #[test]
    fn test_settlement_header_decoding() {
        let encoded = STANDARD.encode(r#"{"success":true,"transaction":"0xabc","network":"base","payer":"0x1"}"#);
        let settlement = decode_settlement_header(&encoded).unwrap();
        assert!(settlement.success);
        assert_eq!(settlement.transaction.as_deref(), Some("0xabc"));
        assert!(decode_settlement_header("not base64!").is_none());
    }

    #[test]
    fn test_invalid_key() {
        assert!(X402Client::new("0x1234").is_err());
        let client = X402Client::new(TEST_KEY).unwrap();
        assert_eq!(client.wallet_address(), "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
    }

    #[actix_web::test]
    async fn test_pays_and_resends_on_402() {
        let base = spawn_server();
        let client = X402Client::new(TEST_KEY).unwrap();

        let result = client
            .post_with_payment(&format!("{}/reserve", base), &json!({"hotelName": "Sea Breeze Inn"}))
            .await
            .unwrap();

        assert!(result.response.status().is_success());
        let payment = result.payment.expect("payment should be recorded");
        assert_eq!(payment.amount, "2500000");
        assert_eq!(payment.amount_formatted, "2.5");
        assert_eq!(payment.network, "base-sepolia");
        assert_eq!(payment.transaction.as_deref(), Some("0xfeed"));

        let body: Value = result.response.json().await.unwrap();
        assert_eq!(body["confirmation"], "SEA-42");
        assert_eq!(body["hotelName"], "Sea Breeze Inn");
    }

    #[actix_web::test]
    async fn test_free_endpoint_is_not_paid() {
        let base = spawn_server();
        let client = X402Client::new(TEST_KEY).unwrap();
        let result = client
            .post_with_payment(&format!("{}/free", base), &json!({}))
            .await
            .unwrap();
        assert!(result.payment.is_none());
        assert!(result.response.status().is_success());
    }

    #[actix_web::test]
    async fn test_spend_cap_blocks_payment() {
        let base = spawn_server();
        let client = X402Client::new(TEST_KEY)
            .unwrap()
            .with_max_payment(Some(1_000_000));
        let err = match client
            .post_with_payment(&format!("{}/reserve", base), &json!({"hotelName": "X"}))
            .await
        {
            Ok(_) => panic!("payment above the cap must be refused"),
            Err(e) => e,
        };
        assert!(err.contains("exceeds the configured limit"));
    }
}
