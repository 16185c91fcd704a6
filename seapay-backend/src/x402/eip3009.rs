//! EIP-3009 `TransferWithAuthorization` signing for the x402 `exact` scheme

use super::types::{ExactEvmPayload, PaymentPayload, PaymentRequirements, TransferAuthorization};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip712::TypedData;
use serde_json::json;

/// Authorizations become valid slightly in the past to tolerate clock skew
const VALID_AFTER_SKEW_SECS: i64 = 600;

/// Chain id for an x402 network name or an `eip155:<id>` identifier
pub fn chain_id_for_network(network: &str) -> Option<u64> {
    let network = network.trim().to_lowercase();
    if let Some(id) = network.strip_prefix("eip155:") {
        return id.parse().ok();
    }
    match network.as_str() {
        "base" => Some(8453),
        "base-sepolia" => Some(84532),
        "avalanche" => Some(43114),
        "avalanche-fuji" => Some(43113),
        "polygon" => Some(137),
        "polygon-amoy" => Some(80002),
        _ => None,
    }
}

/// Build a fresh authorization for `requirement`, valid from `now - skew`
/// until `now + maxTimeoutSeconds`
pub fn new_authorization(from: &str, requirement: &PaymentRequirements, now: i64) -> TransferAuthorization {
    let nonce: [u8; 32] = rand::random();
    TransferAuthorization {
        from: from.to_string(),
        to: requirement.pay_to.clone(),
        value: requirement.max_amount_required.clone(),
        valid_after: (now - VALID_AFTER_SKEW_SECS).to_string(),
        valid_before: (now + requirement.max_timeout_seconds as i64).to_string(),
        nonce: format!("0x{}", hex::encode(nonce)),
    }
}

/// EIP-712 typed data the asset contract verifies
pub fn transfer_typed_data(
    requirement: &PaymentRequirements,
    authorization: &TransferAuthorization,
) -> Result<TypedData, String> {
    let chain_id = chain_id_for_network(&requirement.network)
        .ok_or_else(|| format!("Unsupported x402 network: {}", requirement.network))?;

    let typed = json!({
        "types": {
            "EIP712Domain": [
                { "name": "name", "type": "string" },
                { "name": "version", "type": "string" },
                { "name": "chainId", "type": "uint256" },
                { "name": "verifyingContract", "type": "address" }
            ],
            "TransferWithAuthorization": [
                { "name": "from", "type": "address" },
                { "name": "to", "type": "address" },
                { "name": "value", "type": "uint256" },
                { "name": "validAfter", "type": "uint256" },
                { "name": "validBefore", "type": "uint256" },
                { "name": "nonce", "type": "bytes32" }
            ]
        },
        "primaryType": "TransferWithAuthorization",
        "domain": {
            "name": requirement.asset_name(),
            "version": requirement.asset_version(),
            "chainId": chain_id,
            "verifyingContract": requirement.asset,
        },
        "message": {
            "from": authorization.from,
            "to": authorization.to,
            "value": authorization.value,
            "validAfter": authorization.valid_after,
            "validBefore": authorization.valid_before,
            "nonce": authorization.nonce,
        }
    });

    serde_json::from_value(typed).map_err(|e| format!("Failed to build EIP-712 payload: {}", e))
}

/// Sign a payment for `requirement` and wrap it in the `X-PAYMENT` payload
pub async fn sign_payment(
    wallet: &LocalWallet,
    requirement: &PaymentRequirements,
    x402_version: u32,
) -> Result<PaymentPayload, String> {
    let from = format!("{:?}", wallet.address());
    let authorization = new_authorization(&from, requirement, chrono::Utc::now().timestamp());
    let typed_data = transfer_typed_data(requirement, &authorization)?;

    let signature = wallet
        .sign_typed_data(&typed_data)
        .await
        .map_err(|e| format!("Failed to sign payment authorization: {}", e))?;

    Ok(PaymentPayload {
        x402_version,
        scheme: requirement.scheme.clone(),
        network: requirement.network.clone(),
        payload: ExactEvmPayload {
            signature: format!("0x{}", hex::encode(signature.to_vec())),
            authorization,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::transaction::eip712::Eip712;
    use ethers::types::{Signature, H256};
    use std::str::FromStr;

    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn requirement() -> PaymentRequirements {
        PaymentRequirements {
            scheme: "exact".to_string(),
            network: "base-sepolia".to_string(),
            max_amount_required: "1500000".to_string(),
            resource: "http://localhost:3000/reserve".to_string(),
            description: "Hotel reservation".to_string(),
            mime_type: "application/json".to_string(),
            pay_to: "0x209693Bc6afc0C5328bA36FaF03C514EF312287C".to_string(),
            max_timeout_seconds: 120,
            asset: "0x036CbD53842c5426634e7929541eC2318f3dCF7e".to_string(),
            extra: Some(json!({"name": "USDC", "version": "2"})),
        }
    }

    #[test]
    fn test_chain_ids() {
        assert_eq!(chain_id_for_network("base"), Some(8453));
        assert_eq!(chain_id_for_network("Base-Sepolia"), Some(84532));
        assert_eq!(chain_id_for_network("polygon-amoy"), Some(80002));
        assert_eq!(chain_id_for_network("eip155:10"), Some(10));
        assert_eq!(chain_id_for_network("solana"), None);
    }

    #[test]
    fn test_authorization_window() {
        let auth = new_authorization("0xabc", &requirement(), 1_700_000_000);
        assert_eq!(auth.valid_after, "1699999400");
        assert_eq!(auth.valid_before, "1700000120");
        assert_eq!(auth.value, "1500000");
        assert_eq!(auth.nonce.len(), 66);
        assert_ne!(auth.nonce, new_authorization("0xabc", &requirement(), 1_700_000_000).nonce);
    }

    #[tokio::test]
    async fn test_signature_recovers_to_wallet() {
        let wallet: LocalWallet = TEST_KEY.parse().unwrap();
        let req = requirement();
        let payload = sign_payment(&wallet, &req, 1).await.unwrap();

        assert_eq!(payload.scheme, "exact");
        assert_eq!(payload.network, "base-sepolia");
        assert_eq!(
            payload.payload.authorization.from,
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );

        let typed = transfer_typed_data(&req, &payload.payload.authorization).unwrap();
        let hash = H256::from(typed.encode_eip712().unwrap());
        let signature = Signature::from_str(&payload.payload.signature).unwrap();
        assert_eq!(signature.recover(hash).unwrap(), wallet.address());
    }

    #[test]
    fn test_unknown_network_is_rejected() {
        let mut req = requirement();
        req.network = "solana-devnet".to_string();
        let auth = new_authorization("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266", &req, 0);
        assert!(transfer_typed_data(&req, &auth).is_err());
    }
}
