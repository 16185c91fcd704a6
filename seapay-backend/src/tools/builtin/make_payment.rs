//! Pays for the reservation through the 402-guarded REST endpoint
//!
//! The reservation body is POSTed to `{SEAPAY_API_BASE_URL}/reserve`. A 402
//! answer is settled inline by the x402 client and the request resent once.
//! The tool refuses to run unless the user approved the payment.

use crate::gateway::protocol::GatewayEvent;
use crate::tools::builtin::reserve::failure_message;
use crate::tools::registry::Tool;
use crate::tools::types::{ToolContext, ToolDefinition, ToolInputSchema, ToolResult};
use crate::x402::X402Client;
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct MakePaymentTool {
    definition: ToolDefinition,
}

impl MakePaymentTool {
    pub fn new() -> Self {
        MakePaymentTool {
            definition: ToolDefinition {
                name: "make_payment".to_string(),
                description: "Pay for and complete the reservation. Only works after the user approved the payment. Takes no arguments.".to_string(),
                input_schema: ToolInputSchema::default(),
            },
        }
    }
}

impl Default for MakePaymentTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for MakePaymentTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, _params: Value, context: &ToolContext) -> ToolResult {
        if let Err(e) = check_payable(context) {
            return ToolResult::error(e);
        }

        let private_key = match crate::config::wallet_private_key() {
            Some(k) => k,
            None => return ToolResult::error("PRIVATE_KEY is not set; cannot sign the payment"),
        };

        pay_reservation(context, &private_key).await
    }
}

fn check_payable(context: &ToolContext) -> Result<Value, String> {
    let booking = context.booking.lock();
    if booking.reservation_created {
        return Err("The reservation has already been created.".to_string());
    }
    if !booking.payment_required {
        return Err("No payment is pending for this booking.".to_string());
    }
    if !booking.is_payment_approved() {
        return Err("The user has not approved the payment. Show an approval request first.".to_string());
    }
    booking.reservation_request()
}

/// Run the paid reservation request with the given wallet key
pub async fn pay_reservation(context: &ToolContext, private_key: &str) -> ToolResult {
    let body = match check_payable(context) {
        Ok(b) => b,
        Err(e) => return ToolResult::error(e),
    };

    let client = match X402Client::new(private_key) {
        Ok(c) => c.with_max_payment(context.config.x402_max_payment_atomic),
        Err(e) => return ToolResult::error(e),
    };

    let url = format!(
        "{}/reserve",
        context.config.reservation_api_base_url.trim_end_matches('/')
    );
    log::info!(
        "[PAYMENT] Thread {} reserving via {} with wallet {}",
        context.thread_id,
        url,
        client.wallet_address()
    );

    let response = match client.post_with_payment(&url, &body).await {
        Ok(r) => r,
        Err(e) => return ToolResult::error(format!("Payment failed: {}", e)),
    };

    let status = response.response.status();
    let text = match response.response.text().await {
        Ok(t) => t,
        Err(e) => return ToolResult::error(format!("Failed to read reservation response: {}", e)),
    };

    if !status.is_success() {
        return ToolResult::error(format!(
            "Reservation endpoint returned {}: {}",
            status,
            text.chars().take(500).collect::<String>()
        ));
    }

    let reservation: Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(_) => return ToolResult::error(format!("Reservation endpoint returned invalid JSON: {}", text)),
    };

    if let Some(ref payment) = response.payment {
        context.emit(GatewayEvent::x402_payment(&context.thread_id, payment));
    }

    if let Some(reason) = failure_message(&reservation) {
        log::warn!("[PAYMENT] Thread {}: reservation refused: {}", context.thread_id, reason);
        return ToolResult::error(format!("The reservation was not created: {}", reason)).with_metadata(json!({
            "success": false,
            "reservation": reservation,
            "payment": response.payment,
        }));
    }

    context.booking.lock().mark_reserved(Some(reservation.clone()));

    let message = match response.payment {
        Some(ref p) => format!("Paid {} USDC on {}. The reservation is confirmed.", p.amount_formatted, p.network),
        None => "The reservation is confirmed; no payment was charged.".to_string(),
    };
    log::info!("[PAYMENT] Thread {}: {}", context.thread_id, message);

    let outcome = json!({
        "success": true,
        "message": message,
        "reservation": reservation,
        "payment": response.payment,
    });
    ToolResult::success(outcome.to_string()).with_metadata(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::test_support::{context_awaiting_approval, TEST_PRIVATE_KEY};
    use crate::x402::{PAYMENT_HEADER, PAYMENT_RESPONSE_HEADER};
    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
    use base64::{engine::general_purpose::STANDARD, Engine};
    use std::sync::Arc;

    async fn fake_reserve(req: HttpRequest, body: web::Json<Value>, sold_out: web::Data<bool>) -> HttpResponse {
        if req.headers().get(PAYMENT_HEADER).is_none() {
            return HttpResponse::PaymentRequired().json(json!({
                "x402Version": 1,
                "accepts": [{
                    "scheme": "exact",
                    "network": "base-sepolia",
                    "maxAmountRequired": "1500000",
                    "resource": "/reserve",
                    "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                    "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
                    "extra": {"name": "USDC", "version": "2"}
                }]
            }));
        }
        let settlement = STANDARD.encode(
            json!({"success": true, "transaction": "0xabc", "network": "base-sepolia"}).to_string(),
        );
        let reply = if **sold_out {
            json!({"success": false, "error": "Hotel is fully booked"})
        } else {
            json!({"reservationId": "res_42", "hotelName": body["hotelName"]})
        };
        HttpResponse::Ok()
            .insert_header((PAYMENT_RESPONSE_HEADER, settlement))
            .json(reply)
    }

    fn spawn_reservation_api() -> String {
        spawn_api(false)
    }

    fn spawn_api(sold_out: bool) -> String {
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(sold_out))
                .route("/reserve", web::post().to(fake_reserve))
        })
            .workers(1)
            .bind(("127.0.0.1", 0))
            .unwrap();
        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        format!("http://{}", addr)
    }

    fn approve(ctx: &ToolContext) {
        let mut booking = ctx.booking.lock();
        booking.request_approval("Confirm", "Pay 1.5 USDC").unwrap();
        booking.resolve_approval(true).unwrap();
    }

    #[tokio::test]
    async fn test_refuses_without_approval() {
        let ctx = context_awaiting_approval();
        let result = MakePaymentTool::new().execute(json!({}), &ctx).await;
        assert!(!result.success);
        assert!(result.content.contains("not approved"));

        let result = pay_reservation(&ctx, TEST_PRIVATE_KEY).await;
        assert!(!result.success);
    }

    #[actix_web::test]
    async fn test_pays_and_completes_reservation() {
        let base = spawn_reservation_api();
        let mut ctx = context_awaiting_approval();
        let mut config = (*ctx.config).clone();
        config.reservation_api_base_url = format!("{}/", base);
        ctx.config = Arc::new(config);
        let (emitter, mut rx) = crate::gateway::EventEmitter::channel();
        let ctx = ctx.with_emitter(emitter);
        approve(&ctx);

        let result = pay_reservation(&ctx, TEST_PRIVATE_KEY).await;
        assert!(result.success, "{}", result.content);

        let outcome = result.metadata.unwrap();
        assert_eq!(outcome["reservation"]["reservationId"], "res_42");
        assert_eq!(outcome["payment"]["transaction"], "0xabc");
        assert_eq!(outcome["payment"]["amount_formatted"], "1.5");
        assert!(ctx.booking.lock().reservation_created);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, "x402.payment");
        assert_eq!(event.data["amount"], "1500000");
    }

    #[actix_web::test]
    async fn test_spend_cap_blocks_payment() {
        let base = spawn_reservation_api();
        let mut ctx = context_awaiting_approval();
        let mut config = (*ctx.config).clone();
        config.reservation_api_base_url = base;
        config.x402_max_payment_atomic = Some(1_000_000);
        ctx.config = Arc::new(config);
        approve(&ctx);

        let result = pay_reservation(&ctx, TEST_PRIVATE_KEY).await;
        assert!(!result.success);
        assert!(result.content.contains("exceeds the configured limit"));
        assert!(!ctx.booking.lock().reservation_created);
    }

    #[actix_web::test]
    async fn test_refused_body_is_not_a_reservation() {
        let base = spawn_api(true);
        let mut ctx = context_awaiting_approval();
        let mut config = (*ctx.config).clone();
        config.reservation_api_base_url = base;
        ctx.config = Arc::new(config);
        approve(&ctx);

        let result = pay_reservation(&ctx, TEST_PRIVATE_KEY).await;
        assert!(!result.success);
        assert!(result.content.contains("Hotel is fully booked"));
        assert_eq!(result.metadata.unwrap()["payment"]["transaction"], "0xabc");
        assert!(!ctx.booking.lock().reservation_created);
    }
}
