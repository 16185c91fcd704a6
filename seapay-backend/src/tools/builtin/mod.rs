mod approval;
mod availability;
mod booking_details;
mod hotel_cards;
mod make_payment;
mod reserve;

pub use approval::{interpret_answer, RecordApprovalDecisionTool, ShowApprovalRequestTool};
pub use availability::{parse_hotels, CheckAvailabilityTool};
pub use booking_details::UpdateBookingDetailsTool;
pub use hotel_cards::{SelectHotelTool, ShowHotelCardsTool};
pub use make_payment::{pay_reservation, MakePaymentTool};
pub use reserve::{classify_reservation, ReserveOutcome, ReserveTool};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::Config;
    use crate::mcp::{PROTOCOL_VERSION, SESSION_HEADER};
    use crate::models::{BookingDetails, BookingState, HotelOption, PaymentDetails, Price};
    use crate::tools::types::ToolContext;
    use crate::widgets::WidgetLibrary;
    use actix_web::{web, App, HttpResponse, HttpServer};
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::Arc;

    /// Hardhat account #0
    pub const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    pub type RecordedCalls = Arc<Mutex<Vec<(String, Value)>>>;
    type Responder = fn(&str, &Value) -> Value;

    pub fn test_context() -> ToolContext {
        context_for(BookingState::new())
    }

    pub fn context_for(state: BookingState) -> ToolContext {
        ToolContext::new(
            "thr_test",
            state.shared(),
            Arc::new(WidgetLibrary::bundled().unwrap()),
            Arc::new(Config::default()),
        )
    }

    pub fn state_with_details() -> BookingState {
        let mut state = BookingState::new();
        state
            .apply_details(&BookingDetails {
                destination: Some("Lisbon".to_string()),
                checkin_date: Some("2026-11-02".to_string()),
                checkout_date: Some("2026-11-05".to_string()),
                guests: Some(2),
            })
            .unwrap();
        state
    }

    pub fn sample_hotels() -> Vec<HotelOption> {
        vec![
            HotelOption {
                hotel_name: "Sea Breeze Inn".to_string(),
                location: "Alfama".to_string(),
                dates: "Nov 2 - Nov 5".to_string(),
                room_type: "Double".to_string(),
                price: Price::Amount(120.into()),
                image_url: None,
            },
            HotelOption {
                hotel_name: "Harbor View".to_string(),
                location: "Belem".to_string(),
                dates: "Nov 2 - Nov 5".to_string(),
                room_type: "Suite".to_string(),
                price: Price::Amount(210.into()),
                image_url: Some("https://img.example/harbor.jpg".to_string()),
            },
        ]
    }

    pub fn context_with_details() -> ToolContext {
        context_for(state_with_details())
    }

    pub fn context_with_hotels() -> ToolContext {
        let mut state = state_with_details();
        state.set_hotels(sample_hotels());
        context_for(state)
    }

    pub fn context_with_selection() -> ToolContext {
        let mut state = state_with_details();
        state.set_hotels(sample_hotels());
        state.select_hotel("1").unwrap();
        context_for(state)
    }

    /// Payment demanded by the reservation, not yet approved
    pub fn context_awaiting_approval() -> ToolContext {
        let mut state = state_with_details();
        state.set_hotels(sample_hotels());
        state.select_hotel("1").unwrap();
        state.mark_payment_required(Some(PaymentDetails {
            amount: Some("1500000".to_string()),
            amount_formatted: Some("1.5".to_string()),
            asset: Some("0x036CbD53842c5426634e7929541eC2318f3dCF7e".to_string()),
            network: Some("base-sepolia".to_string()),
            pay_to: Some("0x209693Bc6afc0C5328bA36FaF03C514EF312287C".to_string()),
            description: None,
        }));
        context_for(state)
    }

    async fn fake_mcp(
        body: web::Json<Value>,
        responder: web::Data<Responder>,
        calls: web::Data<RecordedCalls>,
    ) -> HttpResponse {
        match body["method"].as_str().unwrap_or_default() {
            "initialize" => HttpResponse::Ok()
                .insert_header((SESSION_HEADER, "sess-test"))
                .json(json!({
                    "jsonrpc": "2.0",
                    "id": body["id"],
                    "result": {"protocolVersion": PROTOCOL_VERSION, "capabilities": {}}
                })),
            "notifications/initialized" => HttpResponse::Accepted().finish(),
            "tools/call" => {
                let name = body["params"]["name"].as_str().unwrap_or_default().to_string();
                let args = body["params"]["arguments"].clone();
                let result = (responder.get_ref())(&name, &args);
                calls.lock().push((name, args));
                HttpResponse::Ok().json(json!({"jsonrpc": "2.0", "id": body["id"], "result": result}))
            }
            _ => HttpResponse::NotFound().finish(),
        }
    }

    /// MCP server answering `tools/call` with `responder(name, arguments)`
    pub fn spawn_fake_mcp(responder: Responder) -> (String, RecordedCalls) {
        let calls: RecordedCalls = Arc::new(Mutex::new(Vec::new()));
        let recorded = calls.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(responder))
                .app_data(web::Data::new(recorded.clone()))
                .route("/mcp", web::post().to(fake_mcp))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        (format!("http://{}/mcp", addr), calls)
    }
}
