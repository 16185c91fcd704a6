//! Booking state and payment history of a thread

use actix_web::{web, HttpResponse, Responder};
use serde_json::json;

use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/threads/{thread_id}")
            .route("/booking", web::get().to(get_booking))
            .route("/payments", web::get().to(list_payments)),
    );
}

async fn get_booking(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let thread_id = path.into_inner();
    match state.server.booking_state(&thread_id) {
        Ok(booking) => {
            let booking = booking.unwrap_or_default();
            HttpResponse::Ok().json(json!({
                "success": true,
                "thread_id": thread_id,
                "stage": booking.stage(),
                "missing_fields": booking.missing_fields(),
                "booking": booking
            }))
        }
        Err(e) if e.starts_with("Thread not found") => HttpResponse::NotFound().json(json!({
            "success": false,
            "error": e
        })),
        Err(e) => {
            log::error!("[CHAT] {}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": "Internal server error"
            }))
        }
    }
}

async fn list_payments(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let thread_id = path.into_inner();
    match state.db.list_x402_payments(&thread_id) {
        Ok(payments) => HttpResponse::Ok().json(json!({
            "success": true,
            "thread_id": thread_id,
            "payments": payments
        })),
        Err(e) => {
            log::error!("Failed to list x402 payments: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": "Internal server error"
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::test_state;
    use actix_web::{test as actix_test, App};
    use serde_json::Value;

    #[actix_web::test]
    async fn test_booking_of_new_thread() {
        let (_dir, state) = test_state("unused");
        let thread = state.server.create_thread().unwrap();
        let app = actix_test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = actix_test::TestRequest::get()
            .uri(&format!("/api/threads/{}/booking", thread.id))
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["stage"], "collecting_details");
        assert_eq!(body["missing_fields"][0], "destination");

        let req = actix_test::TestRequest::get()
            .uri(&format!("/api/threads/{}/payments", thread.id))
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["payments"], serde_json::json!([]));

        let req = actix_test::TestRequest::get().uri("/api/threads/thr_nope/booking").to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), 404);
    }
}
