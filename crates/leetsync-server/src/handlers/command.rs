use actix_web::{web, HttpResponse, Responder};
use serde_json::json;

use crate::orchestrator::Command;
use crate::state::AppState;

/// `POST /command`. The raw body is parsed here so that bodies which are not
/// JSON, or arrive without a JSON content type, are reported in the same
/// envelope as command failures.
pub async fn handler(state: web::Data<AppState>, body: web::Bytes) -> impl Responder {
    let command = match serde_json::from_slice::<Command>(&body) {
        Ok(command) => command,
        Err(e) => {
            log::warn!("Rejected malformed command: {}", e);
            return HttpResponse::BadRequest().json(json!({
                "success": false,
                "error": format!("Invalid command: {}", e),
                "kind": "request",
            }));
        }
    };

    HttpResponse::Ok().json(state.orchestrator.dispatch(command).await)
}
