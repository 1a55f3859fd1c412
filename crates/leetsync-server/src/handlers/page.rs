//! Browser bridge endpoints. A page script mirrors what it sees into the
//! server: the current snapshot, the editor contents, and click/mutation
//! notifications that drive the submission pipeline.

use std::sync::Arc;

use actix_web::{web, HttpResponse, Responder};
use leetsync_page::{PageElement, PageSignal, StaticBuffer};
use serde::Deserialize;
use serde_json::json;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SnapshotRequest {
    pub location: String,
    pub root: PageElement,
}

#[derive(Debug, Deserialize)]
pub struct EditorRequest {
    /// `None` means the editor model is gone.
    pub source: Option<String>,
    #[serde(default)]
    pub language_id: Option<String>,
}

pub async fn snapshot(state: web::Data<AppState>, body: web::Json<SnapshotRequest>) -> impl Responder {
    let SnapshotRequest { location, root } = body.into_inner();
    state.page.set_location(location);
    state.page.replace_root(root);
    HttpResponse::Ok().json(json!({ "success": true }))
}

pub async fn editor(state: web::Data<AppState>, body: web::Json<EditorRequest>) -> impl Responder {
    let EditorRequest {
        source,
        language_id,
    } = body.into_inner();
    match source {
        Some(source) => {
            let mut buffer = StaticBuffer::new(source);
            if let Some(language_id) = language_id {
                buffer = buffer.with_language_id(language_id);
            }
            state.editor.install(Arc::new(buffer));
        }
        None => state.editor.clear(),
    }
    HttpResponse::Ok().json(json!({ "success": true }))
}

pub async fn signal(state: web::Data<AppState>, body: web::Json<PageSignal>) -> impl Responder {
    match state.signals.send(body.into_inner()).await {
        Ok(()) => HttpResponse::Accepted().json(json!({ "success": true })),
        Err(_) => {
            log::error!("Submission pipeline is not running");
            HttpResponse::ServiceUnavailable().json(json!({
                "success": false,
                "error": "Submission pipeline is not running",
            }))
        }
    }
}
