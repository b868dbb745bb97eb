use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use loomledger_core::ItemId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/clear-history", post(clear_history))
        .route("/audit/:id", post(audit_item))
}

/// Drop every log entry. Item quantities are untouched.
pub async fn clear_history(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::ActorBody>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection_to_response(e),
    };
    let actor = match body.actor() {
        Ok(a) => a,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.run(move |s| s.engine().clear_history(&actor)).await {
        Ok(cleared) => Json(serde_json::json!({ "cleared": cleared })).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// Check the newest log entry for an item against the ledger.
///
/// A disagreement halts the engine and answers 500 `invariant_violation`.
pub async fn audit_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let item_id = match ItemId::new(id) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let audited = item_id.clone();
    match services.run(move |s| s.engine().audit_item(&audited)).await {
        Ok(()) => Json(serde_json::json!({
            "item_id": item_id,
            "consistent": true,
        }))
        .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
