use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::app::services::AppServices;

/// 503 once the engine has halted; a halted engine refuses every call until restart.
pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    if services.engine().is_halted() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "halted", "backend": services.backend() })),
        )
            .into_response();
    }

    Json(serde_json::json!({ "status": "ok", "backend": services.backend() })).into_response()
}
