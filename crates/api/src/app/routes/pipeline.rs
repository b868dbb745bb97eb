use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub async fn cut(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CutBody>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection_to_response(e),
    };
    let req = match body.into_request() {
        Ok(r) => r,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.run(move |s| s.engine().cut(req)).await {
        Ok(outcome) => (StatusCode::CREATED, Json(dto::cut_json(&outcome))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn manufacture(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::ManufactureBody>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection_to_response(e),
    };
    let req = match body.into_request() {
        Ok(r) => r,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.run(move |s| s.engine().manufacture(req)).await {
        Ok(outcome) => (StatusCode::CREATED, Json(dto::manufacture_json(&outcome))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
