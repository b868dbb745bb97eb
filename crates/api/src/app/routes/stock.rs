use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    response::IntoResponse,
    Json,
};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub async fn stock_in(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::StockMovementRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection_to_response(e),
    };
    let req = match body.into_request() {
        Ok(r) => r,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.run(move |s| s.engine().replenish(req)).await {
        Ok(item) => Json(dto::item_json(&item)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// Serves both `/stock_out` and `/consume`.
pub async fn consume(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::StockMovementRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection_to_response(e),
    };
    let req = match body.into_request() {
        Ok(r) => r,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.run(move |s| s.engine().consume(req)).await {
        Ok(item) => Json(dto::item_json(&item)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn adjust(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::AdjustBody>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection_to_response(e),
    };
    let req = match body.into_request() {
        Ok(r) => r,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.run(move |s| s.engine().adjust(req)).await {
        Ok(item) => Json(dto::item_json(&item)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn transfer(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::TransferBody>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection_to_response(e),
    };
    let req = match body.into_request() {
        Ok(r) => r,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.run(move |s| s.engine().transfer(req)).await {
        Ok(outcome) => Json(dto::transfer_json(&outcome)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
