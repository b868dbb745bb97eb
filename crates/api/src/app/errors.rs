use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use loomledger_core::DomainError;
use loomledger_infra::engine::EngineError;

pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    let code = err.kind();
    match err {
        EngineError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, code, msg),
        EngineError::InsufficientStock {
            item_id,
            requested,
            available,
        } => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "error": code,
                "message": format!(
                    "insufficient stock for {item_id}: requested {requested}, available {available}"
                ),
                "item_id": item_id,
                "requested": requested,
                "available": available,
            })),
        )
            .into_response(),
        EngineError::DuplicateId(id) => {
            json_error(StatusCode::CONFLICT, code, format!("id already in use: {id}"))
        }
        EngineError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, code, msg),
        EngineError::TransientFailure(msg) => {
            tracing::warn!(error = %msg, "transient failure answered with 503");
            json_error(StatusCode::SERVICE_UNAVAILABLE, code, msg)
        }
        EngineError::InvariantViolation(msg) => {
            tracing::error!(error = %msg, "invariant violation answered with 500");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, code, msg)
        }
    }
}

/// Request-shape errors (bad ids, unknown kinds) raised before the engine is called.
pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    engine_error_to_response(EngineError::from(err))
}

pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
}

pub fn query_rejection_to_response(rejection: QueryRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
