use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Extension, Path, Query},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/summary", get(summary_by_type))
        .route("/actors/:actor", get(summary_by_actor))
}

/// `GET /transactions`: filtered, newest-first history page.
pub async fn list_transactions(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::TransactionListQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => return errors::query_rejection_to_response(e),
    };
    let (filter, pagination) = match query.into_filter(services.config().default_page_size) {
        Ok(parsed) => parsed,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services
        .run(move |s| s.reporting().range_query(&filter, pagination))
        .await
    {
        Ok(page) => Json(page).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn summary_by_type(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.run(|s| s.reporting().summary_by_type()).await {
        Ok(kinds) => Json(serde_json::json!({ "kinds": kinds })).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn summary_by_actor(
    Extension(services): Extension<Arc<AppServices>>,
    Path(actor): Path<String>,
) -> axum::response::Response {
    let actor = match dto::actor_id("actor", &actor) {
        Ok(a) => a,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.run(move |s| s.reporting().summary_by_actor(&actor)).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
