use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use loomledger_core::ItemId;
use loomledger_inventory::ItemKind;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_item).get(list_items))
        .route("/:id", get(get_item))
        .route("/:id/assign", post(assign_item))
        .route("/:id/complete", post(complete_item))
}

pub async fn create_item(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreateItemRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection_to_response(e),
    };
    let (draft, actor) = match body.into_draft() {
        Ok(parsed) => parsed,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.run(move |s| s.engine().create_item(draft, &actor)).await {
        Ok(item) => (StatusCode::CREATED, Json(dto::item_json(&item))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ItemListQuery>,
) -> axum::response::Response {
    let kind = match query.kind.as_deref().filter(|k| !k.trim().is_empty()) {
        None => None,
        Some(raw) => match raw.parse::<ItemKind>() {
            Ok(k) => Some(k),
            Err(e) => return errors::domain_error_to_response(e),
        },
    };

    match services.run(move |s| s.engine().list_items(kind)).await {
        Ok(items) => {
            let items: Vec<_> = items.iter().map(dto::item_json).collect();
            Json(serde_json::json!({ "items": items })).into_response()
        }
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let item_id = match ItemId::new(id) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.run(move |s| s.engine().get_item(&item_id)).await {
        Ok(item) => Json(dto::item_json(&item)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn assign_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::AssignBody>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection_to_response(e),
    };
    let req = match body.into_request(id) {
        Ok(r) => r,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.run(move |s| s.engine().assign(req)).await {
        Ok(item) => Json(dto::item_json(&item)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn complete_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::ActorBody>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection_to_response(e),
    };
    let req = match body.into_complete(id) {
        Ok(r) => r,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.run(move |s| s.engine().complete(req)).await {
        Ok(item) => Json(dto::item_json(&item)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
