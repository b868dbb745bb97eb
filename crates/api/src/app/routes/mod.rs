use axum::{
    routing::{get, post},
    Router,
};

pub mod admin;
pub mod items;
pub mod pipeline;
pub mod reports;
pub mod stock;
pub mod system;

/// Router for every ledger endpoint except `/health`.
pub fn router() -> Router {
    Router::new()
        .nest("/items", items::router())
        .route("/stock_in", post(stock::stock_in))
        .route("/stock_out", post(stock::consume))
        .route("/consume", post(stock::consume))
        .route("/adjust", post(stock::adjust))
        .route("/transfer", post(stock::transfer))
        .route("/cut", post(pipeline::cut))
        .route("/manufacture", post(pipeline::manufacture))
        .route("/transactions", get(reports::list_transactions))
        .nest("/reports", reports::router())
        .nest("/admin", admin::router())
}
