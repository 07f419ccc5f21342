use axum::{routing::get, Router};

pub mod orders;
pub mod products;
pub mod reports;
pub mod reservations;
pub mod stock;
pub mod system;
pub mod warehouses;

/// Router for all engine endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/alerts", get(reports::alerts))
        .nest("/products", products::router())
        .nest("/warehouses", warehouses::router())
        .nest("/stock", stock::router())
        .nest("/reservations", reservations::router())
        .nest("/orders", orders::router())
        .nest("/reports", reports::router())
}
