use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/inventory", get(inventory))
        .route("/orders", get(orders))
}

pub async fn inventory(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.engine.inventory_report().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn orders(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::OrderReportQuery>,
) -> axum::response::Response {
    match services.engine.order_statistics(query.into()).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// Low-stock alerts raised since start-up, oldest first.
pub async fn alerts(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    Json(services.monitor.sink().all())
}
