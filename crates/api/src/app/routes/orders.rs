use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use wms_infra::EngineResult;
use wms_orders::{Order, OrderId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(submit_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/fulfill", post(fulfill_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/release", post(release_stock))
}

fn respond(status: StatusCode, result: EngineResult<Order>) -> axum::response::Response {
    match result {
        Ok(order) => (status, Json(dto::OrderResponse::from(&order))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// A rejected order is still a created order: 201 with status `rejected`.
pub async fn submit_order(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::SubmitOrderRequest>,
) -> axum::response::Response {
    let ttl = match errors::parse_ttl(body.ttl_seconds) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::CREATED,
        services.engine.orders().submit(body.lines, ttl).await,
    )
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.engine.orders().list().await {
        Ok(orders) => Json(
            orders
                .iter()
                .map(dto::OrderResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: OrderId = match errors::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.engine.orders().get(id).await)
}

pub async fn fulfill_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: OrderId = match errors::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.engine.fulfill_order(id).await)
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: OrderId = match errors::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.engine.cancel_order(id).await)
}

pub async fn release_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: OrderId = match errors::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.engine.orders().release_stock(id).await)
}
