use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use wms_ledger::StockKey;
use wms_reservations::ReservationId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(reserve))
        .route("/:id", get(get_reservation))
        .route("/:id/commit", post(commit))
        .route("/:id/cancel", post(cancel))
}

pub async fn reserve(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::ReserveRequest>,
) -> axum::response::Response {
    let ttl = match errors::parse_ttl(body.ttl_seconds) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let key = StockKey::new(body.product_id, body.warehouse_id);
    match services
        .engine
        .reservations()
        .reserve(key, body.quantity, ttl, None)
        .await
    {
        Ok(r) => (StatusCode::CREATED, Json(dto::ReservationResponse::from(&r))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_reservation(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ReservationId = match errors::parse_id(&id, "reservation") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.engine.reservations().get(id).await {
        Ok(r) => Json(dto::ReservationResponse::from(&r)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// Responds with the SHIPMENT entry the commit wrote.
pub async fn commit(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ReservationId = match errors::parse_id(&id, "reservation") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.engine.reservations().commit(id).await {
        Ok(entry) => Json(entry).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn cancel(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ReservationId = match errors::parse_id(&id, "reservation") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.engine.reservations().cancel(id).await {
        Ok(r) => Json(dto::ReservationResponse::from(&r)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
