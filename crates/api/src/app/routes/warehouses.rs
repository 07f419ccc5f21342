use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use wms_catalog::{Warehouse, WarehouseId};
use wms_infra::{EngineResult, NewWarehouse};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_warehouse).get(list_warehouses))
        .route("/:id", get(get_warehouse))
        .route("/:id/disable", post(disable_warehouse))
        .route("/:id/enable", post(enable_warehouse))
}

fn respond(status: StatusCode, result: EngineResult<Warehouse>) -> axum::response::Response {
    match result {
        Ok(warehouse) => (status, Json(dto::WarehouseResponse::from(&warehouse))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn register_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<NewWarehouse>,
) -> axum::response::Response {
    respond(
        StatusCode::CREATED,
        services.engine.catalog().register_warehouse(body).await,
    )
}

pub async fn list_warehouses(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.engine.catalog().warehouses().await {
        Ok(warehouses) => Json(
            warehouses
                .iter()
                .map(dto::WarehouseResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: WarehouseId = match errors::parse_id(&id, "warehouse") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.engine.catalog().warehouse(id).await)
}

pub async fn disable_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: WarehouseId = match errors::parse_id(&id, "warehouse") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::OK,
        services.engine.catalog().disable_warehouse(id).await,
    )
}

pub async fn enable_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: WarehouseId = match errors::parse_id(&id, "warehouse") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::OK,
        services.engine.catalog().enable_warehouse(id).await,
    )
}
