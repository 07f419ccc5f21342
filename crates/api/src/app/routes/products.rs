use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use wms_catalog::{Pricing, ProductId};
use wms_infra::{EngineResult, NewProduct, ProductFilter};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_product).get(list_products))
        .route("/:id", get(get_product))
        .route("/:id/rename", post(rename_product))
        .route("/:id/threshold", post(set_threshold))
        .route("/:id/pricing", post(set_pricing))
        .route("/:id/disable", post(disable_product))
        .route("/:id/enable", post(enable_product))
}

fn respond(status: StatusCode, result: EngineResult<wms_catalog::Product>) -> axum::response::Response {
    match result {
        Ok(product) => (status, Json(dto::ProductResponse::from(&product))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn register_product(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<NewProduct>,
) -> axum::response::Response {
    respond(
        StatusCode::CREATED,
        services.engine.catalog().register_product(body).await,
    )
}

/// `GET /products?q=lamp&category=furniture`; both filters are optional.
pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Query(filter): Query<ProductFilter>,
) -> axum::response::Response {
    match services.engine.catalog().search_products(&filter).await {
        Ok(products) => Json(
            products
                .iter()
                .map(dto::ProductResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ProductId = match errors::parse_id(&id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.engine.catalog().product(id).await)
}

pub async fn rename_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::RenameProductRequest>,
) -> axum::response::Response {
    let id: ProductId = match errors::parse_id(&id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::OK,
        services.engine.catalog().rename_product(id, &body.name).await,
    )
}

pub async fn set_threshold(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetThresholdRequest>,
) -> axum::response::Response {
    let id: ProductId = match errors::parse_id(&id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::OK,
        services
            .engine
            .catalog()
            .set_reorder_threshold(id, body.reorder_threshold)
            .await,
    )
}

pub async fn set_pricing(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<Pricing>,
) -> axum::response::Response {
    let id: ProductId = match errors::parse_id(&id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::OK,
        services.engine.catalog().set_pricing(id, body).await,
    )
}

pub async fn disable_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ProductId = match errors::parse_id(&id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.engine.catalog().disable_product(id).await)
}

pub async fn enable_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ProductId = match errors::parse_id(&id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.engine.catalog().enable_product(id).await)
}
