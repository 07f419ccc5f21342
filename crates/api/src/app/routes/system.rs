use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode};

use crate::app::services::AppServices;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// 503 until the store answers a ping.
pub async fn ready(Extension(services): Extension<Arc<AppServices>>) -> StatusCode {
    if services.engine.ready().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
