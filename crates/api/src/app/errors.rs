use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use wms_infra::EngineError;

pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    let status = match &err {
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        EngineError::InsufficientAvailable { .. }
        | EngineError::InsufficientStock { .. }
        | EngineError::ReservationExpired
        | EngineError::ReservationNotActive(_)
        | EngineError::InvariantViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::AlreadyExists(_) | EngineError::TransactionConflict(_) => StatusCode::CONFLICT,
        EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }
    json_error(status, err.code(), err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path segment into a typed id, or a 400 `invalid_id` response.
pub fn parse_id<T>(raw: &str, what: &str) -> Result<T, axum::response::Response>
where
    T: core::str::FromStr,
{
    raw.parse().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid {what} id: {raw}"),
        )
    })
}

/// Seconds from a request body as a positive TTL.
pub fn parse_ttl(seconds: Option<i64>) -> Result<Option<chrono::Duration>, axum::response::Response> {
    match seconds {
        None => Ok(None),
        Some(s) if s > 0 => Ok(Some(chrono::Duration::seconds(s))),
        Some(s) => Err(json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            format!("ttl_seconds must be positive, got {s}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_error_kind() {
        let cases = [
            (EngineError::not_found("order x"), StatusCode::NOT_FOUND),
            (EngineError::validation("bad"), StatusCode::BAD_REQUEST),
            (EngineError::ReservationExpired, StatusCode::UNPROCESSABLE_ENTITY),
            (
                EngineError::InsufficientAvailable {
                    available: 1,
                    requested: 2,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (EngineError::AlreadyExists("sku".into()), StatusCode::CONFLICT),
            (EngineError::TransactionConflict("rev".into()), StatusCode::CONFLICT),
            (EngineError::Store("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(engine_error_to_response(err).status(), expected);
        }
    }

    #[test]
    fn ttl_must_be_positive() {
        assert!(parse_ttl(None).unwrap().is_none());
        assert_eq!(parse_ttl(Some(30)).unwrap(), Some(chrono::Duration::seconds(30)));
        assert_eq!(
            parse_ttl(Some(0)).unwrap_err().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
