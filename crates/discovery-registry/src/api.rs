//! Request validation and error rendering shared by the HTTP handlers

use crate::error::Error;
use axum::{
    extract::Query,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use tracing::debug;

/// Handler-level failure, rendered as a plain-text body
#[derive(Debug)]
pub enum ApiError {
    /// 405
    MethodNotAllowed,
    /// 400
    BadRequest(String),
    /// 404
    NotFound(String),
    /// 500
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::MethodNotAllowed => {
                (StatusCode::METHOD_NOT_ALLOWED, Error::MethodNotAllowed.to_string())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        debug!("API error: {} - {}", status, message);
        (status, message).into_response()
    }
}

/// Reject any method other than `expected`
pub fn require_method(actual: &Method, expected: Method) -> Result<(), ApiError> {
    if *actual != expected {
        return Err(ApiError::MethodNotAllowed);
    }
    Ok(())
}

/// Extract a non-empty query parameter, or fail with 400
pub fn required_param(uri: &Uri, key: &str) -> Result<String, ApiError> {
    let value = Query::<HashMap<String, String>>::try_from_uri(uri)
        .ok()
        .and_then(|Query(mut params)| params.remove(key))
        .unwrap_or_default();

    if value.is_empty() {
        return Err(ApiError::BadRequest(format!("{} is required", key)));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_param() {
        let uri: Uri = "/get?name=svc-a&other=1".parse().unwrap();
        assert_eq!(required_param(&uri, "name").unwrap(), "svc-a");

        let uri: Uri = "/get?name=".parse().unwrap();
        assert!(matches!(required_param(&uri, "name"), Err(ApiError::BadRequest(_))));

        let uri: Uri = "/get".parse().unwrap();
        assert!(matches!(
            required_param(&uri, "name"),
            Err(ApiError::BadRequest(msg)) if msg == "name is required"
        ));
    }

    #[test]
    fn test_require_method() {
        assert!(require_method(&Method::GET, Method::GET).is_ok());
        assert!(matches!(
            require_method(&Method::POST, Method::GET),
            Err(ApiError::MethodNotAllowed)
        ));
    }
}
