//! HTTP middleware.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{Any, CorsLayer};

use crate::extractors::{RequestId, REQUEST_ID_HEADER};

/// Ensure every request and response carries an `x-request-id`.
///
/// An incoming ID is kept; otherwise a UUID v4 is generated and written to
/// the request so handlers observe the same value.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let header = HeaderName::from_static(REQUEST_ID_HEADER);
    let (parts, body) = request.into_parts();
    let RequestId(id) = RequestId::from_parts(&parts);
    request = Request::from_parts(parts, body);

    let value = HeaderValue::from_str(&id).ok();
    if let Some(value) = &value {
        request.headers_mut().insert(header.clone(), value.clone());
    }

    let mut response = next.run(request).await;
    if let Some(value) = value {
        response.headers_mut().insert(header, value);
    }
    response
}

/// CORS for browser clients of the OpenAI-compatible API
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
}
