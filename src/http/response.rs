//! Response construction for the REST surface.
//!
//! # Responsibilities
//! - Encode successful call results as JSON with status 200
//! - Map RPC status codes to HTTP status codes with a JSON error body
//! - Copy response header metadata onto the HTTP response
//!
//! # Design Decisions
//! - Metadata headers are written before the body exists
//! - Error bodies carry the code and message only
//! - Trailer metadata has no REST counterpart and is dropped

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Response, StatusCode};
use serde_json::Value;

use crate::http::request::METADATA_HEADER_PREFIX;
use crate::rpc::metadata::Metadata;
use crate::rpc::status::{Code, ErrorBody, Status};

const APPLICATION_JSON: &str = "application/json";

pub fn success(value: &Value, header: &Metadata) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(body) => json(StatusCode::OK, body, header),
        Err(e) => error(
            &Status::internal(format!("failed to encode response: {}", e)),
            header,
        ),
    }
}

/// Error response for `status`, using the fixed code → HTTP mapping.
pub fn error(status: &Status, header: &Metadata) -> Response<Body> {
    error_body(status.code().http_status(), &status.to_error_body(), header)
}

pub fn not_found(method: &Method, path: &str) -> Response<Body> {
    error(
        &Status::not_found(format!("no route for {} {}", method, path)),
        &Metadata::new(),
    )
}

/// 405 listing the verbs the path does accept.
pub fn method_not_allowed(method: &Method, path: &str, allowed: &[Method]) -> Response<Body> {
    let message = format!("{} is not allowed for {}", method, path);
    let body = ErrorBody {
        error: message.clone(),
        message,
        code: Code::Unimplemented.as_i32(),
        status: Code::Unimplemented.to_string(),
    };
    let mut response = error_body(StatusCode::METHOD_NOT_ALLOWED, &body, &Metadata::new());
    let allow = allowed
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if let Ok(value) = HeaderValue::from_str(&allow) {
        response.headers_mut().insert(header::ALLOW, value);
    }
    response
}

fn error_body(status: StatusCode, body: &ErrorBody, header: &Metadata) -> Response<Body> {
    // ErrorBody holds only strings and an integer
    let encoded = serde_json::to_vec(body).unwrap_or_default();
    json(status, encoded, header)
}

fn json(status: StatusCode, body: Vec<u8>, header: &Metadata) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    header.write_headers(response.headers_mut(), METADATA_HEADER_PREFIX);
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(APPLICATION_JSON),
    );
    response
}
