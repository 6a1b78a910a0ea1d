//! Response helpers

use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};
use http_body_util::Full;
use serde::Serialize;

/// HTTP response type
pub type Response = http::Response<Full<Bytes>>;

/// Serialize `body` as JSON with the given status
pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = http::Response::new(Full::new(Bytes::from(bytes)));
            *response.status_mut() = status;
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            response
        }
        Err(err) => {
            tracing::error!("Failed to serialize response: {}", err);
            let mut response = http::Response::new(Full::new(Bytes::from_static(
                br#"{"error":{"type":"internal_error","message":"Failed to serialize response"}}"#,
            )));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            response
        }
    }
}

/// `202 Accepted` pointing at the status resource of job `id`
pub fn accepted<T: Serialize>(id: &str, body: &T) -> Response {
    let mut response = json(StatusCode::ACCEPTED, body);
    if let Ok(location) = HeaderValue::from_str(&format!("/status/{}", id)) {
        response.headers_mut().insert(header::LOCATION, location);
    }
    response
}
