//! Replies and the [`IntoResponse`] conversion.
//!
//! Endpoints usually return `Result<Json<T>, ApiError>` and let
//! [`IntoResponse`] pick the status and body. Middleware works on the
//! concrete [`Response`] to add headers on the way out.

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use tracing::error;

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

/// A complete reply: status, headers and a buffered body.
///
/// ```rust
/// use exgate::Response;
/// use http::StatusCode;
///
/// Response::json(br#"{"symbol":"BTCUSDT"}"#.to_vec());
/// Response::text("uptime: 3s\n");
/// Response::status(StatusCode::SERVICE_UNAVAILABLE);
/// Response::error(StatusCode::BAD_REQUEST, "Invalid Input, symbol must be provided");
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    fn with_body(content_type: &'static str, body: Bytes) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self { status: StatusCode::OK, headers, body }
    }

    /// 200 with an `application/json` body.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::with_body(JSON, body.into())
    }

    /// 200 with a UTF-8 plain-text body.
    pub fn text(body: impl Into<String>) -> Self {
        Self::with_body(TEXT, Bytes::from(body.into()))
    }

    /// `code` and nothing else.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, headers: HeaderMap::new(), body: Bytes::new() }
    }

    /// Plain-text error: `message` and a trailing newline.
    pub fn error(code: StatusCode, message: impl AsRef<str>) -> Self {
        Self::text(format!("{}\n", message.as_ref())).with_status(code)
    }

    pub fn with_status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

/// Conversion of a handler's return value into a [`Response`].
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

impl<T: IntoResponse, E: IntoResponse> IntoResponse for Result<T, E> {
    fn into_response(self) -> Response {
        self.map_or_else(IntoResponse::into_response, IntoResponse::into_response)
    }
}

/// A value serialised to a JSON body.
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(bytes) => Response::json(bytes),
            Err(e) => {
                error!("failed to serialise response: {e}");
                Response::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        }
    }
}
