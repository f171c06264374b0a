//! Incoming HTTP request type.

use std::net::SocketAddr;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, USER_AGENT};
use http::{Extensions, HeaderMap, Method, Uri};

use crate::middleware::RequestId;

/// An incoming HTTP request with its body fully read.
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: SocketAddr,
    extensions: Extensions,
}

impl Request {
    pub(crate) fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        remote_addr: SocketAddr,
    ) -> Self {
        Self { method, uri, headers, body, remote_addr, extensions: Extensions::new() }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query(&self) -> Option<&str> { self.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> SocketAddr { self.remote_addr }

    /// Header lookup. Returns `None` for absent or non-UTF-8 values.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn user_agent(&self) -> &str {
        self.header(USER_AGENT.as_str()).unwrap_or("")
    }

    /// The id assigned by the tracing middleware, if it ran.
    pub fn request_id(&self) -> Option<&RequestId> {
        self.extensions.get::<RequestId>()
    }

    pub fn extensions(&self) -> &Extensions { &self.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.extensions }

    /// Parses form values from a url-encoded body and from the query string.
    ///
    /// Body values come first, so [`Form::get`] prefers them over query
    /// values with the same name. Bodies with another content type are
    /// ignored.
    pub fn form(&self) -> Result<Form, serde_urlencoded::de::Error> {
        let mut pairs: Vec<(String, String)> = Vec::new();
        if self.has_form_body() {
            let body = std::str::from_utf8(&self.body).unwrap_or("");
            pairs.extend(serde_urlencoded::from_str::<Vec<(String, String)>>(body)?);
        }
        if let Some(query) = self.query() {
            pairs.extend(serde_urlencoded::from_str::<Vec<(String, String)>>(query)?);
        }
        Ok(Form { pairs })
    }

    fn has_form_body(&self) -> bool {
        if self.body.is_empty() {
            return false;
        }
        match self.header(CONTENT_TYPE.as_str()) {
            None => true,
            Some(ct) => ct
                .split(';')
                .next()
                .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded")),
        }
    }
}

/// Decoded form values, in body-then-query order.
#[derive(Debug, Default)]
pub struct Form {
    pairs: Vec<(String, String)>,
}

impl Form {
    /// First value for `name`, treating an empty value as absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
impl Request {
    pub(crate) fn get(path: &str) -> Self {
        Self::test(Method::GET, path, &[], "")
    }

    pub(crate) fn test(method: Method, uri: &str, headers: &[(&str, &str)], body: &str) -> Self {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(
                http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                http::HeaderValue::from_str(value).unwrap(),
            );
        }
        Self::new(
            method,
            uri.parse().unwrap(),
            map,
            Bytes::from(body.to_owned()),
            "127.0.0.1:50000".parse().unwrap(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORM: (&str, &str) = ("content-type", "application/x-www-form-urlencoded");

    #[test]
    fn form_reads_body_and_query() {
        let req = Request::test(Method::POST, "/candles?limit=5", &[FORM], "symbol=BTCUSDT&interval=1h");
        let form = req.form().unwrap();
        assert_eq!(form.get("symbol"), Some("BTCUSDT"));
        assert_eq!(form.get("interval"), Some("1h"));
        assert_eq!(form.get("limit"), Some("5"));
    }

    #[test]
    fn body_values_win_over_query_values() {
        let req = Request::test(Method::POST, "/x?symbol=ETHUSDT", &[FORM], "symbol=BTCUSDT");
        assert_eq!(req.form().unwrap().get("symbol"), Some("BTCUSDT"));
    }

    #[test]
    fn non_form_bodies_are_ignored() {
        let req = Request::test(
            Method::POST,
            "/x",
            &[("content-type", "application/json")],
            r#"{"symbol":"BTCUSDT"}"#,
        );
        assert_eq!(req.form().unwrap().get("symbol"), None);
    }

    #[test]
    fn percent_encoding_is_decoded() {
        let req = Request::test(Method::POST, "/x", &[FORM], "note=a%20b+c");
        assert_eq!(req.form().unwrap().get("note"), Some("a b c"));
    }

    #[test]
    fn empty_values_are_absent() {
        let req = Request::test(Method::POST, "/x", &[FORM], "symbol=");
        assert_eq!(req.form().unwrap().get("symbol"), None);
    }

    #[test]
    fn user_agent_defaults_to_empty() {
        assert_eq!(Request::get("/").user_agent(), "");
        let req = Request::test(Method::GET, "/", &[("user-agent", "curl/8")], "");
        assert_eq!(req.user_agent(), "curl/8");
    }
}
