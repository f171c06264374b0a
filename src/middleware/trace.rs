//! Request-id tracing.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use http::header::HeaderName;
use http::HeaderValue;
use tracing::warn;

use crate::handler::{boxed, BoxedHandler};
use crate::middleware::Middleware;
use crate::request::Request;

/// The correlation header, honored on ingress and set on egress.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Produces a fresh request id.
pub type IdFactory = Arc<dyn Fn() -> String + Send + Sync>;

/// The resolved id of the current request.
///
/// Stored as a request extension by [`Tracing`], so inner middleware and
/// handlers can read it with [`Request::request_id`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(HeaderValue);

impl RequestId {
    pub fn header_value(&self) -> &HeaderValue {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.0.as_bytes()))
    }
}

static LAST_NANO_ID: AtomicU64 = AtomicU64::new(0);

/// Default id factory: the current Unix time in nanoseconds, base 36.
///
/// Ids are strictly increasing within the process, so two requests that land
/// on the same clock reading still get distinct ids.
pub fn next_nano_id() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0);
    let prev = LAST_NANO_ID
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| Some(now.max(last.saturating_add(1))))
        .unwrap_or_else(|last| last);
    base36(now.max(prev.saturating_add(1)))
}

fn base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_owned();
    }
    let mut out = Vec::with_capacity(13);
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Establishes the `X-Request-Id` of every request.
///
/// A non-empty inbound header is reused byte-for-byte. Otherwise the factory
/// is asked for a new id.
///
/// Inner layers read the id from the request, through
/// [`Request::request_id`], not from response headers: a handler's response
/// does not exist until it returns. The `X-Request-Id` response header is
/// written after the inner handler returns and replaces any value the
/// handler set.
#[derive(Clone)]
pub struct Tracing {
    ids: IdFactory,
}

impl Tracing {
    pub fn new(ids: IdFactory) -> Self {
        Self { ids }
    }

    fn resolve(&self, req: &Request) -> RequestId {
        if let Some(inbound) = req.headers().get(&X_REQUEST_ID).filter(|v| !v.is_empty()) {
            return RequestId(inbound.clone());
        }
        let fresh = (self.ids)();
        match HeaderValue::try_from(fresh) {
            Ok(v) if !v.is_empty() => RequestId(v),
            _ => {
                warn!("request id factory produced an unusable header value, using default");
                RequestId(HeaderValue::from_str(&next_nano_id()).unwrap_or(HeaderValue::from_static("0")))
            }
        }
    }
}

impl Default for Tracing {
    fn default() -> Self {
        Self::new(Arc::new(next_nano_id))
    }
}

impl Middleware for Tracing {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let this = self.clone();
        boxed(move |mut req: Request| {
            let next = Arc::clone(&next);
            let id = this.resolve(&req);
            req.extensions_mut().insert(id.clone());
            async move {
                let mut res = next.call(req).await;
                res.headers_mut().insert(X_REQUEST_ID, id.0);
                res
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use http::Method;

    use super::*;
    use crate::response::Response;

    fn echo_id() -> BoxedHandler {
        boxed(|req: Request| async move {
            match req.request_id() {
                Some(id) => Response::text(id.to_string()),
                None => Response::text("none"),
            }
        })
    }

    fn fixed(id: &'static str) -> Tracing {
        Tracing::new(Arc::new(move || id.to_owned()))
    }

    #[tokio::test]
    async fn inbound_id_is_echoed() {
        let app = fixed("fresh").wrap(echo_id());
        let req = Request::test(Method::GET, "/", &[("x-request-id", "abc123")], "");
        let res = app.call(req).await;
        assert_eq!(res.headers()[X_REQUEST_ID], "abc123");
        assert_eq!(res.body(), b"abc123");
    }

    #[tokio::test]
    async fn missing_id_comes_from_factory() {
        let app = fixed("fixed").wrap(echo_id());
        let res = app.call(Request::get("/")).await;
        assert_eq!(res.headers()[X_REQUEST_ID], "fixed");
        assert_eq!(res.body(), b"fixed");
    }

    #[tokio::test]
    async fn empty_inbound_id_is_replaced() {
        let app = fixed("fixed").wrap(echo_id());
        let req = Request::test(Method::GET, "/", &[("x-request-id", "")], "");
        let res = app.call(req).await;
        assert_eq!(res.headers()[X_REQUEST_ID], "fixed");
    }

    #[tokio::test]
    async fn default_factory_produces_non_empty_ids() {
        let app = Tracing::default().wrap(echo_id());
        let res = app.call(Request::get("/")).await;
        assert!(!res.headers()[X_REQUEST_ID].is_empty());
    }

    #[tokio::test]
    async fn handler_cannot_clobber_the_id() {
        let inner = boxed(|_req: Request| async {
            let mut res = Response::text("hi");
            res.headers_mut().insert(X_REQUEST_ID, HeaderValue::from_static("other"));
            res
        });
        let res = fixed("fixed").wrap(inner).call(Request::get("/")).await;
        assert_eq!(res.headers()[X_REQUEST_ID], "fixed");
    }

    #[test]
    fn nano_ids_are_unique_and_base36() {
        let ids: Vec<String> = (0..1000).map(|_| next_nano_id()).collect();
        let unique: std::collections::HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert!(ids.iter().all(|id| id.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_lowercase())));
    }

    #[test]
    fn base36_digits() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
        assert_eq!(base36(u64::from(u32::MAX)), "1z141z3");
    }
}
