//! Exact-path request router.
//!
//! Paths are literal: `/health` matches `/health` and nothing else. A path
//! with no entry of its own falls through to the `/` handler, which makes
//! `/` the catch-all. Methods are not part of the key; handlers that care
//! check the method themselves.

use std::sync::Arc;

use http::StatusCode;
use matchit::Router as MatchitRouter;

use crate::handler::{boxed, BoxedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

const FALLBACK: &str = "/";

/// The route table.
///
/// Build it once at startup, then turn it into the terminal handler of the
/// middleware chain with [`Router::into_handler`]. No route can be added
/// after that.
pub struct Router {
    routes: MatchitRouter<BoxedHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: MatchitRouter::new() }
    }

    /// Register a handler for an exact path. Returns `self` for chaining.
    ///
    /// # Panics
    ///
    /// Panics if `path` is registered twice or contains `{`/`}`, which the
    /// underlying tree reserves for parameters.
    pub fn route(mut self, path: &str, handler: impl Handler) -> Self {
        if path.contains(['{', '}']) {
            panic!("route `{path}` must be a literal path");
        }
        self.routes
            .insert(path, boxed(handler))
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub(crate) fn lookup(&self, path: &str) -> Option<BoxedHandler> {
        let matched = self
            .routes
            .at(path)
            .or_else(|_| self.routes.at(FALLBACK))
            .ok()?;
        Some(Arc::clone(matched.value))
    }

    /// Freezes the table into a handler that dispatches by path.
    ///
    /// Without a `/` route, unknown paths answer `404`.
    pub fn into_handler(self) -> BoxedHandler {
        let router = Arc::new(self);
        boxed(move |req: Request| {
            let router = Arc::clone(&router);
            async move {
                match router.lookup(req.path()) {
                    Some(handler) => handler.call(req).await,
                    None => Response::status(StatusCode::NOT_FOUND),
                }
            }
        })
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn named(req: Request) -> String {
        format!("index saw {}", req.path())
    }

    async fn health(_req: Request) -> &'static str {
        "health"
    }

    async fn call(handler: &BoxedHandler, path: &str) -> Response {
        handler.call(Request::get(path)).await
    }

    #[tokio::test]
    async fn exact_paths_win() {
        let app = Router::new().route("/", named).route("/health", health).into_handler();
        assert_eq!(call(&app, "/health").await.body(), b"health");
        assert_eq!(call(&app, "/").await.body(), b"index saw /");
    }

    #[tokio::test]
    async fn unknown_paths_fall_back_to_root() {
        let app = Router::new().route("/", named).route("/health", health).into_handler();
        assert_eq!(call(&app, "/does-not-exist").await.body(), b"index saw /does-not-exist");
        assert_eq!(call(&app, "/health/extra").await.body(), b"index saw /health/extra");
    }

    #[tokio::test]
    async fn no_root_means_not_found() {
        let app = Router::new().route("/health", health).into_handler();
        assert_eq!(call(&app, "/nope").await.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    #[should_panic(expected = "literal path")]
    fn parameter_syntax_is_rejected() {
        let _ = Router::new().route("/users/{id}", health);
    }
}
