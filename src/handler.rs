//! Handlers and their erased form.
//!
//! Endpoints are plain async functions of a [`Request`]. The route table and
//! every middleware layer need to store them side by side, so each one is
//! erased once, at registration, into a [`BoxedHandler`]:
//!
//! ```text
//! async fn market_order(..) -> Result<Json<_>, ApiError>
//!        │  Router::route / boxed()
//!        ▼
//! Arc<Erased<F>>  as  Arc<dyn ErasedHandler>
//!        │  .call(req) per request
//!        ▼
//! BoxFuture ─▶ Response
//! ```
//!
//! Middleware only ever sees the erased form: it takes the inner
//! `BoxedHandler` and returns another one.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// The future every erased handler returns.
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Object-safe handler interface.
pub trait ErasedHandler: Send + Sync + 'static {
    fn call(&self, req: Request) -> BoxFuture;
}

/// A handler shared by every connection task.
pub type BoxedHandler = Arc<dyn ErasedHandler>;

/// Anything that can serve a request: `Fn(Request) -> impl Future<Output:
/// IntoResponse>`.
///
/// Sealed. The closure impl below is the only one.
pub trait Handler: sealed::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn erase(self) -> BoxedHandler;
}

mod sealed {
    pub trait Sealed {}
}

impl<F, Fut> sealed::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoResponse,
{
}

impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoResponse,
{
    fn erase(self) -> BoxedHandler {
        Arc::new(Erased(self))
    }
}

/// Erases `handler` so middleware can wrap it or a server can run it.
pub fn boxed(handler: impl Handler) -> BoxedHandler {
    handler.erase()
}

struct Erased<F>(F);

impl<F, Fut> ErasedHandler for Erased<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoResponse,
{
    fn call(&self, req: Request) -> BoxFuture {
        let pending = (self.0)(req);
        Box::pin(async move { pending.await.into_response() })
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;

    #[tokio::test]
    async fn closures_and_fns_erase_alike() {
        async fn teapot(_req: Request) -> StatusCode {
            StatusCode::IM_A_TEAPOT
        }

        let from_fn = boxed(teapot);
        let from_closure = boxed(|req: Request| async move { req.path().to_owned() });

        assert_eq!(from_fn.call(Request::get("/")).await.status_code(), StatusCode::IM_A_TEAPOT);
        assert_eq!(from_closure.call(Request::get("/x")).await.body(), b"/x");
    }
}
