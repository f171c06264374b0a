//! Access logging.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::info;

use crate::handler::{boxed, BoxedHandler};
use crate::middleware::{Middleware, X_REQUEST_ID};
use crate::request::Request;

/// Emits exactly one record per completed request.
///
/// The record carries the request id, method, path, remote address, user
/// agent, status and elapsed time. It is written after the inner handler
/// returns, or while a panic from the inner handler unwinds (the panic then
/// continues). Requests without a resolved id log `unknown`.
#[derive(Clone, Copy, Debug, Default)]
pub struct AccessLog;

impl Middleware for AccessLog {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        boxed(move |req: Request| {
            let next = Arc::clone(&next);
            let start = Instant::now();
            let request_id = req.request_id().map(ToString::to_string);
            let method = req.method().clone();
            let path = req.path().to_owned();
            let remote_addr = req.remote_addr();
            let user_agent = req.user_agent().to_owned();

            async move {
                let outcome = AssertUnwindSafe(next.call(req)).catch_unwind().await;

                let request_id = request_id
                    .or_else(|| {
                        outcome
                            .as_ref()
                            .ok()
                            .and_then(|res| res.headers().get(&X_REQUEST_ID))
                            .filter(|v| !v.is_empty())
                            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                    })
                    .unwrap_or_else(|| "unknown".to_owned());
                let status = outcome.as_ref().map_or(0, |res| res.status_code().as_u16());

                info!(
                    target: "exgate::access",
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    remote_addr = %remote_addr,
                    user_agent = %user_agent,
                    status,
                    elapsed = ?start.elapsed(),
                );

                match outcome {
                    Ok(res) => res,
                    Err(payload) => panic::resume_unwind(payload),
                }
            }
        })
    }
}
