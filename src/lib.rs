//! # exgate
//!
//! A local HTTP gateway that republishes a subset of the Binance spot API
//! as a handful of form-driven endpoints.
//!
//! Every request passes through the same middleware chain before reaching
//! its endpoint:
//!
//! ```text
//! client ─▶ Tracing ─▶ AccessLog ─▶ Router ─▶ endpoint ─▶ Binance
//!            │           │
//!            │           └─ one access record per request, after the reply
//!            └─ X-Request-Id reused from the client or generated
//! ```
//!
//! `/health` answers 200 with the uptime while the process is ready and 503
//! otherwise. On SIGINT or SIGTERM the [`Supervisor`] flips readiness off,
//! disables keep-alives, and drains in-flight requests for up to five
//! seconds before the process exits.
//!
//! ## Wiring it up
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use exgate::config::Credentials;
//! use exgate::exchange::BinanceClient;
//! use exgate::middleware::next_nano_id;
//! use exgate::{Controller, Server, ShutdownContext, Supervisor};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = BinanceClient::new(&Credentials::from_env()?)?;
//! let ctrl = Controller::new(Arc::new(client), Arc::new(next_nano_id));
//!
//! let server = Server::bind(":8080").await?;
//! let done = Supervisor::new(server.handle(), ctrl.readiness().clone())
//!     .arm(&ShutdownContext::background(), exgate::supervisor::termination_signal()?);
//!
//! ctrl.readiness().mark_ready();
//! server.serve(ctrl.app()).await?;
//! done.done().await;
//! # Ok(())
//! # }
//! ```

mod controller;
mod endpoints;
mod error;
mod handler;
mod health;
mod request;
mod response;
mod router;
mod server;

pub mod config;
pub mod exchange;
pub mod logging;
pub mod middleware;
pub mod supervisor;

#[cfg(test)]
mod testing;

pub use controller::Controller;
pub use endpoints::ApiError;
pub use error::Error;
pub use handler::{boxed, BoxFuture, BoxedHandler, ErasedHandler, Handler};
pub use health::Readiness;
pub use request::{Form, Request};
pub use response::{IntoResponse, Json, Response};
pub use router::Router;
pub use server::{Server, ServerHandle, Timeouts};
pub use supervisor::{ShutdownContext, Supervisor, DRAIN_BUDGET};
