//! Middleware layer.
//!
//! A [`Middleware`] turns an inner handler into an outer one. A [`Chain`] is
//! an ordered list of them; applying it wraps from the tail inward so the
//! *first* entry ends up *outermost*:
//!
//! ```text
//! Chain [A, B] applied to H  ==  A(B(H))
//!
//! ingress:  A → B → H
//! egress:   H → B → A
//! ```
//!
//! Built-in middleware:
//! - [`Tracing`]: resolves the `X-Request-Id` of every request
//! - [`AccessLog`]: one log record per completed request
//!
//! Install them as `[Tracing, AccessLog]` so every access record carries the
//! resolved request id.

mod access_log;
mod trace;

use std::sync::Arc;

use crate::handler::BoxedHandler;

pub use access_log::AccessLog;
pub use trace::{next_nano_id, IdFactory, RequestId, Tracing, X_REQUEST_ID};

/// A handler decorator.
///
/// Implemented for plain closures `Fn(BoxedHandler) -> BoxedHandler`.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

impl<F> Middleware for F
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        self(next)
    }
}

/// An ordered sequence of middleware. Head is outermost.
#[derive(Clone, Default)]
pub struct Chain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `layer` as the new innermost entry.
    pub fn with(mut self, layer: impl Middleware) -> Self {
        self.layers.push(Arc::new(layer));
        self
    }

    pub fn len(&self) -> usize { self.layers.len() }
    pub fn is_empty(&self) -> bool { self.layers.is_empty() }

    /// Wraps `terminal` in every layer. An empty chain returns it unchanged.
    pub fn apply(&self, terminal: BoxedHandler) -> BoxedHandler {
        self.layers
            .iter()
            .rev()
            .fold(terminal, |inner, layer| layer.wrap(inner))
    }
}
