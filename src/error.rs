//! Unified error type.

use std::time::Duration;

use crate::config::ConfigError;
use crate::exchange::ExchangeError;

/// The error type returned by exgate's fallible infrastructure operations.
///
/// Application-level errors (400, 405, 500 from an endpoint) are expressed as
/// HTTP [`Response`](crate::Response) values, not as `Error`s. This type
/// surfaces failures that stop the process, such as a missing credential, a
/// port that cannot be bound, or a drain that overruns its budget.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("exchange client: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("invalid listen address `{0}`")]
    InvalidAddress(String),

    #[error("graceful drain did not finish within {0:?}")]
    DrainTimeout(Duration),
}

/// Reasons a single connection is aborted without a response.
///
/// Returned to hyper from the per-request service, which closes the
/// connection. Never shown to a client.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ConnError {
    #[error("request body not received within {0:?}")]
    ReadTimeout(Duration),

    #[error("failed to read request body: {0}")]
    Body(#[from] hyper::Error),

    #[error("handler did not complete within {0:?}")]
    WriteTimeout(Duration),

    #[error("handler task failed: {0}")]
    Handler(tokio::task::JoinError),
}
