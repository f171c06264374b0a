//! Signal-driven graceful shutdown.
//!
//! # Graceful shutdown and load balancers
//!
//! The supervisor turns the first SIGINT or SIGTERM into a drain and a single
//! [`ShutdownContext`] that `main` waits on:
//!
//! ```text
//! Armed ──signal──▶ Draining ──drain done──▶ Closed
//! ```
//!
//! On the signal it:
//! 1. drops the signal listeners, so the trigger fires exactly once;
//! 2. marks the process not ready, so `/health` answers 503 and load
//!    balancers stop routing new requests here;
//! 3. logs the start of the shutdown;
//! 4. disables keep-alives, so idle connections close;
//! 5. drains the server within [`DRAIN_BUDGET`]; overrunning it is fatal
//!    and exits the process with status 1;
//! 6. cancels the shutdown context.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::health::Readiness;
use crate::server::ServerHandle;

/// How long in-flight requests get to finish once shutdown starts.
pub const DRAIN_BUDGET: Duration = Duration::from_secs(5);

/// A cancellable signal, resolved exactly when the drain completes.
#[derive(Clone, Debug, Default)]
pub struct ShutdownContext(CancellationToken);

impl ShutdownContext {
    /// A root context that is never cancelled on its own.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context cancelled with this one, or on its own.
    pub fn child(&self) -> Self {
        Self(self.0.child_token())
    }

    pub(crate) fn cancel(&self) {
        self.0.cancel();
    }

    /// Resolves once the context is cancelled.
    pub async fn done(&self) {
        self.0.cancelled().await;
    }

    pub fn is_done(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Drives one graceful shutdown of one server.
pub struct Supervisor {
    server: ServerHandle,
    readiness: Readiness,
    budget: Duration,
}

impl Supervisor {
    pub fn new(server: ServerHandle, readiness: Readiness) -> Self {
        Self { server, readiness, budget: DRAIN_BUDGET }
    }

    /// Spawns the supervisor task and returns the context it will cancel.
    ///
    /// `trigger` starts the shutdown when it resolves. In production it is
    /// [`termination_signal`]; any future works.
    pub fn arm<F>(self, parent: &ShutdownContext, trigger: F) -> ShutdownContext
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let ctx = parent.child();
        let done = ctx.clone();

        tokio::spawn(async move {
            trigger.await;

            self.readiness.mark_not_ready();
            warn!(target: "exgate::server", "server is shutting down");

            self.server.disable_keep_alives();
            if let Err(e) = self.server.shutdown(self.budget).await {
                error!(target: "exgate::server", "could not gracefully shut down the server: {e}");
                std::process::exit(1);
            }

            done.cancel();
        });

        ctx
    }
}

/// Installs SIGINT and SIGTERM listeners and returns a future that resolves
/// on the first of them.
///
/// Installation happens here, not on first poll, so no signal is missed
/// between arming the supervisor and the supervisor task starting. Dropping
/// the future unregisters both listeners. On non-Unix platforms only Ctrl-C
/// is available.
pub fn termination_signal() -> std::io::Result<impl Future<Output = ()> + Send + 'static> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        Ok(async move {
            tokio::select! {
                _ = interrupt.recv() => info!("received SIGINT"),
                _ = terminate.recv() => info!("received SIGTERM"),
            }
        })
    }

    #[cfg(not(unix))]
    {
        Ok(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("received Ctrl-C"),
                Err(e) => {
                    error!("failed to listen for Ctrl-C: {e}");
                    std::future::pending::<()>().await;
                }
            }
        })
    }
}
