//! HTTP server and graceful drain.
//!
//! # Drain
//!
//! [`ServerHandle::shutdown`] asks a running [`Server`] to drain:
//! 1. The accept loop stops and the listener is closed, so no new
//!    connections are made.
//! 2. Every open connection is told to wind down. Idle keep-alive
//!    connections close at once; busy ones finish the request in flight and
//!    then close.
//! 3. Once the last connection task has finished, [`Server::serve`] returns
//!    and the drain is reported complete.
//!
//! # Timeouts
//!
//! | Timeout | Default | Bound |
//! |---|---|---|
//! | read | 5 s | from the first byte of a request head, then the whole body |
//! | write | 10 s | handler completion; on expiry the connection is aborted and the handler finishes on its own |
//! | idle | 15 s | keep-alive connection with nothing in flight and nothing received |

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config;
use crate::error::{ConnError, Error};
use crate::handler::BoxedHandler;
use crate::request::Request;

/// Per-connection time limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub read: Duration,
    pub write: Duration,
    pub idle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read: Duration::from_secs(5),
            write: Duration::from_secs(10),
            idle: Duration::from_secs(15),
        }
    }
}

struct Shared {
    keep_alives: AtomicBool,
    /// Stops the accept loop.
    stop: CancellationToken,
    /// Tells open connections to close after their current request.
    wind_down: CancellationToken,
    /// Cancelled by `serve` once every connection has finished.
    drained: CancellationToken,
}

/// Controls a [`Server`] from another task.
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

impl ServerHandle {
    /// New connections get no keep-alive; open ones close once their
    /// current request completes.
    pub fn disable_keep_alives(&self) {
        self.shared.keep_alives.store(false, Ordering::Release);
        self.shared.wind_down.cancel();
    }

    pub fn keep_alives_enabled(&self) -> bool {
        self.shared.keep_alives.load(Ordering::Acquire)
    }

    /// Stops accepting and waits up to `budget` for in-flight connections
    /// to finish.
    pub async fn shutdown(&self, budget: Duration) -> Result<(), Error> {
        self.shared.stop.cancel();
        self.shared.wind_down.cancel();
        tokio::time::timeout(budget, self.shared.drained.cancelled())
            .await
            .map_err(|_| Error::DrainTimeout(budget))
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.stop.is_cancelled()
    }
}

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    timeouts: Timeouts,
    handle: ServerHandle,
}

impl Server {
    /// Configures the server to listen on `addr` (`:8080`, `127.0.0.1:3000`,
    /// ...) when [`serve`](Server::serve) is called.
    pub async fn bind(addr: &str) -> Result<Self, Error> {
        Ok(Self::new(config::listen_addr(addr).await?))
    }

    pub fn new(addr: SocketAddr) -> Self {
        let shared = Shared {
            keep_alives: AtomicBool::new(true),
            stop: CancellationToken::new(),
            wind_down: CancellationToken::new(),
            drained: CancellationToken::new(),
        };
        Self {
            addr,
            timeouts: Timeouts::default(),
            handle: ServerHandle { shared: Arc::new(shared) },
        }
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Binds the listener and serves `app` until a drain completes.
    pub async fn serve(self, app: BoxedHandler) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_listener(listener, app).await
    }

    /// Serves `app` on an already bound listener until a drain completes.
    pub async fn serve_listener(self, listener: TcpListener, app: BoxedHandler) -> Result<(), Error> {
        let shared = Arc::clone(&self.handle.shared);
        info!(addr = %listener.local_addr()?, "exgate listening");

        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                // Check the stop signal first so a drain stops accepting at
                // once, even with connections queued.
                biased;

                () = shared.stop.cancelled() => {
                    info!(in_flight = tasks.len(), "shutdown requested, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            continue;
                        }
                    };
                    tasks.spawn(serve_connection(
                        stream,
                        remote_addr,
                        Arc::clone(&app),
                        self.timeouts,
                        Arc::clone(&shared),
                    ));
                }

                // Reap finished connection tasks so the set does not grow
                // without bound.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);
        while tasks.join_next().await.is_some() {}
        shared.drained.cancel();

        info!("all connections drained");
        Ok(())
    }
}

// ── Connections ───────────────────────────────────────────────────────────────

/// What a connection is doing, as seen from its socket and its service.
#[derive(Debug, PartialEq, Eq)]
enum Phase {
    /// A request is being handled.
    Busy,
    /// Bytes of the next request head arrived this long ago.
    ReadingHead(Duration),
    /// Nothing in flight and nothing received for this long.
    Idle(Duration),
}

/// Per-connection bookkeeping shared by the socket wrapper, the service and
/// the connection task.
struct Activity {
    in_flight: AtomicUsize,
    /// End of the last request, or the accept time.
    last: Mutex<Instant>,
    /// First byte of a request head not yet handed to the service.
    head_since: Mutex<Option<Instant>>,
    /// Wakes the connection task when the phase changes.
    changed: Notify,
}

struct Busy<'a>(&'a Activity);

impl Activity {
    fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            last: Mutex::new(Instant::now()),
            head_since: Mutex::new(None),
            changed: Notify::new(),
        }
    }

    fn begin(&self) -> Busy<'_> {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        *lock(&self.head_since) = None;
        Busy(self)
    }

    /// Called for every successful socket read.
    fn received(&self) {
        if self.in_flight.load(Ordering::Acquire) > 0 {
            return;
        }
        let mut head_since = lock(&self.head_since);
        if head_since.is_none() {
            *head_since = Some(Instant::now());
            self.changed.notify_one();
        }
    }

    fn phase(&self) -> Phase {
        if self.in_flight.load(Ordering::Acquire) > 0 {
            return Phase::Busy;
        }
        if let Some(since) = *lock(&self.head_since) {
            return Phase::ReadingHead(since.elapsed());
        }
        Phase::Idle(lock(&self.last).elapsed())
    }
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        *lock(&self.0.last) = Instant::now();
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.0.changed.notify_one();
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A socket that reports reads to the connection's [`Activity`].
struct Metered {
    stream: TcpStream,
    activity: Arc<Activity>,
}

impl AsyncRead for Metered {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let polled = Pin::new(&mut self.stream).poll_read(cx, buf);
        if matches!(polled, Poll::Ready(Ok(()))) && buf.filled().len() > before {
            self.activity.received();
        }
        polled
    }
}

impl AsyncWrite for Metered {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, data: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, data)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

async fn serve_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    app: BoxedHandler,
    timeouts: Timeouts,
    shared: Arc<Shared>,
) {
    let activity = Arc::new(Activity::new());

    // Called once per request on the connection, not once per connection.
    let svc = {
        let activity = Arc::clone(&activity);
        service_fn(move |req: hyper::Request<Incoming>| {
            let app = Arc::clone(&app);
            let activity = Arc::clone(&activity);
            async move {
                let _busy = activity.begin();
                dispatch(app, req, remote_addr, timeouts).await
            }
        })
    };

    // The read and idle bounds are enforced below. hyper's own header timer
    // also runs while a kept-alive connection waits, so it only backstops
    // both.
    let mut builder = ConnBuilder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(timeouts.idle + timeouts.read)
        .keep_alive(shared.keep_alives.load(Ordering::Acquire));

    let io = Metered { stream, activity: Arc::clone(&activity) };
    let conn = builder.serve_connection(TokioIo::new(io), svc);
    tokio::pin!(conn);

    let mut closing = false;
    loop {
        let next_check = match activity.phase() {
            Phase::ReadingHead(waited) => timeouts.read.saturating_sub(waited),
            Phase::Idle(idle) if !closing => timeouts.idle.saturating_sub(idle),
            Phase::Idle(_) | Phase::Busy => timeouts.read,
        };

        tokio::select! {
            res = conn.as_mut() => {
                if let Err(e) = res {
                    debug!(peer = %remote_addr, "connection closed: {e}");
                }
                break;
            }

            () = shared.wind_down.cancelled(), if !closing => {
                closing = true;
                conn.as_mut().graceful_shutdown();
            }

            () = activity.changed.notified() => {}

            () = tokio::time::sleep(next_check) => match activity.phase() {
                Phase::ReadingHead(waited) if waited >= timeouts.read => {
                    debug!(peer = %remote_addr, "request head not received within {:?}, aborting", timeouts.read);
                    break;
                }
                Phase::Idle(idle) if idle >= timeouts.idle && !closing => {
                    debug!(peer = %remote_addr, "closing idle connection");
                    closing = true;
                    conn.as_mut().graceful_shutdown();
                }
                _ => {}
            },
        }
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Reads one request and runs it through `app`.
///
/// The handler runs on its own task and always completes, so the middleware
/// chain sees every request through. An error tells hyper to abort the
/// connection without a response: the body did not arrive in time, the
/// handler overran the write timeout, or the handler panicked.
async fn dispatch(
    app: BoxedHandler,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
    timeouts: Timeouts,
) -> Result<http::Response<Full<Bytes>>, ConnError> {
    let (parts, body) = req.into_parts();

    let body = match tokio::time::timeout(timeouts.read, body.collect()).await {
        Ok(collected) => collected?.to_bytes(),
        Err(_) => {
            debug!(peer = %remote_addr, "request body read timed out");
            return Err(ConnError::ReadTimeout(timeouts.read));
        }
    };

    let req = Request::new(parts.method, parts.uri, parts.headers, body, remote_addr);
    let handling = tokio::spawn(app.call(req));

    match tokio::time::timeout(timeouts.write, handling).await {
        Ok(Ok(res)) => Ok(res.into_inner()),
        Ok(Err(e)) => {
            error!(peer = %remote_addr, "handler failed, closing connection: {e}");
            Err(ConnError::Handler(e))
        }
        Err(_) => {
            warn!(peer = %remote_addr, "handler exceeded the write timeout, closing connection");
            Err(ConnError::WriteTimeout(timeouts.write))
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::handler::boxed;
    use crate::middleware::{AccessLog, Chain, Tracing};
    use crate::testing::capture_logs;

    const GET: &[u8] = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";

    async fn start(app: BoxedHandler, timeouts: Timeouts) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(Server::new(addr).timeouts(timeouts).serve_listener(listener, app));
        addr
    }

    fn ok() -> BoxedHandler {
        boxed(|_req: Request| async { "ok" })
    }

    /// Reads one `ok` response, or `None` once the server closed the socket.
    async fn read_ok(stream: &mut TcpStream) -> Option<String> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = tokio::time::timeout(Duration::from_secs(3), stream.read(&mut chunk))
                .await
                .expect("server neither answered nor closed")
                .ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);
            if buf.ends_with(b"ok") {
                return Some(String::from_utf8_lossy(&buf).into_owned());
            }
        }
    }

    #[test]
    fn default_timeouts() {
        let t = Timeouts::default();
        assert_eq!(t.read, Duration::from_secs(5));
        assert_eq!(t.write, Duration::from_secs(10));
        assert_eq!(t.idle, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn bind_accepts_a_bare_port() {
        let server = Server::bind(":8080").await.unwrap();
        assert_eq!(server.addr().port(), 8080);
        assert!(server.addr().ip().is_unspecified());
    }

    #[test]
    fn activity_phases() {
        let activity = Activity::new();
        assert!(matches!(activity.phase(), Phase::Idle(_)));

        activity.received();
        assert!(matches!(activity.phase(), Phase::ReadingHead(_)));

        let busy = activity.begin();
        assert_eq!(activity.phase(), Phase::Busy);
        activity.received();
        assert_eq!(activity.phase(), Phase::Busy);

        drop(busy);
        std::thread::sleep(Duration::from_millis(5));
        match activity.phase() {
            Phase::Idle(idle) => assert!(idle >= Duration::from_millis(5)),
            other => panic!("expected idle, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn keep_alive_outlives_the_read_timeout() {
        let timeouts = Timeouts {
            read: Duration::from_millis(300),
            write: Duration::from_secs(1),
            idle: Duration::from_millis(900),
        };
        let addr = start(ok(), timeouts).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream.write_all(GET).await.unwrap();
        assert!(read_ok(&mut stream).await.unwrap().starts_with("HTTP/1.1 200 OK"));

        // Idle past the read timeout but within the idle timeout.
        tokio::time::sleep(Duration::from_millis(600)).await;
        stream.write_all(GET).await.unwrap();
        assert!(read_ok(&mut stream).await.unwrap().starts_with("HTTP/1.1 200 OK"));

        // Idle past the idle timeout.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let _ = stream.write_all(GET).await;
        assert_eq!(read_ok(&mut stream).await, None);
    }

    #[tokio::test]
    async fn partial_request_head_is_aborted_after_the_read_timeout() {
        let timeouts = Timeouts {
            read: Duration::from_millis(200),
            write: Duration::from_secs(1),
            idle: Duration::from_secs(5),
        };
        let addr = start(ok(), timeouts).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();

        assert_eq!(read_ok(&mut stream).await, None);
    }

    #[tokio::test]
    async fn handler_overrunning_the_write_timeout_still_completes_and_logs() {
        let (logs, _guard) = capture_logs();
        let slow = boxed(|_req: Request| async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            "ok"
        });
        let app = Chain::new()
            .with(Tracing::new(Arc::new(|| "slow-1".to_owned())))
            .with(AccessLog)
            .apply(slow);
        let timeouts = Timeouts { write: Duration::from_millis(150), ..Timeouts::default() };
        let addr = start(app, timeouts).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream.write_all(GET).await.unwrap();
        assert_eq!(read_ok(&mut stream).await, None);

        tokio::time::sleep(Duration::from_millis(600)).await;
        let lines = logs.lines();
        assert_eq!(lines.len(), 1, "{lines:?}");
        assert!(lines[0].contains("request_id=slow-1"), "{}", lines[0]);
        assert!(lines[0].contains("status=200"), "{}", lines[0]);
    }

    #[tokio::test]
    async fn shutdown_of_a_server_that_never_ran_times_out() {
        let server = Server::new("127.0.0.1:0".parse().unwrap());
        let err = server.handle().shutdown(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, Error::DrainTimeout(_)));
    }

    #[test]
    fn disabling_keep_alives_is_visible_through_every_handle() {
        let server = Server::new("127.0.0.1:0".parse().unwrap());
        let a = server.handle();
        let b = server.handle();
        assert!(a.keep_alives_enabled());
        b.disable_keep_alives();
        assert!(!a.keep_alives_enabled());
        assert!(!a.is_shutting_down());
    }
}
