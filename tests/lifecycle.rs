//! End-to-end: real sockets, the full middleware chain, and a drain.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use exgate::config::Credentials;
use exgate::exchange::BinanceClient;
use exgate::middleware::next_nano_id;
use exgate::{Controller, Request, Server, ShutdownContext, Supervisor};
use http::StatusCode;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

fn controller() -> Arc<Controller> {
    // Nothing listens on the discard port; no test here reaches the exchange.
    let credentials = Credentials {
        api_key: "key".into(),
        api_secret: "secret".into(),
        base_url: "http://127.0.0.1:9".into(),
    };
    let client = BinanceClient::new(&credentials).unwrap();
    Controller::new(Arc::new(client), Arc::new(next_nano_id))
}

struct Running {
    addr: SocketAddr,
    ctrl: Arc<Controller>,
    trigger: oneshot::Sender<()>,
    done: ShutdownContext,
    serving: tokio::task::JoinHandle<Result<(), exgate::Error>>,
}

async fn start() -> Running {
    let ctrl = controller();
    let routes = ctrl.routes().route("/slow", |_req: Request| async {
        tokio::time::sleep(Duration::from_millis(800)).await;
        "done"
    });
    let app = ctrl.middleware().apply(routes.into_handler());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::new(addr);

    let (trigger, rx) = oneshot::channel::<()>();
    let done = Supervisor::new(server.handle(), ctrl.readiness().clone()).arm(
        &ShutdownContext::background(),
        async move {
            let _ = rx.await;
        },
    );

    ctrl.readiness().mark_ready();
    let serving = tokio::spawn(server.serve_listener(listener, app));

    Running { addr, ctrl, trigger, done, serving }
}

fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_carries_a_request_id() {
    let app = start().await;

    let res = reqwest::get(url(app.addr, "/health")).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let id = res.headers().get("x-request-id").unwrap().to_str().unwrap().to_owned();
    assert!(!id.is_empty());
    assert!(res.text().await.unwrap().starts_with("uptime: "));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn inbound_request_id_is_echoed() {
    let app = start().await;

    let res = reqwest::Client::new()
        .get(url(app.addr, "/health"))
        .header("X-Request-Id", "trace-me-42")
        .send()
        .await
        .unwrap();

    assert_eq!(res.headers()["x-request-id"], "trace-me-42");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_path_is_404() {
    let app = start().await;

    let res = reqwest::get(url(app.addr, "/no/such/thing")).await.unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.text().await.unwrap(), "404 page not found\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn get_on_a_post_endpoint_is_405() {
    let app = start().await;

    let res = reqwest::get(url(app.addr, "/marketOrder")).await.unwrap();

    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.text().await.unwrap(), "POST only\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_drains_in_flight_requests() {
    let app = start().await;
    let slow_url = url(app.addr, "/slow");
    let slow = tokio::spawn(async move { reqwest::get(slow_url).await });

    // Let the slow request reach its handler.
    tokio::time::sleep(Duration::from_millis(200)).await;
    app.trigger.send(()).unwrap();

    tokio::time::timeout(Duration::from_secs(6), app.done.done())
        .await
        .expect("drain should finish within the budget");

    assert!(!app.ctrl.readiness().is_ready());
    assert_eq!(app.ctrl.readiness().probe().status_code(), StatusCode::SERVICE_UNAVAILABLE);

    let res = slow.await.unwrap().unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "done");

    app.serving.await.unwrap().unwrap();

    let fresh = reqwest::Client::builder().pool_max_idle_per_host(0).build().unwrap();
    assert!(fresh.get(url(app.addr, "/health")).send().await.is_err());
}
