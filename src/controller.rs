//! Process-wide request state and the route table.

use std::future::Future;
use std::sync::Arc;

use http::StatusCode;

use crate::endpoints;
use crate::exchange::Exchange;
use crate::handler::{BoxedHandler, Handler};
use crate::health::Readiness;
use crate::middleware::{AccessLog, Chain, IdFactory, Tracing};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// Owns the state every handler shares: the exchange adapter, the
/// request-id factory and the readiness word.
///
/// Everything but readiness is fixed at construction. Handlers hold an
/// `Arc<Controller>` and read freely.
pub struct Controller {
    exchange: Arc<dyn Exchange>,
    ids: IdFactory,
    readiness: Readiness,
}

impl Controller {
    /// A controller that starts not ready.
    pub fn new(exchange: Arc<dyn Exchange>, ids: IdFactory) -> Arc<Self> {
        Arc::new(Self { exchange, ids, readiness: Readiness::new() })
    }

    pub fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    pub fn exchange(&self) -> &dyn Exchange {
        self.exchange.as_ref()
    }

    /// `[tracing, logging]`, outermost first.
    pub fn middleware(&self) -> Chain {
        Chain::new()
            .with(Tracing::new(Arc::clone(&self.ids)))
            .with(AccessLog)
    }

    pub fn routes(self: &Arc<Self>) -> crate::Router {
        crate::Router::new()
            .route("/", with(self, index))
            .route("/health", with(self, health))
            .route("/marketOrder", with(self, endpoints::market_order))
            .route("/cancelOrder", with(self, endpoints::cancel_order))
            .route("/orderStatus", with(self, endpoints::order_status))
            .route("/openOrders", with(self, endpoints::open_orders))
            .route("/tickerPrices", with(self, endpoints::ticker_prices))
            .route("/candles", with(self, endpoints::candles))
            .route("/symbolDepth", with(self, endpoints::symbol_depth))
            .route("/accountBalance", with(self, endpoints::account_balance))
    }

    /// The route table wrapped in the middleware chain, ready to serve.
    pub fn app(self: &Arc<Self>) -> BoxedHandler {
        self.middleware().apply(self.routes().into_handler())
    }
}

/// Binds a controller method-style handler to a shared controller.
fn with<F, Fut, R>(ctrl: &Arc<Controller>, f: F) -> impl Handler + use<F, Fut, R>
where
    F: Fn(Arc<Controller>, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    let ctrl = Arc::clone(ctrl);
    move |req: Request| f(Arc::clone(&ctrl), req)
}

/// `/`: empty 200 for the root itself, 404 for anything that fell through.
async fn index(_ctrl: Arc<Controller>, req: Request) -> Response {
    if req.path() != "/" {
        return Response::error(StatusCode::NOT_FOUND, "404 page not found");
    }
    Response::status(StatusCode::OK)
}

async fn health(ctrl: Arc<Controller>, _req: Request) -> Response {
    ctrl.readiness.probe()
}
