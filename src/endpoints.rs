//! Exchange endpoints.
//!
//! Each handler reads form values, calls the exchange adapter once, and
//! replies with the adapter's result as JSON. Failures become plain-text
//! error responses: 400 for bad input, 405 for the wrong method, 500 when
//! the exchange call fails.

use std::str::FromStr;
use std::sync::Arc;

use http::{Method, StatusCode};
use tracing::warn;

use crate::controller::Controller;
use crate::exchange::{
    Balance, CancelledOrder, CreatedOrder, Depth, ExchangeError, Kline, Order, Side, SymbolPrice,
};
use crate::request::{Form, Request};
use crate::response::{IntoResponse, Json, Response};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("POST only")]
    PostOnly,

    #[error(transparent)]
    Upstream(#[from] ExchangeError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PostOnly => StatusCode::METHOD_NOT_ALLOWED,
            Self::Upstream(e) => {
                warn!("exchange call failed: {e}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Response::error(status, self.to_string())
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Rejects anything but POST, then parses the form.
fn post_form(req: &Request) -> Result<Form, ApiError> {
    if req.method() != Method::POST {
        return Err(ApiError::PostOnly);
    }
    any_form(req)
}

fn any_form(req: &Request) -> Result<Form, ApiError> {
    req.form().map_err(|e| ApiError::BadRequest(format!("malformed form: {e}")))
}

/// Every named field, or a 400 naming all of them.
fn required<'f, const N: usize>(form: &'f Form, names: [&str; N]) -> Result<[&'f str; N], ApiError> {
    let mut values = [""; N];
    for (slot, name) in values.iter_mut().zip(names) {
        *slot = form.get(name).ok_or_else(|| {
            ApiError::BadRequest(format!("Invalid Input, {} must be provided", names.join(", ")))
        })?;
    }
    Ok(values)
}

fn parse<T: FromStr>(name: &str, value: &str) -> Result<T, ApiError> {
    value
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid Input, {name} must be an integer")))
}

fn optional<T: FromStr>(form: &Form, name: &str) -> Result<Option<T>, ApiError> {
    form.get(name).map(|v| parse(name, v)).transpose()
}

/// `POST /marketOrder`: `symbol`, `order` (`BUY`/`SELL`), `quantity`.
pub async fn market_order(ctrl: Arc<Controller>, req: Request) -> ApiResult<CreatedOrder> {
    let form = post_form(&req)?;
    let [symbol, order, quantity] = required(&form, ["symbol", "order", "quantity"])?;
    let side: Side = order.parse().map_err(ApiError::BadRequest)?;
    Ok(Json(ctrl.exchange().market_order(symbol, side, quantity).await?))
}

/// `POST /cancelOrder`: `symbol`, `orderId`.
pub async fn cancel_order(ctrl: Arc<Controller>, req: Request) -> ApiResult<CancelledOrder> {
    let form = post_form(&req)?;
    let [symbol, order_id] = required(&form, ["symbol", "orderId"])?;
    let order_id = parse("orderId", order_id)?;
    Ok(Json(ctrl.exchange().cancel_order(symbol, order_id).await?))
}

/// `POST /orderStatus`: `symbol`, `orderId`.
pub async fn order_status(ctrl: Arc<Controller>, req: Request) -> ApiResult<Order> {
    let form = post_form(&req)?;
    let [symbol, order_id] = required(&form, ["symbol", "orderId"])?;
    let order_id = parse("orderId", order_id)?;
    Ok(Json(ctrl.exchange().order_status(symbol, order_id).await?))
}

/// `/openOrders`: optional `symbol`; any method.
pub async fn open_orders(ctrl: Arc<Controller>, req: Request) -> ApiResult<Vec<Order>> {
    let form = any_form(&req)?;
    Ok(Json(ctrl.exchange().open_orders(form.get("symbol")).await?))
}

/// `POST /tickerPrices`: optional `symbol`.
pub async fn ticker_prices(ctrl: Arc<Controller>, req: Request) -> ApiResult<Vec<SymbolPrice>> {
    let form = post_form(&req)?;
    Ok(Json(ctrl.exchange().ticker_prices(form.get("symbol")).await?))
}

/// `POST /candles`: `symbol`, `interval`, optional `limit`.
pub async fn candles(ctrl: Arc<Controller>, req: Request) -> ApiResult<Vec<Kline>> {
    let form = post_form(&req)?;
    let [symbol, interval] = required(&form, ["symbol", "interval"])?;
    let limit = optional(&form, "limit")?;
    Ok(Json(ctrl.exchange().candles(symbol, interval, limit).await?))
}

/// `POST /symbolDepth`: `symbol`, optional `limit`.
pub async fn symbol_depth(ctrl: Arc<Controller>, req: Request) -> ApiResult<Depth> {
    let form = post_form(&req)?;
    let [symbol] = required(&form, ["symbol"])?;
    let limit = optional(&form, "limit")?;
    Ok(Json(ctrl.exchange().depth(symbol, limit).await?))
}

/// `/accountBalance`: any method.
pub async fn account_balance(ctrl: Arc<Controller>, _req: Request) -> ApiResult<Vec<Balance>> {
    Ok(Json(ctrl.exchange().account_balance().await?))
}
