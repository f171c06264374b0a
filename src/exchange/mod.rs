//! The remote exchange, as seen by the gateway.
//!
//! [`Exchange`] is the narrow capability the endpoint handlers use.
//! [`BinanceClient`] implements it against the Binance spot REST API; tests
//! substitute their own implementation.

mod binance;
mod signing;
mod types;

use async_trait::async_trait;

pub use binance::BinanceClient;
pub use signing::sign;
pub use types::{
    Balance, CancelledOrder, CreatedOrder, Depth, Fill, Kline, Order, PriceLevel, Side,
    SymbolPrice,
};

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("binance api error {code}: {msg}")]
    Api { code: i64, msg: String },

    #[error("binance http {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_urlencoded::ser::Error),
}

/// Typed operations against the exchange.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Places a market order for `quantity` units of `symbol`.
    async fn market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: &str,
    ) -> Result<CreatedOrder, ExchangeError>;

    async fn cancel_order(&self, symbol: &str, order_id: i64) -> Result<CancelledOrder, ExchangeError>;

    async fn order_status(&self, symbol: &str, order_id: i64) -> Result<Order, ExchangeError>;

    /// Open orders for `symbol`, or for every symbol when `None`.
    async fn open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>, ExchangeError>;

    /// Latest prices for `symbol`, or for every symbol when `None`.
    async fn ticker_prices(&self, symbol: Option<&str>) -> Result<Vec<SymbolPrice>, ExchangeError>;

    async fn candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: Option<u32>,
    ) -> Result<Vec<Kline>, ExchangeError>;

    async fn depth(&self, symbol: &str, limit: Option<u32>) -> Result<Depth, ExchangeError>;

    async fn account_balance(&self) -> Result<Vec<Balance>, ExchangeError>;
}
