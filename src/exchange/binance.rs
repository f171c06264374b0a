//! Binance spot REST client (`/api/v3/`).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::signing::sign;
use super::types::{
    Account, Balance, CancelledOrder, CreatedOrder, Depth, Kline, Order, Side, SymbolPrice,
};
use super::{Exchange, ExchangeError};
use crate::config::Credentials;

const RECV_WINDOW_MS: u64 = 5000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

type Params<'a> = Vec<(&'a str, String)>;

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

/// Binance REST API client.
///
/// One `reqwest::Client` is reused for connection pooling. Account and
/// order endpoints are signed with HMAC-SHA256; market-data endpoints are
/// public.
pub struct BinanceClient {
    base_url: String,
    api_key: String,
    api_secret: String,
    http: Client,
}

impl BinanceClient {
    pub fn new(credentials: &Credentials) -> Result<Self, ExchangeError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: credentials.base_url.trim_end_matches('/').to_owned(),
            api_key: credentials.api_key.clone(),
            api_secret: credentials.api_secret.clone(),
            http,
        })
    }

    async fn public<T: DeserializeOwned>(&self, path: &str, params: Params<'_>) -> Result<T, ExchangeError> {
        let mut url = format!("{}{}", self.base_url, path);
        if !params.is_empty() {
            url.push('?');
            url.push_str(&serde_urlencoded::to_string(&params)?);
        }
        debug!(path, "binance public request");
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        decode(status, &body)
    }

    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: Params<'_>,
    ) -> Result<T, ExchangeError> {
        let query = signed_query(&self.api_secret, params, now_millis())?;
        let url = format!("{}{}?{}", self.base_url, path, query);
        debug!(%method, path, "binance signed request");
        let resp = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        decode(status, &body)
    }
}

/// Encodes `params` with the receive window and timestamp, then appends the
/// signature over exactly that string.
fn signed_query(secret: &str, mut params: Params<'_>, timestamp: u64) -> Result<String, ExchangeError> {
    params.push(("recvWindow", RECV_WINDOW_MS.to_string()));
    params.push(("timestamp", timestamp.to_string()));
    let query = serde_urlencoded::to_string(&params)?;
    let signature = sign(secret, &query);
    Ok(format!("{query}&signature={signature}"))
}

fn decode<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T, ExchangeError> {
    if !status.is_success() {
        if let Ok(err) = serde_json::from_str::<ApiError>(body) {
            return Err(ExchangeError::Api { code: err.code, msg: err.msg });
        }
        return Err(ExchangeError::Status { status: status.as_u16(), body: body.to_owned() });
    }
    Ok(serde_json::from_str(body)?)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn push_opt<'a>(params: &mut Params<'a>, name: &'a str, value: Option<impl ToString>) {
    if let Some(v) = value {
        params.push((name, v.to_string()));
    }
}

#[async_trait]
impl Exchange for BinanceClient {
    async fn market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: &str,
    ) -> Result<CreatedOrder, ExchangeError> {
        let params = vec![
            ("symbol", symbol.to_owned()),
            ("side", side.as_str().to_owned()),
            ("type", "MARKET".to_owned()),
            ("quantity", quantity.to_owned()),
            ("newOrderRespType", "FULL".to_owned()),
        ];
        self.signed(Method::POST, "/api/v3/order", params).await
    }

    async fn cancel_order(&self, symbol: &str, order_id: i64) -> Result<CancelledOrder, ExchangeError> {
        let params = vec![("symbol", symbol.to_owned()), ("orderId", order_id.to_string())];
        self.signed(Method::DELETE, "/api/v3/order", params).await
    }

    async fn order_status(&self, symbol: &str, order_id: i64) -> Result<Order, ExchangeError> {
        let params = vec![("symbol", symbol.to_owned()), ("orderId", order_id.to_string())];
        self.signed(Method::GET, "/api/v3/order", params).await
    }

    async fn open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>, ExchangeError> {
        let mut params = Params::new();
        push_opt(&mut params, "symbol", symbol);
        self.signed(Method::GET, "/api/v3/openOrders", params).await
    }

    async fn ticker_prices(&self, symbol: Option<&str>) -> Result<Vec<SymbolPrice>, ExchangeError> {
        match symbol {
            // A single-symbol query answers with one object, not a list.
            Some(symbol) => {
                let price: SymbolPrice = self
                    .public("/api/v3/ticker/price", vec![("symbol", symbol.to_owned())])
                    .await?;
                Ok(vec![price])
            }
            None => self.public("/api/v3/ticker/price", Params::new()).await,
        }
    }

    async fn candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: Option<u32>,
    ) -> Result<Vec<Kline>, ExchangeError> {
        let mut params = vec![("symbol", symbol.to_owned()), ("interval", interval.to_owned())];
        push_opt(&mut params, "limit", limit);
        self.public("/api/v3/klines", params).await
    }

    async fn depth(&self, symbol: &str, limit: Option<u32>) -> Result<Depth, ExchangeError> {
        let mut params = vec![("symbol", symbol.to_owned())];
        push_opt(&mut params, "limit", limit);
        self.public("/api/v3/depth", params).await
    }

    async fn account_balance(&self) -> Result<Vec<Balance>, ExchangeError> {
        let account: Account = self.signed(Method::GET, "/api/v3/account", Params::new()).await?;
        Ok(account.balances)
    }
}
