use crate::auth::sign_request;
use crate::error::ApiError;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use configuration::ApiConfig;
use core_types::{Holdings, OrderSide, PriceBar, PriceSeries};
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod auth;
pub mod error;
pub mod responses;

// --- Public API ---
pub use responses::{AccountResponse, ApiErrorResponse, BalanceResponse, OrderResponse};

const PRODUCTION_URL: &str = "https://api.binance.com";
const TESTNET_URL: &str = "https://testnet.binance.vision";

/// A market order the engine wants placed.
///
/// The engine only knows a direction and a fraction; turning that into an exchange
/// quantity is the client's job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OrderRequest<'a> {
    pub side: OrderSide,
    pub base: &'a str,
    pub quote: &'a str,
    /// The price the decision was made at; used to size buys.
    pub price_hint: f64,
    /// Fraction of the free balance of the spent currency.
    pub fraction: f64,
}

/// The generic, abstract interface for a trading exchange API client.
/// This trait is the contract that the live engine will use, allowing the
/// underlying implementation (live or mock) to be swapped out.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Fetches the most recent bars of the pair, oldest first. The last bar may
    /// still be forming.
    async fn fetch_bars(
        &self,
        base: &str,
        quote: &str,
        interval_minutes: u32,
    ) -> Result<PriceSeries, ApiError>;

    /// Fetches the free balances of both currencies of the pair. (Authenticated)
    async fn get_holdings(&self, base: &str, quote: &str) -> Result<Holdings, ApiError>;

    /// Places a market order. (Authenticated)
    async fn submit_order(&self, order: &OrderRequest<'_>) -> Result<OrderResponse, ApiError>;
}

/// A concrete implementation of the `ApiClient` for the Binance spot exchange.
#[derive(Clone)]
pub struct BinanceClient {
    client: reqwest::Client,
    base_url: String,
    api_secret: String,
    history_limit: usize,
    quantity_precision: u32,
}

impl BinanceClient {
    /// Talks to the production exchange when `live_mode` is set and to the spot
    /// testnet otherwise.
    pub fn new(live_mode: bool, api_config: &ApiConfig, history_limit: usize) -> Result<Self, ApiError> {
        let base_url = if live_mode { PRODUCTION_URL } else { TESTNET_URL };
        Self::with_base_url(base_url, live_mode, api_config, history_limit)
    }

    pub fn with_base_url(
        base_url: &str,
        live_mode: bool,
        api_config: &ApiConfig,
        history_limit: usize,
    ) -> Result<Self, ApiError> {
        let keys = if live_mode {
            &api_config.production
        } else {
            &api_config.testnet
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            "X-MBX-APIKEY",
            HeaderValue::from_str(&keys.key)
                .map_err(|e| ApiError::InvalidCredentials(e.to_string()))?,
        );

        Ok(Self {
            client: reqwest::Client::builder().default_headers(headers).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_secret: keys.secret.clone(),
            history_limit,
            quantity_precision: api_config.quantity_precision,
        })
    }

    async fn send_signed<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        params: &mut BTreeMap<&str, String>,
    ) -> Result<T, ApiError> {
        params.insert("timestamp", Utc::now().timestamp_millis().to_string());

        let query_string =
            serde_qs::to_string(params).map_err(|e| ApiError::InvalidData(e.to_string()))?;
        let signature = sign_request(&self.api_secret, &query_string)?;

        let url = format!(
            "{}{}?{}&signature={}",
            self.base_url, path, query_string, signature
        );

        let response = self.client.request(method, &url).send().await?;
        parse_response(response).await
    }

    /// Rounds `quantity` down to the exchange's precision.
    fn order_quantity(&self, quantity: Decimal) -> Decimal {
        quantity.round_dp_with_strategy(self.quantity_precision, RoundingStrategy::ToZero)
    }
}

async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    let text = response.text().await?;

    if status.is_success() {
        serde_json::from_str::<T>(&text).map_err(|e| ApiError::Deserialization(e.to_string()))
    } else {
        let api_error: ApiErrorResponse = serde_json::from_str(&text).map_err(|e| {
            ApiError::Deserialization(format!(
                "Failed to deserialize error response: {}. Original text: {}",
                e, text
            ))
        })?;
        Err(ApiError::BinanceError(api_error.code, api_error.msg))
    }
}

/// The Binance interval code for a bar width in minutes.
pub fn interval_code(minutes: u32) -> Result<&'static str, ApiError> {
    let code = match minutes {
        1 => "1m",
        3 => "3m",
        5 => "5m",
        15 => "15m",
        30 => "30m",
        60 => "1h",
        120 => "2h",
        240 => "4h",
        360 => "6h",
        480 => "8h",
        720 => "12h",
        1440 => "1d",
        other => {
            return Err(ApiError::InvalidData(format!(
                "Binance has no {}-minute interval",
                other
            )));
        }
    };
    Ok(code)
}

// Intermediate struct for deserializing klines from Binance API
#[derive(Deserialize)]
struct RawKline(i64, String, String, String, String, String, i64, String, i64, String, String, String);

impl RawKline {
    fn into_bar(self) -> Result<PriceBar, ApiError> {
        let price = |field: &str, raw: &str| {
            raw.parse::<f64>()
                .map_err(|e| ApiError::Deserialization(format!("{} '{}': {}", field, raw, e)))
        };
        Ok(PriceBar {
            timestamp: Utc
                .timestamp_millis_opt(self.0)
                .single()
                .ok_or_else(|| ApiError::InvalidData(format!("Invalid open_time: {}", self.0)))?,
            open: price("open", &self.1)?,
            high: price("high", &self.2)?,
            low: price("low", &self.3)?,
            close: price("close", &self.4)?,
        })
    }
}

#[async_trait]
impl ApiClient for BinanceClient {
    async fn fetch_bars(
        &self,
        base: &str,
        quote: &str,
        interval_minutes: u32,
    ) -> Result<PriceSeries, ApiError> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let symbol = format!("{}{}", base, quote);
        let limit = self.history_limit.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", symbol.as_str()),
                ("interval", interval_code(interval_minutes)?),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;
        let raw: Vec<RawKline> = parse_response(response).await?;

        let bars = raw
            .into_iter()
            .map(RawKline::into_bar)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(%symbol, bars = bars.len(), "Fetched klines");
        PriceSeries::new(bars).map_err(|e| ApiError::InvalidData(e.to_string()))
    }

    async fn get_holdings(&self, base: &str, quote: &str) -> Result<Holdings, ApiError> {
        let mut params = BTreeMap::new();
        let account: AccountResponse = self
            .send_signed(reqwest::Method::GET, "/api/v3/account", &mut params)
            .await?;

        let free = |asset: &str| {
            account
                .balances
                .iter()
                .find(|b| b.asset == asset)
                .map(|b| b.free)
                .unwrap_or(Decimal::ZERO)
        };

        Ok(Holdings {
            base: free(base),
            quote: free(quote),
        })
    }

    async fn submit_order(&self, order: &OrderRequest<'_>) -> Result<OrderResponse, ApiError> {
        let fraction = Decimal::from_f64(order.fraction)
            .ok_or_else(|| ApiError::InvalidOrder(format!("fraction {}", order.fraction)))?;
        let holdings = self.get_holdings(order.base, order.quote).await?;

        let raw_quantity = match order.side {
            OrderSide::Sell => holdings.base * fraction,
            OrderSide::Buy => {
                let price = Decimal::from_f64(order.price_hint)
                    .filter(|p| p.is_sign_positive() && !p.is_zero())
                    .ok_or_else(|| {
                        ApiError::InvalidOrder(format!("price hint {}", order.price_hint))
                    })?;
                holdings.quote * fraction / price
            }
        };
        let quantity = self.order_quantity(raw_quantity);
        if quantity <= Decimal::ZERO {
            return Err(ApiError::InvalidOrder(format!(
                "{:?} quantity rounds to zero (free {} {} / {} {})",
                order.side, holdings.base, order.base, holdings.quote, order.quote
            )));
        }

        let mut params = BTreeMap::new();
        params.insert("symbol", format!("{}{}", order.base, order.quote));
        params.insert(
            "side",
            match order.side {
                OrderSide::Buy => "BUY".to_string(),
                OrderSide::Sell => "SELL".to_string(),
            },
        );
        params.insert("type", "MARKET".to_string());
        params.insert("quantity", quantity.to_string());

        tracing::info!(side = ?order.side, %quantity, price_hint = order.price_hint, "Submitting market order");
        self.send_signed(reqwest::Method::POST, "/api/v3/order", &mut params)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_supported_intervals() {
        assert_eq!(interval_code(15).unwrap(), "15m");
        assert_eq!(interval_code(240).unwrap(), "4h");
        assert!(interval_code(7).is_err());
    }

    #[test]
    fn raw_kline_becomes_bar() {
        let json = r#"[1700000000000,"100.5","101.0","99.5","100.0","12.3",1700000899999,"1230.0",42,"6.0","600.0","0"]"#;
        let raw: RawKline = serde_json::from_str(json).unwrap();
        let bar = raw.into_bar().unwrap();
        assert_eq!(bar.timestamp.timestamp_millis(), 1_700_000_000_000);
        assert_eq!((bar.open, bar.high, bar.low, bar.close), (100.5, 101.0, 99.5, 100.0));
    }

    #[test]
    fn quantity_rounds_down() {
        let client = BinanceClient::new(false, &ApiConfig::default(), 10).unwrap();
        let q = client.order_quantity(Decimal::new(123456789, 8));
        assert_eq!(q, Decimal::new(123456, 5));
    }
}
