use crate::types::*;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Public Binance REST endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

/// Binance caps klines requests at 1000 rows
const MAX_KLINES_LIMIT: usize = 1000;

/// Lock-free request counters behind `health()`
#[derive(Default)]
struct RequestStats {
    ok: AtomicU64,
    failed: AtomicU64,
    /// Failures since the last success
    failing_streak: AtomicU64,
    /// Sum over successful requests, for the mean
    latency_sum_ms: AtomicU64,
    /// Epoch millis of the last success, 0 if none
    last_ok_at_ms: AtomicU64,
}

impl RequestStats {
    fn ok(&self, latency: Duration) {
        self.ok.fetch_add(1, Ordering::Relaxed);
        self.failing_streak.store(0, Ordering::Relaxed);
        self.latency_sum_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
        self.last_ok_at_ms
            .store(Utc::now().timestamp_millis() as u64, Ordering::Relaxed);
    }

    fn failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.failing_streak.fetch_add(1, Ordering::Relaxed);
    }

    /// At least one success and no failure since
    fn healthy(&self) -> bool {
        self.last_ok_at_ms.load(Ordering::Relaxed) > 0
            && self.failing_streak.load(Ordering::Relaxed) == 0
    }

    fn success_rate(&self) -> f64 {
        let ok = self.ok.load(Ordering::Relaxed);
        match ok + self.failed.load(Ordering::Relaxed) {
            0 => 1.0,
            total => ok as f64 / total as f64,
        }
    }

    fn mean_latency_ms(&self) -> u64 {
        match self.ok.load(Ordering::Relaxed) {
            0 => 0,
            ok => self.latency_sum_ms.load(Ordering::Relaxed) / ok,
        }
    }

    fn last_ok_at(&self) -> Option<DateTime<Utc>> {
        match self.last_ok_at_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => DateTime::from_timestamp_millis(ms as i64),
        }
    }
}

/// Binance spot REST client (public market data only)
pub struct BinanceClient {
    http: Client,
    base_url: String,
    request_timeout: Duration,
    stats: RequestStats,
}

impl BinanceClient {
    /// Create a client against `base_url` (use [`DEFAULT_BASE_URL`] in production)
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| MarketDataError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout,
            stats: RequestStats::default(),
        })
    }

    /// GET `endpoint` and decode the JSON body, recording the outcome.
    ///
    /// Rate limiting (429) is reported as a network error without retrying;
    /// callers poll on a schedule, so the next tick is the retry.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let started = Instant::now();
        let result = self.fetch(endpoint).await;
        match &result {
            Ok(_) => self.stats.ok(started.elapsed()),
            Err(_) => self.stats.failed(),
        }
        result
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("GET {}", url);

        let response = tokio::time::timeout(self.request_timeout, self.http.get(&url).send())
            .await
            .map_err(|_| {
                MarketDataError::Network(format!(
                    "Request to {} timed out after {}s",
                    endpoint,
                    self.request_timeout.as_secs()
                ))
            })?
            .map_err(|e| MarketDataError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                warn!("Binance rate limit hit on {}", endpoint);
            }
            let body = response.text().await.unwrap_or_default();
            return Err(MarketDataError::Network(format!(
                "Binance returned {} for {}: {}",
                status, endpoint, body
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| MarketDataError::Network(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| MarketDataError::Format(e.to_string()))
    }

    /// Get 24h ticker statistics
    pub async fn get_ticker(&self, symbol: &str) -> Result<Ticker> {
        let symbol = symbol.to_uppercase();
        let endpoint = format!("/api/v3/ticker/24hr?symbol={}", symbol);

        let response: Ticker24hResponse = self.get_json(&endpoint).await?;

        let last_price = parse_decimal(&response.last_price, "lastPrice")?;
        if last_price <= Decimal::ZERO {
            return Err(MarketDataError::Format(format!(
                "Non-positive lastPrice '{}' for {}",
                response.last_price, symbol
            )));
        }

        Ok(Ticker {
            symbol,
            last_price,
            high_24h: parse_decimal(&response.high_price, "highPrice")?,
            low_24h: parse_decimal(&response.low_price, "lowPrice")?,
            timestamp: Utc::now(),
        })
    }

    /// Get klines, oldest first
    ///
    /// Row format: `[openTime, "open", "high", "low", "close", "volume", closeTime, ...]`
    pub async fn get_candles(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let endpoint = format!(
            "/api/v3/klines?symbol={}&interval={}&limit={}",
            symbol.to_uppercase(),
            timeframe.as_str(),
            limit.clamp(1, MAX_KLINES_LIMIT)
        );

        let rows: Vec<Vec<Value>> = self.get_json(&endpoint).await?;

        let mut candles = rows
            .iter()
            .map(|row| parse_kline(row))
            .collect::<Result<Vec<_>>>()?;

        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }

    /// Health from the request counters (no API call)
    pub fn health(&self) -> SourceHealth {
        let is_healthy = self.stats.healthy();
        let failing = self.stats.failing_streak.load(Ordering::Relaxed);

        SourceHealth {
            source: "binance".to_string(),
            is_healthy,
            last_success: self.stats.last_ok_at(),
            last_error: (failing > 0).then(|| format!("{} consecutive failed requests", failing)),
            success_rate: self.stats.success_rate(),
            avg_latency_ms: self.stats.mean_latency_ms(),
        }
    }
}

fn parse_decimal(raw: &str, field: &str) -> Result<Decimal> {
    Decimal::from_str(raw)
        .map_err(|e| MarketDataError::Format(format!("Bad {} '{}': {}", field, raw, e)))
}

fn parse_kline(row: &[Value]) -> Result<Candle> {
    if row.len() < 6 {
        return Err(MarketDataError::Format(format!(
            "Kline row has {} fields, expected at least 6",
            row.len()
        )));
    }

    let open_time_ms = row[0]
        .as_i64()
        .ok_or_else(|| MarketDataError::Format("Kline open time is not an integer".to_string()))?;
    let timestamp = DateTime::from_timestamp_millis(open_time_ms).ok_or_else(|| {
        MarketDataError::Format(format!("Kline open time out of range: {}", open_time_ms))
    })?;

    let field = |idx: usize, name: &str| -> Result<Decimal> {
        let raw = row[idx]
            .as_str()
            .ok_or_else(|| MarketDataError::Format(format!("Kline {} is not a string", name)))?;
        parse_decimal(raw, name)
    };

    Ok(Candle {
        timestamp,
        open: field(1, "open")?,
        high: field(2, "high")?,
        low: field(3, "low")?,
        close: field(4, "close")?,
        volume: field(5, "volume")?,
    })
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24hResponse {
    last_price: String,
    high_price: String,
    low_price: String,
}

#[async_trait::async_trait]
impl MarketDataSource for BinanceClient {
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker> {
        BinanceClient::get_ticker(self, symbol).await
    }

    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        BinanceClient::get_candles(self, symbol, timeframe, limit).await
    }

    async fn health(&self) -> SourceHealth {
        BinanceClient::health(self)
    }

    fn name(&self) -> &str {
        "binance"
    }
}
