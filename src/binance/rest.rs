use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::AppError;
use crate::price_source::PriceSource;

use super::types::{BinanceApiErrorResponse, TickerPriceResponse};

// Public market-data endpoints are weighted against 6000/min; warn at 80%.
const REQUEST_WARN_PER_MINUTE: u64 = 4800;

pub struct BinanceRestClient {
    http: reqwest::Client,
    base_url: String,
    // Simple rate tracking: request count in current minute window
    request_count: AtomicU64,
    window_start: std::sync::Mutex<Instant>,
}

impl BinanceRestClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_count: AtomicU64::new(0),
            window_start: std::sync::Mutex::new(Instant::now()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn check_rate_limit(&self) {
        if let Ok(mut start) = self.window_start.lock() {
            if start.elapsed().as_secs() >= 60 {
                *start = Instant::now();
                self.request_count.store(0, Ordering::Relaxed);
            }
        }
        let count = self.request_count.fetch_add(1, Ordering::Relaxed);
        if count > REQUEST_WARN_PER_MINUTE {
            tracing::warn!(count, "Approaching Binance request budget");
        }
    }

    pub async fn ping(&self) -> Result<(), AppError> {
        let url = format!("{}/api/v3/ping", self.base_url);
        self.http.get(&url).send().await?.error_for_status()?;
        Ok(())
    }

    /// Latest traded price for `symbol`. Non-finite or non-positive prices
    /// are rejected.
    pub async fn ticker_price(&self, symbol: &str) -> Result<f64, AppError> {
        self.check_rate_limit();

        let url = format!("{}/api/v3/ticker/price", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<BinanceApiErrorResponse>(&body) {
                return Err(AppError::BinanceApi {
                    code: err.code,
                    msg: err.msg,
                });
            }
            return Err(AppError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let ticker: TickerPriceResponse = serde_json::from_str(&body)?;
        if !ticker.price.is_finite() || ticker.price <= 0.0 {
            return Err(AppError::UnusablePrice {
                symbol: symbol.to_string(),
                price: ticker.price,
            });
        }
        Ok(ticker.price)
    }
}

impl PriceSource for BinanceRestClient {
    async fn fetch_real_price(&self, symbol: &str) -> Option<f64> {
        match self.ticker_price(symbol).await {
            Ok(price) => Some(price),
            Err(e) => {
                tracing::warn!(symbol, error = %e, "Real price unavailable");
                None
            }
        }
    }
}
