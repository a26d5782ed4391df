use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::coin::{find_coin, normalize_symbol};
use crate::price_store::{validate_table_name, DEFAULT_TABLE};
use crate::trajectory::TrajectoryParams;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub binance: BinanceConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceConfig {
    pub rest_base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub symbol: String,
    pub tick_interval: String,
    /// Points kept in the display window.
    pub history_len: usize,
    /// Rows loaded from the store on start and on symbol change.
    pub history_load_limit: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimulationConfig {
    #[serde(flatten)]
    pub params: TrajectoryParams,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendKind {
    Sqlite,
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackendKind,
    pub sqlite_path: PathBuf,
    pub table: String,
    pub auto_provision: bool,
    #[serde(skip)]
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: PathBuf,
}

fn default_request_timeout_ms() -> u64 {
    3000
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            tick_interval: "2s".to_string(),
            history_len: 200,
            history_load_limit: 100,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackendKind::Sqlite,
            sqlite_path: PathBuf::from("data/crypto_prices.sqlite"),
            table: DEFAULT_TABLE.to_string(),
            auto_provision: false,
            database_url: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: PathBuf::from("price-excursion.log"),
        }
    }
}

/// Parse an interval string (e.g. "500ms", "2s", "1m", "1h") into milliseconds.
pub fn parse_interval_ms(s: &str) -> Result<u64> {
    let s = s.trim();
    if s.len() < 2 {
        bail!("invalid interval '{}': expected format like '2s'", s);
    }

    let (num_str, unit_ms) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else {
        let (num_str, suffix) = s.split_at(s.len() - 1);
        let unit_ms = match suffix {
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            _ => bail!(
                "invalid interval '{}': unsupported suffix '{}', expected one of ms/s/m/h",
                s,
                suffix
            ),
        };
        (num_str, unit_ms)
    };

    let n: u64 = num_str.parse().with_context(|| {
        format!(
            "invalid interval '{}': quantity must be a positive integer",
            s
        )
    })?;
    if n == 0 {
        bail!("invalid interval '{}': quantity must be > 0", s);
    }

    n.checked_mul(unit_ms)
        .with_context(|| format!("invalid interval '{}': value is too large", s))
}

impl FeedConfig {
    pub fn tick_interval(&self) -> Result<Duration> {
        parse_interval_ms(&self.tick_interval).map(Duration::from_millis)
    }
}

impl BinanceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }
}

fn config_path() -> PathBuf {
    std::env::var("PRICE_EXCURSION_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config/default.toml"))
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::load_from_path(&config_path())?;
        config.store.database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        if config.store.backend == StoreBackendKind::Postgres && config.store.database_url.is_none()
        {
            bail!("store.backend = \"postgres\" requires DATABASE_URL in .env or environment");
        }
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&config_str)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(s).context("invalid config toml")?;
        config.feed.symbol = normalize_symbol(&config.feed.symbol);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.feed
            .tick_interval()
            .context("feed.tick_interval is invalid")?;
        if find_coin(&self.feed.symbol).is_none() {
            bail!("feed.symbol '{}' is not a supported asset", self.feed.symbol);
        }
        if self.feed.history_len == 0 {
            bail!("feed.history_len must be > 0");
        }
        self.simulation
            .params
            .validate()
            .map_err(|e| anyhow::anyhow!(e))?;
        validate_table_name(&self.store.table).context("store.table is invalid")?;
        Ok(())
    }
}
