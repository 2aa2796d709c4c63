//! Configuration loading from environment variables.

use std::env;

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: String, value: String },
}

/// Application configuration loaded from the environment.
///
/// `CONDITION_ID` absent ⇒ dynamic (auto-discover) mode; present ⇒ static
/// mode pinned to that round (§4.2). `BUILDER_API_*` are required only when
/// `dry_run` is false.
#[derive(Debug, Clone)]
pub struct Config {
    pub condition_id: Option<String>,
    pub clob_api_url: String,
    pub ws_url: String,
    pub gamma_api_url: String,
    pub move_pct: f64,
    pub window_ms: i64,
    pub sum_target: Decimal,
    pub max_order_usdc: Decimal,
    pub cooldown_ms: i64,
    pub dry_run: bool,
    pub builder_api_key: Option<String>,
    pub builder_api_secret: Option<String>,
    pub builder_api_passphrase: Option<String>,
}

impl Config {
    /// Load configuration, pulling in a `.env` file first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env_only()
    }

    /// Load configuration from process environment variables only. Used by
    /// tests to avoid `.env`-file interference.
    pub fn from_env_only() -> Result<Self, ConfigError> {
        let condition_id = env::var("CONDITION_ID").ok();

        let clob_api_url = env::var("CLOB_API_URL")
            .unwrap_or_else(|_| "https://clob.polymarket.com".to_string());

        let ws_url = env::var("WS_URL")
            .unwrap_or_else(|_| "wss://ws-subscriptions-clob.polymarket.com/ws".to_string());

        let gamma_api_url = env::var("GAMMA_API_URL")
            .unwrap_or_else(|_| "https://gamma-api.polymarket.com".to_string());

        let move_pct = parse_env_or("MOVE_PCT", 0.15)?;
        // Full dump-monitoring horizon from round start, in ms (2 min
        // default). The drop itself must still occur within DumpDetector's
        // fixed 3000ms sub-window (spec.md §4.3); this only bounds how long
        // after round start detection stays armed.
        let window_ms = parse_env_or("WINDOW_MS", 120_000)?;
        let sum_target = parse_env_or("SUM_TARGET", Decimal::new(95, 2))?;
        let max_order_usdc = parse_env_or("MAX_ORDER_USDC", Decimal::new(2000, 2))?;
        let cooldown_ms = parse_env_or("COOLDOWN_MS", 0)?;
        let dry_run = parse_bool_env_or("DRY_RUN", true)?;

        let builder_api_key = env::var("BUILDER_API_KEY").ok();
        let builder_api_secret = env::var("BUILDER_API_SECRET").ok();
        let builder_api_passphrase = env::var("BUILDER_API_PASSPHRASE").ok();

        if !dry_run {
            if builder_api_key.is_none() {
                return Err(ConfigError::MissingVar("BUILDER_API_KEY".to_string()));
            }
            if builder_api_secret.is_none() {
                return Err(ConfigError::MissingVar("BUILDER_API_SECRET".to_string()));
            }
            if builder_api_passphrase.is_none() {
                return Err(ConfigError::MissingVar("BUILDER_API_PASSPHRASE".to_string()));
            }
        }

        Ok(Self {
            condition_id,
            clob_api_url,
            ws_url,
            gamma_api_url,
            move_pct,
            window_ms,
            sum_target,
            max_order_usdc,
            cooldown_ms,
            dry_run,
            builder_api_key,
            builder_api_secret,
            builder_api_passphrase,
        })
    }

    pub fn auto_discover(&self) -> bool {
        self.condition_id.is_none()
    }
}

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

fn parse_bool_env_or(var: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(var) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                var: var.to_string(),
                value: raw,
            }),
        },
        Err(_) => Ok(default),
    }
}
