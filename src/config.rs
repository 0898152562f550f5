use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::{AppError, Result};

pub const DEFAULT_DB_PATH: &str = "cpa_sync.db";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_SPEND_FILE: &str = "fb_spend.json";
pub const DEFAULT_CONVERSIONS_FILE: &str = "network_conv.json";

/// External API calls allowed per rolling 24h.
pub const DEFAULT_DAILY_LIMIT: u32 = 100;

/// Fraction of the daily limit held back and never spent by the sync loop.
pub const DEFAULT_SAFETY_MARGIN: &str = "0.2";

/// Scheduler tick interval (minutes).
pub const DEFAULT_UPDATE_INTERVAL_MINUTES: u64 = 30;

/// Number of trailing calendar days (today included) checked for missing data.
pub const DEFAULT_STALENESS_WINDOW_DAYS: u32 = 7;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Directory holding the feed snapshots (DATA_DIR)
    pub data_dir: PathBuf,
    /// Spend feed file name inside data_dir (FB_SPEND_FILE)
    pub spend_file: String,
    /// Conversions feed file name inside data_dir (NETWORK_CONV_FILE)
    pub conversions_file: String,
    /// API_DAILY_LIMIT
    pub daily_limit: u32,
    /// API_SAFETY_MARGIN, in [0, 1)
    pub safety_margin: Decimal,
    /// UPDATE_INTERVAL_MINUTES
    pub update_interval_minutes: u64,
    /// STALENESS_WINDOW_DAYS
    pub staleness_window_days: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let cfg = Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string())
                .into(),
            spend_file: std::env::var("FB_SPEND_FILE")
                .unwrap_or_else(|_| DEFAULT_SPEND_FILE.to_string()),
            conversions_file: std::env::var("NETWORK_CONV_FILE")
                .unwrap_or_else(|_| DEFAULT_CONVERSIONS_FILE.to_string()),
            daily_limit: std::env::var("API_DAILY_LIMIT")
                .unwrap_or_else(|_| DEFAULT_DAILY_LIMIT.to_string())
                .parse::<u32>()
                .map_err(|_| {
                    AppError::Config("API_DAILY_LIMIT must be a non-negative integer".to_string())
                })?,
            safety_margin: std::env::var("API_SAFETY_MARGIN")
                .unwrap_or_else(|_| DEFAULT_SAFETY_MARGIN.to_string())
                .trim()
                .parse::<Decimal>()
                .map_err(|_| AppError::Config("API_SAFETY_MARGIN must be a decimal".to_string()))?,
            update_interval_minutes: std::env::var("UPDATE_INTERVAL_MINUTES")
                .unwrap_or_else(|_| DEFAULT_UPDATE_INTERVAL_MINUTES.to_string())
                .parse::<u64>()
                .map_err(|_| {
                    AppError::Config("UPDATE_INTERVAL_MINUTES must be a positive integer".to_string())
                })?,
            staleness_window_days: std::env::var("STALENESS_WINDOW_DAYS")
                .unwrap_or_else(|_| DEFAULT_STALENESS_WINDOW_DAYS.to_string())
                .parse::<u32>()
                .map_err(|_| {
                    AppError::Config("STALENESS_WINDOW_DAYS must be a positive integer".to_string())
                })?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.safety_margin.is_sign_negative() || self.safety_margin >= Decimal::ONE {
            return Err(AppError::Config(format!(
                "API_SAFETY_MARGIN must be in [0, 1), got {}",
                self.safety_margin
            )));
        }
        if self.update_interval_minutes == 0 {
            return Err(AppError::Config(
                "UPDATE_INTERVAL_MINUTES must be at least 1".to_string(),
            ));
        }
        if self.staleness_window_days == 0 {
            return Err(AppError::Config(
                "STALENESS_WINDOW_DAYS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Slots the sync loop may spend per rolling 24h.
    pub fn quota_ceiling(&self) -> usize {
        quota_ceiling(self.daily_limit, self.safety_margin)
    }

    pub fn spend_path(&self) -> PathBuf {
        self.data_dir.join(&self.spend_file)
    }

    pub fn conversions_path(&self) -> PathBuf {
        self.data_dir.join(&self.conversions_file)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_minutes * 60)
    }
}

/// floor(limit × (1 − margin)) in exact decimal, so 100 × 0.8 is 80 and not 79.
pub fn quota_ceiling(daily_limit: u32, safety_margin: Decimal) -> usize {
    let ceiling = (Decimal::from(daily_limit) * (Decimal::ONE - safety_margin)).floor();
    ceiling.to_usize().unwrap_or(0)
}
