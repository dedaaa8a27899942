//! Configuration loading - TOML file with defaults, CLI flags override

use std::{fs, path::Path};

use serde::Deserialize;

use crate::shared::errors::AppError;
use crate::shared::types::{Category, Metal};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceCfg {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    pub retry_attempts: u32,
    pub retry_backoff: f64,
    pub categories: Vec<CategoryPageCfg>,
}

impl Default for SourceCfg {
    fn default() -> Self {
        Self {
            base_url: "https://igold.bg".to_string(),
            request_timeout_secs: 30,
            delay_min_ms: 1000,
            delay_max_ms: 2500,
            retry_attempts: 3,
            retry_backoff: 1.5,
            categories: vec![
                CategoryPageCfg::new("/zlatni-kyulcheta", Metal::Gold, Some(Category::Bar)),
                CategoryPageCfg::new("/zlatni-moneti", Metal::Gold, Some(Category::Coin)),
                CategoryPageCfg::new("/srebarni-kyulcheta", Metal::Silver, Some(Category::Bar)),
                CategoryPageCfg::new("/srebarni-moneti", Metal::Silver, Some(Category::Coin)),
            ],
        }
    }
}

/// One category listing page to walk, with the category it implies.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryPageCfg {
    pub path: String,
    pub metal: Metal,
    #[serde(default)]
    pub hint: Option<Category>,
}

impl CategoryPageCfg {
    fn new(path: &str, metal: Metal, hint: Option<Category>) -> Self {
        Self {
            path: path.to_string(),
            metal,
            hint,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreCfg {
    pub db_path: String,
    pub retention_days: u32,
}

impl Default for StoreCfg {
    fn default() -> Self {
        Self {
            db_path: "data/observations.db".to_string(),
            retention_days: 180,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerCfg {
    pub top_n: usize,
    pub change_threshold_pct: f64,
}

impl Default for TrackerCfg {
    fn default() -> Self {
        Self {
            top_n: 10,
            change_threshold_pct: 5.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MarketCfg {
    /// Base URL of the spot price API; spot lookups are skipped when unset.
    pub api_base: Option<String>,
    /// EUR -> BGN conversion rate supplied externally, never computed here.
    pub eur_bgn_rate: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscordCfg {
    pub enabled: bool,
    pub webhook_url: Option<String>,
}

impl Default for DiscordCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            webhook_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportCfg {
    pub output_dir: String,
}

impl Default for ExportCfg {
    fn default() -> Self {
        Self {
            output_dir: "data/export".to_string(),
        }
    }
}

/// Tracker configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub source: SourceCfg,
    pub store: StoreCfg,
    pub tracker: TrackerCfg,
    pub market: MarketCfg,
    pub discord: DiscordCfg,
    pub export: ExportCfg,
}

impl TrackerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let s = fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("failed to read config file: {e}")))?;
        let cfg: Self = toml::from_str(&s)
            .map_err(|e| AppError::Config(format!("failed to parse config file: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.source.delay_min_ms > self.source.delay_max_ms {
            return Err(AppError::Config(format!(
                "delay_min_ms ({}) cannot exceed delay_max_ms ({})",
                self.source.delay_min_ms, self.source.delay_max_ms
            )));
        }
        if self.tracker.top_n == 0 {
            return Err(AppError::Config("top_n must be positive".to_string()));
        }
        if self.tracker.change_threshold_pct < 0.0 {
            return Err(AppError::Config(
                "change_threshold_pct cannot be negative".to_string(),
            ));
        }
        if self.store.retention_days == 0 {
            return Err(AppError::Config(
                "retention_days must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
