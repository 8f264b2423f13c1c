use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    pub export: ExportConfig,
}

/// Upstream financial-data API
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
    pub request_delay_ms: u64,
    /// Retries for network errors only; HTTP 429 is never retried.
    pub max_retries: u32,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    /// Drop and recreate every table before ingesting. Destroys data.
    pub reset_schema: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub companies_file: PathBuf,
    /// Pull the company list from the API instead of `companies_file`.
    pub fetch_company_list: bool,
    /// Keep NYSE/NASDAQ listings only when fetching the list.
    pub us_only: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportConfig {
    pub dataset_path: PathBuf,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://financialmodelingprep.com/api/v3".to_string(),
            api_key: String::new(),
            timeout_secs: 30,
            request_delay_ms: 250,
            max_retries: 3,
            user_agent: "fiscal-etl/0.1 (fundamentals research)".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/financial_data.duckdb"),
            reset_schema: false,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            companies_file: PathBuf::from("data/company_list.csv"),
            fetch_company_list: false,
            us_only: true,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("data/dataset.csv"),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("FISCAL").separator("__"))
            .build()?;

        let mut app_cfg: AppConfig = cfg.try_deserialize().unwrap_or_else(|e| {
            warn!("Invalid configuration ({}), using defaults", e);
            AppConfig::default()
        });

        if app_cfg.api.api_key.is_empty() {
            if let Ok(key) = std::env::var("API_KEY") {
                app_cfg.api.api_key = key;
            }
        }

        Ok(app_cfg)
    }
}
