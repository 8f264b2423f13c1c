pub mod http_client;
pub mod mapping;

use crate::config::ApiConfig;
use crate::models::{CompanyListRow, PriceBar};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

pub use self::http_client::FetchError;
use self::http_client::HttpClient;
use self::mapping::{RawReport, company_list_from_payload, price_bars_from_payload, reports_from_payload};

/// Annual statement endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    CashFlow,
    BalanceSheet,
    IncomeStatement,
}

impl ReportKind {
    fn path(self) -> &'static str {
        match self {
            ReportKind::CashFlow => "cash-flow-statement",
            ReportKind::BalanceSheet => "balance-sheet-statement",
            ReportKind::IncomeStatement => "income-statement",
        }
    }
}

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable upstream for profiles, filings and daily prices.
///
/// Empty payloads come back as `Ok` with nothing in them; only transport,
/// status and rate-limit failures are errors.
#[async_trait]
pub trait FinancialDataSource: Send + Sync {
    async fn company_list(&self) -> Result<Vec<CompanyListRow>, FetchError>;
    async fn profile(&self, symbol: &str) -> Result<Option<RawReport>, FetchError>;
    async fn reports(&self, kind: ReportKind, symbol: &str) -> Result<Vec<RawReport>, FetchError>;
    async fn daily_prices(&self, symbol: &str) -> Result<Vec<PriceBar>, FetchError>;
}

// ── Financial Modeling Prep ───────────────────────────────────────────────────

pub struct FmpClient {
    client: HttpClient,
    base_url: String,
    api_key: String,
}

impl FmpClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            warn!("No API key configured; requests will likely be rejected");
        }
        Url::parse(&config.base_url)
            .with_context(|| format!("Invalid API base URL {:?}", config.base_url))?;

        Ok(Self {
            client: HttpClient::new(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// e.g. `income-statement/AAPL?period=annual&apikey=..`
    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, FetchError> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, path))?;
        url.query_pairs_mut()
            .extend_pairs(query)
            .append_pair("apikey", &self.api_key);
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<Value, FetchError> {
        let payload = self.client.get_json(&url).await?;
        // FMP answers some failures with 200 and an error object
        if let Some(msg) = payload.get("Error Message").and_then(Value::as_str) {
            warn!("API error for {}: {}", http_client::redact(&url), msg);
            return Ok(Value::Null);
        }
        Ok(payload)
    }
}

#[async_trait]
impl FinancialDataSource for FmpClient {
    async fn company_list(&self) -> Result<Vec<CompanyListRow>, FetchError> {
        let payload = self.get(self.endpoint("stock/list", &[])?).await?;
        match company_list_from_payload(payload) {
            Ok(rows) => Ok(rows),
            Err(e) => {
                warn!("Company list payload rejected: {}", e);
                Ok(Vec::new())
            }
        }
    }

    async fn profile(&self, symbol: &str) -> Result<Option<RawReport>, FetchError> {
        let url = self.endpoint(&format!("profile/{}", symbol), &[])?;
        let profile = reports_from_payload(self.get(url).await?).into_iter().next();
        debug!("{}: profile {}", symbol, if profile.is_some() { "found" } else { "empty" });
        Ok(profile)
    }

    async fn reports(&self, kind: ReportKind, symbol: &str) -> Result<Vec<RawReport>, FetchError> {
        let url = self.endpoint(
            &format!("{}/{}", kind.path(), symbol),
            &[("period", "annual")],
        )?;
        Ok(reports_from_payload(self.get(url).await?))
    }

    async fn daily_prices(&self, symbol: &str) -> Result<Vec<PriceBar>, FetchError> {
        let url = self.endpoint(&format!("historical-price-full/{}", symbol), &[])?;
        Ok(price_bars_from_payload(&self.get(url).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> FmpClient {
        let config = ApiConfig {
            base_url: "https://financialmodelingprep.com/api/v3/".into(),
            api_key: "k3y".into(),
            ..ApiConfig::default()
        };
        FmpClient::new(&config).unwrap()
    }

    #[test]
    fn test_endpoint_urls() {
        let c = client();
        let url = c
            .endpoint("income-statement/AAPL", &[("period", "annual")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://financialmodelingprep.com/api/v3/income-statement/AAPL?period=annual&apikey=k3y"
        );

        let url = c.endpoint("stock/list", &[]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://financialmodelingprep.com/api/v3/stock/list?apikey=k3y"
        );
    }

    #[test]
    fn test_report_paths() {
        assert_eq!(ReportKind::CashFlow.path(), "cash-flow-statement");
        assert_eq!(ReportKind::BalanceSheet.path(), "balance-sheet-statement");
        assert_eq!(ReportKind::IncomeStatement.path(), "income-statement");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let config = ApiConfig {
            base_url: "not a url".into(),
            ..ApiConfig::default()
        };
        assert!(FmpClient::new(&config).is_err());
    }
}
