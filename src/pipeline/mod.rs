//! Ingestion loop: one company at a time, profile → prices → statements.
//!
//! ## Failure handling
//!
//! * A fault while processing one company is logged and the loop moves on.
//!   Records already committed for that company stay.
//! * Any other failed fetch (prices or one statement endpoint) is logged,
//!   counted in `fetch_errors`, and the company carries on with the next
//!   endpoint.
//! * HTTP 429 ends the run immediately ([`RunOutcome::RateLimited`]).
//! * The interrupt flag is checked before each company; once set, no
//!   further company is started ([`RunOutcome::Interrupted`]).

use crate::aggregate::aggregate_years;
use crate::config::PipelineConfig;
use crate::feed::{FetchError, FinancialDataSource, ReportKind};
use crate::loader::{read_company_list, us_listings, write_company_list};
use crate::models::{BalanceSheet, CashFlow, IncomeStatement, Statement};
use crate::storage::Repository;
use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunOutcome {
    #[default]
    Completed,
    Interrupted,
    RateLimited,
}

#[derive(Debug, Default)]
pub struct PipelineStats {
    pub companies_processed: usize,
    pub companies_failed: usize,
    pub fiscal_years_inserted: usize,
    pub statements_inserted: usize,
    pub statements_rejected: usize,
    pub fetch_errors: usize,
    pub outcome: RunOutcome,
}

pub struct Pipeline<S> {
    source: S,
    repo: Repository,
    interrupted: Arc<AtomicBool>,
}

impl<S: FinancialDataSource> Pipeline<S> {
    pub fn new(source: S, repo: Repository) -> Self {
        Self {
            source,
            repo,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set to stop the run before the next company.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Symbols to ingest: fetched from the API and cached to
    /// `companies_file`, or read back from that file.
    pub async fn resolve_symbols(&self, config: &PipelineConfig) -> Result<Vec<String>> {
        if !config.fetch_company_list {
            return read_company_list(&config.companies_file);
        }

        info!("=== Fetching company list ===");
        let mut rows = self.source.company_list().await?;
        if config.us_only {
            rows = us_listings(rows);
        }
        write_company_list(&config.companies_file, &rows)?;
        Ok(rows.into_iter().filter_map(|r| r.symbol).filter(|s| !s.is_empty()).collect())
    }

    pub async fn run(&self, symbols: &[String]) -> PipelineStats {
        let mut stats = PipelineStats::default();
        info!("=== Ingesting {} companies ===", symbols.len());

        for (i, symbol) in symbols.iter().enumerate() {
            if self.interrupted.load(Ordering::SeqCst) {
                warn!("Interrupted, stopping before {}", symbol);
                stats.outcome = RunOutcome::Interrupted;
                break;
            }

            info!("[{}/{}] {}", i + 1, symbols.len(), symbol);
            match self.ingest_company(symbol, &mut stats).await {
                Ok(true) => stats.companies_processed += 1,
                Ok(false) => stats.companies_failed += 1,
                Err(e) if e.is_rate_limited() => {
                    error!("{}: {}. Stopping the run", symbol, e);
                    stats.outcome = RunOutcome::RateLimited;
                    break;
                }
                Err(e) => {
                    error!("{}: {:#}", symbol, anyhow::Error::new(e));
                    stats.companies_failed += 1;
                }
            }
        }

        info!(
            "=== Done: {} companies ({} failed) | {} fiscal years | {} statements ({} rejected) | {} fetch errors | {:?} ===",
            stats.companies_processed,
            stats.companies_failed,
            stats.fiscal_years_inserted,
            stats.statements_inserted,
            stats.statements_rejected,
            stats.fetch_errors,
            stats.outcome,
        );
        stats
    }

    /// `Ok(false)` when the company itself could not be stored.
    async fn ingest_company(&self, symbol: &str, stats: &mut PipelineStats) -> Result<bool, FetchError> {
        let Some(profile) = self.source.profile(symbol).await? else {
            warn!("No data found for profile of {}", symbol);
            return Ok(false);
        };
        if self.repo.save_company_profile(&profile).record().is_none() {
            return Ok(false);
        }

        let bars = match self.source.daily_prices(symbol).await {
            Ok(bars) => bars,
            Err(e) => {
                skip_unless_rate_limited(symbol, "prices", e, stats)?;
                Vec::new()
            }
        };
        if bars.is_empty() {
            warn!("No data found for prices of {}", symbol);
        }
        for fy in aggregate_years(symbol, &bars) {
            if self.repo.ensure_fiscal_year(&fy).is_inserted() {
                debug!("{:?}: fiscal year stored", fy.key());
                stats.fiscal_years_inserted += 1;
            }
        }

        self.ingest_reports::<CashFlow>(ReportKind::CashFlow, symbol, stats).await?;
        self.ingest_reports::<BalanceSheet>(ReportKind::BalanceSheet, symbol, stats).await?;
        self.ingest_reports::<IncomeStatement>(ReportKind::IncomeStatement, symbol, stats).await?;
        Ok(true)
    }

    async fn ingest_reports<T: Statement + Clone>(
        &self,
        kind: ReportKind,
        symbol: &str,
        stats: &mut PipelineStats,
    ) -> Result<(), FetchError> {
        let reports = match self.source.reports(kind, symbol).await {
            Ok(reports) => reports,
            Err(e) => return skip_unless_rate_limited(symbol, T::KIND, e, stats),
        };
        if reports.is_empty() {
            warn!("No data found for {} of {}", T::KIND, symbol);
            return Ok(());
        }

        for report in &reports {
            if self.repo.save_statement_report::<T>(report).is_failed() {
                stats.statements_rejected += 1;
            } else {
                stats.statements_inserted += 1;
            }
        }
        debug!("{}: {} {} filings", symbol, reports.len(), T::KIND);
        Ok(())
    }
}

/// Rate limiting propagates; anything else is logged and counted.
fn skip_unless_rate_limited(
    symbol: &str,
    what: &str,
    e: FetchError,
    stats: &mut PipelineStats,
) -> Result<(), FetchError> {
    if e.is_rate_limited() {
        return Err(e);
    }
    warn!("{}: no {} fetched: {:#}", symbol, what, anyhow::Error::new(e));
    stats.fetch_errors += 1;
    Ok(())
}
