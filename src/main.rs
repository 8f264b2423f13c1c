mod aggregate;
mod config;
mod dataset;
mod feed;
mod loader;
mod models;
mod pipeline;
mod ratios;
mod storage;
mod utils;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::aggregate::price_on;
use crate::config::AppConfig;
use crate::feed::mapping::normalise_symbol;
use crate::feed::{FinancialDataSource, FmpClient};
use crate::models::{BalanceSheet, CashFlow, IncomeStatement};
use crate::pipeline::{Pipeline, RunOutcome};
use crate::ratios::Valuation;
use crate::storage::Repository;
use crate::utils::{fmt_count, fmt_metric};

#[derive(Parser)]
#[command(name = "fiscal-etl", about = "Company fundamentals and fiscal-year price ETL", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch profiles, prices and annual statements for every listed company
    Ingest {
        /// Ingest only these symbols instead of the company list
        #[arg(short, long = "symbol")]
        symbols: Vec<String>,

        /// Drop and recreate all tables first (destroys stored data)
        #[arg(long)]
        reset: bool,
    },

    /// Write the flattened dataset to CSV
    Export {
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show per-year prices and valuation ratios for one symbol
    Ratios {
        symbol: String,

        /// Also fetch daily prices and show the close nearest each filing date
        #[arg(long)]
        at_filing: bool,
    },

    /// Show row counts per table
    Stats,

    /// Create missing tables without loading data
    Migrate,

    /// Drop and recreate all tables (destroys stored data)
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "fiscal_etl=info,warn",
        1 => "fiscal_etl=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Ingest { symbols, reset } => {
            let _t = utils::Timer::start("Ingestion");
            let repo = Repository::open(&config.storage.db_path)?;
            if reset || config.storage.reset_schema {
                repo.reset_schema()?;
            } else {
                repo.run_migrations()?;
            }

            let pipeline = Pipeline::new(FmpClient::new(&config.api)?, repo);
            let symbols = if symbols.is_empty() {
                pipeline.resolve_symbols(&config.pipeline).await?
            } else {
                symbols.iter().map(|s| normalise_symbol(s)).collect()
            };

            let flag = pipeline.interrupt_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Ctrl-C received, finishing the current company");
                    flag.store(true, Ordering::SeqCst);
                }
            });

            let stats = pipeline.run(&symbols).await;
            if stats.outcome == RunOutcome::RateLimited {
                bail!("Run aborted: API rate limit reached");
            }
        }

        Command::Export { out } => {
            let _t = utils::Timer::start("Dataset export");
            let repo = Repository::open(&config.storage.db_path)?;
            repo.run_migrations()?;
            let joined = repo.joined_years()?;
            let dataset = dataset::flatten(&joined);
            if dataset.is_empty() {
                warn!("No fiscal year has all three statements, exporting the header only");
            }
            let path = out.unwrap_or(config.export.dataset_path);
            loader::write_dataset(&path, &dataset)?;
            info!("{} complete fiscal years exported", dataset.len());
        }

        Command::Ratios { symbol, at_filing } => {
            let symbol = normalise_symbol(&symbol);
            let repo = Repository::open(&config.storage.db_path)?;
            repo.run_migrations()?;
            let years = repo.fiscal_years(&symbol)?;
            if years.is_empty() {
                println!("No fiscal years for {}, run `fiscal-etl ingest -s {}` first.", symbol, symbol);
                return Ok(());
            }

            if let Some(name) = repo.company(&symbol)?.and_then(|c| c.name) {
                println!("{} ({})", name, symbol);
            }

            let bars = if at_filing {
                FmpClient::new(&config.api)?.daily_prices(&symbol).await?
            } else {
                Vec::new()
            };

            println!(
                "{:<6} {:>10} {:>9} {:>9} {:>9} {:>9} {:>9} {:>10} {:>10}",
                "year", "close", "1y %", "P/E", "P/E*", "P/B", "P/S", "P/FCF", "EV/EBIT"
            );
            for fy in &years {
                let cf = repo.statement::<CashFlow>(&symbol, fy.fiscal_year)?;
                let bs = repo.statement::<BalanceSheet>(&symbol, fy.fiscal_year)?;
                let is = repo.statement::<IncomeStatement>(&symbol, fy.fiscal_year)?;
                let v = Valuation::compute(fy, cf.as_ref(), bs.as_ref(), is.as_ref());

                println!(
                    "{:<6} {:>10} {:>9} {:>9} {:>9} {:>9} {:>9} {:>10} {:>10}",
                    fy.fiscal_year,
                    fmt_metric(fy.price_last),
                    fmt_metric(fy.price_change_pct_1y.map(|p| p * 100.0)),
                    fmt_metric(v.price_to_earnings),
                    fmt_metric(v.price_to_computed_earnings),
                    fmt_metric(v.price_to_book),
                    fmt_metric(v.price_to_sales),
                    fmt_metric(v.price_to_free_cash_flow),
                    fmt_metric(v.ev_to_ebit),
                );

                let filed = is
                    .as_ref()
                    .and_then(|s| s.filing.filing_date.as_deref())
                    .and_then(|d| NaiveDate::parse_from_str(d.get(..10)?, "%Y-%m-%d").ok());
                if let Some(date) = filed.filter(|_| at_filing) {
                    println!("       filed {} at close {}", date, fmt_metric(price_on(&bars, date)));
                }
            }
            println!("P/E* uses recomputed net income; — marks undefined values.");
        }

        Command::Stats => {
            let repo = Repository::open(&config.storage.db_path)?;
            repo.run_migrations()?;
            println!("─────────────────────────────────");
            println!("  Fiscal ETL — Database Stats");
            println!("─────────────────────────────────");
            for (table, n) in repo.table_counts()? {
                println!("  {:<17}: {}", table, fmt_count(n));
            }
            println!("  {:<17}: {}", "complete years", fmt_count(repo.joined_years()?.len() as i64));
            println!("─────────────────────────────────");
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }

        Command::Reset => {
            Repository::open(&config.storage.db_path)?.reset_schema()?;
            println!("All tables dropped and recreated.");
        }
    }

    Ok(())
}
