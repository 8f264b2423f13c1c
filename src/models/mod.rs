pub mod statements;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use statements::{BalanceSheet, CashFlow, IncomeStatement, Statement};

// ── Company ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Company {
    pub symbol: String,
    pub name: Option<String>,
    pub price: Option<f64>, // latest quote from the profile
    pub exchange: Option<String>,
    pub exchange_short_name: Option<String>,
    pub sector: Option<String>,
}

impl Company {
    pub const COLUMNS: &'static [&'static str] = &[
        "symbol",
        "name",
        "price",
        "exchange",
        "exchange_short_name",
        "sector",
    ];
}

// ── Fiscal year ───────────────────────────────────────────────────────────────

/// Annual price statistics for one (symbol, fiscal_year).
///
/// Rows are derived from the daily series by the aggregator and are never
/// updated once stored. Every statistic is optional: `None` means the value
/// could not be computed from the observations available for that year.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FiscalYear {
    pub symbol: String,
    pub fiscal_year: i32,
    pub price_first: Option<f64>,
    pub price_last: Option<f64>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub price_avg: Option<f64>,
    pub price_std: Option<f64>,
    pub price_var: Option<f64>,
    pub price_change: Option<f64>,
    pub price_change_pct: Option<f64>,
    pub price_change_pct_1y: Option<f64>,
    pub price_change_pct_1m: Option<f64>,
    pub price_change_pct_3m: Option<f64>,
    pub price_change_pct_6m: Option<f64>,
}

impl FiscalYear {
    /// Price columns after the (symbol, fiscal_year) key, in storage order.
    pub const PRICE_COLUMNS: &'static [&'static str] = &[
        "price_first",
        "price_last",
        "price_min",
        "price_max",
        "price_avg",
        "price_std",
        "price_var",
        "price_change",
        "price_change_pct",
        "price_change_pct_1y",
        "price_change_pct_1m",
        "price_change_pct_3m",
        "price_change_pct_6m",
    ];

    pub fn key(&self) -> (&str, i32) {
        (&self.symbol, self.fiscal_year)
    }

    pub fn prices(&self) -> Vec<Option<f64>> {
        vec![
            self.price_first,
            self.price_last,
            self.price_min,
            self.price_max,
            self.price_avg,
            self.price_std,
            self.price_var,
            self.price_change,
            self.price_change_pct,
            self.price_change_pct_1y,
            self.price_change_pct_1m,
            self.price_change_pct_3m,
            self.price_change_pct_6m,
        ]
    }

    pub fn from_prices(symbol: String, fiscal_year: i32, prices: Vec<Option<f64>>) -> Self {
        let mut it = prices.into_iter();
        let mut next = || it.next().flatten();
        Self {
            symbol,
            fiscal_year,
            price_first: next(),
            price_last: next(),
            price_min: next(),
            price_max: next(),
            price_avg: next(),
            price_std: next(),
            price_var: next(),
            price_change: next(),
            price_change_pct: next(),
            price_change_pct_1y: next(),
            price_change_pct_1m: next(),
            price_change_pct_3m: next(),
            price_change_pct_6m: next(),
        }
    }
}

// ── Daily price observation ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

// ── Filing metadata ───────────────────────────────────────────────────────────

/// Identifiers shared by every statement filing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilingMeta {
    pub reported_currency: Option<String>, // stored as reported, never converted
    pub cik: Option<String>,
    pub filing_date: Option<String>,
    pub accepted_date: Option<String>,
    pub period: Option<String>, // "FY" for annual filings
    pub link: Option<String>,
    pub final_link: Option<String>,
}

impl FilingMeta {
    /// (feed key, column) pairs, in storage order.
    pub const FIELDS: &'static [(&'static str, &'static str)] = &[
        ("reportedCurrency", "reported_currency"),
        ("cik", "cik"),
        ("fillingDate", "filing_date"),
        ("acceptedDate", "accepted_date"),
        ("period", "period"),
        ("link", "link"),
        ("finalLink", "final_link"),
    ];

    pub fn values(&self) -> Vec<Option<String>> {
        vec![
            self.reported_currency.clone(),
            self.cik.clone(),
            self.filing_date.clone(),
            self.accepted_date.clone(),
            self.period.clone(),
            self.link.clone(),
            self.final_link.clone(),
        ]
    }

    pub fn from_values(values: Vec<Option<String>>) -> Self {
        let mut it = values.into_iter();
        let mut next = || it.next().flatten();
        Self {
            reported_currency: next(),
            cik: next(),
            filing_date: next(),
            accepted_date: next(),
            period: next(),
            link: next(),
            final_link: next(),
        }
    }
}

// ── Joined year ───────────────────────────────────────────────────────────────

/// One company-year for which every statement has been filed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinedYear {
    pub company: Company,
    pub fiscal_year: FiscalYear,
    pub cash_flow: CashFlow,
    pub balance_sheet: BalanceSheet,
    pub income_statement: IncomeStatement,
}

// ── Raw CSV rows ──────────────────────────────────────────────────────────────

/// Company list CSV: symbol, name, exchangeShortName (extra columns ignored).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanyListRow {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "exchangeShortName")]
    pub exchange_short_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fiscal_year_prices_follow_column_order() {
        let fy = FiscalYear {
            symbol: "AAPL".into(),
            fiscal_year: 2023,
            price_first: Some(1.0),
            price_change_pct_6m: Some(13.0),
            ..Default::default()
        };
        let prices = fy.prices();
        assert_eq!(prices.len(), FiscalYear::PRICE_COLUMNS.len());
        assert_eq!(prices[0], Some(1.0));
        assert_eq!(prices[12], Some(13.0));

        let back = FiscalYear::from_prices("AAPL".into(), 2023, prices);
        assert_eq!(back, fy);
    }

    #[test]
    fn test_filing_meta_values_align_with_fields() {
        let meta = FilingMeta {
            reported_currency: Some("USD".into()),
            final_link: Some("https://www.sec.gov/final".into()),
            ..Default::default()
        };
        let values = meta.values();
        assert_eq!(values.len(), FilingMeta::FIELDS.len());
        assert_eq!(FilingMeta::from_values(values), meta);
    }
}
