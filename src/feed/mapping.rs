//! Upstream JSON payloads → typed records.
//!
//! Every record is built by walking an explicit (feed key → field) table.
//! Keys that are absent or `null` read as `None`; a value of the wrong JSON
//! type fails the whole record with [`FieldError::TypeMismatch`].

use crate::models::{Company, CompanyListRow, FilingMeta, PriceBar, Statement};
use chrono::NaiveDate;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq)]
pub enum FieldError {
    #[error("required field `{key}` is missing")]
    MissingKey { key: &'static str },

    #[error("field `{key}`: expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Raw report ────────────────────────────────────────────────────────────────

/// One JSON object from the feed, keyed by camelCase field names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawReport(Map<String, Value>);

impl From<Map<String, Value>> for RawReport {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl RawReport {
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    fn present(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn number(&self, key: &str) -> Result<Option<f64>, FieldError> {
        match self.present(key) {
            None => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64()),
            Some(other) => Err(FieldError::TypeMismatch {
                key: key.to_string(),
                expected: "number",
                found: kind(other),
            }),
        }
    }

    /// Text field; numbers are rendered, blank strings read as `None`.
    pub fn text(&self, key: &str) -> Result<Option<String>, FieldError> {
        match self.present(key) {
            None => Ok(None),
            Some(Value::String(s)) => {
                let s = s.trim();
                Ok(if s.is_empty() { None } else { Some(s.to_string()) })
            }
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(FieldError::TypeMismatch {
                key: key.to_string(),
                expected: "string",
                found: kind(other),
            }),
        }
    }

    /// Four-digit year given either as a number or as a numeric string.
    pub fn year(&self, key: &str) -> Result<Option<i32>, FieldError> {
        let mismatch = |found: &'static str| FieldError::TypeMismatch {
            key: key.to_string(),
            expected: "year",
            found,
        };
        match self.present(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .and_then(|y| i32::try_from(y).ok())
                .map(Some)
                .ok_or_else(|| mismatch("number")),
            Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| mismatch("string")),
            Some(other) => Err(mismatch(kind(other))),
        }
    }
}

pub fn normalise_symbol(s: &str) -> String {
    s.trim().to_uppercase()
}

/// Objects of a JSON array payload. Anything else yields nothing.
pub fn reports_from_payload(payload: Value) -> Vec<RawReport> {
    match payload {
        Value::Array(items) => items.into_iter().filter_map(RawReport::from_value).collect(),
        _ => Vec::new(),
    }
}

// ── Company ───────────────────────────────────────────────────────────────────

pub fn company_from_profile(profile: &RawReport) -> Result<Company, FieldError> {
    let symbol = profile
        .text("symbol")?
        .ok_or(FieldError::MissingKey { key: "symbol" })?;

    Ok(Company {
        symbol: normalise_symbol(&symbol),
        name: profile.text("companyName")?,
        price: profile.number("price")?,
        exchange: profile.text("exchange")?,
        exchange_short_name: profile.text("exchangeShortName")?,
        sector: profile.text("sector")?,
    })
}

pub fn company_list_from_payload(payload: Value) -> Result<Vec<CompanyListRow>, FieldError> {
    reports_from_payload(payload)
        .iter()
        .map(|r| {
            Ok(CompanyListRow {
                symbol: r.text("symbol")?.map(|s| normalise_symbol(&s)),
                name: r.text("name")?,
                exchange_short_name: r.text("exchangeShortName")?,
            })
        })
        .collect()
}

// ── Statements ────────────────────────────────────────────────────────────────

pub fn filing_from_report(report: &RawReport) -> Result<FilingMeta, FieldError> {
    let values = FilingMeta::FIELDS
        .iter()
        .map(|(key, _)| report.text(key))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(FilingMeta::from_values(values))
}

/// Build a statement record from one feed object via `S::LINE_ITEMS`.
pub fn statement_from_report<S: Statement>(report: &RawReport) -> Result<S, FieldError> {
    let symbol = report
        .text("symbol")?
        .ok_or(FieldError::MissingKey { key: "symbol" })?;
    let fiscal_year = report
        .year("calendarYear")?
        .ok_or(FieldError::MissingKey { key: "calendarYear" })?;

    let items = S::LINE_ITEMS
        .iter()
        .map(|(key, _)| report.number(key))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(S::from_parts(
        normalise_symbol(&symbol),
        fiscal_year,
        filing_from_report(report)?,
        items,
    ))
}

// ── Prices ────────────────────────────────────────────────────────────────────

fn parse_day(s: &str) -> Option<NaiveDate> {
    let day = s.trim().get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// `{"symbol": .., "historical": [{"date", "open", "high", "low", "close"}, ..]}`.
///
/// Rows missing a date or any of the four prices are skipped. The result is
/// sorted by date ascending.
pub fn price_bars_from_payload(payload: &Value) -> Vec<PriceBar> {
    let rows = match payload.get("historical").and_then(Value::as_array) {
        Some(rows) => rows,
        None => return Vec::new(),
    };

    let mut bars: Vec<PriceBar> = rows
        .iter()
        .filter_map(|row| {
            let bar = price_bar(row);
            if bar.is_none() {
                debug!("Skipping incomplete price row: {}", row);
            }
            bar
        })
        .collect();

    bars.sort_by_key(|b| b.date);
    bars
}

fn price_bar(row: &Value) -> Option<PriceBar> {
    let field = |k: &str| row.get(k).and_then(Value::as_f64);
    Some(PriceBar {
        date: row.get("date").and_then(Value::as_str).and_then(parse_day)?,
        open: field("open")?,
        high: field("high")?,
        low: field("low")?,
        close: field("close")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BalanceSheet, CashFlow, IncomeStatement};
    use serde_json::json;

    fn report(v: Value) -> RawReport {
        RawReport::from_value(v).unwrap()
    }

    #[test]
    fn test_number_field() {
        let r = report(json!({"a": 1.5, "b": null, "c": "x", "d": 3}));
        assert_eq!(r.number("a"), Ok(Some(1.5)));
        assert_eq!(r.number("b"), Ok(None));
        assert_eq!(r.number("missing"), Ok(None));
        assert_eq!(r.number("d"), Ok(Some(3.0)));
        assert_eq!(
            r.number("c"),
            Err(FieldError::TypeMismatch {
                key: "c".into(),
                expected: "number",
                found: "string"
            })
        );
    }

    #[test]
    fn test_text_and_year_fields() {
        let r = report(json!({"cik": "0000320193", "n": 42, "blank": "  ", "y": "2023", "y2": 2021, "bad": "FY23"}));
        assert_eq!(r.text("cik"), Ok(Some("0000320193".into())));
        assert_eq!(r.text("n"), Ok(Some("42".into())));
        assert_eq!(r.text("blank"), Ok(None));
        assert_eq!(r.year("y"), Ok(Some(2023)));
        assert_eq!(r.year("y2"), Ok(Some(2021)));
        assert!(r.year("bad").is_err());
    }

    #[test]
    fn test_company_from_profile() {
        let r = report(json!({
            "symbol": " aapl ",
            "companyName": "Apple Inc.",
            "price": 189.5,
            "exchange": "NASDAQ Global Select",
            "exchangeShortName": "NASDAQ",
            "sector": "Technology",
            "beta": 1.29
        }));
        let c = company_from_profile(&r).unwrap();
        assert_eq!(c.symbol, "AAPL");
        assert_eq!(c.name.as_deref(), Some("Apple Inc."));
        assert_eq!(c.price, Some(189.5));
        assert_eq!(c.exchange_short_name.as_deref(), Some("NASDAQ"));
    }

    #[test]
    fn test_company_requires_symbol() {
        let r = report(json!({"companyName": "Nameless"}));
        assert_eq!(
            company_from_profile(&r),
            Err(FieldError::MissingKey { key: "symbol" })
        );
    }

    #[test]
    fn test_every_line_item_key_is_read() {
        fn check<S: Statement>() {
            let mut map = Map::new();
            map.insert("symbol".into(), json!("XYZ"));
            map.insert("calendarYear".into(), json!("2020"));
            for (i, (key, _)) in S::LINE_ITEMS.iter().enumerate() {
                map.insert((*key).into(), json!(i as f64 + 1.0));
            }
            let s: S = statement_from_report(&RawReport::from(map)).unwrap();
            let expected: Vec<Option<f64>> =
                (0..S::LINE_ITEMS.len()).map(|i| Some(i as f64 + 1.0)).collect();
            assert_eq!(s.line_items(), expected, "{}", S::KIND);
            assert_eq!(s.key(), ("XYZ", 2020));
        }
        check::<CashFlow>();
        check::<BalanceSheet>();
        check::<IncomeStatement>();
    }

    #[test]
    fn test_statement_absent_fields_are_none() {
        let r = report(json!({
            "symbol": "MSFT",
            "calendarYear": "2022",
            "reportedCurrency": "USD",
            "cik": "0000789019",
            "fillingDate": "2022-07-28",
            "acceptedDate": "2022-07-28 16:06:19",
            "period": "FY",
            "link": "https://www.sec.gov/a",
            "finalLink": "https://www.sec.gov/b",
            "revenue": 198270000000.0,
            "netIncome": 72738000000.0
        }));
        let is: IncomeStatement = statement_from_report(&r).unwrap();
        assert_eq!(is.revenue, Some(198270000000.0));
        assert_eq!(is.net_income, Some(72738000000.0));
        assert_eq!(is.cost_of_revenue, None);
        assert_eq!(is.weighted_average_shares_outstanding, None);
        assert_eq!(is.filing.reported_currency.as_deref(), Some("USD"));
        assert_eq!(is.filing.filing_date.as_deref(), Some("2022-07-28"));
        assert_eq!(is.filing.final_link.as_deref(), Some("https://www.sec.gov/b"));
    }

    #[test]
    fn test_statement_requires_key_fields() {
        let no_year = report(json!({"symbol": "MSFT"}));
        assert_eq!(
            statement_from_report::<CashFlow>(&no_year).unwrap_err(),
            FieldError::MissingKey { key: "calendarYear" }
        );
        let no_symbol = report(json!({"calendarYear": 2022}));
        assert_eq!(
            statement_from_report::<CashFlow>(&no_symbol).unwrap_err(),
            FieldError::MissingKey { key: "symbol" }
        );
    }

    #[test]
    fn test_statement_type_mismatch_fails_record() {
        let r = report(json!({"symbol": "MSFT", "calendarYear": 2022, "totalDebt": "lots"}));
        assert!(matches!(
            statement_from_report::<BalanceSheet>(&r),
            Err(FieldError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_price_bars_sorted_and_filtered() {
        let payload = json!({
            "symbol": "AAPL",
            "historical": [
                {"date": "2023-01-04", "open": 2.0, "high": 3.0, "low": 1.0, "close": 2.5},
                {"date": "2023-01-03", "open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5},
                {"date": "2023-01-02", "open": 1.0, "high": 2.0, "low": 0.5},
                {"date": "not a date", "open": 1.0, "high": 2.0, "low": 0.5, "close": 1.0}
            ]
        });
        let bars = price_bars_from_payload(&payload);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2023, 1, 3).unwrap());
        assert_eq!(bars[1].close, 2.5);
    }

    #[test]
    fn test_price_payload_without_history() {
        assert!(price_bars_from_payload(&json!({})).is_empty());
        assert!(price_bars_from_payload(&json!([])).is_empty());
    }

    #[test]
    fn test_reports_from_payload() {
        assert_eq!(reports_from_payload(json!([{"a": 1}, 3, {"b": 2}])).len(), 2);
        assert!(reports_from_payload(json!({"Error Message": "bad key"})).is_empty());
    }
}
