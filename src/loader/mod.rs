//! CSV in and out: the company list and the flattened dataset export.

use crate::dataset::Dataset;
use crate::feed::mapping::normalise_symbol;
use crate::models::CompanyListRow;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

const US_EXCHANGES: &[&str] = &["NYSE", "NASDAQ"];

/// Symbols from a company list CSV with a `symbol` header. Blank symbols
/// are skipped; duplicates keep their first position.
pub fn read_company_list(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Cannot open company list {:?}", path))?;

    let mut seen = HashSet::new();
    let mut symbols = Vec::new();

    for (i, result) in reader.deserialize::<CompanyListRow>().enumerate() {
        let row = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Row {} in {:?}: {}", i + 1, path, e);
                continue;
            }
        };
        match row.symbol.as_deref().map(normalise_symbol) {
            Some(s) if !s.is_empty() => {
                if seen.insert(s.clone()) {
                    symbols.push(s);
                } else {
                    debug!("Duplicate symbol {} in {:?}", s, path);
                }
            }
            _ => warn!("Row {} in {:?} has no symbol, skipped", i + 1, path),
        }
    }

    info!("{} symbols read from {:?}", symbols.len(), path);
    Ok(symbols)
}

/// Keep NYSE and NASDAQ listings only.
pub fn us_listings(rows: Vec<CompanyListRow>) -> Vec<CompanyListRow> {
    rows.into_iter()
        .filter(|r| {
            r.exchange_short_name
                .as_deref()
                .is_some_and(|x| US_EXCHANGES.contains(&x))
        })
        .collect()
}

pub fn write_company_list(path: &Path, rows: &[CompanyListRow]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Cannot write company list {:?}", path))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("{} companies written to {:?}", rows.len(), path);
    Ok(())
}

/// Write the flattened dataset; undefined cells are left empty.
pub fn write_dataset(path: &Path, dataset: &Dataset) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Cannot write dataset {:?}", path))?;
    writer.write_record(&dataset.columns)?;
    for row in &dataset.rows {
        writer.write_record(row.iter().map(|c| c.to_string()))?;
    }
    writer.flush()?;
    info!("{} rows x {} columns written to {:?}", dataset.len(), dataset.columns.len(), path);
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create dir {:?}", parent))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Cell;
    use std::io::Write;

    fn listing(symbol: &str, exchange: &str) -> CompanyListRow {
        CompanyListRow {
            symbol: Some(symbol.into()),
            name: Some(format!("{} Inc", symbol)),
            exchange_short_name: Some(exchange.into()),
        }
    }

    #[test]
    fn test_read_company_list_skips_blank_symbols() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "symbol,name,exchangeShortName").unwrap();
        writeln!(file, "aapl,Apple,NASDAQ").unwrap();
        writeln!(file, ",Nameless,NYSE").unwrap();
        writeln!(file, " IBM ,IBM,NYSE").unwrap();
        writeln!(file, "AAPL,Apple again,NASDAQ").unwrap();
        file.flush().unwrap();

        let symbols = read_company_list(file.path()).unwrap();
        assert_eq!(symbols, vec!["AAPL".to_string(), "IBM".to_string()]);
    }

    #[test]
    fn test_missing_company_list_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_company_list(&dir.path().join("absent.csv")).is_err());
    }

    #[test]
    fn test_company_list_written_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/company_list.csv");
        let rows = us_listings(vec![
            listing("MSFT", "NASDAQ"),
            listing("SHEL", "LSE"),
            listing("KO", "NYSE"),
        ]);
        assert_eq!(rows.len(), 2);

        write_company_list(&path, &rows).unwrap();
        let header = std::fs::read_to_string(&path).unwrap();
        assert!(header.starts_with("symbol,name,exchangeShortName"));
        assert_eq!(read_company_list(&path).unwrap(), vec!["MSFT", "KO"]);
    }

    #[test]
    fn test_write_dataset_leaves_nulls_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.csv");
        let ds = Dataset {
            columns: vec!["symbol", "fiscal_year", "price_to_earnings"],
            rows: vec![
                vec![Cell::Text("IBM".into()), Cell::Int(2021), Cell::Float(20.5)],
                vec![Cell::Text("IBM".into()), Cell::Int(2022), Cell::Null],
            ],
        };
        write_dataset(&path, &ds).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![
            "symbol,fiscal_year,price_to_earnings",
            "IBM,2021,20.5",
            "IBM,2022,",
        ]);
    }
}
