//! Flattened, one-row-per-(symbol, fiscal_year) view of the joined tables.
//!
//! Columns are laid out Company, FiscalYear, CashFlow, IncomeStatement,
//! BalanceSheet, derived income fields, valuation ratios. A label seen twice
//! (`symbol`, `fiscal_year`, filing metadata, `inventory`)
//! keeps its first occurrence only.

use crate::models::{Company, FilingMeta, FiscalYear, IncomeStatement, JoinedYear, Statement};
use crate::ratios::Valuation;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<Option<f64>> for Cell {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Cell::Null, Cell::Float)
    }
}

impl From<Option<String>> for Cell {
    fn from(v: Option<String>) -> Self {
        v.map_or(Cell::Null, Cell::Text)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Int(n) => write!(f, "{}", n),
            Cell::Float(x) => write!(f, "{}", x),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<Cell>>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.columns.iter().position(|c| *c == label)
    }

    /// Cell at (`row`, `label`), if both exist.
    pub fn get(&self, row: usize, label: &str) -> Option<&Cell> {
        self.rows.get(row)?.get(self.column_index(label)?)
    }

    pub fn float(&self, row: usize, label: &str) -> Option<f64> {
        match self.get(row, label)? {
            Cell::Float(x) => Some(*x),
            _ => None,
        }
    }
}

/// (label, cell) for every column of one joined year, duplicates included.
fn labelled_cells(j: &JoinedYear) -> Vec<(&'static str, Cell)> {
    let mut out: Vec<(&'static str, Cell)> = Vec::new();

    let c = &j.company;
    out.extend(Company::COLUMNS.iter().copied().zip([
        Cell::Text(c.symbol.clone()),
        c.name.clone().into(),
        c.price.into(),
        c.exchange.clone().into(),
        c.exchange_short_name.clone().into(),
        c.sector.clone().into(),
    ]));

    let fy = &j.fiscal_year;
    out.push(("symbol", Cell::Text(fy.symbol.clone())));
    out.push(("fiscal_year", Cell::Int(fy.fiscal_year.into())));
    out.extend(
        FiscalYear::PRICE_COLUMNS
            .iter()
            .copied()
            .zip(fy.prices().into_iter().map(Cell::from)),
    );

    statement_cells(&j.cash_flow, &mut out);
    statement_cells(&j.income_statement, &mut out);
    statement_cells(&j.balance_sheet, &mut out);

    out.extend(
        IncomeStatement::DERIVED
            .iter()
            .copied()
            .zip(j.income_statement.derived().into_iter().map(Cell::from)),
    );

    let valuation = Valuation::compute(
        fy,
        Some(&j.cash_flow),
        Some(&j.balance_sheet),
        Some(&j.income_statement),
    );
    out.extend(
        Valuation::COLUMNS
            .iter()
            .copied()
            .zip(valuation.values().into_iter().map(Cell::from)),
    );
    out
}

fn statement_cells<S: Statement>(s: &S, out: &mut Vec<(&'static str, Cell)>) {
    let (symbol, year) = s.key();
    out.push(("symbol", Cell::Text(symbol.to_string())));
    out.push(("fiscal_year", Cell::Int(year.into())));
    out.extend(
        FilingMeta::FIELDS
            .iter()
            .map(|(_, col)| *col)
            .zip(s.filing().values().into_iter().map(Cell::from)),
    );
    out.extend(
        S::LINE_ITEMS
            .iter()
            .map(|(_, col)| *col)
            .zip(s.line_items().into_iter().map(Cell::from)),
    );
}

/// Flatten joined years into a table with unique column labels.
pub fn flatten(joined: &[JoinedYear]) -> Dataset {
    let template = labelled_cells(&JoinedYear::default());

    let mut seen = HashSet::new();
    let keep: Vec<bool> = template.iter().map(|(label, _)| seen.insert(*label)).collect();
    let columns = template
        .iter()
        .zip(&keep)
        .filter(|(_, k)| **k)
        .map(|((label, _), _)| *label)
        .collect();

    let rows = joined
        .iter()
        .map(|j| {
            labelled_cells(j)
                .into_iter()
                .zip(&keep)
                .filter(|(_, k)| **k)
                .map(|((_, cell), _)| cell)
                .collect()
        })
        .collect();

    Dataset { columns, rows }
}
