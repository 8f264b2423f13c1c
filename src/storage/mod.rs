use crate::feed::mapping::{FieldError, RawReport, company_from_profile, statement_from_report};
use crate::models::{
    BalanceSheet, CashFlow, Company, FilingMeta, FiscalYear, IncomeStatement, JoinedYear,
    Statement,
};
use anyhow::{Context, Result};
use chrono::Utc;
use duckdb::types::Value;
use duckdb::{Connection, Row, params, params_from_iter};
use std::error::Error as _;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, error, info, warn};

// ── Schema ────────────────────────────────────────────────────────────────────

const COMPANY_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS company (
    symbol               VARCHAR PRIMARY KEY,
    name                 VARCHAR,
    price                DOUBLE,
    exchange             VARCHAR,
    exchange_short_name  VARCHAR,
    sector               VARCHAR
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

/// Child tables first, so foreign keys never block a drop.
const DROP_ORDER: &[&str] = &[
    IncomeStatement::TABLE,
    BalanceSheet::TABLE,
    CashFlow::TABLE,
    "fiscal_year",
    "company",
    "schema_version",
];

fn fiscal_year_ddl() -> String {
    let prices: String = FiscalYear::PRICE_COLUMNS
        .iter()
        .map(|c| format!("    {} DOUBLE,\n", c))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS fiscal_year (\n\
         \x20   symbol       VARCHAR NOT NULL REFERENCES company (symbol),\n\
         \x20   fiscal_year  INTEGER NOT NULL,\n\
         {prices}\
         \x20   PRIMARY KEY (symbol, fiscal_year)\n\
         );\n"
    )
}

fn statement_ddl<S: Statement>() -> String {
    let meta: String = FilingMeta::FIELDS
        .iter()
        .map(|(_, c)| format!("    {} VARCHAR,\n", c))
        .collect();
    let items: String = S::LINE_ITEMS
        .iter()
        .map(|(_, c)| format!("    {} DOUBLE,\n", c))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n\
         \x20   symbol       VARCHAR NOT NULL,\n\
         \x20   fiscal_year  INTEGER NOT NULL,\n\
         {meta}{items}\
         \x20   PRIMARY KEY (symbol, fiscal_year),\n\
         \x20   FOREIGN KEY (symbol, fiscal_year) REFERENCES fiscal_year (symbol, fiscal_year)\n\
         );\n",
        table = S::TABLE,
    )
}

fn schema_ddl() -> String {
    [
        COMPANY_DDL.to_string(),
        fiscal_year_ddl(),
        statement_ddl::<CashFlow>(),
        statement_ddl::<BalanceSheet>(),
        statement_ddl::<IncomeStatement>(),
    ]
    .concat()
}

fn fiscal_year_columns() -> Vec<&'static str> {
    let mut cols = vec!["symbol", "fiscal_year"];
    cols.extend_from_slice(FiscalYear::PRICE_COLUMNS);
    cols
}

fn statement_columns<S: Statement>() -> Vec<&'static str> {
    let mut cols = vec!["symbol", "fiscal_year"];
    cols.extend(FilingMeta::FIELDS.iter().map(|(_, c)| *c));
    cols.extend(S::LINE_ITEMS.iter().map(|(_, c)| *c));
    cols
}

fn insert_sql(table: &str, cols: &[&str]) -> String {
    let marks = vec!["?"; cols.len()].join(", ");
    format!("INSERT INTO {} ({}) VALUES ({})", table, cols.join(", "), marks)
}

fn select_sql(table: &str, cols: &[&str]) -> String {
    format!(
        "SELECT {} FROM {} WHERE symbol = ? AND fiscal_year = ?",
        cols.join(", "),
        table
    )
}

fn qualified(alias: &str, cols: &[&str]) -> Vec<String> {
    cols.iter().map(|c| format!("{}.{}", alias, c)).collect()
}

// ── Value conversion ──────────────────────────────────────────────────────────

fn num(v: Option<f64>) -> Value {
    v.map_or(Value::Null, Value::Double)
}

fn text(v: Option<String>) -> Value {
    v.map_or(Value::Null, Value::Text)
}

fn company_values(c: &Company) -> Vec<Value> {
    vec![
        Value::Text(c.symbol.clone()),
        text(c.name.clone()),
        num(c.price),
        text(c.exchange.clone()),
        text(c.exchange_short_name.clone()),
        text(c.sector.clone()),
    ]
}

fn fiscal_year_values(fy: &FiscalYear) -> Vec<Value> {
    let mut values = vec![Value::Text(fy.symbol.clone()), Value::Int(fy.fiscal_year)];
    values.extend(fy.prices().into_iter().map(num));
    values
}

fn statement_values<S: Statement>(s: &S) -> Vec<Value> {
    let (symbol, year) = s.key();
    let mut values = vec![Value::Text(symbol.to_string()), Value::Int(year)];
    values.extend(s.filing().values().into_iter().map(text));
    values.extend(s.line_items().into_iter().map(num));
    values
}

fn read_f64s(row: &Row, start: usize, n: usize) -> duckdb::Result<Vec<Option<f64>>> {
    (start..start + n).map(|i| row.get(i)).collect()
}

fn read_texts(row: &Row, start: usize, n: usize) -> duckdb::Result<Vec<Option<String>>> {
    (start..start + n).map(|i| row.get(i)).collect()
}

fn read_company(row: &Row, at: usize) -> duckdb::Result<Company> {
    Ok(Company {
        symbol: row.get(at)?,
        name: row.get(at + 1)?,
        price: row.get(at + 2)?,
        exchange: row.get(at + 3)?,
        exchange_short_name: row.get(at + 4)?,
        sector: row.get(at + 5)?,
    })
}

fn read_fiscal_year(row: &Row, at: usize) -> duckdb::Result<FiscalYear> {
    let prices = read_f64s(row, at + 2, FiscalYear::PRICE_COLUMNS.len())?;
    Ok(FiscalYear::from_prices(row.get(at)?, row.get(at + 1)?, prices))
}

fn read_statement<S: Statement>(row: &Row, at: usize) -> duckdb::Result<S> {
    let n_meta = FilingMeta::FIELDS.len();
    let meta = read_texts(row, at + 2, n_meta)?;
    let items = read_f64s(row, at + 2 + n_meta, S::LINE_ITEMS.len())?;
    Ok(S::from_parts(
        row.get(at)?,
        row.get(at + 1)?,
        FilingMeta::from_values(meta),
        items,
    ))
}

// ── Save results ──────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("invalid record")]
    Mapping(#[from] FieldError),

    #[error("database error")]
    Database(#[source] duckdb::Error),
}

/// duckdb-rs reports every engine failure with `ErrorCode::Unknown`, so
/// constraint violations are told apart by DuckDB's exception type, which
/// prefixes the message ("Constraint Error: Duplicate key ..."). The same
/// prefix survives when the violation surfaces at commit.
impl From<duckdb::Error> for StoreError {
    fn from(e: duckdb::Error) -> Self {
        if let duckdb::Error::DuckDBFailure(_, Some(msg)) = &e
            && msg.contains("Constraint Error")
        {
            return StoreError::Constraint(msg.clone());
        }
        StoreError::Database(e)
    }
}

/// Outcome of one transactional save. Failures are already logged.
#[derive(Debug)]
pub enum SaveOutcome<T> {
    Inserted(T),
    /// A row with the same key was already stored; it is returned unchanged.
    Existing(T),
    Failed(StoreError),
}

impl<T> SaveOutcome<T> {
    /// The stored record, or `None` when the save failed.
    pub fn record(self) -> Option<T> {
        match self {
            SaveOutcome::Inserted(t) | SaveOutcome::Existing(t) => Some(t),
            SaveOutcome::Failed(_) => None,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, SaveOutcome::Inserted(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SaveOutcome::Failed(_))
    }
}

fn error_chain(e: &StoreError) -> String {
    let mut detail = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        detail.push_str(": ");
        detail.push_str(&s.to_string());
        source = s.source();
    }
    detail
}

/// Save boundary: log a failure and turn it into `SaveOutcome::Failed`.
fn settle<T>(what: impl FnOnce() -> String, result: Result<SaveOutcome<T>, StoreError>) -> SaveOutcome<T> {
    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Error saving {}: {}", what(), error_chain(&e));
            SaveOutcome::Failed(e)
        }
    }
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    /// Create any missing table. Never drops data.
    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        self.conn.execute_batch(&schema_ddl()).context("DDL failed")?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    /// Drop every table, then recreate the schema. Destroys all data.
    pub fn reset_schema(&self) -> Result<()> {
        warn!("Dropping all tables");
        let drops: String = DROP_ORDER
            .iter()
            .map(|t| format!("DROP TABLE IF EXISTS {};\n", t))
            .collect();
        self.conn.execute_batch(&drops).context("Dropping tables failed")?;
        self.run_migrations()
    }

    // ── Company ───────────────────────────────────────────────────────────────

    /// Insert a company once; a second save returns the stored row.
    pub fn save_company(&self, company: &Company) -> SaveOutcome<Company> {
        settle(
            || format!("company {}", company.symbol),
            self.try_save_company(company),
        )
    }

    /// Map a profile payload and save it.
    pub fn save_company_profile(&self, profile: &RawReport) -> SaveOutcome<Company> {
        match company_from_profile(profile) {
            Ok(company) => self.save_company(&company),
            Err(e) => settle(|| "company profile".to_string(), Err(e.into())),
        }
    }

    fn try_save_company(&self, company: &Company) -> Result<SaveOutcome<Company>, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        if let Some(existing) = query_company(&tx, &company.symbol)? {
            debug!("{}: company already stored", company.symbol);
            return Ok(SaveOutcome::Existing(existing));
        }
        tx.execute(
            &insert_sql("company", Company::COLUMNS),
            params_from_iter(company_values(company)),
        )?;
        tx.commit()?;
        Ok(SaveOutcome::Inserted(company.clone()))
    }

    pub fn company(&self, symbol: &str) -> Result<Option<Company>> {
        Ok(query_company(&self.conn, symbol)?)
    }

    pub fn list_symbols(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT symbol FROM company ORDER BY symbol")?;
        let syms = stmt
            .query_map([], |r| r.get(0))?
            .collect::<duckdb::Result<Vec<String>>>()?;
        Ok(syms)
    }

    // ── Fiscal year ───────────────────────────────────────────────────────────

    /// Create the (symbol, fiscal_year) row unless it exists. An existing
    /// row is returned unchanged and `fy` is discarded.
    pub fn ensure_fiscal_year(&self, fy: &FiscalYear) -> SaveOutcome<FiscalYear> {
        settle(
            || format!("fiscal year {} {}", fy.symbol, fy.fiscal_year),
            self.try_ensure_fiscal_year(fy),
        )
    }

    fn try_ensure_fiscal_year(&self, fy: &FiscalYear) -> Result<SaveOutcome<FiscalYear>, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        if let Some(existing) = query_fiscal_year(&tx, &fy.symbol, fy.fiscal_year)? {
            return Ok(SaveOutcome::Existing(existing));
        }
        tx.execute(
            &insert_sql("fiscal_year", &fiscal_year_columns()),
            params_from_iter(fiscal_year_values(fy)),
        )?;
        tx.commit()?;
        Ok(SaveOutcome::Inserted(fy.clone()))
    }

    pub fn fiscal_years(&self, symbol: &str) -> Result<Vec<FiscalYear>> {
        let sql = format!(
            "SELECT {} FROM fiscal_year WHERE symbol = ? ORDER BY fiscal_year",
            fiscal_year_columns().join(", ")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let years = stmt
            .query_map(params![symbol], |r| read_fiscal_year(r, 0))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(years)
    }

    // ── Statements ────────────────────────────────────────────────────────────

    /// Insert one statement. The primary key rejects a second filing for the
    /// same (symbol, fiscal_year); the foreign key rejects years without a
    /// fiscal-year row.
    pub fn save_statement<S: Statement + Clone>(&self, statement: &S) -> SaveOutcome<S> {
        let (symbol, year) = statement.key();
        settle(
            || format!("{} {} {}", S::KIND, symbol, year),
            self.try_save_statement(statement),
        )
    }

    /// Map a feed report into `S` and save it.
    pub fn save_statement_report<S: Statement + Clone>(&self, report: &RawReport) -> SaveOutcome<S> {
        match statement_from_report::<S>(report) {
            Ok(statement) => self.save_statement(&statement),
            Err(e) => settle(|| S::KIND.to_string(), Err(e.into())),
        }
    }

    fn try_save_statement<S: Statement + Clone>(&self, statement: &S) -> Result<SaveOutcome<S>, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            &insert_sql(S::TABLE, &statement_columns::<S>()),
            params_from_iter(statement_values(statement)),
        )?;
        tx.commit()?;
        Ok(SaveOutcome::Inserted(statement.clone()))
    }

    pub fn statement<S: Statement>(&self, symbol: &str, year: i32) -> Result<Option<S>> {
        let sql = select_sql(S::TABLE, &statement_columns::<S>());
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![symbol, year])?;
        match rows.next()? {
            Some(row) => Ok(Some(read_statement(row, 0)?)),
            None => Ok(None),
        }
    }

    // ── Join ──────────────────────────────────────────────────────────────────

    /// Company × FiscalYear × CashFlow × BalanceSheet × IncomeStatement,
    /// inner-joined on (symbol, fiscal_year). A year missing any statement
    /// is left out.
    pub fn joined_years(&self) -> Result<Vec<JoinedYear>> {
        let company_cols = Company::COLUMNS;
        let fy_cols = fiscal_year_columns();
        let cf_cols = statement_columns::<CashFlow>();
        let bs_cols = statement_columns::<BalanceSheet>();
        let is_cols = statement_columns::<IncomeStatement>();

        let select = [
            qualified("c", company_cols),
            qualified("f", &fy_cols),
            qualified("cf", &cf_cols),
            qualified("bs", &bs_cols),
            qualified("inc", &is_cols),
        ]
        .concat()
        .join(", ");

        let sql = format!(
            r#"SELECT {select}
               FROM company c
               JOIN fiscal_year f        ON f.symbol = c.symbol
               JOIN {cf} cf  ON cf.symbol = f.symbol  AND cf.fiscal_year = f.fiscal_year
               JOIN {bs} bs  ON bs.symbol = f.symbol  AND bs.fiscal_year = f.fiscal_year
               JOIN {is} inc ON inc.symbol = f.symbol AND inc.fiscal_year = f.fiscal_year
               ORDER BY f.symbol, f.fiscal_year"#,
            cf = CashFlow::TABLE,
            bs = BalanceSheet::TABLE,
            is = IncomeStatement::TABLE,
        );

        let at_fy = company_cols.len();
        let at_cf = at_fy + fy_cols.len();
        let at_bs = at_cf + cf_cols.len();
        let at_is = at_bs + bs_cols.len();

        let mut stmt = self.conn.prepare(&sql)?;
        let joined = stmt
            .query_map([], |r| {
                Ok(JoinedYear {
                    company: read_company(r, 0)?,
                    fiscal_year: read_fiscal_year(r, at_fy)?,
                    cash_flow: read_statement(r, at_cf)?,
                    balance_sheet: read_statement(r, at_bs)?,
                    income_statement: read_statement(r, at_is)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()
            .context("Reading joined fiscal years failed")?;
        Ok(joined)
    }

    // ── Stats ─────────────────────────────────────────────────────────────────

    pub fn table_counts(&self) -> Result<Vec<(&'static str, i64)>> {
        let tables = [
            "company",
            "fiscal_year",
            CashFlow::TABLE,
            BalanceSheet::TABLE,
            IncomeStatement::TABLE,
        ];
        tables
            .into_iter()
            .map(|t| {
                let n: i64 = self
                    .conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", t), [], |r| r.get(0))
                    .with_context(|| format!("count {}", t))?;
                Ok((t, n))
            })
            .collect()
    }
}

fn query_company(conn: &Connection, symbol: &str) -> duckdb::Result<Option<Company>> {
    let sql = format!("SELECT {} FROM company WHERE symbol = ?", Company::COLUMNS.join(", "));
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![symbol])?;
    match rows.next()? {
        Some(row) => Ok(Some(read_company(row, 0)?)),
        None => Ok(None),
    }
}

fn query_fiscal_year(conn: &Connection, symbol: &str, year: i32) -> duckdb::Result<Option<FiscalYear>> {
    let mut stmt = conn.prepare(&select_sql("fiscal_year", &fiscal_year_columns()))?;
    let mut rows = stmt.query(params![symbol, year])?;
    match rows.next()? {
        Some(row) => Ok(Some(read_fiscal_year(row, 0)?)),
        None => Ok(None),
    }
}
