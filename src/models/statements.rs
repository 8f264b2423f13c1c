//! Annual financial statements keyed by (symbol, fiscal_year).
//!
//! Each statement is a flat record of optional line items plus the filing
//! metadata. The `LINE_ITEMS` table of every statement lists, in storage
//! order, the upstream feed key and the column it lands in; mapping and
//! persistence both walk that table instead of naming fields one by one.

use super::FilingMeta;
use serde::{Deserialize, Serialize};

/// Common surface of the three statement records.
pub trait Statement: Sized {
    /// Storage table name.
    const TABLE: &'static str;
    /// Human label used in logs ("cash flow", ...).
    const KIND: &'static str;
    /// (feed key, column) for every reported line item.
    const LINE_ITEMS: &'static [(&'static str, &'static str)];

    fn key(&self) -> (&str, i32);
    fn filing(&self) -> &FilingMeta;
    fn line_items(&self) -> Vec<Option<f64>>;

    /// Rebuild a record from its key, metadata and line items in
    /// `LINE_ITEMS` order. Missing trailing items read back as `None`.
    fn from_parts(
        symbol: String,
        fiscal_year: i32,
        filing: FilingMeta,
        items: Vec<Option<f64>>,
    ) -> Self;
}

macro_rules! statement {
    (
        $(#[$meta:meta])*
        pub struct $name:ident ($table:literal, $kind:literal) {
            $( $(#[$fmeta:meta])* $field:ident = $key:literal, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            pub symbol: String,
            pub fiscal_year: i32,
            pub filing: FilingMeta,
            $( $(#[$fmeta])* pub $field: Option<f64>, )*
        }

        impl Statement for $name {
            const TABLE: &'static str = $table;
            const KIND: &'static str = $kind;
            const LINE_ITEMS: &'static [(&'static str, &'static str)] =
                &[ $( ($key, stringify!($field)) ),* ];

            fn key(&self) -> (&str, i32) {
                (&self.symbol, self.fiscal_year)
            }

            fn filing(&self) -> &FilingMeta {
                &self.filing
            }

            fn line_items(&self) -> Vec<Option<f64>> {
                vec![ $( self.$field ),* ]
            }

            fn from_parts(
                symbol: String,
                fiscal_year: i32,
                filing: FilingMeta,
                items: Vec<Option<f64>>,
            ) -> Self {
                let mut it = items.into_iter();
                Self {
                    symbol,
                    fiscal_year,
                    filing,
                    $( $field: it.next().flatten(), )*
                }
            }
        }
    };
}

// ── Cash flow ─────────────────────────────────────────────────────────────────

statement! {
    /// Annual cash flow statement.
    pub struct CashFlow ("cash_flow", "cash flow") {
        // prefixed so the flattened view keeps the income statement's figures too
        cash_flow_net_income = "netIncome",
        cash_flow_depreciation_and_amortization = "depreciationAndAmortization",
        deferred_income_tax = "deferredIncomeTax",
        stock_based_compensation = "stockBasedCompensation",
        change_in_working_capital = "changeInWorkingCapital",
        accounts_receivables = "accountsReceivables",
        inventory = "inventory",
        accounts_payables = "accountsPayables",
        other_working_capital = "otherWorkingCapital",
        other_non_cash_items = "otherNonCashItems",
        net_cash_from_operating_activities = "netCashProvidedByOperatingActivities",
        investments_in_property_plant_and_equipment = "investmentsInPropertyPlantAndEquipment",
        acquisitions_net = "acquisitionsNet",
        purchases_of_investments = "purchasesOfInvestments",
        sales_maturities_of_investments = "salesMaturitiesOfInvestments",
        // upstream spells "Activites"
        other_investing_activities = "otherInvestingActivites",
        net_cash_from_investing_activities = "netCashUsedForInvestingActivites",
        debt_repayment = "debtRepayment",
        common_stock_issued = "commonStockIssued",
        common_stock_repurchased = "commonStockRepurchased",
        dividends_paid = "dividendsPaid",
        other_financing_activities = "otherFinancingActivites",
        net_cash_from_financing_activities = "netCashUsedProvidedByFinancingActivities",
        effect_of_forex_changes_on_cash = "effectOfForexChangesOnCash",
        net_change_in_cash = "netChangeInCash",
        cash_at_beginning_of_period = "cashAtBeginningOfPeriod",
        cash_at_end_of_period = "cashAtEndOfPeriod",
        free_cash_flow = "freeCashFlow",
    }
}

// ── Balance sheet ─────────────────────────────────────────────────────────────

statement! {
    /// Annual balance sheet.
    pub struct BalanceSheet ("balance_sheet", "balance sheet") {
        cash_and_cash_equivalents = "cashAndCashEquivalents",
        short_term_investments = "shortTermInvestments",
        cash_and_short_term_investments = "cashAndShortTermInvestments",
        net_receivables = "netReceivables",
        inventory = "inventory",
        other_current_assets = "otherCurrentAssets",
        total_current_assets = "totalCurrentAssets",
        property_plant_equipment_net = "propertyPlantEquipmentNet",
        goodwill = "goodwill",
        intangible_assets = "intangibleAssets",
        goodwill_and_intangible_assets = "goodwillAndIntangibleAssets",
        long_term_investments = "longTermInvestments",
        tax_assets = "taxAssets",
        other_non_current_assets = "otherNonCurrentAssets",
        total_non_current_assets = "totalNonCurrentAssets",
        other_assets = "otherAssets",
        total_assets = "totalAssets",
        account_payables = "accountPayables",
        short_term_debt = "shortTermDebt",
        tax_payables = "taxPayables",
        deferred_revenue = "deferredRevenue",
        other_current_liabilities = "otherCurrentLiabilities",
        total_current_liabilities = "totalCurrentLiabilities",
        long_term_debt = "longTermDebt",
        deferred_revenue_non_current = "deferredRevenueNonCurrent",
        deferred_tax_liabilities_non_current = "deferredTaxLiabilitiesNonCurrent",
        other_non_current_liabilities = "otherNonCurrentLiabilities",
        total_non_current_liabilities = "totalNonCurrentLiabilities",
        other_liabilities = "otherLiabilities",
        capital_lease_obligations = "capitalLeaseObligations",
        total_liabilities = "totalLiabilities",
        preferred_stock = "preferredStock",
        common_stock = "commonStock",
        retained_earnings = "retainedEarnings",
        accumulated_other_comprehensive_income_loss = "accumulatedOtherComprehensiveIncomeLoss",
        other_total_stockholders_equity = "othertotalStockholdersEquity",
        total_stockholders_equity = "totalStockholdersEquity",
        total_equity = "totalEquity",
        minority_interest = "minorityInterest",
        total_liabilities_and_stockholders_equity = "totalLiabilitiesAndStockholdersEquity",
        total_liabilities_and_total_equity = "totalLiabilitiesAndTotalEquity",
        total_investments = "totalInvestments",
        total_debt = "totalDebt",
        net_debt = "netDebt",
    }
}

// ── Income statement ──────────────────────────────────────────────────────────

statement! {
    /// Annual income statement.
    pub struct IncomeStatement ("income_statement", "income statement") {
        revenue = "revenue",
        /// Cost of goods sold.
        cost_of_revenue = "costOfRevenue",
        gross_profit = "grossProfit",
        gross_profit_ratio = "grossProfitRatio",
        research_and_development_expenses = "researchAndDevelopmentExpenses",
        general_and_administrative_expenses = "generalAndAdministrativeExpenses",
        selling_and_marketing_expenses = "sellingAndMarketingExpenses",
        operating_expenses = "operatingExpenses",
        other_expenses = "otherExpenses",
        cost_and_expenses = "costAndExpenses",
        interest_income = "interestIncome",
        interest_expense = "interestExpense",
        depreciation_and_amortization = "depreciationAndAmortization",
        ebitda = "ebitda",
        ebitda_ratio = "ebitdaratio",
        operating_income = "operatingIncome",
        operating_income_ratio = "operatingIncomeRatio",
        total_other_income_expenses_net = "totalOtherIncomeExpensesNet",
        income_before_tax = "incomeBeforeTax",
        income_before_tax_ratio = "incomeBeforeTaxRatio",
        income_tax_expense = "incomeTaxExpense",
        /// Reported net income. May disagree with `computed_net_income`.
        net_income = "netIncome",
        net_income_ratio = "netIncomeRatio",
        eps = "eps",
        eps_diluted = "epsdiluted",
        weighted_average_shares_outstanding = "weightedAverageShsOut",
        weighted_average_shares_outstanding_diluted = "weightedAverageShsOutDil",
    }
}

/// `a - b`, undefined when either side is.
fn sub(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    Some(a? - b?)
}

impl IncomeStatement {
    /// Derived columns exposed next to the reported ones.
    pub const DERIVED: &'static [&'static str] = &[
        "computed_gross_profit",
        "computed_operating_result",
        "computed_ebit",
        "computed_pre_tax_income",
        "computed_net_income",
    ];

    /// revenue − cost of goods sold
    pub fn computed_gross_profit(&self) -> Option<f64> {
        sub(self.revenue, self.cost_of_revenue)
    }

    /// gross profit − operating expenses
    pub fn computed_operating_result(&self) -> Option<f64> {
        sub(self.computed_gross_profit(), self.operating_expenses)
    }

    /// operating result − depreciation/amortization
    pub fn computed_ebit(&self) -> Option<f64> {
        sub(self.computed_operating_result(), self.depreciation_and_amortization)
    }

    /// EBIT − interest expense
    pub fn computed_pre_tax_income(&self) -> Option<f64> {
        sub(self.computed_ebit(), self.interest_expense)
    }

    /// pre-tax income − taxes
    pub fn computed_net_income(&self) -> Option<f64> {
        sub(self.computed_pre_tax_income(), self.income_tax_expense)
    }

    pub fn derived(&self) -> Vec<Option<f64>> {
        vec![
            self.computed_gross_profit(),
            self.computed_operating_result(),
            self.computed_ebit(),
            self.computed_pre_tax_income(),
            self.computed_net_income(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn assert_unique<S: Statement>() {
        let keys: HashSet<_> = S::LINE_ITEMS.iter().map(|(k, _)| *k).collect();
        let cols: HashSet<_> = S::LINE_ITEMS.iter().map(|(_, c)| *c).collect();
        assert_eq!(keys.len(), S::LINE_ITEMS.len(), "{}: duplicate feed key", S::KIND);
        assert_eq!(cols.len(), S::LINE_ITEMS.len(), "{}: duplicate column", S::KIND);
    }

    #[test]
    fn test_line_item_tables_are_one_to_one() {
        assert_unique::<CashFlow>();
        assert_unique::<BalanceSheet>();
        assert_unique::<IncomeStatement>();
    }

    #[test]
    fn test_line_items_follow_table_order() {
        let bs = BalanceSheet {
            cash_and_cash_equivalents: Some(10.0),
            net_debt: Some(-5.0),
            ..Default::default()
        };
        let items = bs.line_items();
        assert_eq!(items.len(), BalanceSheet::LINE_ITEMS.len());
        assert_eq!(items.first().copied().flatten(), Some(10.0));
        assert_eq!(items.last().copied().flatten(), Some(-5.0));
        assert_eq!(BalanceSheet::LINE_ITEMS.last().map(|(_, c)| *c), Some("net_debt"));
    }

    #[test]
    fn test_from_parts_pads_missing_items() {
        let cf = CashFlow::from_parts("MSFT".into(), 2022, FilingMeta::default(), vec![Some(1.0)]);
        assert_eq!(cf.cash_flow_net_income, Some(1.0));
        assert_eq!(cf.free_cash_flow, None);
        assert_eq!(cf.key(), ("MSFT", 2022));
    }

    #[test]
    fn test_income_statement_derived_chain() {
        let is = IncomeStatement {
            revenue: Some(1000.0),
            cost_of_revenue: Some(400.0),
            operating_expenses: Some(200.0),
            depreciation_and_amortization: Some(50.0),
            interest_expense: Some(30.0),
            income_tax_expense: Some(20.0),
            net_income: Some(999.0),
            ..Default::default()
        };
        assert_eq!(is.computed_gross_profit(), Some(600.0));
        assert_eq!(is.computed_operating_result(), Some(400.0));
        assert_eq!(is.computed_ebit(), Some(350.0));
        assert_eq!(is.computed_pre_tax_income(), Some(320.0));
        assert_eq!(is.computed_net_income(), Some(300.0));
        // reported figure is untouched
        assert_eq!(is.net_income, Some(999.0));
    }

    #[test]
    fn test_derived_fields_propagate_missing_inputs() {
        let is = IncomeStatement {
            revenue: Some(1000.0),
            cost_of_revenue: Some(400.0),
            ..Default::default()
        };
        assert_eq!(is.computed_gross_profit(), Some(600.0));
        assert_eq!(is.computed_operating_result(), None);
        assert_eq!(is.computed_net_income(), None);
        assert_eq!(is.derived().len(), IncomeStatement::DERIVED.len());
    }
}
