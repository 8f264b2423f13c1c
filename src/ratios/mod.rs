//! Valuation ratios computed on read from joined per-year records.
//!
//! Every function takes the records it joins explicitly. A side of the join
//! that is absent (`None`) makes the ratio undefined, and every division goes
//! through [`safe_div`].

use crate::models::{BalanceSheet, CashFlow, FiscalYear, IncomeStatement};
use serde::Serialize;

/// `num / den`, undefined when either operand is undefined, when `den` is
/// zero, or when the quotient is not finite.
pub fn safe_div(num: Option<f64>, den: Option<f64>) -> Option<f64> {
    let (num, den) = (num?, den?);
    if den == 0.0 {
        return None;
    }
    Some(num / den).filter(|q| q.is_finite())
}

/// Relative change `(current - previous) / previous`.
pub fn pct_change(previous: Option<f64>, current: Option<f64>) -> Option<f64> {
    safe_div(Some(current? - previous?), previous)
}

pub fn market_cap(fy: &FiscalYear, is: Option<&IncomeStatement>) -> Option<f64> {
    Some(fy.price_last? * is?.weighted_average_shares_outstanding?)
}

pub fn price_to_earnings(fy: &FiscalYear, is: Option<&IncomeStatement>) -> Option<f64> {
    safe_div(market_cap(fy, is), is?.net_income)
}

/// P/E against the recomputed net income instead of the reported figure.
pub fn price_to_computed_earnings(fy: &FiscalYear, is: Option<&IncomeStatement>) -> Option<f64> {
    safe_div(market_cap(fy, is), is?.computed_net_income())
}

pub fn price_to_free_cash_flow(
    fy: &FiscalYear,
    is: Option<&IncomeStatement>,
    cf: Option<&CashFlow>,
) -> Option<f64> {
    safe_div(market_cap(fy, is), cf?.free_cash_flow)
}

pub fn price_to_book(
    fy: &FiscalYear,
    is: Option<&IncomeStatement>,
    bs: Option<&BalanceSheet>,
) -> Option<f64> {
    safe_div(market_cap(fy, is), bs?.total_stockholders_equity)
}

pub fn price_to_sales(fy: &FiscalYear, is: Option<&IncomeStatement>) -> Option<f64> {
    safe_div(market_cap(fy, is), is?.revenue)
}

/// market cap + total debt − cash. Missing operands count as zero inside
/// the sum, but the balance sheet itself must be present.
pub fn enterprise_value(
    fy: &FiscalYear,
    is: Option<&IncomeStatement>,
    bs: Option<&BalanceSheet>,
) -> Option<f64> {
    let bs = bs?;
    Some(
        market_cap(fy, is).unwrap_or(0.0) + bs.total_debt.unwrap_or(0.0)
            - bs.cash_and_cash_equivalents.unwrap_or(0.0),
    )
}

pub fn ev_to_ebit(
    fy: &FiscalYear,
    is: Option<&IncomeStatement>,
    bs: Option<&BalanceSheet>,
) -> Option<f64> {
    safe_div(enterprise_value(fy, is, bs), is?.operating_income)
}

// ── Valuation bundle ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Valuation {
    pub market_cap: Option<f64>,
    pub enterprise_value: Option<f64>,
    pub price_to_earnings: Option<f64>,
    pub price_to_computed_earnings: Option<f64>,
    pub price_to_free_cash_flow: Option<f64>,
    pub price_to_book: Option<f64>,
    pub price_to_sales: Option<f64>,
    pub ev_to_ebit: Option<f64>,
}

impl Valuation {
    pub const COLUMNS: &'static [&'static str] = &[
        "market_cap",
        "enterprise_value",
        "price_to_earnings",
        "price_to_computed_earnings",
        "price_to_free_cash_flow",
        "price_to_book",
        "price_to_sales",
        "ev_to_ebit",
    ];

    pub fn compute(
        fy: &FiscalYear,
        cf: Option<&CashFlow>,
        bs: Option<&BalanceSheet>,
        is: Option<&IncomeStatement>,
    ) -> Self {
        Self {
            market_cap: market_cap(fy, is),
            enterprise_value: enterprise_value(fy, is, bs),
            price_to_earnings: price_to_earnings(fy, is),
            price_to_computed_earnings: price_to_computed_earnings(fy, is),
            price_to_free_cash_flow: price_to_free_cash_flow(fy, is, cf),
            price_to_book: price_to_book(fy, is, bs),
            price_to_sales: price_to_sales(fy, is),
            ev_to_ebit: ev_to_ebit(fy, is, bs),
        }
    }

    pub fn values(&self) -> Vec<Option<f64>> {
        vec![
            self.market_cap,
            self.enterprise_value,
            self.price_to_earnings,
            self.price_to_computed_earnings,
            self.price_to_free_cash_flow,
            self.price_to_book,
            self.price_to_sales,
            self.ev_to_ebit,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn year(price_last: Option<f64>) -> FiscalYear {
        FiscalYear {
            symbol: "ACME".into(),
            fiscal_year: 2023,
            price_last,
            ..Default::default()
        }
    }

    fn income(shares: Option<f64>, net_income: Option<f64>) -> IncomeStatement {
        IncomeStatement {
            symbol: "ACME".into(),
            fiscal_year: 2023,
            weighted_average_shares_outstanding: shares,
            net_income,
            ..Default::default()
        }
    }

    #[test]
    fn test_safe_div() {
        assert_eq!(safe_div(Some(10.0), Some(4.0)), Some(2.5));
        assert_eq!(safe_div(Some(-3.0), Some(2.0)), Some(-1.5));
        assert_eq!(safe_div(Some(10.0), Some(0.0)), None);
        assert_eq!(safe_div(Some(0.0), Some(0.0)), None);
        assert_eq!(safe_div(Some(10.0), Some(-0.0)), None);
        assert_eq!(safe_div(None, Some(2.0)), None);
        assert_eq!(safe_div(Some(2.0), None), None);
        assert_eq!(safe_div(Some(f64::MAX), Some(1e-300)), None);
    }

    #[test]
    fn test_pct_change() {
        assert_eq!(pct_change(Some(100.0), Some(110.0)), Some(0.1));
        assert_eq!(pct_change(Some(0.0), Some(5.0)), None);
        assert_eq!(pct_change(None, Some(5.0)), None);
        assert_eq!(pct_change(Some(5.0), None), None);
    }

    #[test]
    fn test_market_cap_and_pe() {
        let fy = year(Some(100.0));
        let is = income(Some(10.0), Some(50.0));
        assert_eq!(market_cap(&fy, Some(&is)), Some(1000.0));
        assert_eq!(price_to_earnings(&fy, Some(&is)), Some(20.0));
    }

    #[test]
    fn test_pe_undefined_for_zero_earnings() {
        let fy = year(Some(100.0));
        let is = income(Some(10.0), Some(0.0));
        assert_eq!(price_to_earnings(&fy, Some(&is)), None);
    }

    #[test]
    fn test_market_cap_needs_both_operands() {
        let is = income(Some(10.0), Some(50.0));
        assert_eq!(market_cap(&year(None), Some(&is)), None);
        assert_eq!(market_cap(&year(Some(100.0)), Some(&income(None, Some(50.0)))), None);
        assert_eq!(market_cap(&year(Some(100.0)), None), None);
    }

    #[test]
    fn test_missing_join_side_is_undefined() {
        let fy = year(Some(100.0));
        let is = income(Some(10.0), Some(50.0));
        assert_eq!(price_to_free_cash_flow(&fy, Some(&is), None), None);
        assert_eq!(price_to_book(&fy, Some(&is), None), None);
        assert_eq!(enterprise_value(&fy, Some(&is), None), None);
        assert_eq!(ev_to_ebit(&fy, None, Some(&BalanceSheet::default())), None);
    }

    #[test]
    fn test_enterprise_value_and_ev_ebit() {
        let fy = year(Some(100.0));
        let mut is = income(Some(10.0), Some(50.0));
        is.operating_income = Some(200.0);
        let bs = BalanceSheet {
            total_debt: Some(300.0),
            cash_and_cash_equivalents: Some(100.0),
            ..Default::default()
        };
        assert_eq!(enterprise_value(&fy, Some(&is), Some(&bs)), Some(1200.0));
        assert_eq!(ev_to_ebit(&fy, Some(&is), Some(&bs)), Some(6.0));

        // absent operands count as zero in the sum
        let bare = BalanceSheet::default();
        assert_eq!(enterprise_value(&fy, Some(&is), Some(&bare)), Some(1000.0));
        assert_eq!(enterprise_value(&year(None), Some(&is), Some(&bs)), Some(200.0));
    }

    #[test]
    fn test_valuation_bundle() {
        let fy = year(Some(100.0));
        let is = IncomeStatement {
            revenue: Some(500.0),
            cost_of_revenue: Some(300.0),
            operating_expenses: Some(50.0),
            depreciation_and_amortization: Some(10.0),
            interest_expense: Some(15.0),
            income_tax_expense: Some(25.0),
            operating_income: Some(0.0),
            ..income(Some(10.0), Some(50.0))
        };
        let cf = CashFlow {
            free_cash_flow: Some(40.0),
            ..Default::default()
        };
        let bs = BalanceSheet {
            total_stockholders_equity: Some(250.0),
            ..Default::default()
        };

        let v = Valuation::compute(&fy, Some(&cf), Some(&bs), Some(&is));
        assert_eq!(v.market_cap, Some(1000.0));
        assert_eq!(v.price_to_earnings, Some(20.0));
        assert_eq!(v.price_to_computed_earnings, Some(10.0));
        assert_eq!(v.price_to_free_cash_flow, Some(25.0));
        assert_eq!(v.price_to_book, Some(4.0));
        assert_eq!(v.price_to_sales, Some(2.0));
        assert_eq!(v.ev_to_ebit, None);
        assert_eq!(v.values().len(), Valuation::COLUMNS.len());
    }
}
