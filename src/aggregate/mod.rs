//! Daily prices → one [`FiscalYear`] summary per calendar year.
//!
//! Years are emitted in ascending order; a calendar year without any
//! observation produces no row. Trailing momentum (1m/3m/6m) compares the
//! mean close of the last two non-empty sub-periods of the year, so a year
//! with a single bucket for a window leaves that field undefined.

use crate::models::{FiscalYear, PriceBar};
use crate::ratios::{pct_change, safe_div};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

/// Sub-year resampling window for the momentum metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Month,
    Quarter,
    Half,
}

impl Window {
    /// Bucket index of `date` within its calendar year.
    pub fn bucket(self, date: NaiveDate) -> u32 {
        let m0 = date.month0();
        match self {
            Window::Month => m0,
            Window::Quarter => m0 / 3,
            Window::Half => m0 / 6,
        }
    }
}

pub fn aggregate_years(symbol: &str, bars: &[PriceBar]) -> Vec<FiscalYear> {
    let mut by_year: BTreeMap<i32, Vec<PriceBar>> = BTreeMap::new();
    for bar in bars {
        by_year.entry(bar.date.year()).or_default().push(*bar);
    }

    let mut years = Vec::with_capacity(by_year.len());
    let mut previous: Option<(i32, f64)> = None;

    for (year, mut obs) in by_year {
        obs.sort_by_key(|b| b.date);
        let mut fy = summarise_year(symbol, year, &obs);

        fy.price_change_pct_1y = match previous {
            Some((prev_year, prev_last)) if prev_year == year - 1 => {
                pct_change(Some(prev_last), fy.price_last)
            }
            _ => None,
        };

        previous = fy.price_last.map(|last| (year, last));
        years.push(fy);
    }

    years
}

/// Statistics for one calendar year; `obs` must be non-empty and sorted.
fn summarise_year(symbol: &str, year: i32, obs: &[PriceBar]) -> FiscalYear {
    let price_first = obs.first().map(|b| b.open);
    let price_last = obs.last().map(|b| b.close);
    let price_min = obs.iter().map(|b| b.low).reduce(f64::min);
    let price_max = obs.iter().map(|b| b.high).reduce(f64::max);

    let closes: Vec<f64> = obs.iter().map(|b| b.close).collect();
    let (price_avg, price_var) = mean_and_sample_var(&closes);

    let price_change = match (price_first, price_last) {
        (Some(first), Some(last)) => Some(last - first),
        _ => None,
    };

    FiscalYear {
        symbol: symbol.to_string(),
        fiscal_year: year,
        price_first,
        price_last,
        price_min,
        price_max,
        price_avg,
        price_std: price_var.map(f64::sqrt),
        price_var,
        price_change,
        price_change_pct: safe_div(price_change, price_first),
        price_change_pct_1y: None,
        price_change_pct_1m: trailing_momentum(obs, Window::Month),
        price_change_pct_3m: trailing_momentum(obs, Window::Quarter),
        price_change_pct_6m: trailing_momentum(obs, Window::Half),
    }
}

/// Mean and sample (n − 1) variance. Variance needs two observations.
fn mean_and_sample_var(values: &[f64]) -> (Option<f64>, Option<f64>) {
    let n = values.len();
    if n == 0 {
        return (None, None);
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    if n < 2 {
        return (Some(mean), None);
    }
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (Some(mean), Some(ss / (n - 1) as f64))
}

/// Pct change of the mean close of the last bucket against the one before it.
fn trailing_momentum(obs: &[PriceBar], window: Window) -> Option<f64> {
    let mut buckets: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
    for bar in obs {
        let slot = buckets.entry(window.bucket(bar.date)).or_insert((0.0, 0));
        slot.0 += bar.close;
        slot.1 += 1;
    }

    let mut means = buckets.values().rev().map(|(sum, n)| sum / *n as f64);
    let last = means.next()?;
    let before = means.next()?;
    pct_change(Some(before), Some(last))
}

/// Close of the observation nearest to `date`; ties go to the earlier one.
pub fn price_on(bars: &[PriceBar], date: NaiveDate) -> Option<f64> {
    bars.iter()
        .min_by_key(|b| ((b.date - date).num_days().abs(), b.date))
        .map(|b| b.close)
}
