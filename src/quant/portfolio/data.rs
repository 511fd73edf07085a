//! # Portfolio Data Utilities
//!
//! $$
//! r_{t,i} = \frac{p_{t,i}}{p_{t-1,i}} - 1
//! $$
//!
//! Price observations, the dense date × symbol price table and daily returns.
//! Missing cells are stored as `NaN`.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use chrono::NaiveDate;
use ndarray::Array2;
use ndarray::ArrayView2;
use ndarray::Axis;
use serde::Deserialize;
use tracing::warn;

use crate::error::PortfolioError;
use crate::error::Result;

/// One stored price record for a symbol on a date.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PriceObservation {
  pub date: NaiveDate,
  pub symbol: String,
  pub close: f64,
  #[serde(default)]
  pub adjusted_close: Option<f64>,
}

impl PriceObservation {
  pub fn new(date: NaiveDate, symbol: &str, close: f64, adjusted_close: Option<f64>) -> Self {
    Self {
      date,
      symbol: symbol.to_string(),
      close,
      adjusted_close,
    }
  }

  /// Adjusted close when present, otherwise close.
  pub fn price(&self) -> f64 {
    match self.adjusted_close {
      Some(p) if p.is_finite() && p != 0.0 => p,
      _ => self.close,
    }
  }
}

/// Dense price table: one row per date (ascending), one column per symbol.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceTable {
  dates: Vec<NaiveDate>,
  symbols: Vec<String>,
  values: Array2<f64>,
}

impl PriceTable {
  pub fn new(dates: Vec<NaiveDate>, symbols: Vec<String>, values: Array2<f64>) -> Result<Self> {
    if values.dim() != (dates.len(), symbols.len()) {
      return Err(PortfolioError::DegenerateInput(format!(
        "price values have shape {:?}, expected ({}, {})",
        values.dim(),
        dates.len(),
        symbols.len()
      )));
    }

    if dates.windows(2).any(|w| w[0] >= w[1]) {
      return Err(PortfolioError::DegenerateInput(
        "price dates must be strictly increasing".to_string(),
      ));
    }

    Ok(Self {
      dates,
      symbols,
      values,
    })
  }

  /// Pivot observations into a table. Dates ascend and symbol columns are
  /// sorted; cells without an observation are `NaN`.
  pub fn from_observations(observations: &[PriceObservation]) -> Self {
    let dates: BTreeSet<NaiveDate> = observations.iter().map(|o| o.date).collect();
    let symbols: BTreeSet<&str> = observations.iter().map(|o| o.symbol.as_str()).collect();

    let row_of: BTreeMap<NaiveDate, usize> = dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
    let col_of: BTreeMap<&str, usize> = symbols.iter().enumerate().map(|(j, s)| (*s, j)).collect();

    let mut values = Array2::from_elem((dates.len(), symbols.len()), f64::NAN);
    let mut seen = BTreeSet::new();

    for obs in observations {
      let i = row_of[&obs.date];
      let j = col_of[obs.symbol.as_str()];
      if !seen.insert((i, j)) {
        warn!(
          symbol = %obs.symbol,
          date = %obs.date,
          "duplicate price observation, keeping the last one"
        );
      }
      values[[i, j]] = obs.price();
    }

    Self {
      dates: dates.into_iter().collect(),
      symbols: symbols.into_iter().map(str::to_string).collect(),
      values,
    }
  }

  /// Like [`PriceTable::from_observations`], restricted to `symbols` (all when
  /// empty) and to the inclusive `[start, end]` date window.
  pub fn from_observations_in_range(
    observations: &[PriceObservation],
    symbols: &[String],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
  ) -> Self {
    let wanted: BTreeSet<&str> = symbols.iter().map(String::as_str).collect();
    let filtered: Vec<PriceObservation> = observations
      .iter()
      .filter(|o| wanted.is_empty() || wanted.contains(o.symbol.as_str()))
      .filter(|o| start.map_or(true, |s| o.date >= s))
      .filter(|o| end.map_or(true, |e| o.date <= e))
      .cloned()
      .collect();

    Self::from_observations(&filtered)
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn symbols(&self) -> &[String] {
    &self.symbols
  }

  pub fn values(&self) -> ArrayView2<'_, f64> {
    self.values.view()
  }

  pub fn n_rows(&self) -> usize {
    self.dates.len()
  }

  pub fn n_symbols(&self) -> usize {
    self.symbols.len()
  }

  pub fn is_empty(&self) -> bool {
    self.dates.is_empty() || self.symbols.is_empty()
  }
}

/// Daily relative price changes. One row fewer than the source prices, minus
/// any row where every symbol is undefined.
#[derive(Clone, Debug, PartialEq)]
pub struct DailyReturns {
  dates: Vec<NaiveDate>,
  symbols: Vec<String>,
  values: Array2<f64>,
}

impl DailyReturns {
  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn symbols(&self) -> &[String] {
    &self.symbols
  }

  pub fn values(&self) -> ArrayView2<'_, f64> {
    self.values.view()
  }

  pub fn n_rows(&self) -> usize {
    self.dates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.dates.is_empty()
  }
}

fn pct_change(prev: f64, curr: f64) -> f64 {
  if prev.is_finite() && curr.is_finite() && prev != 0.0 {
    curr / prev - 1.0
  } else {
    f64::NAN
  }
}

/// Percentage-change table of `prices`.
///
/// Rows with partial gaps are kept with `NaN` cells; rows that are entirely
/// undefined are dropped. An empty price table is an [`PortfolioError::EmptyData`].
pub fn compute_daily_returns(prices: &PriceTable) -> Result<DailyReturns> {
  if prices.is_empty() {
    return Err(PortfolioError::EmptyData(
      "price table has no observations".to_string(),
    ));
  }

  let p = prices.values();
  let mut dates = Vec::with_capacity(prices.n_rows().saturating_sub(1));
  let mut rows: Vec<f64> = Vec::with_capacity(prices.n_rows().saturating_sub(1) * prices.n_symbols());

  for t in 1..prices.n_rows() {
    let row: Vec<f64> = p
      .row(t - 1)
      .iter()
      .zip(p.row(t).iter())
      .map(|(&prev, &curr)| pct_change(prev, curr))
      .collect();

    if row.iter().all(|r| r.is_nan()) {
      continue;
    }

    dates.push(prices.dates[t]);
    rows.extend(row);
  }

  let values = Array2::from_shape_vec((dates.len(), prices.n_symbols()), rows)
    .map_err(|e| PortfolioError::DegenerateInput(e.to_string()))?;

  Ok(DailyReturns {
    dates,
    symbols: prices.symbols.clone(),
    values,
  })
}

/// Number of defined cells per symbol.
pub fn observation_counts(returns: &DailyReturns) -> Vec<usize> {
  returns
    .values
    .axis_iter(Axis(1))
    .map(|col| col.iter().filter(|v| v.is_finite()).count())
    .collect()
}
