//! # Portfolio Types
//!
//! $$
//! \mathcal F=\{(\sigma_k,\mu_k,\mathbf{w}_k)\}_{k=1}^{K}
//! $$
//!
//! Result containers for single optimizations and frontier sweeps.

use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::ArrayView1;

/// Output of a portfolio optimization run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PortfolioResult {
  /// Asset identifiers, in weight order.
  pub symbols: Vec<String>,
  /// Final portfolio weights.
  pub weights: Vec<f64>,
  /// Model expected portfolio return (annualized if inputs are annualized).
  pub expected_return: f64,
  /// Model portfolio volatility.
  pub volatility: f64,
  /// Sharpe ratio computed as `(expected_return - risk_free) / volatility`.
  pub sharpe: f64,
  /// Target return the weights were solved for, if any.
  pub target_return: Option<f64>,
}

impl PortfolioResult {
  /// `(symbol, weight)` pairs in column order, ready to be stored as a named portfolio.
  pub fn weights_by_symbol(&self) -> Vec<(&str, f64)> {
    self
      .symbols
      .iter()
      .map(String::as_str)
      .zip(self.weights.iter().copied())
      .collect()
  }

  pub fn weight_of(&self, symbol: &str) -> Option<f64> {
    self
      .symbols
      .iter()
      .position(|s| s == symbol)
      .map(|i| self.weights[i])
  }

  /// Default stored-portfolio name, e.g. `Opt AAPL+MSFT 2024-05-01`.
  pub fn default_name(&self, date: NaiveDate) -> String {
    self.name_in_order(&[], date)
  }

  /// Like [`Self::default_name`], but lists held symbols in `order` first.
  ///
  /// Symbols in `order` that the result does not hold are left out; held
  /// symbols missing from `order` follow in column order.
  pub fn name_in_order(&self, order: &[String], date: NaiveDate) -> String {
    let mut names: Vec<&str> = order
      .iter()
      .map(String::as_str)
      .filter(|s| self.symbols.iter().any(|held| held == s))
      .collect();
    for held in &self.symbols {
      if !names.contains(&held.as_str()) {
        names.push(held);
      }
    }
    format!("Opt {} {}", names.join("+"), date.format("%Y-%m-%d"))
  }
}

/// One solved grid point of the frontier.
#[derive(Clone, Debug)]
pub struct FrontierPoint<'a> {
  pub volatility: f64,
  pub expected_return: f64,
  pub weights: ArrayView1<'a, f64>,
}

/// Efficient frontier as parallel sequences in non-decreasing target order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frontier {
  pub returns: Vec<f64>,
  pub volatilities: Vec<f64>,
  pub weights: Vec<Array1<f64>>,
  /// Grid points dropped because the target was unattainable.
  pub skipped_infeasible: usize,
  /// Grid points dropped because the solver failed.
  pub skipped_failed: usize,
}

impl Frontier {
  pub fn len(&self) -> usize {
    self.returns.len()
  }

  pub fn is_empty(&self) -> bool {
    self.returns.is_empty()
  }

  pub(crate) fn push(&mut self, expected_return: f64, volatility: f64, weights: Array1<f64>) {
    self.returns.push(expected_return);
    self.volatilities.push(volatility);
    self.weights.push(weights);
  }

  pub fn points(&self) -> impl Iterator<Item = FrontierPoint<'_>> + '_ {
    self
      .returns
      .iter()
      .zip(self.volatilities.iter())
      .zip(self.weights.iter())
      .map(|((&expected_return, &volatility), w)| FrontierPoint {
        volatility,
        expected_return,
        weights: w.view(),
      })
  }

  /// `(volatility, return)` pairs for charting.
  pub fn risk_return_pairs(&self) -> Vec<(f64, f64)> {
    self
      .volatilities
      .iter()
      .copied()
      .zip(self.returns.iter().copied())
      .collect()
  }
}
