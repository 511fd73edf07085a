//! # Return/Covariance Estimator
//!
//! $$
//! \mu_i = (1+\bar r_i)^{P}-1,\qquad \Sigma = P\,\hat\Sigma_{\text{daily}}
//! $$
//!
//! Annualized expected returns and covariance from a price table.

use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray::Axis;
use tracing::debug;

use super::data::DailyReturns;
use super::data::PriceTable;
use super::data::compute_daily_returns;
use crate::error::PortfolioError;
use crate::error::Result;

/// Trading periods per year used for annualization.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Compounded annualization, elementwise: `(1 + m)^periods - 1`.
pub fn annualize_return(daily_mean: ArrayView1<f64>, periods: f64) -> Array1<f64> {
  daily_mean.mapv(|m| (1.0 + m).powf(periods) - 1.0)
}

/// Linear annualization of a daily covariance matrix.
pub fn annualize_cov(daily_cov: ArrayView2<f64>, periods: f64) -> Array2<f64> {
  daily_cov.mapv(|c| c * periods)
}

/// Per-symbol mean of the defined daily returns.
pub fn mean_daily_returns(returns: &DailyReturns) -> Result<Array1<f64>> {
  let values = returns.values();
  let mut means = Array1::zeros(values.ncols());

  for (j, col) in values.axis_iter(Axis(1)).enumerate() {
    let (sum, count) = col
      .iter()
      .filter(|v| v.is_finite())
      .fold((0.0, 0usize), |(s, c), &v| (s + v, c + 1));

    if count == 0 {
      return Err(PortfolioError::EmptyData(format!(
        "no return observations for {}",
        returns.symbols()[j]
      )));
    }
    means[j] = sum / count as f64;
  }

  Ok(means)
}

/// Sample covariance (n - 1 denominator) over pairwise-complete rows.
pub fn daily_covariance(returns: &DailyReturns) -> Result<Array2<f64>> {
  let values = returns.values();
  let n = values.ncols();
  let mut cov = Array2::zeros((n, n));

  for i in 0..n {
    for j in i..n {
      let pairs: Vec<(f64, f64)> = values
        .column(i)
        .iter()
        .zip(values.column(j).iter())
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(&a, &b)| (a, b))
        .collect();

      if pairs.len() < 2 {
        return Err(PortfolioError::EmptyData(format!(
          "fewer than two overlapping return observations for {} / {}",
          returns.symbols()[i],
          returns.symbols()[j]
        )));
      }

      let k = pairs.len() as f64;
      let mean_a = pairs.iter().map(|p| p.0).sum::<f64>() / k;
      let mean_b = pairs.iter().map(|p| p.1).sum::<f64>() / k;
      let c = pairs
        .iter()
        .map(|(a, b)| (a - mean_a) * (b - mean_b))
        .sum::<f64>()
        / (k - 1.0);

      cov[[i, j]] = c;
      cov[[j, i]] = c;
    }
  }

  Ok(cov)
}

/// Annualized (μ, Σ) with the symbol ordering of the source price table.
#[derive(Clone, Debug, PartialEq)]
pub struct MarketEstimates {
  pub symbols: Vec<String>,
  pub mu: Array1<f64>,
  pub cov: Array2<f64>,
}

impl MarketEstimates {
  pub fn new(symbols: Vec<String>, mu: Array1<f64>, cov: Array2<f64>) -> Result<Self> {
    if symbols.len() != mu.len() {
      return Err(PortfolioError::DegenerateInput(format!(
        "{} symbols for {} expected returns",
        symbols.len(),
        mu.len()
      )));
    }
    validate_inputs(mu.view(), cov.view())?;

    Ok(Self { symbols, mu, cov })
  }

  pub fn n_assets(&self) -> usize {
    self.mu.len()
  }
}

/// Reject inputs no optimizer should see: zero assets, Σ not `n × n`, or
/// non-finite entries.
pub fn validate_inputs(mu: ArrayView1<f64>, cov: ArrayView2<f64>) -> Result<()> {
  let n = mu.len();
  if n == 0 {
    return Err(PortfolioError::DegenerateInput("no symbols".to_string()));
  }

  if cov.dim() != (n, n) {
    return Err(PortfolioError::DegenerateInput(format!(
      "covariance has shape {:?} for {} expected returns",
      cov.dim(),
      n
    )));
  }

  if mu.iter().chain(cov.iter()).any(|v| !v.is_finite()) {
    return Err(PortfolioError::DegenerateInput(
      "expected returns or covariance contain non-finite values".to_string(),
    ));
  }

  Ok(())
}

/// Estimate annualized (μ, Σ) from prices.
pub fn estimate(prices: &PriceTable, periods: f64) -> Result<MarketEstimates> {
  let returns = compute_daily_returns(prices)?;
  if returns.is_empty() {
    return Err(PortfolioError::EmptyData(format!(
      "{} price row(s) give no daily returns",
      prices.n_rows()
    )));
  }

  let mu = annualize_return(mean_daily_returns(&returns)?.view(), periods);
  let cov = annualize_cov(daily_covariance(&returns)?.view(), periods);

  debug!(
    symbols = returns.symbols().len(),
    observations = returns.n_rows(),
    "estimated annualized returns and covariance"
  );

  MarketEstimates::new(returns.symbols().to_vec(), mu, cov)
}
