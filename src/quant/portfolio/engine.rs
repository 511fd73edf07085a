//! # Portfolio Engine
//!
//! $$
//! \text{prices}\ \to\ (\mu,\Sigma)\ \to\ \mathbf{w}^\*\ \to\ \mathcal F
//! $$
//!
//! High-level orchestration: estimate, optimize, and optionally sweep the frontier.

use tracing::info;

use super::data::PriceTable;
use super::estimator::MarketEstimates;
use super::estimator::TRADING_DAYS_PER_YEAR;
use super::estimator::estimate;
use super::estimator::validate_inputs;
use super::frontier::DEFAULT_FRONTIER_POINTS;
use super::frontier::FrontierConfig;
use super::frontier::efficient_frontier;
use super::metrics::portfolio_return;
use super::metrics::portfolio_vol;
use super::metrics::sharpe_ratio;
use super::qp::ActiveSetSolver;
use super::types::Frontier;
use super::types::PortfolioResult;
use crate::error::Result;
use crate::traits::MinVarianceSolver;

/// Runtime configuration for [`PortfolioEngine`].
#[derive(Clone, Debug)]
pub struct PortfolioEngineConfig {
  /// Trading periods per year used to annualize daily statistics.
  pub periods_per_year: f64,
  /// Minimum expected return; `None` solves for the global minimum-variance portfolio.
  pub target_return: Option<f64>,
  /// Allow negative weights.
  pub allow_short: bool,
  /// Risk-free rate used in the reported Sharpe ratio.
  pub risk_free: f64,
  /// Grid size of [`PortfolioEngine::frontier`].
  pub frontier_points: usize,
  pub parallel_frontier: bool,
}

impl Default for PortfolioEngineConfig {
  fn default() -> Self {
    Self {
      periods_per_year: TRADING_DAYS_PER_YEAR,
      target_return: None,
      allow_short: false,
      risk_free: 0.0,
      frontier_points: DEFAULT_FRONTIER_POINTS,
      parallel_frontier: false,
    }
  }
}

/// Everything a single optimization request produces.
#[derive(Clone, Debug)]
pub struct PortfolioReport {
  pub estimates: MarketEstimates,
  pub portfolio: PortfolioResult,
  pub frontier: Option<Frontier>,
}

/// Single entry-point engine for minimum-variance workflows.
#[derive(Clone, Debug)]
pub struct PortfolioEngine<S = ActiveSetSolver> {
  config: PortfolioEngineConfig,
  solver: S,
}

impl PortfolioEngine {
  /// Construct an engine backed by the built-in active-set solver.
  pub fn new(config: PortfolioEngineConfig) -> Self {
    Self {
      config,
      solver: ActiveSetSolver::default(),
    }
  }
}

impl<S: MinVarianceSolver> PortfolioEngine<S> {
  /// Construct an engine around a custom solver.
  pub fn with_solver(config: PortfolioEngineConfig, solver: S) -> Self {
    Self { config, solver }
  }

  pub fn config(&self) -> &PortfolioEngineConfig {
    &self.config
  }

  pub fn solver(&self) -> &S {
    &self.solver
  }

  /// Annualized (μ, Σ) for the table's symbols.
  pub fn estimate(&self, prices: &PriceTable) -> Result<MarketEstimates> {
    estimate(prices, self.config.periods_per_year)
  }

  /// Minimum-variance weights for the configured target and shorting policy.
  pub fn optimize(&self, estimates: &MarketEstimates) -> Result<PortfolioResult> {
    let mu = estimates.mu.view();
    let cov = estimates.cov.view();
    validate_inputs(mu, cov)?;
    let weights = self
      .solver
      .solve(mu, cov, self.config.target_return, self.config.allow_short)?;

    let expected_return = portfolio_return(weights.view(), mu);
    let volatility = portfolio_vol(weights.view(), cov);

    Ok(PortfolioResult {
      symbols: estimates.symbols.clone(),
      weights: weights.to_vec(),
      expected_return,
      volatility,
      sharpe: sharpe_ratio(expected_return, volatility, self.config.risk_free),
      target_return: self.config.target_return,
    })
  }

  /// Efficient frontier over `[min μ, max μ]`.
  pub fn frontier(&self, estimates: &MarketEstimates) -> Result<Frontier> {
    let config = FrontierConfig::new(
      self.config.frontier_points,
      self.config.allow_short,
      self.config.parallel_frontier,
    );
    efficient_frontier(
      estimates.mu.view(),
      estimates.cov.view(),
      &self.solver,
      &config,
    )
  }

  /// Full request: estimate, optimize and, when asked, trace the frontier.
  pub fn run(&self, prices: &PriceTable, include_frontier: bool) -> Result<PortfolioReport> {
    info!(
      symbols = prices.n_symbols(),
      dates = prices.n_rows(),
      target = ?self.config.target_return,
      allow_short = self.config.allow_short,
      "optimizing portfolio"
    );

    let estimates = self.estimate(prices)?;
    let portfolio = self.optimize(&estimates)?;
    let frontier = if include_frontier {
      Some(self.frontier(&estimates)?)
    } else {
      None
    };

    info!(
      expected_return = portfolio.expected_return,
      volatility = portfolio.volatility,
      frontier_points = frontier.as_ref().map_or(0, Frontier::len),
      "portfolio optimized"
    );

    Ok(PortfolioReport {
      estimates,
      portfolio,
      frontier,
    })
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::Array1;
  use ndarray::ArrayView1;
  use ndarray::ArrayView2;
  use ndarray::array;

  use super::*;
  use crate::error::PortfolioError;

  fn estimates() -> MarketEstimates {
    MarketEstimates::new(
      vec!["AAA".to_string(), "BBB".to_string()],
      array![0.1, 0.2],
      array![[0.04, 0.0], [0.0, 0.09]],
    )
    .unwrap()
  }

  fn all_in_first(
    mu: ArrayView1<f64>,
    _cov: ArrayView2<f64>,
    _target: Option<f64>,
    _allow_short: bool,
  ) -> Result<Array1<f64>> {
    let mut w = Array1::zeros(mu.len());
    w[0] = 1.0;
    Ok(w)
  }

  #[test]
  fn default_config_is_long_only_daily_252() {
    let config = PortfolioEngineConfig::default();
    assert_eq!(config.periods_per_year, 252.0);
    assert_eq!(config.target_return, None);
    assert!(!config.allow_short);
    assert_eq!(config.frontier_points, 50);
  }

  #[test]
  fn optimize_reports_metrics_of_solved_weights() {
    let engine = PortfolioEngine::new(PortfolioEngineConfig {
      target_return: Some(0.15),
      risk_free: 0.02,
      ..Default::default()
    });
    let result = engine.optimize(&estimates()).unwrap();

    assert_abs_diff_eq!(result.weights[0], 0.5, epsilon = 1e-8);
    assert_abs_diff_eq!(result.expected_return, 0.15, epsilon = 1e-8);
    let vol = (0.25 * 0.04 + 0.25 * 0.09_f64).sqrt();
    assert_abs_diff_eq!(result.volatility, vol, epsilon = 1e-8);
    assert_abs_diff_eq!(result.sharpe, (0.15 - 0.02) / vol, epsilon = 1e-6);
    assert_eq!(result.target_return, Some(0.15));
  }

  #[test]
  fn unattainable_target_surfaces_infeasibility() {
    let engine = PortfolioEngine::new(PortfolioEngineConfig {
      target_return: Some(0.5),
      ..Default::default()
    });
    assert!(matches!(
      engine.optimize(&estimates()),
      Err(PortfolioError::InfeasibleConstraint { .. })
    ));
  }

  #[test]
  fn malformed_estimates_never_reach_the_solver() {
    let engine = PortfolioEngine::with_solver(PortfolioEngineConfig::default(), all_in_first);
    let est = MarketEstimates {
      symbols: vec!["AAA".to_string(), "BBB".to_string()],
      mu: array![0.1, 0.2],
      cov: array![[0.04]],
    };

    assert!(matches!(
      engine.optimize(&est),
      Err(PortfolioError::DegenerateInput(_))
    ));
  }

  #[test]
  fn custom_solver_is_used_for_optimize_and_frontier() {
    let engine = PortfolioEngine::with_solver(
      PortfolioEngineConfig {
        frontier_points: 4,
        ..Default::default()
      },
      all_in_first,
    );
    let est = estimates();

    let result = engine.optimize(&est).unwrap();
    assert_eq!(result.weight_of("AAA"), Some(1.0));

    let frontier = engine.frontier(&est).unwrap();
    assert_eq!(frontier.len(), 4);
    assert!(frontier.returns.iter().all(|&r| r == 0.1));
  }
}
