//! # Efficient Frontier
//!
//! $$
//! t_k = \min\mu + \frac{k}{K-1}(\max\mu-\min\mu),\qquad
//! \mathbf{w}_k=\arg\min\{\mathbf{w}^\top\Sigma\mathbf{w} : \mathbf 1^\top\mathbf{w}=1,\ \mu^\top\mathbf{w}\ge t_k\}
//! $$
//!
//! Sweeps a target-return grid through a [`MinVarianceSolver`]. Unreachable
//! targets and solver failures drop the point; the sweep itself only fails on
//! malformed input.

use impl_new_derive::ImplNew;
use ndarray::Array1;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use rayon::prelude::*;
use tracing::debug;

use super::estimator::validate_inputs;
use super::metrics::portfolio_return;
use super::metrics::portfolio_vol;
use super::types::Frontier;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::traits::MinVarianceSolver;

pub const DEFAULT_FRONTIER_POINTS: usize = 50;

#[derive(ImplNew, Clone, Copy, Debug)]
pub struct FrontierConfig {
  /// Number of grid points between `min(μ)` and `max(μ)`.
  pub n_points: usize,
  pub allow_short: bool,
  /// Solve grid points on the rayon pool.
  pub parallel: bool,
}

impl Default for FrontierConfig {
  fn default() -> Self {
    Self {
      n_points: DEFAULT_FRONTIER_POINTS,
      allow_short: false,
      parallel: false,
    }
  }
}

/// Evenly spaced targets from `min(μ)` to `max(μ)`, both ends exact.
///
/// Collapses to a single target when every asset has the same expected return.
pub fn target_grid(mu: ArrayView1<f64>, n_points: usize) -> Vec<f64> {
  if n_points == 0 || mu.is_empty() {
    return Vec::new();
  }

  let min = mu.iter().copied().fold(f64::INFINITY, f64::min);
  let max = mu.iter().copied().fold(f64::NEG_INFINITY, f64::max);

  if n_points == 1 || min == max {
    return vec![min];
  }

  let step = (max - min) / (n_points - 1) as f64;
  let mut grid: Vec<f64> = (0..n_points).map(|k| min + step * k as f64).collect();
  grid[n_points - 1] = max;
  grid
}

/// Trace the efficient frontier with `solver`.
pub fn efficient_frontier<S>(
  mu: ArrayView1<f64>,
  cov: ArrayView2<f64>,
  solver: &S,
  config: &FrontierConfig,
) -> Result<Frontier>
where
  S: MinVarianceSolver + ?Sized,
{
  validate_inputs(mu, cov)?;

  let grid = target_grid(mu, config.n_points);
  let solve = |t: f64| solver.solve(mu, cov, Some(t), config.allow_short);

  let outcomes: Vec<Result<Array1<f64>>> = if config.parallel {
    grid.par_iter().map(|&t| solve(t)).collect()
  } else {
    grid.iter().map(|&t| solve(t)).collect()
  };

  let mut frontier = Frontier::default();
  for (target, outcome) in grid.iter().zip(outcomes) {
    match outcome {
      Ok(w) => {
        let ret = portfolio_return(w.view(), mu);
        let vol = portfolio_vol(w.view(), cov);
        frontier.push(ret, vol, w);
      }
      Err(err) if !err.is_recoverable() => return Err(err),
      Err(PortfolioError::SolverFailure(reason)) => {
        debug!(target_return = *target, reason = %reason, "skipping frontier point after solver failure");
        frontier.skipped_failed += 1;
      }
      Err(err) => {
        debug!(target_return = *target, error = %err, "skipping infeasible frontier point");
        frontier.skipped_infeasible += 1;
      }
    }
  }

  debug!(
    requested = config.n_points,
    solved = frontier.len(),
    infeasible = frontier.skipped_infeasible,
    failed = frontier.skipped_failed,
    "frontier sweep finished"
  );

  Ok(frontier)
}
