//! # Traits
//!
//! $$
//! \mathcal{S}:(\mu,\Sigma,t,\text{short})\mapsto \mathbf{w}\ \text{or failure}
//! $$
//!
use ndarray::Array1;
use ndarray::ArrayView1;
use ndarray::ArrayView2;

use crate::error::Result;

/// Minimum-variance solver capability.
///
/// Solves `min wᵀΣw` subject to `sum(w) = 1`, `w ≥ 0` unless `allow_short`,
/// and `wᵀμ ≥ target` when a target is given. Implementations must be pure:
/// identical inputs give identical weights.
pub trait MinVarianceSolver: Sync {
  fn solve(
    &self,
    mu: ArrayView1<f64>,
    cov: ArrayView2<f64>,
    target: Option<f64>,
    allow_short: bool,
  ) -> Result<Array1<f64>>;
}

impl<F> MinVarianceSolver for F
where
  F: Fn(ArrayView1<f64>, ArrayView2<f64>, Option<f64>, bool) -> Result<Array1<f64>> + Sync,
{
  fn solve(
    &self,
    mu: ArrayView1<f64>,
    cov: ArrayView2<f64>,
    target: Option<f64>,
    allow_short: bool,
  ) -> Result<Array1<f64>> {
    self(mu, cov, target, allow_short)
  }
}
