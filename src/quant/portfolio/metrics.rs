//! # Portfolio Metrics
//!
//! $$
//! \mu_p = \mathbf{w}^\top\mu,\qquad \sigma_p = \sqrt{\max(0,\mathbf{w}^\top \Sigma \mathbf{w})}
//! $$
//!
use ndarray::ArrayView1;
use ndarray::ArrayView2;

/// Expected portfolio return `wᵀμ`.
pub fn portfolio_return(w: ArrayView1<f64>, mu: ArrayView1<f64>) -> f64 {
  w.dot(&mu)
}

/// Portfolio variance `wᵀΣw`, clamped at zero.
pub fn portfolio_variance(w: ArrayView1<f64>, cov: ArrayView2<f64>) -> f64 {
  w.dot(&cov.dot(&w)).max(0.0)
}

/// Portfolio volatility. Rounding on a near-singular Σ can push `wᵀΣw`
/// slightly below zero, so the radicand is clamped first.
pub fn portfolio_vol(w: ArrayView1<f64>, cov: ArrayView2<f64>) -> f64 {
  portfolio_variance(w, cov).sqrt()
}

pub fn sharpe_ratio(expected_return: f64, volatility: f64, risk_free: f64) -> f64 {
  if volatility > 1e-15 {
    (expected_return - risk_free) / volatility
  } else {
    0.0
  }
}
