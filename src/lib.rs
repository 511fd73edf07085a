//! # markowitz-rs
//!
//! $$
//! \min_{\mathbf{w}}\ \mathbf{w}^\top\Sigma\mathbf{w}\quad\text{s.t.}\quad \mathbf 1^\top\mathbf{w}=1,\ \mu^\top\mathbf{w}\ge t
//! $$
//!
//! Modern-portfolio-theory toolkit: annualized return/covariance estimation
//! from daily prices, minimum-variance optimization with optional return target
//! and short-selling, efficient frontier sweeps and frontier charts.

pub mod error;
pub mod quant;
pub mod traits;
pub mod visualization;
