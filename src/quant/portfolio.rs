//! # Portfolio
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Mean-variance estimation, minimum-variance optimization and efficient frontiers.

pub mod data;
pub mod engine;
pub mod estimator;
pub mod frontier;
pub mod loader;
pub mod metrics;
pub mod qp;
pub mod types;

pub use data::DailyReturns;
pub use data::PriceObservation;
pub use data::PriceTable;
pub use data::compute_daily_returns;
pub use engine::PortfolioEngine;
pub use engine::PortfolioEngineConfig;
pub use engine::PortfolioReport;
pub use estimator::MarketEstimates;
pub use estimator::TRADING_DAYS_PER_YEAR;
pub use estimator::annualize_cov;
pub use estimator::annualize_return;
pub use estimator::estimate;
pub use frontier::FrontierConfig;
pub use frontier::efficient_frontier;
pub use loader::load_price_csv;
pub use metrics::portfolio_return;
pub use metrics::portfolio_vol;
pub use metrics::sharpe_ratio;
pub use qp::ActiveSetSolver;
pub use qp::optimize_min_variance;
pub use types::Frontier;
pub use types::FrontierPoint;
pub use types::PortfolioResult;
