//! # Errors
//!
//! $$
//! \text{request}\to\{\text{weights}\}\cup\{\text{EmptyData},\text{Infeasible},\text{SolverFailure},\text{Degenerate}\}
//! $$
//!
//! Failure kinds reported by estimation, optimization and the frontier sweep.

use thiserror::Error;

/// Why the quadratic program did not produce a usable weight vector.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverFailure {
  /// Iteration budget exhausted before the optimality conditions held.
  #[error("no convergence after {iterations} iterations")]
  NonConvergence { iterations: usize },
  /// The KKT system could not be solved.
  #[error("KKT system could not be solved: {0}")]
  LinearSystem(String),
  /// The solver finished but the candidate violates the constraints or is not finite.
  #[error("invalid solution: {0}")]
  InvalidSolution(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PortfolioError {
  /// No usable price observations for the requested symbols/date range.
  #[error("empty data: {0}")]
  EmptyData(String),
  /// Target return cannot be reached under the active short-selling policy.
  #[error("target return {target} is unattainable (max attainable {max_attainable})")]
  InfeasibleConstraint { target: f64, max_attainable: f64 },
  #[error("solver failure: {0}")]
  SolverFailure(#[from] SolverFailure),
  /// Contract violation: zero symbols, mismatched dimensions or non-finite inputs.
  #[error("degenerate input: {0}")]
  DegenerateInput(String),
}

impl PortfolioError {
  /// Per-point failures a frontier sweep may skip. Everything else aborts the request.
  pub fn is_recoverable(&self) -> bool {
    matches!(
      self,
      PortfolioError::InfeasibleConstraint { .. } | PortfolioError::SolverFailure(_)
    )
  }
}

pub type Result<T> = std::result::Result<T, PortfolioError>;
