//! # Active-Set Quadratic Program
//!
//! $$
//! \min_{\mathbf{w}} \ \mathbf{w}^\top \Sigma \mathbf{w}
//! \quad \text{s.t.}\quad \mathbf{1}^\top\mathbf{w}=1,\ \ \mathbf{w}\ge 0,\ \ \mu^\top\mathbf{w}\ge t
//! $$
//!
//! Primal active-set method for small dense problems. Each iteration solves the
//! equality-constrained subproblem on the current working set through the KKT
//! system
//!
//! $$
//! \begin{pmatrix} G & -A^\top \\ A & 0 \end{pmatrix}
//! \begin{pmatrix} p \\ \lambda \end{pmatrix}
//! = \begin{pmatrix} -G x \\ 0 \end{pmatrix}
//! $$
//!
//! with an SVD least-squares solve, so a singular (PSD only) covariance still
//! yields a minimizer instead of a failed factorization.

use impl_new_derive::ImplNew;
use nalgebra::DMatrix;
use nalgebra::DVector;
use nalgebra::SVD;
use ndarray::Array1;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray::Axis;
use tracing::debug;

use super::estimator::validate_inputs;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::error::SolverFailure;
use crate::traits::MinVarianceSolver;

/// Slack allowed on `sum(w) = 1`, `w ≥ 0` and `wᵀμ ≥ t` in returned weights.
pub const FEASIBILITY_TOLERANCE: f64 = 1e-8;

/// Steps shorter than this, relative to the iterate, count as zero.
const STEP_TOLERANCE: f64 = 1e-8;

/// Singular values below `largest * SVD_CUTOFF` are truncated in the KKT solve.
const SVD_CUTOFF: f64 = 1e-10;

/// Active-set solver for the long-only / long-short minimum-variance problem.
#[derive(ImplNew, Clone, Copy, Debug)]
pub struct ActiveSetSolver {
  /// Zero threshold for steps and Lagrange multipliers.
  pub tolerance: f64,
  /// Iteration budget; scales with problem size when `None`.
  pub max_iterations: Option<usize>,
}

impl Default for ActiveSetSolver {
  fn default() -> Self {
    Self {
      tolerance: 1e-10,
      max_iterations: None,
    }
  }
}

/// Inequality `aᵀx ≥ b`.
#[derive(Clone, Debug)]
struct Constraint {
  normal: DVector<f64>,
  rhs: f64,
}

impl Constraint {
  fn slack(&self, x: &DVector<f64>) -> f64 {
    self.normal.dot(x) - self.rhs
  }
}

impl MinVarianceSolver for ActiveSetSolver {
  fn solve(
    &self,
    mu: ArrayView1<f64>,
    cov: ArrayView2<f64>,
    target: Option<f64>,
    allow_short: bool,
  ) -> Result<Array1<f64>> {
    validate_inputs(mu, cov)?;
    check_attainable(mu, target, allow_short)?;

    if let Some(w) = self.solve_at_max_return(mu, cov, target, allow_short)? {
      return Ok(w);
    }

    let n = mu.len();
    let mu_vec = DVector::from_iterator(n, mu.iter().copied());

    // Symmetrize and scale so multipliers compare against an absolute tolerance.
    let mut g = DMatrix::from_fn(n, n, |i, j| 0.5 * (cov[[i, j]] + cov[[j, i]]));
    let scale = g.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if scale > 0.0 {
      g /= scale;
    }

    let mut constraints = Vec::with_capacity(n + 1);
    if !allow_short {
      for i in 0..n {
        let mut normal = DVector::zeros(n);
        normal[i] = 1.0;
        constraints.push(Constraint { normal, rhs: 0.0 });
      }
    }
    if let Some(t) = target {
      constraints.push(Constraint {
        normal: mu_vec.clone(),
        rhs: t,
      });
    }

    let x0 = initial_point(&mu_vec, target, allow_short);
    let x = self.run(&g, &constraints, x0)?;

    finalize(x, &mu_vec, target, allow_short)
  }
}

impl ActiveSetSolver {
  /// Long-only with `t = max(μ)`: only the top-return assets are feasible, so
  /// the problem reduces to plain minimum variance over them.
  fn solve_at_max_return(
    &self,
    mu: ArrayView1<f64>,
    cov: ArrayView2<f64>,
    target: Option<f64>,
    allow_short: bool,
  ) -> Result<Option<Array1<f64>>> {
    let Some(t) = target else {
      return Ok(None);
    };
    let max = mu.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let tol = FEASIBILITY_TOLERANCE * max.abs().max(1.0);
    if allow_short || t < max - tol {
      return Ok(None);
    }

    let top: Vec<usize> = (0..mu.len()).filter(|&i| mu[i] >= max - tol).collect();
    let mut w = Array1::zeros(mu.len());

    if let [only] = top[..] {
      w[only] = 1.0;
      return Ok(Some(w));
    }

    let sub_mu = mu.select(Axis(0), &top);
    let sub_cov = cov.select(Axis(0), &top).select(Axis(1), &top);
    let sub_w = self.solve(sub_mu.view(), sub_cov.view(), None, false)?;
    for (&i, &v) in top.iter().zip(sub_w.iter()) {
      w[i] = v;
    }

    Ok(Some(w))
  }

  fn run(
    &self,
    g: &DMatrix<f64>,
    constraints: &[Constraint],
    mut x: DVector<f64>,
  ) -> Result<DVector<f64>> {
    let n = x.len();
    let max_iterations = self
      .max_iterations
      .unwrap_or(50 * (n + constraints.len() + 1));
    let mut working: Vec<usize> = Vec::new();

    for iteration in 0..max_iterations {
      let (p, lambda) = solve_kkt(g, constraints, &working, &x)?;

      if self.is_null_step(g, &p, &x) {
        // lambda[0] belongs to the budget constraint, the rest follow `working`
        let most_negative = working
          .iter()
          .enumerate()
          .map(|(k, _)| (k, lambda[k + 1]))
          .filter(|(_, l)| *l < -self.tolerance)
          .min_by(|a, b| a.1.total_cmp(&b.1));

        match most_negative {
          Some((k, _)) => {
            working.remove(k);
          }
          None => {
            debug!(
              iterations = iteration + 1,
              active = working.len(),
              "active-set solver converged"
            );
            return Ok(x);
          }
        }
        continue;
      }

      let mut alpha = 1.0;
      let mut blocking = None;
      for (idx, c) in constraints.iter().enumerate() {
        if working.contains(&idx) {
          continue;
        }
        let ap = c.normal.dot(&p);
        if ap < -1e-14 {
          let ratio = c.slack(&x).max(0.0) / -ap;
          if ratio < alpha {
            alpha = ratio;
            blocking = Some(idx);
          }
        }
      }

      x += &p * alpha;
      if let Some(idx) = blocking {
        working.push(idx);
      }
    }

    Err(
      SolverFailure::NonConvergence {
        iterations: max_iterations,
      }
      .into(),
    )
  }

  /// A step is zero when it is tiny relative to `x` or when it cannot lower
  /// `½xᵀGx` measurably. Singular `G` leaves rounding-level steps along its
  /// null space that would otherwise never vanish.
  fn is_null_step(&self, g: &DMatrix<f64>, p: &DVector<f64>, x: &DVector<f64>) -> bool {
    let step = p.amax();
    if step <= self.tolerance || step <= STEP_TOLERANCE * x.amax().max(1.0) {
      return true;
    }

    let gx = g * x;
    let gp = g * p;
    let objective = 0.5 * x.dot(&gx);
    let gain = -(p.dot(&gx) + 0.5 * p.dot(&gp));
    gain <= f64::EPSILON * objective.max(1.0) && p.dot(&gp) <= f64::EPSILON
  }
}

fn solve_kkt(
  g: &DMatrix<f64>,
  constraints: &[Constraint],
  working: &[usize],
  x: &DVector<f64>,
) -> Result<(DVector<f64>, DVector<f64>)> {
  let n = x.len();
  let m = 1 + working.len();
  let mut kkt = DMatrix::zeros(n + m, n + m);

  for i in 0..n {
    for j in 0..n {
      kkt[(i, j)] = g[(i, j)];
    }
  }

  let budget = DVector::from_element(n, 1.0);
  for (row, normal) in std::iter::once(&budget)
    .chain(working.iter().map(|&idx| &constraints[idx].normal))
    .enumerate()
  {
    for j in 0..n {
      kkt[(n + row, j)] = normal[j];
      kkt[(j, n + row)] = -normal[j];
    }
  }

  let gx = g * x;
  let mut rhs = DVector::zeros(n + m);
  for i in 0..n {
    rhs[i] = -gx[i];
  }

  let svd = SVD::try_new(kkt, true, true, f64::EPSILON, 10_000).ok_or_else(|| {
    PortfolioError::from(SolverFailure::LinearSystem(
      "SVD did not converge".to_string(),
    ))
  })?;
  let largest = svd.singular_values.iter().fold(0.0_f64, |acc, s| acc.max(*s));
  let sol = svd
    .solve(&rhs, largest * SVD_CUTOFF)
    .map_err(|e| PortfolioError::from(SolverFailure::LinearSystem(e.to_string())))?;

  let p = sol.rows(0, n).into_owned();
  let lambda = sol.rows(n, m).into_owned();
  Ok((p, lambda))
}

fn argmax(v: &DVector<f64>) -> usize {
  v.iter()
    .enumerate()
    .max_by(|a, b| a.1.total_cmp(b.1))
    .map_or(0, |(i, _)| i)
}

fn argmin(v: &DVector<f64>) -> usize {
  v.iter()
    .enumerate()
    .min_by(|a, b| a.1.total_cmp(b.1))
    .map_or(0, |(i, _)| i)
}

/// Fails with [`PortfolioError::InfeasibleConstraint`] when no weighting reaches `target`.
///
/// Long-only, the best attainable return is `max(μ)`. With shorts allowed any
/// return is reachable unless every asset has the same expected return.
pub fn check_attainable(mu: ArrayView1<f64>, target: Option<f64>, allow_short: bool) -> Result<()> {
  let Some(t) = target else {
    return Ok(());
  };
  if !t.is_finite() {
    return Err(PortfolioError::DegenerateInput(format!(
      "target return must be finite, got {t}"
    )));
  }

  let max = mu.iter().copied().fold(f64::NEG_INFINITY, f64::max);
  let min = mu.iter().copied().fold(f64::INFINITY, f64::min);
  let max_attainable = if allow_short && max > min {
    f64::INFINITY
  } else {
    max
  };

  if t > max_attainable + FEASIBILITY_TOLERANCE * max.abs().max(1.0) {
    return Err(PortfolioError::InfeasibleConstraint {
      target: t,
      max_attainable,
    });
  }

  Ok(())
}

fn initial_point(mu: &DVector<f64>, target: Option<f64>, allow_short: bool) -> DVector<f64> {
  let n = mu.len();
  let equal = DVector::from_element(n, 1.0 / n as f64);
  let Some(t) = target else {
    return equal;
  };

  if equal.dot(mu) >= t {
    return equal;
  }

  let hi = argmax(mu);
  let lo = argmin(mu);
  let mut x = DVector::zeros(n);

  if mu[hi] >= t || !allow_short || mu[hi] <= mu[lo] {
    x[hi] = 1.0;
  } else {
    // leveraged long/short pair with return exactly t
    let a = (t - mu[lo]) / (mu[hi] - mu[lo]);
    x[hi] = a;
    x[lo] = 1.0 - a;
  }

  x
}

fn finalize(
  x: DVector<f64>,
  mu: &DVector<f64>,
  target: Option<f64>,
  allow_short: bool,
) -> Result<Array1<f64>> {
  if x.iter().any(|v| !v.is_finite()) {
    return Err(SolverFailure::InvalidSolution("non-finite weights".to_string()).into());
  }

  let mut w = Array1::from_iter(x.iter().copied());

  if !allow_short {
    let min = w.iter().copied().fold(f64::INFINITY, f64::min);
    if min < -FEASIBILITY_TOLERANCE {
      return Err(SolverFailure::InvalidSolution(format!("negative weight {min}")).into());
    }
    w.mapv_inplace(|v| v.max(0.0));
  }

  let sum = w.sum();
  if (sum - 1.0).abs() > FEASIBILITY_TOLERANCE.sqrt() {
    return Err(SolverFailure::InvalidSolution(format!("weights sum to {sum}")).into());
  }
  w /= sum;

  if let Some(t) = target {
    let achieved = w.iter().zip(mu.iter()).map(|(a, b)| a * b).sum::<f64>();
    if achieved < t - FEASIBILITY_TOLERANCE * t.abs().max(1.0) {
      return Err(
        SolverFailure::InvalidSolution(format!("return {achieved} below target {t}")).into(),
      );
    }
  }

  Ok(w)
}

/// Minimum-variance weights with the default [`ActiveSetSolver`].
pub fn optimize_min_variance(
  mu: ArrayView1<f64>,
  cov: ArrayView2<f64>,
  target: Option<f64>,
  allow_short: bool,
) -> Result<Array1<f64>> {
  ActiveSetSolver::default().solve(mu, cov, target, allow_short)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::Array2;
  use ndarray::array;

  use super::*;
  use crate::quant::portfolio::metrics::portfolio_return;
  use crate::quant::portfolio::metrics::portfolio_variance;

  fn assert_valid(w: &Array1<f64>, allow_short: bool) {
    assert_abs_diff_eq!(w.sum(), 1.0, epsilon = 1e-9);
    if !allow_short {
      assert!(w.iter().all(|&v| v >= -1e-9), "negative weight in {w}");
    }
  }

  fn three_assets() -> (Array1<f64>, Array2<f64>) {
    let mu = array![0.08, 0.1, 0.12];
    let cov = array![[0.04, 0.01, 0.0], [0.01, 0.09, 0.02], [0.0, 0.02, 0.16]];
    (mu, cov)
  }

  #[test]
  fn min_variance_skews_to_lower_variance_asset() {
    let mu = array![0.10, 0.20];
    let cov = array![[0.04, 0.0], [0.0, 0.09]];

    let w = optimize_min_variance(mu.view(), cov.view(), None, false).unwrap();

    assert_valid(&w, false);
    assert!(w[0] > 0.5);
    assert_abs_diff_eq!(w[0], 0.09 / 0.13, epsilon = 1e-8);
  }

  #[test]
  fn target_above_max_return_is_infeasible_long_only() {
    let mu = array![0.10, 0.20];
    let cov = array![[0.04, 0.0], [0.0, 0.09]];

    let err = optimize_min_variance(mu.view(), cov.view(), Some(0.25), false).unwrap_err();
    assert_eq!(
      err,
      PortfolioError::InfeasibleConstraint {
        target: 0.25,
        max_attainable: 0.20
      }
    );
  }

  #[test]
  fn target_equal_to_max_return_puts_everything_on_that_asset() {
    let mu = array![0.10, 0.20];
    let cov = array![[0.04, 0.0], [0.0, 0.09]];

    let w = optimize_min_variance(mu.view(), cov.view(), Some(0.20), false).unwrap();

    assert_valid(&w, false);
    assert_abs_diff_eq!(w[1], 1.0, epsilon = 1e-9);
  }

  #[test]
  fn every_target_in_range_is_feasible_long_only() {
    let (mu, cov) = three_assets();
    for k in 0..=20 {
      let t = 0.08 + 0.04 * k as f64 / 20.0;
      let w = optimize_min_variance(mu.view(), cov.view(), Some(t), false).unwrap();
      assert_valid(&w, false);
      assert!(portfolio_return(w.view(), mu.view()) >= t - 1e-8);
    }
  }

  #[test]
  fn long_only_beats_a_dense_simplex_grid() {
    let (mu, cov) = three_assets();
    let w = optimize_min_variance(mu.view(), cov.view(), None, false).unwrap();
    let best = portfolio_variance(w.view(), cov.view());

    let steps = 100;
    for a in 0..=steps {
      for b in 0..=(steps - a) {
        let c = steps - a - b;
        let candidate = array![a as f64, b as f64, c as f64] / steps as f64;
        assert!(best <= portfolio_variance(candidate.view(), cov.view()) + 1e-12);
      }
    }
  }

  #[test]
  fn shorting_matches_closed_form() {
    let mu = array![0.1, 0.2];
    let cov = array![[0.04, 0.05], [0.05, 0.09]];

    let short = optimize_min_variance(mu.view(), cov.view(), None, true).unwrap();
    assert_valid(&short, true);
    assert_abs_diff_eq!(short[0], 4.0 / 3.0, epsilon = 1e-8);
    assert_abs_diff_eq!(short[1], -1.0 / 3.0, epsilon = 1e-8);

    let long = optimize_min_variance(mu.view(), cov.view(), None, false).unwrap();
    assert_valid(&long, false);
    assert_abs_diff_eq!(long[0], 1.0, epsilon = 1e-9);
  }

  #[test]
  fn shorting_reaches_targets_above_max_return() {
    let mu = array![0.1, 0.2];
    let cov = array![[0.04, 0.0], [0.0, 0.09]];

    let w = optimize_min_variance(mu.view(), cov.view(), Some(0.3), true).unwrap();

    assert_valid(&w, true);
    assert_abs_diff_eq!(w[0], -1.0, epsilon = 1e-8);
    assert_abs_diff_eq!(w[1], 2.0, epsilon = 1e-8);
  }

  #[test]
  fn identical_assets_do_not_break_the_solver() {
    // perfectly correlated, identical return series: Σ is singular
    let mu = array![0.1, 0.1, 0.15];
    let cov = array![[0.04, 0.04, 0.01], [0.04, 0.04, 0.01], [0.01, 0.01, 0.09]];

    let w = optimize_min_variance(mu.view(), cov.view(), None, false).unwrap();
    assert_valid(&w, false);

    let var = portfolio_variance(w.view(), cov.view());
    for candidate in [array![0.5, 0.5, 0.0], array![1.0, 0.0, 0.0], array![0.4, 0.4, 0.2]] {
      assert!(var <= portfolio_variance(candidate.view(), cov.view()) + 1e-10);
    }
  }

  /// Assets 0 and 1 share identical daily returns but carry different μ.
  fn twin_assets() -> (Array1<f64>, Array2<f64>) {
    let c = 0.006574888286511141;
    let d = 0.0006939833679077981;
    let e = 0.009176181351474104;
    let mu = array![0.1515, 0.1069, 0.2913];
    let cov = array![[c, c, d], [c, c, d], [d, d, e]];
    (mu, cov)
  }

  #[test]
  fn twin_assets_converge_without_target_long_only() {
    let (mu, cov) = twin_assets();
    let w = optimize_min_variance(mu.view(), cov.view(), None, false).unwrap();
    assert_valid(&w, false);

    let best = portfolio_variance(w.view(), cov.view());
    let steps = 50;
    for a in 0..=steps {
      for b in 0..=(steps - a) {
        let c = steps - a - b;
        let candidate = array![a as f64, b as f64, c as f64] / steps as f64;
        assert!(best <= portfolio_variance(candidate.view(), cov.view()) + 1e-12);
      }
    }
  }

  #[test]
  fn twin_assets_converge_without_target_long_short() {
    let (mu, cov) = twin_assets();
    let short = optimize_min_variance(mu.view(), cov.view(), None, true).unwrap();
    assert_valid(&short, true);

    let long = optimize_min_variance(mu.view(), cov.view(), None, false).unwrap();
    assert!(
      portfolio_variance(short.view(), cov.view())
        <= portfolio_variance(long.view(), cov.view()) + 1e-12
    );
  }

  #[test]
  fn twin_assets_at_max_return_hold_only_the_top_asset() {
    let (mu, cov) = twin_assets();
    let w = optimize_min_variance(mu.view(), cov.view(), Some(0.2913), false).unwrap();

    assert_valid(&w, false);
    assert_abs_diff_eq!(w[2], 1.0, epsilon = 1e-12);
  }

  #[test]
  fn tied_top_assets_split_by_variance_at_max_return() {
    let mu = array![0.1, 0.2, 0.2];
    let cov = array![[0.04, 0.0, 0.0], [0.0, 0.09, 0.0], [0.0, 0.0, 0.18]];
    let w = optimize_min_variance(mu.view(), cov.view(), Some(0.2), false).unwrap();

    assert_valid(&w, false);
    assert_abs_diff_eq!(w[0], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(w[1], 2.0 / 3.0, epsilon = 1e-8);
  }

  #[test]
  fn twin_families_solve_every_target_in_range() {
    for (c, d, e) in [
      (0.0066, 0.0007, 0.0092),
      (0.04, 0.01, 0.09),
      (0.0123, -0.0031, 0.0211),
      (0.25, 0.05, 0.02),
    ] {
      let mu = array![0.12, 0.07, 0.21];
      let cov = array![[c, c, d], [c, c, d], [d, d, e]];

      for allow_short in [false, true] {
        for k in 0..=10 {
          let t = 0.07 + 0.14 * k as f64 / 10.0;
          let w = optimize_min_variance(mu.view(), cov.view(), Some(t), allow_short)
            .unwrap_or_else(|err| panic!("c={c} d={d} e={e} short={allow_short} t={t}: {err}"));
          assert_valid(&w, allow_short);
          assert!(portfolio_return(w.view(), mu.view()) >= t - 1e-8);
        }
      }
    }
  }

  #[test]
  fn rank_one_covariance_is_handled() {
    let mu = array![0.1, 0.2];
    let cov = array![[0.04, 0.04], [0.04, 0.04]];

    let w = optimize_min_variance(mu.view(), cov.view(), Some(0.15), false).unwrap();
    assert_valid(&w, false);
    assert!(portfolio_return(w.view(), mu.view()) >= 0.15 - 1e-8);
  }

  #[test]
  fn zero_covariance_returns_feasible_weights() {
    let mu = array![0.1, 0.2, 0.3];
    let cov = Array2::zeros((3, 3));

    let w = optimize_min_variance(mu.view(), cov.view(), Some(0.25), false).unwrap();
    assert_valid(&w, false);
    assert!(portfolio_return(w.view(), mu.view()) >= 0.25 - 1e-8);
  }

  #[test]
  fn solving_twice_gives_the_same_weights() {
    let (mu, cov) = three_assets();
    let a = optimize_min_variance(mu.view(), cov.view(), Some(0.1), false).unwrap();
    let b = optimize_min_variance(mu.view(), cov.view(), Some(0.1), false).unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn empty_problem_is_degenerate() {
    let mu: Array1<f64> = Array1::zeros(0);
    let cov: Array2<f64> = Array2::zeros((0, 0));
    assert!(matches!(
      optimize_min_variance(mu.view(), cov.view(), None, false),
      Err(PortfolioError::DegenerateInput(_))
    ));
  }

  #[test]
  fn mismatched_dimensions_are_degenerate() {
    let mu = array![0.1, 0.2];
    let cov = array![[0.04]];
    assert!(matches!(
      optimize_min_variance(mu.view(), cov.view(), None, false),
      Err(PortfolioError::DegenerateInput(_))
    ));
  }

  #[test]
  fn exhausted_budget_is_a_solver_failure() {
    let (mu, cov) = three_assets();
    let solver = ActiveSetSolver::new(1e-10, Some(0));

    let err = solver.solve(mu.view(), cov.view(), None, false).unwrap_err();
    assert_eq!(
      err,
      PortfolioError::SolverFailure(SolverFailure::NonConvergence { iterations: 0 })
    );
  }
}
