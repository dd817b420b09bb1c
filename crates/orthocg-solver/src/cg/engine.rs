//! CG iteration engine.

use log::{debug, trace, warn};
use orthocg_simd::{SimdCapability, real_axpy, real_dot_product, real_xpay};

use crate::error::Result;
use crate::operator::RealOperator;
use crate::validate::ValidatedSystem;

use super::history::ResidualHistory;
use super::{CgConfig, CgFlag, CgResult, NumericFault};

/// Solve a validated system with re-orthogonalized CG.
///
/// Fails only if `config` carries an invalid tolerance; every numeric outcome
/// is reported through [`CgResult::flag`].
pub fn solve_cg<A: RealOperator>(system: &ValidatedSystem<'_, A>, config: &CgConfig) -> Result<CgResult> {
    config.validate()?;
    let max_iter = config.max_iter_for(system.dim());
    Ok(solve_cg_operator(
        system.operator(),
        system.rhs(),
        system.initial_guess(),
        config.tol,
        max_iter,
    ))
}

/// Solve `A*x = b` starting from `x0`, for an operator already known to be
/// symmetric positive definite.
///
/// Iterations are counted from 1. The reported [`CgResult::iterations`] is:
///
/// - on convergence detected in iteration `i`: `i - 1`;
/// - when the limit is reached: `max_iter`;
/// - on numeric failure: 0, and the relative residual is reported as 0.
///
/// The last two values on numeric failure do not describe the state at the
/// failing iteration; callers that need it can read
/// [`CgResult::residual_norms`], which always covers every completed
/// iteration.
///
/// # Panics
///
/// Panics if `b` or `x0` do not match the operator dimension.
pub fn solve_cg_operator(
    op: &dyn RealOperator,
    b: &[f64],
    x0: &[f64],
    tol: f64,
    max_iter: usize,
) -> CgResult {
    let n = op.dim();
    assert_eq!(b.len(), n, "RHS dimension mismatch");
    assert_eq!(x0.len(), n, "initial guess dimension mismatch");

    let mut engine = CgEngine::new(op, b, x0, tol, max_iter);
    debug!(
        "CG start: n={}, max_iter={}, tol={:.2e}, |r0|={:.3e}, simd={}",
        n,
        max_iter,
        tol,
        engine.r2.sqrt(),
        engine.cap
    );

    for i in 1..=max_iter {
        match engine.step(i) {
            Step::Continue => {}
            Step::Converged => {
                let relres = engine.relative_residual();
                debug!("CG converged in iteration {} (relres={:.3e})", i, relres);
                return engine.finish(CgFlag::Converged, i - 1, relres, None);
            }
            Step::Failed(fault) => {
                warn!("CG numeric failure in iteration {}: {} broke down", i, fault);
                return engine.finish(CgFlag::NumericFailure, 0, 0.0, Some(fault));
            }
        }
    }

    let relres = engine.relative_residual();
    if max_iter > 0 {
        warn!(
            "CG did not converge after {} iterations (relres={:.3e}, tol={:.2e})",
            max_iter, relres, tol
        );
    }
    engine.finish(CgFlag::MaxIterationsReached, max_iter, relres, None)
}

/// Outcome of a single iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Converged,
    Failed(NumericFault),
}

/// Mutable state of one solve. Created on entry and consumed on exit.
struct CgEngine<'a> {
    op: &'a dyn RealOperator,
    cap: SimdCapability,
    b_norm: f64,
    abstol2: f64,
    x: Vec<f64>,
    r: Vec<f64>,
    p: Vec<f64>,
    ap: Vec<f64>,
    /// Squared norm of `r`, always equal to the last stored squared norm.
    r2: f64,
    history: ResidualHistory,
}

impl<'a> CgEngine<'a> {
    fn new(op: &'a dyn RealOperator, b: &[f64], x0: &[f64], tol: f64, max_iter: usize) -> Self {
        let cap = SimdCapability::detect();
        let n = b.len();

        // r = b - A*x0
        let mut r = vec![0.0; n];
        op.apply(x0, &mut r);
        for (ri, &bi) in r.iter_mut().zip(b.iter()) {
            *ri = bi - *ri;
        }
        let r2 = real_dot_product(&r, &r, cap);

        let b_norm = real_dot_product(b, b, cap).sqrt();
        let abstol = tol * b_norm;

        // Beyond n iterations the residuals cannot stay independent, so the
        // history rarely outgrows n + 1 even for large limits.
        let mut history = ResidualHistory::with_capacity(max_iter.min(n).saturating_add(1));
        history.push(r.clone(), r2);

        Self {
            op,
            cap,
            b_norm,
            abstol2: abstol * abstol,
            x: x0.to_vec(),
            p: r.clone(),
            r,
            ap: vec![0.0; n],
            r2,
            history,
        }
    }

    fn step(&mut self, iteration: usize) -> Step {
        self.op.apply(&self.p, &mut self.ap);

        let pap = real_dot_product(&self.p, &self.ap, self.cap);
        if !pap.is_normal() {
            return Step::Failed(NumericFault::Curvature);
        }
        let alpha = self.r2 / pap;
        if !alpha.is_finite() {
            return Step::Failed(NumericFault::StepLength);
        }

        real_axpy(alpha, &self.p, &mut self.x);
        real_axpy(-alpha, &self.ap, &mut self.r);

        self.history.reorthogonalize(&mut self.r, self.cap);

        let r2 = real_dot_product(&self.r, &self.r, self.cap);
        if !r2.is_finite() {
            return Step::Failed(NumericFault::ResidualNorm);
        }
        let r2_prev = self.r2;
        self.history.push(self.r.clone(), r2);
        self.r2 = r2;

        trace!(
            "CG iteration {}: alpha={:.3e}, |r|={:.3e}",
            iteration,
            alpha,
            r2.sqrt()
        );

        if r2 <= self.abstol2 {
            return Step::Converged;
        }

        if r2_prev == 0.0 {
            return Step::Failed(NumericFault::DirectionUpdate);
        }
        let beta = r2 / r2_prev;
        if !beta.is_finite() {
            return Step::Failed(NumericFault::DirectionUpdate);
        }

        // p = r + beta*p
        real_xpay(&self.r, beta, &mut self.p);
        Step::Continue
    }

    /// `‖r‖ / ‖b‖`, or the absolute residual norm when `b` is zero.
    fn relative_residual(&self) -> f64 {
        let r_norm = self.r2.sqrt();
        if self.b_norm == 0.0 {
            r_norm
        } else {
            r_norm / self.b_norm
        }
    }

    fn finish(
        self,
        flag: CgFlag,
        iterations: usize,
        relative_residual: f64,
        fault: Option<NumericFault>,
    ) -> CgResult {
        CgResult {
            residual_norms: self.history.norms(),
            x: self.x,
            flag,
            relative_residual,
            iterations,
            fault,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::DenseRealOperator;
    use nalgebra::DMatrix;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Dense SPD matrix `MᵀM + shift·I` with deterministic pseudo-random M.
    fn random_spd(n: usize, shift: f64, seed: u64) -> DMatrix<f64> {
        let mut state = seed;
        let m = DMatrix::from_fn(n, n, |_, _| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
        });
        m.transpose() * &m + DMatrix::identity(n, n) * shift
    }

    fn laplacian(n: usize) -> DMatrix<f64> {
        DMatrix::from_fn(n, n, |i, j| {
            if i == j {
                2.0
            } else if i.abs_diff(j) == 1 {
                -1.0
            } else {
                0.0
            }
        })
    }

    fn true_relative_residual(a: &DMatrix<f64>, b: &[f64], x: &[f64]) -> f64 {
        let op = DenseRealOperator::new(a);
        let mut ax = vec![0.0; b.len()];
        op.apply(x, &mut ax);
        let r: f64 = b.iter().zip(&ax).map(|(bi, axi)| (bi - axi).powi(2)).sum();
        let bn: f64 = b.iter().map(|bi| bi * bi).sum();
        r.sqrt() / bn.sqrt()
    }

    #[test]
    fn identity_converges_in_first_update() {
        let a = DMatrix::<f64>::identity(3, 3);
        let op = DenseRealOperator::new(&a);
        let b = [1.0, 2.0, 3.0];

        let result = solve_cg_operator(&op, &b, &[0.0; 3], 1e-6, 3);

        assert_eq!(result.flag, CgFlag::Converged);
        assert_eq!(result.iterations, 0);
        assert!(result.relative_residual < 1e-15);
        assert_eq!(result.residual_norms.len(), 2);
        assert!((result.residual_norms[0] - 14.0_f64.sqrt()).abs() < 1e-14);
        for (xi, bi) in result.x.iter().zip(b.iter()) {
            assert!((xi - bi).abs() < 1e-14);
        }
        assert_eq!(result.fault, None);
    }

    #[test]
    fn zero_iteration_limit_reports_initial_residual() {
        let a = laplacian(4);
        let op = DenseRealOperator::new(&a);
        let b = [1.0, 0.0, 0.0, 1.0];
        let x0 = [0.5, 0.0, 0.0, 0.0];

        let result = solve_cg_operator(&op, &b, &x0, 1e-6, 0);

        // r0 = b - A*x0 = [0, 0.5, 0, 1]
        let r0_norm = 1.25_f64.sqrt();
        assert_eq!(result.flag, CgFlag::MaxIterationsReached);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.x, x0.to_vec());
        assert_eq!(result.residual_norms.len(), 1);
        assert!((result.residual_norms[0] - r0_norm).abs() < 1e-15);
        assert!((result.relative_residual - r0_norm / 2.0_f64.sqrt()).abs() < 1e-15);
    }

    #[test]
    fn terminates_within_n_iterations() {
        for n in [5, 20, 50] {
            let a = laplacian(n);
            let op = DenseRealOperator::new(&a);
            let b: Vec<f64> = (0..n).map(|i| ((i * 7 + 3) % 11) as f64 - 5.0).collect();

            let result = solve_cg_operator(&op, &b, &vec![0.0; n], 1e-8, n);

            assert_eq!(result.flag, CgFlag::Converged, "n = {}", n);
            assert!(result.iterations < n, "n = {}", n);
            assert!(true_relative_residual(&a, &b, &result.x) < 1e-7, "n = {}", n);
        }
    }

    #[test]
    fn stored_residuals_stay_orthogonal() {
        let n = 200;
        let steps = 60;
        let a = random_spd(n, 0.5, 42);
        let op = DenseRealOperator::new(&a);
        let b: Vec<f64> = (0..n).map(|i| (i as f64 * 0.37).sin()).collect();

        let mut engine = CgEngine::new(&op, &b, &vec![0.0; n], 1e-14, steps);
        for i in 1..=steps {
            match engine.step(i) {
                Step::Continue => {}
                other => panic!("iteration {} stopped early: {:?}", i, other),
            }
        }

        assert_eq!(engine.history.len(), steps + 1);
        assert_eq!(engine.history.squared_norms().len(), steps + 1);
        let worst = engine.history.max_pairwise_cosine(engine.cap);
        assert!(worst < 1e-10, "max |cos| = {:e}", worst);
    }

    #[test]
    fn exhaustion_reports_true_residual() {
        let n = 30;
        let a = laplacian(n);
        let op = DenseRealOperator::new(&a);
        let b = vec![1.0; n];

        let result = solve_cg_operator(&op, &b, &vec![0.0; n], 1e-12, 3);

        assert_eq!(result.flag, CgFlag::MaxIterationsReached);
        assert_eq!(result.iterations, 3);
        assert_eq!(result.residual_norms.len(), 4);
        let expected = true_relative_residual(&a, &b, &result.x);
        assert!((result.relative_residual - expected).abs() < 1e-10);
        let last = *result.residual_norms.last().unwrap();
        assert!((last / (n as f64).sqrt() - result.relative_residual).abs() < 1e-12);
    }

    #[test]
    fn indefinite_curvature_is_numeric_failure() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, -1.0]);
        let op = DenseRealOperator::new(&a);

        let result = solve_cg_operator(&op, &[1.0, 1.0], &[0.0, 0.0], 1e-6, 2);

        assert_eq!(result.flag, CgFlag::NumericFailure);
        assert_eq!(result.fault, Some(NumericFault::Curvature));
        assert_eq!(result.iterations, 0);
        assert_eq!(result.relative_residual, 0.0);
        assert_eq!(result.residual_norms.len(), 1);
        assert_eq!(result.x, vec![0.0, 0.0]);
    }

    /// Diagonal operator that starts returning NaN after a number of products.
    struct FailingOp {
        diag: Vec<f64>,
        healthy_applies: usize,
        applies: AtomicUsize,
    }

    impl RealOperator for FailingOp {
        fn dim(&self) -> usize {
            self.diag.len()
        }

        #[allow(clippy::needless_range_loop)]
        fn apply(&self, x: &[f64], y: &mut [f64]) {
            let count = self.applies.fetch_add(1, Ordering::Relaxed);
            for i in 0..self.diag.len() {
                y[i] = if count < self.healthy_applies {
                    self.diag[i] * x[i]
                } else {
                    f64::NAN
                };
            }
        }
    }

    #[test]
    fn failure_resets_iteration_count_after_progress() {
        // One product for r0 and one for the first iteration; the second
        // iteration sees a NaN curvature.
        let op = FailingOp {
            diag: vec![1.0, 2.0, 3.0],
            healthy_applies: 2,
            applies: AtomicUsize::new(0),
        };

        let result = solve_cg_operator(&op, &[1.0, 1.0, 1.0], &[0.0; 3], 1e-10, 3);

        assert_eq!(result.flag, CgFlag::NumericFailure);
        assert_eq!(result.fault, Some(NumericFault::Curvature));
        assert_eq!(result.iterations, 0);
        assert_eq!(result.relative_residual, 0.0);
        assert_eq!(result.residual_norms.len(), 2);
        assert!(result.x.iter().all(|xi| xi.is_finite() && *xi > 0.0));
    }

    #[test]
    fn exact_initial_guess_is_numeric_failure() {
        // r0 = 0 makes p = 0, so the first curvature p·Ap is zero.
        let a = laplacian(3);
        let op = DenseRealOperator::new(&a);
        let x0 = [1.0, 1.0, 1.0];
        let b = [1.0, 0.0, 1.0];

        let result = solve_cg_operator(&op, &b, &x0, 1e-6, 3);

        assert_eq!(result.flag, CgFlag::NumericFailure);
        assert_eq!(result.residual_norms, vec![0.0]);
        assert_eq!(result.x, x0.to_vec());
    }

    #[test]
    fn nan_rhs_is_numeric_failure() {
        let a = DMatrix::<f64>::identity(2, 2);
        let op = DenseRealOperator::new(&a);

        let result = solve_cg_operator(&op, &[f64::NAN, 1.0], &[0.0, 0.0], 1e-6, 2);

        assert_eq!(result.flag, CgFlag::NumericFailure);
        assert_eq!(result.fault, Some(NumericFault::Curvature));
    }

    fn assert_reset_failure(result: &CgResult, fault: NumericFault) {
        assert_eq!(result.flag, CgFlag::NumericFailure);
        assert_eq!(result.fault, Some(fault));
        assert_eq!(result.iterations, 0);
        assert_eq!(result.relative_residual, 0.0);
    }

    #[test]
    fn overflowing_step_length_is_numeric_failure() {
        // p·Ap = 1e-110 is normal, but r2 / p·Ap = 1e310 overflows.
        let a = DMatrix::from_row_slice(1, 1, &[1e-310]);
        let op = DenseRealOperator::new(&a);

        let result = solve_cg_operator(&op, &[1e100], &[0.0], 1e-6, 3);

        assert_reset_failure(&result, NumericFault::StepLength);
        assert_eq!(result.residual_norms.len(), 1);
        assert_eq!(result.x, vec![0.0]);
    }

    #[test]
    fn overflowing_residual_norm_is_numeric_failure() {
        // The updated residual has a component near 5e299, whose square
        // overflows.
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1e-300]);
        let op = DenseRealOperator::new(&a);

        let result = solve_cg_operator(&op, &[1.0, 1e150], &[0.0, 0.0], 1e-6, 3);

        assert_reset_failure(&result, NumericFault::ResidualNorm);
        // The non-finite residual is never stored.
        assert_eq!(result.residual_norms.len(), 1);
    }

    /// Operator returning a fixed sequence of products, one per call.
    struct ScriptedOp {
        products: Vec<Vec<f64>>,
        calls: AtomicUsize,
    }

    impl RealOperator for ScriptedOp {
        fn dim(&self) -> usize {
            self.products[0].len()
        }

        fn apply(&self, _x: &[f64], y: &mut [f64]) {
            let call = self.calls.fetch_add(1, Ordering::Relaxed);
            y.copy_from_slice(&self.products[call]);
        }
    }

    #[test]
    fn overflowing_direction_update_is_numeric_failure() {
        // r0 = b has squared norm 1e-310; the first update leaves |r| near
        // 1e5, so beta = 1e10 / 1e-310 overflows.
        let op = ScriptedOp {
            products: vec![vec![0.0, 0.0], vec![1e-150, -1e10]],
            calls: AtomicUsize::new(0),
        };

        let result = solve_cg_operator(&op, &[1e-155, 0.0], &[0.0, 0.0], 1e-6, 3);

        assert_reset_failure(&result, NumericFault::DirectionUpdate);
        // The residual of the failing iteration was finite and is kept.
        assert_eq!(result.residual_norms.len(), 2);
        assert!((result.residual_norms[1] / 1e5 - 1.0).abs() < 1e-2);
    }

    #[test]
    fn zero_rhs_reports_absolute_residual() {
        let a = DMatrix::<f64>::identity(2, 2);
        let op = DenseRealOperator::new(&a);

        let result = solve_cg_operator(&op, &[0.0, 0.0], &[1.0, 0.0], 1e-6, 0);

        assert_eq!(result.flag, CgFlag::MaxIterationsReached);
        assert_eq!(result.relative_residual, 1.0);
        assert!(result.relative_residual.is_finite());
    }

    #[test]
    #[should_panic(expected = "RHS dimension mismatch")]
    fn operator_entry_asserts_dimensions() {
        let a = DMatrix::<f64>::identity(2, 2);
        let op = DenseRealOperator::new(&a);
        solve_cg_operator(&op, &[1.0], &[0.0, 0.0], 1e-6, 2);
    }
}
