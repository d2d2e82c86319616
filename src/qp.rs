use log::{debug, trace, warn};
use nalgebra::{
    Cholesky, DMatrix, DVector, Dim, Dyn, Matrix, RealField, Scalar, SimdRealField, convert,
    storage::RawStorage,
};

use crate::{
    admm::AdmmWorkspace,
    error::{MpcError, Result},
    settings::{AdmmSettings, invalid},
};

/// Outcome of a fixed-iteration solve.
///
/// Both variants are normal results; `MaxIterReached` only means the
/// residuals were still above the configured tolerances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Converged,
    MaxIterReached,
}

/// Primal/dual starting point threaded between successive solves
#[derive(Debug, Clone, PartialEq)]
pub struct WarmStart<F> {
    pub z: DVector<F>, // n
    pub y: DVector<F>, // m
}

impl<F> WarmStart<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    pub fn new(z: DVector<F>, y: DVector<F>) -> Self {
        Self { z, y }
    }

    /// All-zero start
    pub fn cold(n: usize, m: usize) -> Self {
        Self {
            z: DVector::zeros(n),
            y: DVector::zeros(m),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QpSolution<F> {
    /// Primal solution, n
    pub z: DVector<F>,
    /// Lagrange multipliers, m
    pub y: DVector<F>,
    /// Projected slack `w`, m. Satisfies `l <= w <= u` exactly.
    pub w: DVector<F>,
    pub iterations: usize,
    pub primal_residual: F,
    pub dual_residual: F,
    pub status: SolveStatus,
}

impl<F> QpSolution<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    /// Reuse this solution as the starting point of the next solve
    pub fn into_warm_start(self) -> WarmStart<F> {
        WarmStart {
            z: self.z,
            y: self.y,
        }
    }
}

/// ADMM solver for `min 0.5 z'Pz + q'z  s.t.  l <= Az <= u`.
///
/// [`QpSolver::setup`] factorizes `P + sigma I + rho A'A` once. Every
/// [`QpSolver::solve`] then reuses that factor with new `q`, `l`, `u` and warm
/// start. `solve` takes `&self`, so one solver can be shared between threads
/// solving the same problem structure.
#[derive(Debug, Clone)]
pub struct QpSolver<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    P: DMatrix<F>,       // n * n
    A: DMatrix<F>,       // m * n
    factor: Cholesky<F, Dyn>,
    settings: AdmmSettings<F>,
}

impl<F> QpSolver<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    /// Validate the problem structure and factorize the ADMM system matrix.
    ///
    /// ## Arguments
    /// - `P`: symmetric positive semidefinite cost, n * n
    /// - `A`: constraint matrix, m * n
    /// - `settings`: `rho` and `sigma` enter the factor
    pub fn setup(P: DMatrix<F>, A: DMatrix<F>, settings: AdmmSettings<F>) -> Result<Self> {
        settings.validate()?;

        let n = P.nrows();
        if P.ncols() != n {
            return Err(MpcError::NotSquare {
                what: "P",
                rows: P.nrows(),
                cols: P.ncols(),
            });
        }
        if A.ncols() != n {
            return Err(MpcError::DimensionMismatch {
                what: "columns of A",
                expected: n,
                got: A.ncols(),
            });
        }
        check_finite("P", &P)?;
        check_finite("A", &A)?;
        check_symmetric("P", &P)?;

        let factor = factorize(&P, &A, settings.rho, settings.sigma)?;

        debug!(
            "QP setup: n = {}, m = {}, rho = {}, sigma = {}",
            n,
            A.nrows(),
            settings.rho,
            settings.sigma
        );

        Ok(Self {
            P,
            A,
            factor,
            settings,
        })
    }

    /// Number of decision variables
    pub fn n(&self) -> usize {
        self.P.nrows()
    }

    /// Number of constraint rows
    pub fn m(&self) -> usize {
        self.A.nrows()
    }

    pub fn settings(&self) -> &AdmmSettings<F> {
        &self.settings
    }

    pub fn cost_matrix(&self) -> &DMatrix<F> {
        &self.P
    }

    pub fn constraint_matrix(&self) -> &DMatrix<F> {
        &self.A
    }

    /// Cholesky factor of `P + sigma I + rho A'A`
    pub fn factor(&self) -> &Cholesky<F, Dyn> {
        &self.factor
    }

    /// Run `settings.max_iter` ADMM iterations from `warm`
    pub fn solve(
        &self,
        q: &DVector<F>,
        l: &DVector<F>,
        u: &DVector<F>,
        warm: &WarmStart<F>,
    ) -> Result<QpSolution<F>> {
        self.solve_with_iters(q, l, u, warm, self.settings.max_iter)
    }

    /// Same as [`QpSolver::solve`] with an explicit iteration count
    pub fn solve_with_iters(
        &self,
        q: &DVector<F>,
        l: &DVector<F>,
        u: &DVector<F>,
        warm: &WarmStart<F>,
        max_iter: usize,
    ) -> Result<QpSolution<F>> {
        if max_iter < 1 {
            return Err(MpcError::InvalidParameter {
                name: "max_iter",
                value: max_iter as f64,
            });
        }
        let (n, m) = (self.n(), self.m());
        check_len("q", q, n)?;
        check_len("l", l, m)?;
        check_len("u", u, m)?;
        check_len("warm start z", &warm.z, n)?;
        check_len("warm start y", &warm.y, m)?;
        check_finite("q", q)?;
        check_finite("warm start z", &warm.z)?;
        check_finite("warm start y", &warm.y)?;
        check_bounds("l, u", l, u)?;

        let AdmmSettings {
            rho, sigma, alpha, ..
        } = self.settings;

        let mut work = AdmmWorkspace::new(&self.A, &warm.z, &warm.y, l, u);
        work.run(&self.factor, &self.A, q, l, u, rho, sigma, alpha, max_iter);

        let status = if work.primal_residual <= self.settings.abs_pri_tol
            && work.dual_residual <= self.settings.abs_dua_tol
        {
            SolveStatus::Converged
        } else {
            SolveStatus::MaxIterReached
        };

        trace!(
            "QP solve: {} iterations, r_prim = {}, r_dual = {}, {:?}",
            work.iter, work.primal_residual, work.dual_residual, status
        );

        Ok(QpSolution {
            z: work.x,
            y: work.y,
            w: work.w,
            iterations: work.iter,
            primal_residual: work.primal_residual,
            dual_residual: work.dual_residual,
            status,
        })
    }

    /// `0.5 z'Pz + q'z`
    pub fn objective(&self, z: &DVector<F>, q: &DVector<F>) -> F {
        let half: F = convert(0.5);
        (z.transpose() * &self.P * z)[(0, 0)] * half + q.dot(z)
    }
}

/// Form `P + sigma I + rho A'A` and take its Cholesky factor.
///
/// Fails when the matrix is not positive definite or a pivot is zero or
/// non-finite.
pub(crate) fn factorize<F>(
    P: &DMatrix<F>,
    A: &DMatrix<F>,
    rho: F,
    sigma: F,
) -> Result<Cholesky<F, Dyn>>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    let n = P.nrows();
    let mut M = P + A.tr_mul(A).scale(rho);
    for i in 0..n {
        M[(i, i)] += sigma;
    }

    let factor = Cholesky::new(M).ok_or_else(|| {
        warn!("ADMM system matrix ({n}x{n}) is not positive definite");
        MpcError::Factorization { dim: n }
    })?;

    let degenerate = factor
        .l_dirty()
        .diagonal()
        .iter()
        .any(|d| !d.is_finite() || *d <= F::zero());
    if degenerate {
        warn!("ADMM system matrix ({n}x{n}) has a degenerate pivot");
        return Err(MpcError::Factorization { dim: n });
    }

    Ok(factor)
}

pub(crate) fn check_len<F: Scalar>(what: &'static str, v: &DVector<F>, expected: usize) -> Result<()> {
    if v.len() != expected {
        return Err(MpcError::DimensionMismatch {
            what,
            expected,
            got: v.len(),
        });
    }
    Ok(())
}

pub(crate) fn check_finite<F, R, C, S>(what: &'static str, m: &Matrix<F, R, C, S>) -> Result<()>
where
    F: Scalar + Copy + SimdRealField + RealField,
    R: Dim,
    C: Dim,
    S: RawStorage<F, R, C>,
{
    if m.iter().all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err(MpcError::NonFinite { what })
    }
}

pub(crate) fn check_symmetric<F>(what: &'static str, m: &DMatrix<F>) -> Result<()>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    let tol = F::default_epsilon().sqrt() * m.amax().max(F::one());
    let asymmetry = (m - m.transpose()).amax();
    if asymmetry > tol {
        return Err(MpcError::NotSymmetric { what });
    }
    Ok(())
}

/// `l <= u` elementwise. Infinite bounds are fine, NaN is not.
pub(crate) fn check_bounds<F>(what: &'static str, l: &DVector<F>, u: &DVector<F>) -> Result<()>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    match l.iter().zip(u.iter()).position(|(l, u)| !(l <= u)) {
        Some(index) => Err(MpcError::InvalidBounds { what, index }),
        None => Ok(()),
    }
}

pub(crate) fn check_positive<F>(name: &'static str, value: F) -> Result<()>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    if value.is_finite() && value > F::zero() {
        Ok(())
    } else {
        Err(invalid(name, value))
    }
}
