use nalgebra::{RealField, Scalar, SimdRealField, convert, try_convert};
use serde::{Deserialize, Serialize};

use crate::error::{MpcError, Result};

// Default settings
pub const DEFAULT_RHO: f64 = 0.1;
pub const DEFAULT_SIGMA: f64 = 1e-4;
pub const DEFAULT_ALPHA: f64 = 1.6;
pub const DEFAULT_MAX_ITER: usize = 5;
pub const DEFAULT_ABS_PRI_TOL: f64 = 1e-03;
pub const DEFAULT_ABS_DUA_TOL: f64 = 1e-03;
/// Control period of the reference drivers, in seconds.
pub const DEFAULT_DT: f64 = 0.02;

/// ADMM parameters.
///
/// `rho`, `sigma` and the problem matrices determine the factorization, so a
/// change to either of them requires a new [`QpSolver::setup`](crate::QpSolver::setup).
/// `alpha` and `max_iter` only affect the iteration.
///
/// The tolerances never stop the loop early; they only classify the
/// reported [`SolveStatus`](crate::SolveStatus).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, bound(deserialize = "F: Deserialize<'de> + Scalar + Copy + SimdRealField + RealField"))]
pub struct AdmmSettings<F> {
    /// ADMM penalty, > 0
    pub rho: F,
    /// Primal regularization, >= 0
    pub sigma: F,
    /// Over-relaxation factor in (0, 2)
    pub alpha: F,
    /// Number of iterations run by every solve, >= 1
    pub max_iter: usize,
    pub abs_pri_tol: F,
    pub abs_dua_tol: F,
}

impl<F> Default for AdmmSettings<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    fn default() -> Self {
        Self {
            rho: convert(DEFAULT_RHO),
            sigma: convert(DEFAULT_SIGMA),
            alpha: convert(DEFAULT_ALPHA),
            max_iter: DEFAULT_MAX_ITER,
            abs_pri_tol: convert(DEFAULT_ABS_PRI_TOL),
            abs_dua_tol: convert(DEFAULT_ABS_DUA_TOL),
        }
    }
}

impl<F> AdmmSettings<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    pub fn new(rho: F, sigma: F, alpha: F, max_iter: usize) -> Self {
        Self {
            rho,
            sigma,
            alpha,
            max_iter,
            ..Default::default()
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Reject parameters the iteration is not defined for.
    ///
    /// `sigma == 0` passes: an unregularized system is allowed to reach the
    /// factorization, which reports singularity itself.
    pub fn validate(&self) -> Result<()> {
        let zero = F::zero();
        let two: F = convert(2.0);

        if !self.rho.is_finite() || self.rho <= zero {
            return Err(invalid("rho", self.rho));
        }
        if !self.sigma.is_finite() || self.sigma < zero {
            return Err(invalid("sigma", self.sigma));
        }
        if !self.alpha.is_finite() || self.alpha <= zero || self.alpha >= two {
            return Err(invalid("alpha", self.alpha));
        }
        if self.max_iter < 1 {
            return Err(MpcError::InvalidParameter {
                name: "max_iter",
                value: self.max_iter as f64,
            });
        }
        if !self.abs_pri_tol.is_finite() || self.abs_pri_tol < zero {
            return Err(invalid("abs_pri_tol", self.abs_pri_tol));
        }
        if !self.abs_dua_tol.is_finite() || self.abs_dua_tol < zero {
            return Err(invalid("abs_dua_tol", self.abs_dua_tol));
        }
        Ok(())
    }
}

pub(crate) fn invalid<F>(name: &'static str, value: F) -> MpcError
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    MpcError::InvalidParameter {
        name,
        value: try_convert(value).unwrap_or(f64::NAN),
    }
}
