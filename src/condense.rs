//! Horizon condensation: eliminate the predicted states of a linear MPC
//! problem so that only the stacked control sequence remains as decision
//! variable.
//!
//! Stacked vectors are stage-major: `x_hat = [x_1; x_2; ...; x_N]` and
//! `u_hat = [u_0; u_1; ...; u_{N-1}]`.

use nalgebra::{DMatrix, DVector, RealField, Scalar, SimdRealField};

use crate::{
    error::{MpcError, Result},
    qp::{check_finite, check_len, check_symmetric},
};

/// Discrete-time model `x_{k+1} = A x_k + B u_k`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel<F> {
    pub(crate) A: DMatrix<F>, // Nx * Nx
    pub(crate) B: DMatrix<F>, // Nx * Nu
}

impl<F> LinearModel<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    pub fn new(A: DMatrix<F>, B: DMatrix<F>) -> Result<Self> {
        if !A.is_square() {
            return Err(MpcError::NotSquare {
                what: "A",
                rows: A.nrows(),
                cols: A.ncols(),
            });
        }
        if B.nrows() != A.nrows() {
            return Err(MpcError::DimensionMismatch {
                what: "rows of B",
                expected: A.nrows(),
                got: B.nrows(),
            });
        }
        check_finite("A", &A)?;
        check_finite("B", &B)?;
        Ok(Self { A, B })
    }

    pub fn nx(&self) -> usize {
        self.A.nrows()
    }

    pub fn nu(&self) -> usize {
        self.B.ncols()
    }

    pub fn A(&self) -> &DMatrix<F> {
        &self.A
    }

    pub fn B(&self) -> &DMatrix<F> {
        &self.B
    }

    /// Advance one step: `A x + B u`
    pub fn step(&self, x: &DVector<F>, u: &DVector<F>) -> Result<DVector<F>> {
        check_len("x", x, self.nx())?;
        check_len("u", u, self.nu())?;
        Ok(&self.A * x + &self.B * u)
    }
}

/// Per-stage quadratic weights `x'Qx + u'Ru`
#[derive(Debug, Clone, PartialEq)]
pub struct StageCost<F> {
    pub(crate) Q: DMatrix<F>, // Nx * Nx
    pub(crate) R: DMatrix<F>, // Nu * Nu
}

impl<F> StageCost<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    pub fn new(Q: DMatrix<F>, R: DMatrix<F>) -> Result<Self> {
        for (what, m) in [("Q", &Q), ("R", &R)] {
            if !m.is_square() {
                return Err(MpcError::NotSquare {
                    what,
                    rows: m.nrows(),
                    cols: m.ncols(),
                });
            }
            check_finite(what, m)?;
            check_symmetric(what, m)?;
        }
        Ok(Self { Q, R })
    }

    /// Diagonal weights
    pub fn diagonal(q: &[F], r: &[F]) -> Self {
        Self {
            Q: DMatrix::from_diagonal(&DVector::from_column_slice(q)),
            R: DMatrix::from_diagonal(&DVector::from_column_slice(r)),
        }
    }

    pub fn Q(&self) -> &DMatrix<F> {
        &self.Q
    }

    pub fn R(&self) -> &DMatrix<F> {
        &self.R
    }
}

/// Prediction matrices with `x_hat = E x_0 + F u_hat`
#[derive(Debug, Clone, PartialEq)]
pub struct CondensedModel<F> {
    pub E: DMatrix<F>, // Nx*N * Nx
    pub F: DMatrix<F>, // Nx*N * Nu*N
}

impl<F> CondensedModel<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    /// Unroll the dynamics over `horizon` steps.
    ///
    /// Block row `i` of `E` is `A^(i+1)`; block `(i, j)` of `F` is `A^(i-j) B`
    /// for `j <= i` and zero above the block diagonal.
    pub fn new(model: &LinearModel<F>, horizon: usize) -> Result<Self> {
        if horizon < 1 {
            return Err(MpcError::InvalidHorizon(horizon));
        }
        let (nx, nu) = (model.nx(), model.nu());

        let mut e = DMatrix::zeros(nx * horizon, nx);
        let mut power = model.A.clone();
        for i in 0..horizon {
            e.view_mut((i * nx, 0), (nx, nx)).copy_from(&power);
            power = &model.A * power;
        }

        // A^k B for k = 0..N-1
        let mut ab = Vec::with_capacity(horizon);
        ab.push(model.B.clone());
        for k in 1..horizon {
            let next = &model.A * &ab[k - 1];
            ab.push(next);
        }

        let mut f = DMatrix::zeros(nx * horizon, nu * horizon);
        for i in 0..horizon {
            for j in 0..=i {
                f.view_mut((i * nx, j * nu), (nx, nu)).copy_from(&ab[i - j]);
            }
        }

        Ok(Self { E: e, F: f })
    }

    pub fn horizon(&self) -> usize {
        self.E.nrows() / self.E.ncols().max(1)
    }

    /// Stacked predicted states `E x0 + F u_hat`
    pub fn predict(&self, x0: &DVector<F>, u_hat: &DVector<F>) -> Result<DVector<F>> {
        check_len("x0", x0, self.E.ncols())?;
        check_len("u_hat", u_hat, self.F.ncols())?;
        let mut x_hat = &self.F * u_hat;
        x_hat.gemv(F::one(), &self.E, x0, F::one());
        Ok(x_hat)
    }
}

/// `horizon` copies of `m` along the block diagonal
pub fn block_diagonal<F>(m: &DMatrix<F>, horizon: usize) -> DMatrix<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    let (r, c) = m.shape();
    let mut out = DMatrix::zeros(r * horizon, c * horizon);
    for i in 0..horizon {
        out.view_mut((i * r, i * c), (r, c)).copy_from(m);
    }
    out
}

/// First-difference operator: `(Ac u_hat)_k = u_{k+1} - u_k`, shape `nu*(N-1) x nu*N`
pub fn difference_operator<F>(nu: usize, horizon: usize) -> DMatrix<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    let rows = nu * horizon.saturating_sub(1);
    let mut ac = DMatrix::zeros(rows, nu * horizon);
    for r in 0..rows {
        ac[(r, r)] = -F::one();
        ac[(r, r + nu)] = F::one();
    }
    ac
}

/// Identity rows for the box bounds stacked above the rate rows `Ac`
pub fn constraint_matrix<F>(ac: &DMatrix<F>) -> DMatrix<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    let n = ac.ncols();
    let mut g = DMatrix::zeros(n + ac.nrows(), n);
    g.view_mut((0, 0), (n, n)).fill_with_identity();
    g.view_mut((n, 0), (ac.nrows(), n)).copy_from(ac);
    g
}

/// Repeat `v` `times` times, end to end
pub fn tile<F>(v: &DVector<F>, times: usize) -> DVector<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    let n = v.len();
    DVector::from_fn(n * times, |i, _| v[i % n.max(1)])
}
