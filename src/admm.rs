use nalgebra::{Cholesky, DMatrix, DVector, Dyn, RealField, Scalar, SimdRealField};

/// Iterates and scratch buffers for one ADMM solve.
///
/// Everything is allocated once in [`AdmmWorkspace::new`]; the iteration
/// itself only runs in-place kernels (gemv, triangular solves, clipping).
#[derive(Debug, Clone)]
pub(crate) struct AdmmWorkspace<F> {
    /// Primal iterate, n
    pub(crate) x: DVector<F>,
    /// Dual iterate, m
    pub(crate) y: DVector<F>,
    /// Projected slack, m. Always inside [l, u].
    pub(crate) w: DVector<F>,
    pub(crate) w_prev: DVector<F>,

    // Temporaries
    ax: DVector<F>,      // m
    relaxed: DVector<F>, // m
    rhs: DVector<F>,     // n
    tmp_m: DVector<F>,   // m
    tmp_n: DVector<F>,   // n

    pub(crate) primal_residual: F,
    pub(crate) dual_residual: F,
    pub(crate) iter: usize,
}

impl<F> AdmmWorkspace<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    /// Load the warm start. The slack starts at the projection of `A z0`.
    pub(crate) fn new(
        A: &DMatrix<F>,
        z0: &DVector<F>,
        y0: &DVector<F>,
        l: &DVector<F>,
        u: &DVector<F>,
    ) -> Self {
        let (m, n) = A.shape();

        let mut ax = DVector::zeros(m);
        ax.gemv(F::one(), A, z0, F::zero());

        let mut w = ax.clone();
        w.zip_zip_apply(l, u, |w, min, max| *w = (*w).clamp(min, max));

        Self {
            x: z0.clone(),
            y: y0.clone(),
            w_prev: w.clone(),
            w,
            ax,
            relaxed: DVector::zeros(m),
            rhs: DVector::zeros(n),
            tmp_m: DVector::zeros(m),
            tmp_n: DVector::zeros(n),
            primal_residual: F::zero(),
            dual_residual: F::zero(),
            iter: 0,
        }
    }

    /// Solve `(P + sigma I + rho A'A) x = sigma x - q + A'(rho w - y)` with the cached factor
    pub(crate) fn update_primal(
        &mut self,
        factor: &Cholesky<F, Dyn>,
        A: &DMatrix<F>,
        q: &DVector<F>,
        rho: F,
        sigma: F,
    ) {
        self.tmp_m
            .zip_zip_apply(&self.w, &self.y, |t, w, y| *t = rho * w - y);
        self.rhs
            .zip_zip_apply(&self.x, q, |r, x, q| *r = sigma * x - q);
        self.rhs.gemv_tr(F::one(), A, &self.tmp_m, F::one());

        factor.solve_mut(&mut self.rhs);
        std::mem::swap(&mut self.x, &mut self.rhs);
    }

    /// Blend `A x` with the previous slack: `alpha A x + (1 - alpha) w`
    pub(crate) fn relax(&mut self, A: &DMatrix<F>, alpha: F) {
        self.ax.gemv(F::one(), A, &self.x, F::zero());
        let beta = F::one() - alpha;
        self.relaxed
            .zip_zip_apply(&self.ax, &self.w, |r, ax, w| *r = alpha * ax + beta * w);
    }

    /// Project the shifted relaxed iterate onto the box `[l, u]`
    pub(crate) fn update_slack(&mut self, l: &DVector<F>, u: &DVector<F>, rho: F) {
        self.w_prev.copy_from(&self.w);
        self.w
            .zip_zip_apply(&self.relaxed, &self.y, |w, r, y| *w = r + y / rho);
        self.w
            .zip_zip_apply(l, u, |w, min, max| *w = (*w).clamp(min, max));
    }

    /// Augmented Lagrangian multiplier update
    pub(crate) fn update_dual(&mut self, rho: F) {
        self.y
            .zip_zip_apply(&self.relaxed, &self.w, |y, r, w| *y = *y + rho * (r - w));
    }

    /// Infinity norms of `A x - w` and `rho A'(w - w_prev)`
    pub(crate) fn update_residuals(&mut self, A: &DMatrix<F>, rho: F) {
        self.tmp_m
            .zip_zip_apply(&self.ax, &self.w, |t, ax, w| *t = ax - w);
        self.primal_residual = self.tmp_m.amax();

        self.tmp_m
            .zip_zip_apply(&self.w, &self.w_prev, |t, w, prev| *t = w - prev);
        self.tmp_n.gemv_tr(F::one(), A, &self.tmp_m, F::zero());
        self.dual_residual = rho * self.tmp_n.amax();
    }

    /// Run exactly `max_iter` iterations. There is no early exit.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn run(
        &mut self,
        factor: &Cholesky<F, Dyn>,
        A: &DMatrix<F>,
        q: &DVector<F>,
        l: &DVector<F>,
        u: &DVector<F>,
        rho: F,
        sigma: F,
        alpha: F,
        max_iter: usize,
    ) {
        for _ in 0..max_iter {
            self.update_primal(factor, A, q, rho, sigma);
            self.relax(A, alpha);
            self.update_slack(l, u, rho);
            self.update_dual(rho);
            self.update_residuals(A, rho);
            self.iter += 1;
        }
    }
}
