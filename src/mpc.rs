use log::{debug, trace};
use nalgebra::{DMatrix, DVector, RealField, Scalar, SimdRealField, convert};

use crate::{
    condense::{
        CondensedModel, LinearModel, StageCost, block_diagonal, constraint_matrix,
        difference_operator, tile,
    },
    error::{MpcError, Result},
    qp::{QpSolver, SolveStatus, WarmStart, check_bounds, check_len, check_positive},
    settings::AdmmSettings,
};

/// Stacked input bounds over the horizon.
///
/// Rows line up with the constraint matrix `G = [I; Ac]`: `N` box blocks
/// followed by `N - 1` rate blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintSet<F> {
    pub u_min_hat: DVector<F>,  // Nu*N
    pub u_max_hat: DVector<F>,  // Nu*N
    pub du_min_hat: DVector<F>, // Nu*(N-1)
    pub du_max_hat: DVector<F>, // Nu*(N-1)
}

impl<F> ConstraintSet<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    pub fn new(
        u_min_hat: DVector<F>,
        u_max_hat: DVector<F>,
        du_min_hat: DVector<F>,
        du_max_hat: DVector<F>,
    ) -> Result<Self> {
        check_len("u_max_hat", &u_max_hat, u_min_hat.len())?;
        check_len("du_max_hat", &du_max_hat, du_min_hat.len())?;
        check_bounds("u_min_hat, u_max_hat", &u_min_hat, &u_max_hat)?;
        check_bounds("du_min_hat, du_max_hat", &du_min_hat, &du_max_hat)?;
        Ok(Self {
            u_min_hat,
            u_max_hat,
            du_min_hat,
            du_max_hat,
        })
    }

    /// Repeat per-stage bounds across a horizon of `horizon` steps
    pub fn from_stage(
        u_min: &DVector<F>,
        u_max: &DVector<F>,
        du_min: &DVector<F>,
        du_max: &DVector<F>,
        horizon: usize,
    ) -> Result<Self> {
        if horizon < 1 {
            return Err(MpcError::InvalidHorizon(horizon));
        }
        let nu = u_min.len();
        check_len("u_max", u_max, nu)?;
        check_len("du_min", du_min, nu)?;
        check_len("du_max", du_max, nu)?;
        Self::new(
            tile(u_min, horizon),
            tile(u_max, horizon),
            tile(du_min, horizon - 1),
            tile(du_max, horizon - 1),
        )
    }

    /// Infinite bounds everywhere
    pub fn unbounded(nu: usize, horizon: usize) -> Self {
        let inf: F = convert(f64::INFINITY);
        let rate = nu * horizon.saturating_sub(1);
        Self {
            u_min_hat: DVector::from_element(nu * horizon, -inf),
            u_max_hat: DVector::from_element(nu * horizon, inf),
            du_min_hat: DVector::from_element(rate, -inf),
            du_max_hat: DVector::from_element(rate, inf),
        }
    }

    /// `l = [u_min_hat; du_min_hat]`
    pub fn lower(&self) -> DVector<F> {
        stack(&self.u_min_hat, &self.du_min_hat)
    }

    /// `u = [u_max_hat; du_max_hat]`
    pub fn upper(&self) -> DVector<F> {
        stack(&self.u_max_hat, &self.du_max_hat)
    }
}

fn stack<F>(top: &DVector<F>, bottom: &DVector<F>) -> DVector<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    let mut out = DVector::zeros(top.len() + bottom.len());
    out.rows_mut(0, top.len()).copy_from(top);
    out.rows_mut(top.len(), bottom.len()).copy_from(bottom);
    out
}

/// State and input references for one horizon
#[derive(Debug, Clone, PartialEq)]
pub struct Reference<F> {
    pub x_ref_hat: DVector<F>, // Nx*N
    pub u_ref_hat: DVector<F>, // Nu*N
}

impl<F> Reference<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    pub fn new(x_ref_hat: DVector<F>, u_ref_hat: DVector<F>) -> Self {
        Self {
            x_ref_hat,
            u_ref_hat,
        }
    }

    /// Hold a constant set point over the whole horizon
    pub fn constant(x_ref: &DVector<F>, u_ref: &DVector<F>, horizon: usize) -> Self {
        Self {
            x_ref_hat: tile(x_ref, horizon),
            u_ref_hat: tile(u_ref, horizon),
        }
    }
}

/// Result of one receding-horizon step
#[derive(Debug, Clone, PartialEq)]
pub struct MpcAction<F> {
    /// Optimized input sequence, Nu*N
    pub u_hat: DVector<F>,
    /// Multipliers of `G`, Nu*(2N-1)
    pub lambda: DVector<F>,
    pub iterations: usize,
    pub primal_residual: F,
    pub dual_residual: F,
    pub status: SolveStatus,
    /// First block of `u_hat` clipped to the first-stage box bounds
    control: DVector<F>,
}

impl<F> MpcAction<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    /// The input to apply now.
    ///
    /// A fixed iteration budget can leave `u_hat` slightly outside the box,
    /// so the applied block is clipped to `[u_min_hat, u_max_hat]`.
    pub fn first_control(&self) -> &DVector<F> {
        &self.control
    }

    /// `(u_hat, lambda)` as the starting point of the next step
    pub fn into_warm_start(self) -> WarmStart<F> {
        WarmStart::new(self.u_hat, self.lambda)
    }
}

/// Condensed linear MPC over the fixed-iteration ADMM solver.
///
/// [`MpcSolver::build`] computes everything that depends only on the model,
/// cost and horizon, including the QP factorization. [`MpcSolver::action`]
/// only rebuilds the linear cost and bounds, so it is cheap and allocation
/// light. Warm-start state lives with the caller.
#[derive(Debug, Clone)]
pub struct MpcSolver<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    horizon: usize,
    dt: F,
    model: LinearModel<F>,
    condensed: CondensedModel<F>,
    Qhat: DMatrix<F>, // Nx*N * Nx*N
    Rhat: DMatrix<F>, // Nu*N * Nu*N
    Ac: DMatrix<F>,   // Nu*(N-1) * Nu*N

    /// Precomputed `F' Qhat`
    FtQhat: DMatrix<F>, // Nu*N * Nx*N

    /// Holds `P = F' Qhat F + Rhat` and `G = [I; Ac]`
    qp: QpSolver<F>,
}

impl<F> MpcSolver<F>
where
    F: Scalar + Copy + SimdRealField + RealField,
{
    /// Condense the horizon problem and factorize it.
    ///
    /// ## Arguments
    /// - `horizon`: lookahead `N >= 1`
    /// - `model`: `A`, `B`
    /// - `cost`: stage weights `Q`, `R`
    /// - `settings`: ADMM parameters shared by every [`MpcSolver::action`]
    /// - `dt`: control period in seconds
    pub fn build(
        horizon: usize,
        model: LinearModel<F>,
        cost: StageCost<F>,
        settings: AdmmSettings<F>,
        dt: F,
    ) -> Result<Self> {
        if horizon < 1 {
            return Err(MpcError::InvalidHorizon(horizon));
        }
        check_positive("dt", dt)?;
        let (nx, nu) = (model.nx(), model.nu());
        if cost.Q.nrows() != nx {
            return Err(MpcError::DimensionMismatch {
                what: "Q",
                expected: nx,
                got: cost.Q.nrows(),
            });
        }
        if cost.R.nrows() != nu {
            return Err(MpcError::DimensionMismatch {
                what: "R",
                expected: nu,
                got: cost.R.nrows(),
            });
        }

        let condensed = CondensedModel::new(&model, horizon)?;
        let Qhat = block_diagonal(&cost.Q, horizon);
        let Rhat = block_diagonal(&cost.R, horizon);

        let FtQhat = condensed.F.tr_mul(&Qhat);
        let P = &FtQhat * &condensed.F + &Rhat;
        // Remove round-off asymmetry
        let half: F = convert(0.5);
        let P = (&P + P.transpose()).scale(half);

        let Ac = difference_operator(nu, horizon);
        let G = constraint_matrix(&Ac);

        let qp = QpSolver::setup(P, G, settings)?;

        debug!(
            "MPC build: nx = {}, nu = {}, N = {}, dt = {}, QP {}x{} with {} constraints",
            nx,
            nu,
            horizon,
            dt,
            qp.n(),
            qp.n(),
            qp.m()
        );

        Ok(Self {
            horizon,
            dt,
            model,
            condensed,
            Qhat,
            Rhat,
            Ac,
            FtQhat,
            qp,
        })
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn dt(&self) -> F {
        self.dt
    }

    pub fn nx(&self) -> usize {
        self.model.nx()
    }

    pub fn nu(&self) -> usize {
        self.model.nu()
    }

    pub fn model(&self) -> &LinearModel<F> {
        &self.model
    }

    pub fn condensed(&self) -> &CondensedModel<F> {
        &self.condensed
    }

    pub fn E(&self) -> &DMatrix<F> {
        &self.condensed.E
    }

    pub fn F(&self) -> &DMatrix<F> {
        &self.condensed.F
    }

    pub fn P(&self) -> &DMatrix<F> {
        self.qp.cost_matrix()
    }

    pub fn G(&self) -> &DMatrix<F> {
        self.qp.constraint_matrix()
    }

    pub fn Ac(&self) -> &DMatrix<F> {
        &self.Ac
    }

    pub fn Qhat(&self) -> &DMatrix<F> {
        &self.Qhat
    }

    pub fn Rhat(&self) -> &DMatrix<F> {
        &self.Rhat
    }

    pub fn qp(&self) -> &QpSolver<F> {
        &self.qp
    }

    pub fn settings(&self) -> &AdmmSettings<F> {
        self.qp.settings()
    }

    /// Zero inputs and multipliers sized for this horizon
    pub fn cold_start(&self) -> WarmStart<F> {
        WarmStart::cold(self.qp.n(), self.qp.m())
    }

    /// `q = F' Qhat (E x_k - x_ref_hat) - Rhat u_ref_hat`
    pub fn linear_cost(&self, x_k: &DVector<F>, reference: &Reference<F>) -> Result<DVector<F>> {
        check_len("x_k", x_k, self.nx())?;
        check_len("x_ref_hat", &reference.x_ref_hat, self.condensed.E.nrows())?;
        check_len("u_ref_hat", &reference.u_ref_hat, self.qp.n())?;

        // E x_k - x_ref_hat
        let mut deviation = reference.x_ref_hat.clone();
        deviation.gemv(F::one(), &self.condensed.E, x_k, -F::one());

        let mut q = &self.Rhat * &reference.u_ref_hat;
        q.gemv(F::one(), &self.FtQhat, &deviation, -F::one());
        Ok(q)
    }

    /// Solve one receding-horizon step from the measured state `x_k`.
    ///
    /// `warm` is normally the previous step's [`MpcAction::into_warm_start`];
    /// use [`MpcSolver::cold_start`] for the first call.
    pub fn action(
        &self,
        x_k: &DVector<F>,
        reference: &Reference<F>,
        constraints: &ConstraintSet<F>,
        warm: &WarmStart<F>,
    ) -> Result<MpcAction<F>> {
        let n = self.qp.n();
        check_len("u_min_hat", &constraints.u_min_hat, n)?;
        check_len("u_max_hat", &constraints.u_max_hat, n)?;
        check_len("du_min_hat", &constraints.du_min_hat, self.Ac.nrows())?;
        check_len("du_max_hat", &constraints.du_max_hat, self.Ac.nrows())?;

        let q = self.linear_cost(x_k, reference)?;
        let l = constraints.lower();
        let u = constraints.upper();

        let sol = self.qp.solve(&q, &l, &u, warm)?;

        let nu = self.nu();
        let mut control = sol.z.rows(0, nu).into_owned();
        control.zip_zip_apply(
            &constraints.u_min_hat.rows(0, nu),
            &constraints.u_max_hat.rows(0, nu),
            |u, min, max| *u = (*u).clamp(min, max),
        );
        trace!(
            "MPC action: u0 = {}, r_prim = {}, r_dual = {}",
            control, sol.primal_residual, sol.dual_residual
        );

        Ok(MpcAction {
            u_hat: sol.z,
            lambda: sol.y,
            iterations: sol.iterations,
            primal_residual: sol.primal_residual,
            dual_residual: sol.dual_residual,
            status: sol.status,
            control,
        })
    }

    /// Stacked predicted states for the input sequence `u_hat`
    pub fn predict(&self, x0: &DVector<F>, u_hat: &DVector<F>) -> Result<DVector<F>> {
        self.condensed.predict(x0, u_hat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::{dmatrix, dvector};

    fn spring_cart(horizon: usize) -> MpcSolver<f64> {
        let dt = 0.02;
        let model = LinearModel::new(
            dmatrix![1.0, dt; -dt, 1.0 - 0.1 * dt],
            dmatrix![0.0; dt],
        )
        .unwrap();
        let cost = StageCost::diagonal(&[1.0, 1.0], &[1.0]);
        MpcSolver::build(horizon, model, cost, AdmmSettings::default(), dt).unwrap()
    }

    #[test]
    fn build_shapes() {
        let mpc = spring_cart(4);
        assert_eq!(mpc.E().shape(), (8, 2));
        assert_eq!(mpc.F().shape(), (8, 4));
        assert_eq!(mpc.P().shape(), (4, 4));
        assert_eq!(mpc.G().shape(), (7, 4));
        assert_eq!(mpc.Ac().shape(), (3, 4));
        assert_eq!(mpc.Qhat().shape(), (8, 8));
        assert_eq!(mpc.Rhat().shape(), (4, 4));
        assert_eq!(mpc.P(), &mpc.P().transpose());

        let warm = mpc.cold_start();
        assert_eq!(warm.z.len(), 4);
        assert_eq!(warm.y.len(), 7);
    }

    #[test]
    fn cost_matrix_is_condensed_hessian() {
        let mpc = spring_cart(3);
        let expected = mpc.F().transpose() * mpc.Qhat() * mpc.F() + mpc.Rhat();
        assert_abs_diff_eq!(mpc.P().clone(), expected, epsilon = 1e-12);
    }

    #[test]
    fn build_rejects_bad_configuration() {
        let model = LinearModel::new(DMatrix::<f64>::identity(2, 2), dmatrix![0.0; 1.0]).unwrap();
        let cost = StageCost::diagonal(&[1.0, 1.0], &[1.0]);
        let settings = AdmmSettings::default();

        assert_eq!(
            MpcSolver::build(0, model.clone(), cost.clone(), settings, 0.02).unwrap_err(),
            MpcError::InvalidHorizon(0)
        );
        assert!(matches!(
            MpcSolver::build(5, model.clone(), cost, settings, 0.0),
            Err(MpcError::InvalidParameter { name: "dt", .. })
        ));
        assert!(matches!(
            MpcSolver::build(5, model, StageCost::diagonal(&[1.0], &[1.0]), settings, 0.02),
            Err(MpcError::DimensionMismatch { what: "Q", .. })
        ));
    }

    #[test]
    fn linear_cost_vanishes_at_reference() {
        let mpc = spring_cart(5);
        let reference = Reference::constant(&dvector![0.0, 0.0], &dvector![0.0], 5);
        let q = mpc.linear_cost(&dvector![0.0, 0.0], &reference).unwrap();
        assert_eq!(q, DVector::zeros(5));

        let q = mpc.linear_cost(&dvector![0.0, 0.5], &reference).unwrap();
        let expected = mpc.F().transpose() * mpc.Qhat() * (mpc.E() * dvector![0.0, 0.5]);
        assert_abs_diff_eq!(q, expected, epsilon = 1e-12);
    }

    #[test]
    fn input_reference_shifts_linear_cost() {
        let mpc = spring_cart(2);
        let reference = Reference::constant(&dvector![0.0, 0.0], &dvector![0.5], 2);
        let q = mpc.linear_cost(&dvector![0.0, 0.0], &reference).unwrap();
        assert_abs_diff_eq!(q, dvector![-0.5, -0.5], epsilon = 1e-12);
    }

    #[test]
    fn constraint_set_stacks_box_then_rate() {
        let c = ConstraintSet::from_stage(
            &dvector![-0.005],
            &dvector![1.0],
            &dvector![-1.0],
            &dvector![1.0],
            3,
        )
        .unwrap();
        assert_eq!(c.lower(), dvector![-0.005, -0.005, -0.005, -1.0, -1.0]);
        assert_eq!(c.upper(), dvector![1.0, 1.0, 1.0, 1.0, 1.0]);

        assert!(matches!(
            ConstraintSet::from_stage(&dvector![1.0], &dvector![0.0], &dvector![-1.0], &dvector![1.0], 3),
            Err(MpcError::InvalidBounds { index: 0, .. })
        ));

        let open = ConstraintSet::<f64>::unbounded(2, 3);
        assert_eq!(open.lower().len(), 10);
        assert!(open.upper().iter().all(|u| *u > 1e300));
    }

    #[test]
    fn action_rejects_mismatched_inputs() {
        let mpc = spring_cart(4);
        let reference = Reference::constant(&dvector![0.0, 0.0], &dvector![0.0], 4);
        let constraints = ConstraintSet::unbounded(1, 4);
        let warm = mpc.cold_start();

        assert!(matches!(
            mpc.action(&dvector![0.0], &reference, &constraints, &warm),
            Err(MpcError::DimensionMismatch { what: "x_k", .. })
        ));
        assert!(matches!(
            mpc.action(&dvector![0.0, 0.0], &reference, &ConstraintSet::unbounded(1, 5), &warm),
            Err(MpcError::DimensionMismatch { what: "u_min_hat", .. })
        ));
        assert!(matches!(
            mpc.action(&dvector![0.0, 0.0], &reference, &constraints, &WarmStart::cold(4, 4)),
            Err(MpcError::DimensionMismatch { what: "warm start y", .. })
        ));
    }

    #[test]
    fn first_control_takes_leading_block() {
        let mpc = spring_cart(3);
        let reference = Reference::constant(&dvector![0.0, 0.0], &dvector![0.0], 3);
        let constraints = ConstraintSet::from_stage(
            &dvector![-1.0],
            &dvector![1.0],
            &dvector![-1.0],
            &dvector![1.0],
            3,
        )
        .unwrap();
        let action = mpc
            .action(&dvector![0.0, 0.01], &reference, &constraints, &mpc.cold_start())
            .unwrap();
        assert_eq!(action.first_control(), &dvector![action.u_hat[0].clamp(-1.0, 1.0)]);
        assert_eq!(action.lambda.len(), 5);
        assert_eq!(action.iterations, AdmmSettings::<f64>::default().max_iter);
    }
}
