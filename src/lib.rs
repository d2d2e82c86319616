#![allow(non_snake_case)]
#![doc = r#"
Condensed linear MPC on top of a fixed-iteration ADMM QP solver.

The QP core solves `min 0.5 z'Pz + q'z  s.t.  l <= Az <= u` with a Cholesky
factor computed once in [`QpSolver::setup`] and exactly `max_iter` warm-started
ADMM iterations per [`QpSolver::solve`]. The condenser ([`MpcSolver`]) turns
`x_{k+1} = A x_k + B u_k` with stage costs `Q`, `R` and input box/rate bounds
into that form once, then rebuilds only `q`, `l`, `u` at every control step.

```no_run
use nalgebra::{dmatrix, dvector};
use qpmpc::{AdmmSettings, ConstraintSet, LinearModel, MpcSolver, Reference, StageCost};

let dt = 0.02;
let model = LinearModel::new(dmatrix![1.0, dt; -dt, 1.0 - 0.1 * dt], dmatrix![0.0; dt])?;
let cost = StageCost::diagonal(&[1.0, 1.0], &[1.0]);
let mpc = MpcSolver::build(10, model.clone(), cost, AdmmSettings::default(), dt)?;

let reference = Reference::constant(&dvector![0.0, 0.0], &dvector![0.0], 10);
let bounds = ConstraintSet::from_stage(&dvector![-1.0], &dvector![1.0], &dvector![-1.0], &dvector![1.0], 10)?;

let mut x = dvector![0.0, 0.01];
let mut warm = mpc.cold_start();
for _ in 0..100 {
    let action = mpc.action(&x, &reference, &bounds, &warm)?;
    x = model.step(&x, action.first_control())?;
    warm = action.into_warm_start();
}
# Ok::<(), qpmpc::MpcError>(())
```
"#]

mod admm;
pub mod condense;
pub mod error;
pub mod mpc;
pub mod qp;
pub mod settings;

pub use condense::{CondensedModel, LinearModel, StageCost};
pub use error::{MpcError, Result};
pub use mpc::{ConstraintSet, MpcAction, MpcSolver, Reference};
pub use qp::{QpSolution, QpSolver, SolveStatus, WarmStart};
pub use settings::AdmmSettings;
