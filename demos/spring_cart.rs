/// Spring-cart example
///
/// A single cart of mass `m` on a spring `k` with damping `b`, pushed by a force `u`:
///
///     x_dot = [0, 1; -k/m, -b/m] x + [0; 1/m] u
///
/// discretized with an explicit Euler step of `DT`.
///     - NSTATES = 2 (position, velocity)
///     - NINPUTS = 1 (force)
///
use std::time::Instant;

use log::debug;
use nalgebra::{DMatrix, DVector, dvector};
use qpmpc::{AdmmSettings, ConstraintSet, LinearModel, MpcSolver, Reference, StageCost};

const NH: usize = 60;
const NSTEPS: usize = 600;
const DT: f64 = 0.02;

const M: f64 = 1.0;
const K: f64 = 1.0;
const B: f64 = 0.1;

fn main() -> qpmpc::Result<()> {
    env_logger::init();

    #[rustfmt::skip]
    let a = DMatrix::from_row_slice(2, 2, &[
        1.0,          DT,
        -K / M * DT,  1.0 - B / M * DT,
    ]);
    let b = DMatrix::from_row_slice(2, 1, &[0.0, DT / M]);
    let model = LinearModel::new(a, b)?;
    let cost = StageCost::diagonal(&[1.0, 1.0], &[1.0]);

    let settings = AdmmSettings::new(0.1, 1e-4, 1.6, 5);
    let mpc = MpcSolver::build(NH, model.clone(), cost, settings, DT)?;

    // Hold position 0 at rest
    let reference = Reference::constant(&dvector![0.0, 0.0], &dvector![0.0], NH);
    let bounds = ConstraintSet::from_stage(
        &dvector![-0.005],
        &dvector![1.0],
        &dvector![-1.0],
        &dvector![1.0],
        NH,
    )?;

    let x0 = dvector![0.0, 0.01];
    let mut x = x0.clone();
    let mut x_open = x0;
    let mut warm = mpc.cold_start();
    let mut runtimes = Vec::with_capacity(NSTEPS);

    for k in 1..NSTEPS {
        let start = Instant::now();
        let action = mpc.action(&x, &reference, &bounds, &warm)?;
        runtimes.push(start.elapsed().as_secs_f64());

        x = model.step(&x, action.first_control())?;
        x_open = model.step(&x_open, &DVector::zeros(1))?;

        debug!(
            "step {k:3}: u = {:+.5}, v = {:+.5} (open loop {:+.5}), r_prim = {:.2e}, r_dual = {:.2e}",
            action.first_control()[0],
            x[1],
            x_open[1],
            action.primal_residual,
            action.dual_residual,
        );

        warm = action.into_warm_start();
    }

    let (mean, std) = mean_std(&runtimes);
    println!("Final state: MPC {:?}, open loop {:?}", x.as_slice(), x_open.as_slice());
    println!("Mean runtime: {mean:.1e} +/- {std:.1e} s");
    Ok(())
}

fn mean_std(samples: &[f64]) -> (f64, f64) {
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}
