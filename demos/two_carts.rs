/// Two-cart example
///
/// Two carts with independent engines: wall, spring, first cart, spring,
/// second cart. States are the spring extensions and the cart velocities.
///     - NSTATES = 4
///     - NINPUTS = 2 (the second engine is bounded to zero)
///
use std::time::Instant;

use log::debug;
use nalgebra::{DMatrix, DVector, dvector};
use qpmpc::{AdmmSettings, ConstraintSet, LinearModel, MpcSolver, Reference, StageCost};

const NX: usize = 4;
const NU: usize = 2;
const NH: usize = 60;
const NSTEPS: usize = 600;
const DT: f64 = 0.02;

fn main() -> qpmpc::Result<()> {
    env_logger::init();

    let a = DMatrix::from_row_slice(NX, NX, &A);
    let b = DMatrix::from_row_slice(NX, NU, &B);
    let model = LinearModel::new(a, b)?;
    let cost = StageCost::new(DMatrix::identity(NX, NX), DMatrix::identity(NU, NU))?;

    let mpc = MpcSolver::build(NH, model.clone(), cost, AdmmSettings::default(), DT)?;

    let reference = Reference::constant(&DVector::zeros(NX), &DVector::zeros(NU), NH);
    let bounds = ConstraintSet::from_stage(
        &dvector![-0.005, 0.0],
        &dvector![1.0, 0.0],
        &dvector![-1.0, -1.0],
        &dvector![1.0, 1.0],
        NH,
    )?;

    let mut x = dvector![0.01, 0.0, 0.0, 0.0];
    let mut x_open = x.clone();
    let mut warm = mpc.cold_start();
    let mut total = 0.0;

    for k in 1..NSTEPS {
        let start = Instant::now();
        let action = mpc.action(&x, &reference, &bounds, &warm)?;
        total += start.elapsed().as_secs_f64();

        x = model.step(&x, action.first_control())?;
        x_open = model.step(&x_open, &DVector::zeros(NU))?;

        debug!(
            "step {k:3}: u = {}, tracking error {:.5} (open loop {:.5})",
            action.first_control().transpose(),
            x.norm(),
            x_open.norm(),
        );

        warm = action.into_warm_start();
    }

    println!(
        "Tracking error after {} s: MPC {:.5}, open loop {:.5}",
        NSTEPS as f64 * DT,
        x.norm(),
        x_open.norm()
    );
    println!("Mean runtime: {:.1e} s", total / (NSTEPS - 1) as f64);
    Ok(())
}

#[rustfmt::skip]
const A: [f64; NX * NX] = [
    1.0, DT,             0.0, 0.0,
    -DT, 1.0 - 0.1 * DT, 0.0, 0.0,
    0.0, 0.0,            1.0, DT,
    DT,  0.0,            -DT, 1.0 - 0.1 * DT,
];

#[rustfmt::skip]
const B: [f64; NX * NU] = [
    0.0, 0.0,
    DT,  0.0,
    0.0, 0.0,
    0.0, DT,
];
