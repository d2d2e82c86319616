//! Numerical properties of the fixed-iteration ADMM QP solver.

use approx::assert_abs_diff_eq;
use nalgebra::{DMatrix, DVector, dmatrix, dvector};

use qpmpc::{AdmmSettings, QpSolver, SolveStatus, WarmStart};

/// Reference QP with 5 variables and 4 box rows on the first four of them.
fn reference_problem() -> (DMatrix<f64>, DMatrix<f64>, DVector<f64>, DVector<f64>, DVector<f64>) {
    #[rustfmt::skip]
    let P = dmatrix![
        1.63729889, 1.49800623, 0.66972223, 1.16520369, 1.00871733;
        1.49800623, 2.30753699, 1.00125695, 1.29220823, 1.59194631;
        0.66972223, 1.00125695, 1.16973938, 0.60180993, 0.81632789;
        1.16520369, 1.29220823, 0.60180993, 1.33521535, 1.24619392;
        1.00871733, 1.59194631, 0.81632789, 1.24619392, 1.4141925
    ];
    let A = DMatrix::identity(4, 5);
    let q = dvector![0.87613838, 0.7393823, 0.55419765, 0.59420561, 0.26704384];
    let l = dvector![-0.37471228, -0.80018154, -0.47095637, -0.11762543];
    let u = dvector![0.21614515, 0.50421568, 0.35092037, 0.95366794];
    (P, A, q, l, u)
}

// KKT point of the reference problem: rows 0, 2, 3 at their lower bounds.
const Z_STAR: [f64; 5] = [-0.37471228, -0.53770005, -0.47095637, -0.11762543, 1.05923589];
const Y_STAR: [f64; 4] = [-0.07314642, 0.0, -0.00786803, -0.34230088];

#[test]
fn reference_problem_converges_to_kkt_point() {
    let (P, A, q, l, u) = reference_problem();
    let solver = QpSolver::setup(P, A, AdmmSettings::new(6.0, 1e-6, 1.6, 1000)).unwrap();
    let sol = solver.solve(&q, &l, &u, &WarmStart::cold(5, 4)).unwrap();

    assert_abs_diff_eq!(sol.z, DVector::from_column_slice(&Z_STAR), epsilon = 1e-7);
    assert_abs_diff_eq!(sol.y, DVector::from_column_slice(&Y_STAR), epsilon = 1e-7);
    assert_eq!(sol.iterations, 1000);
    assert_eq!(sol.status, SolveStatus::Converged);
    assert_abs_diff_eq!(solver.objective(&sol.z, &q), -0.42263877, epsilon = 1e-7);
}

#[test]
fn single_precision_agrees_with_double() {
    let (P, A, q, l, u) = reference_problem();
    let solver = QpSolver::<f32>::setup(
        P.cast(),
        A.cast(),
        AdmmSettings::new(6.0, 1e-6, 1.6, 1000),
    )
    .unwrap();
    let sol = solver
        .solve(&q.cast(), &l.cast(), &u.cast(), &WarmStart::cold(5, 4))
        .unwrap();

    for (z, expected) in sol.z.iter().zip(Z_STAR) {
        assert_abs_diff_eq!(*z, expected as f32, epsilon = 1e-3);
    }
}

#[test]
fn repeated_solves_are_bit_identical() {
    let (P, A, q, l, u) = reference_problem();
    let solver = QpSolver::setup(P, A, AdmmSettings::new(0.1, 1e-4, 1.6, 5)).unwrap();
    let warm = WarmStart::new(dvector![0.1, -0.2, 0.0, 0.3, 0.5], dvector![0.01, 0.0, -0.02, 0.0]);

    let first = solver.solve(&q, &l, &u, &warm).unwrap();
    let second = solver.solve(&q, &l, &u, &warm).unwrap();
    assert_eq!(first, second);
}

#[test]
fn slack_stays_inside_bounds_at_every_iteration() {
    let (P, A, q, l, u) = reference_problem();
    let solver = QpSolver::setup(P, A, AdmmSettings::new(0.1, 1e-4, 1.6, 1)).unwrap();

    for iters in 1..=25 {
        let sol = solver
            .solve_with_iters(&q, &l, &u, &WarmStart::cold(5, 4), iters)
            .unwrap();
        for i in 0..4 {
            assert!(l[i] <= sol.w[i] && sol.w[i] <= u[i], "iteration {iters}, row {i}");
        }
    }
}

#[test]
fn unconstrained_problem_matches_least_squares() {
    let P = DMatrix::<f64>::identity(4, 4);
    let q = dvector![0.5, -1.25, 2.0, -0.75];
    let big = DVector::from_element(4, 1e9);
    let solver = QpSolver::setup(P, DMatrix::identity(4, 4), AdmmSettings::new(1.0, 1e-6, 1.6, 10)).unwrap();

    let sol = solver.solve(&q, &-&big, &big, &WarmStart::cold(4, 4)).unwrap();

    assert_abs_diff_eq!(sol.z, -q, epsilon = 1e-6);
    assert_abs_diff_eq!(sol.y, DVector::zeros(4), epsilon = 1e-10);
}

#[test]
fn residuals_vanish_at_a_fixed_point() {
    let (P, A, q, l, u) = reference_problem();
    let solver = QpSolver::setup(P, A, AdmmSettings::new(6.0, 1e-6, 1.6, 1000)).unwrap();
    let converged = solver.solve(&q, &l, &u, &WarmStart::cold(5, 4)).unwrap();

    let again = solver
        .solve_with_iters(&q, &l, &u, &converged.clone().into_warm_start(), 3)
        .unwrap();

    assert_abs_diff_eq!(again.primal_residual, 0.0, epsilon = 1e-10);
    assert_abs_diff_eq!(again.dual_residual, 0.0, epsilon = 1e-10);
    assert_abs_diff_eq!(again.z, converged.z, epsilon = 1e-10);
}

#[test]
fn short_budget_reports_max_iter_reached() {
    let (P, A, q, l, u) = reference_problem();
    let settings = AdmmSettings {
        abs_pri_tol: 1e-9,
        abs_dua_tol: 1e-9,
        ..AdmmSettings::new(6.0, 1e-6, 1.6, 2)
    };
    let solver = QpSolver::setup(P, A, settings).unwrap();
    let sol = solver.solve(&q, &l, &u, &WarmStart::cold(5, 4)).unwrap();

    assert_eq!(sol.status, SolveStatus::MaxIterReached);
    assert_eq!(sol.iterations, 2);
    assert!(sol.primal_residual.is_finite() && sol.dual_residual.is_finite());
}

#[test]
fn factorization_is_shared_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<QpSolver<f64>>();

    let (P, A, q, l, u) = reference_problem();
    let solver = QpSolver::setup(P, A, AdmmSettings::new(6.0, 1e-6, 1.6, 50)).unwrap();
    let expected = solver.solve(&q, &l, &u, &WarmStart::cold(5, 4)).unwrap();

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| solver.solve(&q, &l, &u, &WarmStart::cold(5, 4)).unwrap()))
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), expected);
        }
    });
}
