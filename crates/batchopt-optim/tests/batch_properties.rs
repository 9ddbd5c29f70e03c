//! Properties of batched runs: element independence, determinism and
//! convergence on random convex quadratics.

use batchopt_core::{
    test_utils::{QuadraticBowl, Rosenbrock},
    Batch, DVector,
};
use batchopt_optim::{ElementStatus, Lbfgs, LbfgsConfig};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn rosenbrock_starts() -> Batch<f64> {
    Batch::from_flat(4, 2, vec![-1.2, 1.0, 0.9, 0.8, 2.0, 2.0, -0.5, -1.5]).unwrap()
}

#[test]
fn test_runs_are_deterministic() {
    let lbfgs = Lbfgs::new(LbfgsConfig::new().with_max_iterations(100));
    let first = lbfgs.minimize(&Rosenbrock, &rosenbrock_starts()).unwrap();
    let second = lbfgs.minimize(&Rosenbrock, &rosenbrock_starts()).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_elements_match_single_runs() {
    let lbfgs = Lbfgs::new(LbfgsConfig::new().with_max_iterations(100));
    let starts = rosenbrock_starts();
    let batched = lbfgs.minimize(&Rosenbrock, &starts).unwrap();

    for i in 0..starts.len() {
        let single = lbfgs
            .minimize_single(&Rosenbrock, &starts.row_vector(i))
            .unwrap();

        assert_eq!(batched.position.row(i), single.position.row(0));
        assert_eq!(batched.objective_value[i], single.objective_value[0]);
        assert_eq!(batched.objective_gradient.row(i), single.objective_gradient.row(0));
        assert_eq!(batched.status[i], single.status[0]);
        assert_eq!(batched.num_iterations[i], single.num_iterations[0]);
        assert_eq!(batched.position_deltas[i], single.position_deltas[0]);
        assert_eq!(batched.gradient_deltas[i], single.gradient_deltas[0]);
    }
}

#[test]
fn test_batch_evaluations_do_not_scale_with_batch_size() {
    // One oracle call serves every element of a probe round, so a batch
    // costs no more calls than its most expensive element.
    let lbfgs = Lbfgs::new(LbfgsConfig::new().with_max_iterations(100));
    let starts = rosenbrock_starts();
    let batched = lbfgs.minimize(&Rosenbrock, &starts).unwrap();

    let mut sum = 0;
    for i in 0..starts.len() {
        let single = lbfgs
            .minimize_single(&Rosenbrock, &starts.row_vector(i))
            .unwrap();
        assert!(single.num_objective_evaluations <= batched.num_objective_evaluations);
        sum += single.num_objective_evaluations;
    }
    assert!(batched.num_objective_evaluations < sum);
}

fn quadratic_problem() -> impl Strategy<Value = (Vec<f64>, Vec<f64>, Vec<f64>)> {
    (1usize..6).prop_flat_map(|dim| {
        (
            prop::collection::vec(-5.0..5.0f64, dim),
            prop::collection::vec(0.1..10.0f64, dim),
            prop::collection::vec(-5.0..5.0f64, dim),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_convex_quadratics_converge((center, scales, start) in quadratic_problem()) {
        let dim = center.len();
        let bowl = QuadraticBowl::new(DVector::from_vec(center.clone()), DVector::from_vec(scales));
        let lbfgs = Lbfgs::new(
            LbfgsConfig::new()
                .with_tolerance(1e-8)
                .with_max_iterations(200),
        );

        let result = lbfgs.minimize_single(&bowl, &DVector::from_vec(start)).unwrap();

        prop_assert_eq!(result.status[0], ElementStatus::Converged);
        prop_assert!(result.objective_value[0] >= 0.0);
        for j in 0..dim {
            prop_assert!((result.position.row(0)[j] - center[j]).abs() < 1e-6);
        }
    }

    #[test]
    fn prop_objective_never_increases(x in -3.0..3.0f64, y in -3.0..3.0f64) {
        let start = Batch::from_flat(1, 2, vec![x, y]).unwrap();
        let initial = batchopt_core::BatchObjective::evaluate(&Rosenbrock, &start).unwrap();

        let result = Lbfgs::new(LbfgsConfig::new().with_max_iterations(20))
            .minimize(&Rosenbrock, &start)
            .unwrap();

        prop_assert!(result.objective_value[0] <= initial.values[0]);
        prop_assert!(result.num_iterations[0] <= 20);
        prop_assert!(result.position_deltas[0].nrows() <= 10);
    }
}
