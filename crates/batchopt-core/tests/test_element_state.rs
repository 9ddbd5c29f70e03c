//! Element bookkeeping across a sequence of accepted points.

use batchopt_core::{
    optimization::{
        ConvergenceChecker, ConvergenceContext, ElementState, ElementStatus, FailureKind,
    },
    Batch, BatchObjective, DVector, Pointwise,
};
use pretty_assertions::assert_eq;

const CENTER: [f64; 3] = [1.0, -2.0, 0.5];
const SCALES: [f64; 3] = [0.5, 2.0, 4.0];

fn evaluate(x: &DVector<f64>) -> (f64, DVector<f64>) {
    // Σ sⱼ (xⱼ − cⱼ)², Hessian diag(1, 4, 8)
    let bowl = Pointwise::new(|_: usize, x: &[f64]| {
        let mut value = 0.0;
        let mut gradient = vec![0.0; 3];
        for j in 0..3 {
            let d = x[j] - CENTER[j];
            value += SCALES[j] * d * d;
            gradient[j] = 2.0 * SCALES[j] * d;
        }
        (value, gradient)
    });
    let eval = bowl.evaluate(&Batch::from_vector(x)).unwrap();
    (eval.values[0], eval.gradients.row_vector(0))
}

#[test]
fn test_stored_pairs_satisfy_secant_equation() {
    let hessian = [1.0, 4.0, 8.0];
    let x0 = DVector::from_vec(vec![3.0, 1.0, -1.0]);
    let (f0, g0) = evaluate(&x0);
    let mut element = ElementState::new(x0, f0, g0, 3);

    for _ in 0..5 {
        let next = &element.position - &element.gradient * 0.05;
        let (value, gradient) = evaluate(&next);
        assert!(element.advance(next, value, gradient));
    }

    assert_eq!(element.history.len(), 3);
    for i in 0..element.history.len() {
        let s = element.history.s(i);
        let y = element.history.y(i);
        for j in 0..3 {
            assert!((y[j] - hessian[j] * s[j]).abs() < 1e-12);
        }
        assert!(element.history.rho(i) > 0.0);
    }

    let deltas = element.history.position_deltas();
    assert_eq!(deltas.nrows(), 3);
    // Steepest descent on a bowl shrinks every step: oldest rows are largest.
    assert!(deltas.row(0).norm() > deltas.row(2).norm());
}

#[test]
fn test_terminal_element_ignores_updates() {
    let x0 = DVector::from_vec(vec![1.0, -2.0, 0.5]);
    let (f0, g0) = evaluate(&x0);
    let mut element = ElementState::new(x0.clone(), f0, g0, 5);

    let checker = ConvergenceChecker::new(1e-8);
    let status = checker.assess(&ConvergenceContext {
        element: 0,
        iteration: 0,
        position: element.position.as_slice(),
        value: element.value,
        gradient: element.gradient.as_slice(),
        previous_position: None,
        previous_value: None,
    });
    element.finish(status);
    assert_eq!(element.status, ElementStatus::Converged);

    let elsewhere = DVector::from_vec(vec![0.0, 0.0, 0.0]);
    let (value, gradient) = evaluate(&elsewhere);
    assert!(!element.advance(elsewhere, value, gradient));
    element.finish(ElementStatus::Failed(FailureKind::NumericalFailure));

    assert_eq!(element.position, x0);
    assert_eq!(element.status, ElementStatus::Converged);
    assert!(element.history.is_empty());
}

#[cfg(feature = "serde")]
#[test]
fn test_serde_round_trip() {
    use batchopt_core::optimization::{BatchTermination, LineSearchParams};

    let params = LineSearchParams::<f64>::default().with_c2(0.5);
    let json = serde_json::to_string(&params).unwrap();
    let restored: LineSearchParams<f64> = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, params);

    let statuses = vec![
        ElementStatus::Running,
        ElementStatus::Converged,
        ElementStatus::Failed(FailureKind::LineSearchExhausted),
        ElementStatus::Exhausted,
    ];
    let json = serde_json::to_string(&statuses).unwrap();
    let restored: Vec<ElementStatus> = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, statuses);

    let termination: BatchTermination =
        serde_json::from_str(&serde_json::to_string(&BatchTermination::MaxIterations).unwrap())
            .unwrap();
    assert_eq!(termination, BatchTermination::MaxIterations);

    let batch = Batch::from_flat(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let restored: Batch<f64> =
        serde_json::from_str(&serde_json::to_string(&batch).unwrap()).unwrap();
    assert_eq!(restored, batch);
}
