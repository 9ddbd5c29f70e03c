//! Tests for numerical validation utilities.
//!
//! This test module verifies gradient checking on batched objectives and the
//! input checks made before an optimization call.

use batchopt_core::{
    numerical::validation::{
        validate_initial_position, validate_inverse_hessian, GradientCheckConfig,
        NumericalValidator,
    },
    Batch, DVector, FnObjective, OptimizerError, Pointwise,
};

/// Per-element log-sum-exp `log Σⱼ exp(wᵢ xⱼ)` with element weights `wᵢ`.
fn log_sum_exp(i: usize, x: &[f64]) -> (f64, Vec<f64>) {
    let w = 1.0 + i as f64;
    let m = x.iter().fold(f64::NEG_INFINITY, |a, &v| a.max(w * v));
    let sum: f64 = x.iter().map(|&v| (w * v - m).exp()).sum();
    let gradient = x.iter().map(|&v| w * (w * v - m).exp() / sum).collect();
    (m + sum.ln(), gradient)
}

#[test]
fn test_gradient_check_on_batch() {
    let positions = Batch::from_flat(3, 3, vec![0.1, -0.4, 0.9, 1.5, 0.0, -2.0, 0.3, 0.3, 0.3])
        .unwrap();
    let result = NumericalValidator::check_gradient(
        &Pointwise::new(log_sum_exp),
        &positions,
        &GradientCheckConfig::default(),
    )
    .unwrap();

    assert!(result.passed, "max error {}", result.max_relative_error);
    assert_eq!(result.element_errors.len(), 3);
}

#[test]
fn test_gradient_check_flags_only_broken_element() {
    // Element 1 reports a gradient scaled by two.
    let objective = Pointwise::new(|i: usize, x: &[f64]| {
        let value = x.iter().map(|v| v * v).sum::<f64>();
        let factor = if i == 1 { 4.0 } else { 2.0 };
        (value, x.iter().map(|v| factor * v).collect())
    });
    let positions = Batch::from_flat(3, 2, vec![1.0, 2.0, 1.0, 2.0, -1.0, 0.5]).unwrap();

    let result =
        NumericalValidator::check_gradient(&objective, &positions, &GradientCheckConfig::default())
            .unwrap();

    assert!(!result.passed);
    assert!(result.element_errors[0] < 1e-6);
    assert!(result.element_errors[1] > 0.1);
    assert!(result.element_errors[2] < 1e-6);
}

#[test]
fn test_gradient_check_rejects_malformed_output() {
    let objective = FnObjective::new(|x: &Batch<f64>| {
        (DVector::<f64>::zeros(x.len()), Batch::<f64>::zeros(x.len(), 1))
    });
    let positions = Batch::zeros(2, 3);

    assert!(matches!(
        NumericalValidator::check_gradient(&objective, &positions, &GradientCheckConfig::default()),
        Err(OptimizerError::DimensionMismatch { .. })
    ));
}

#[test]
fn test_input_validation() {
    assert!(validate_initial_position(&Batch::<f64>::zeros(1, 1)).is_ok());
    assert!(validate_initial_position(&Batch::<f64>::zeros(0, 4)).is_err());

    let estimate = DVector::from_vec(vec![1.0, f64::INFINITY]);
    match validate_inverse_hessian(&estimate, 2) {
        Err(OptimizerError::InvalidConfiguration { parameter, .. }) => {
            assert_eq!(parameter, "initial_inverse_hessian_estimate");
        }
        other => panic!("unexpected result {other:?}"),
    }
}
