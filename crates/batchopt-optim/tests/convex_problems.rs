//! Default-configuration runs on larger convex problems: separable and
//! rotated quadratics, and a maximum likelihood fit.

use batchopt_core::{test_utils::QuadraticBowl, DMatrix, DVector, Pointwise};
use batchopt_optim::{ElementStatus, Lbfgs, LbfgsConfig};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Geometric, StandardNormal, Uniform};

fn normal_vector(rng: &mut StdRng, dim: usize) -> DVector<f64> {
    DVector::from_fn(dim, |_, _| rng.sample(StandardNormal))
}

/// Curvatures spread log-uniformly over `[e⁻², e²]`.
fn log_uniform_scales(rng: &mut StdRng, dim: usize) -> DVector<f64> {
    let exponent = Uniform::new(-2.0_f64, 2.0);
    DVector::from_fn(dim, |_, _| rng.sample(exponent).exp())
}

fn random_rotation(rng: &mut StdRng, dim: usize) -> DMatrix<f64> {
    DMatrix::<f64>::from_fn(dim, dim, |_, _| rng.sample(StandardNormal))
        .qr()
        .q()
}

/// `½ (x − m)ᵀ A (x − m)`.
fn quadratic_form(
    minimum: DVector<f64>,
    hessian: DMatrix<f64>,
) -> Pointwise<impl Fn(usize, &[f64]) -> (f64, Vec<f64>) + Send + Sync> {
    Pointwise::new(move |_: usize, x: &[f64]| {
        let y = DVector::from_column_slice(x) - &minimum;
        let gradient = &hessian * &y;
        (0.5 * y.dot(&gradient), gradient.as_slice().to_vec())
    })
}

fn rotated_hessian(rng: &mut StdRng, principal_values: &DVector<f64>) -> DMatrix<f64> {
    let rotation = random_rotation(rng, principal_values.len());
    rotation.transpose() * DMatrix::from_diagonal(principal_values) * &rotation
}

fn assert_solved<O>(objective: &O, start: &DVector<f64>, minimum: &DVector<f64>)
where
    O: batchopt_core::BatchObjective<f64>,
{
    let lbfgs = Lbfgs::new(LbfgsConfig::new().with_tolerance(1e-8));
    let result = lbfgs.minimize_single(objective, start).unwrap();

    assert_eq!(result.status, vec![ElementStatus::Converged]);
    assert!(result.gradient_norm_of(0) <= 1e-8);
    for (x, m) in result.position.row(0).iter().zip(minimum.iter()) {
        assert!((x - m).abs() < 1e-5, "{x} vs {m}");
    }
}

#[test]
fn test_quadratic_bowl_40d() {
    let mut rng = StdRng::seed_from_u64(14159);
    let minimum = normal_vector(&mut rng, 40);
    let scales = log_uniform_scales(&mut rng, 40);

    let bowl = QuadraticBowl::new(minimum.clone(), scales);
    assert_solved(&bowl, &DVector::from_element(40, 1.0), &minimum);
}

#[test]
fn test_rotated_quadratic_50d() {
    let mut rng = StdRng::seed_from_u64(26535);
    let minimum = normal_vector(&mut rng, 50);
    let principal_values = log_uniform_scales(&mut rng, 50);
    let hessian = rotated_hessian(&mut rng, &principal_values);

    let objective = quadratic_form(minimum.clone(), hessian);
    assert_solved(&objective, &DVector::from_element(50, 1.0), &minimum);
}

#[test]
fn test_strongly_skewed_quadratic() {
    let mut rng = StdRng::seed_from_u64(89793);
    let minimum = normal_vector(&mut rng, 3);
    let principal_values = DVector::from_vec(vec![0.1, 2.0, 50.0]);
    let hessian = rotated_hessian(&mut rng, &principal_values);

    let objective = quadratic_form(minimum.clone(), hessian);
    assert_solved(&objective, &DVector::from_element(3, 1.0), &minimum);
}

/// `log(1 + eˡ)` without overflow.
fn softplus(l: f64) -> f64 {
    l.max(0.0) + (-l.abs()).exp().ln_1p()
}

fn sigmoid(l: f64) -> f64 {
    if l >= 0.0 {
        1.0 / (1.0 + (-l).exp())
    } else {
        let e = l.exp();
        e / (1.0 + e)
    }
}

#[test]
fn test_geometric_regression_fit() {
    // Negative log-likelihood of a geometric GLM with a Gaussian prior:
    // Σᵢ yᵢ softplus(lᵢ) − Σᵢ lᵢ + ½ ‖w‖², lᵢ = Σⱼ wⱼ xⱼᵢ.
    let (n, dim) = (100, 30);
    let mut rng = StdRng::seed_from_u64(234095);
    let features: Vec<Vec<f64>> = (0..n)
        .map(|_| (0..dim).map(|_| if rng.gen_bool(0.5) { 1.0 } else { 0.0 }).collect())
        .collect();
    let counts: Vec<f64> = features
        .iter()
        .map(|row| {
            let s = 0.01 * row.iter().sum::<f64>();
            let p = 1.0 / (1.0 + (-s).exp());
            // Number of trials up to and including the first success.
            Geometric::new(p).unwrap().sample(&mut rng) as f64 + 1.0
        })
        .collect();

    let objective = Pointwise::new(move |_: usize, w: &[f64]| {
        let mut value = 0.5 * w.iter().map(|v| v * v).sum::<f64>();
        let mut gradient = w.to_vec();
        for (row, &y) in features.iter().zip(&counts) {
            let l: f64 = row.iter().zip(w).map(|(x, w)| x * w).sum();
            value += y * softplus(l) - l;
            let weight = y * sigmoid(l) - 1.0;
            for (g, x) in gradient.iter_mut().zip(row) {
                *g += weight * x;
            }
        }
        (value, gradient)
    });

    let lbfgs = Lbfgs::<f64>::new(LbfgsConfig::new().with_tolerance(1e-6));
    let result = lbfgs
        .minimize_single(&objective, &DVector::from_element(dim, 1.0))
        .unwrap();

    assert_eq!(result.status, vec![ElementStatus::Converged]);
    assert!(result.gradient_norm_of(0) <= 1e-6);
    assert!(result.objective_value[0].is_finite());
}
