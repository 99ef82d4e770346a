//! Test the numerical operations of the extended Kalman filter.
//!
//! Linear observation functions are used so the expected estimates are known in closed form.
//! Tests are performed with Dynamic matrices and matrices with fixed dimensions.

#![allow(non_snake_case)]

use na::allocator::Allocator;
use na::{DefaultAllocator, Dim, Dynamic, MatrixN, VectorN, U1, U2};
use nalgebra as na;

use queue_calibrate::estimators::extended::ExtendedKalmanFilter;
use queue_calibrate::estimators::jacobian::{numerical_jacobian, JacobianStep};
use queue_calibrate::models::{Estimator, ExtendedObserver, ExtendedPredictor, KalmanEstimator, KalmanState, StateBounds};
use queue_calibrate::noise::{CorrelatedNoise, UncorrelatedNoise};
use queue_calibrate::Error;

fn vector<D: Dim>(d: D, v: [f64; 2]) -> VectorN<f64, D>
where
    DefaultAllocator: Allocator<f64, D>,
{
    VectorN::from_iterator_generic(d, U1, v.iter().cloned())
}

fn matrix<D: Dim>(d: D, rows: [f64; 4]) -> MatrixN<f64, D>
where
    DefaultAllocator: Allocator<f64, D, D>,
{
    MatrixN::from_row_slice_generic(d, d, &rows)
}

fn noise<D: Dim>(d: D, q: [f64; 2]) -> CorrelatedNoise<f64, D>
where
    DefaultAllocator: Allocator<f64, D, D> + Allocator<f64, D>,
{
    CorrelatedNoise::from_uncorrelated(&UncorrelatedNoise { q: vector(d, q) })
}

fn new_filter<D: Dim>(d: D) -> ExtendedKalmanFilter<f64, D, D>
where
    DefaultAllocator: Allocator<f64, D, D> + Allocator<f64, D>,
{
    let state = KalmanState {
        x: vector(d, [1., 2.]),
        X: matrix(d, [1., 0., 0., 1.]),
    };
    ExtendedKalmanFilter::new(state).unwrap()
}

fn drift<D: Dim>(x: &VectorN<f64, D>) -> VectorN<f64, D>
where
    DefaultAllocator: Allocator<f64, D>,
{
    let mut y = x.clone();
    y[0] += 0.5 * x[1];
    y
}

#[test]
fn test_predict() {
    predict(U2);
    predict(Dynamic::new(2));
}

fn predict<D: Dim>(d: D)
where
    DefaultAllocator: Allocator<f64, D, D> + Allocator<f64, D>,
{
    // Identity transition
    let mut filter = new_filter(d);
    filter.predict(&noise(d, [0.1, 0.2])).unwrap();
    assert_eq!(filter.state(), vector(d, [1., 2.]));
    approx::assert_relative_eq!(filter.covariance()[(0, 0)], 1.1, max_relative = 1e-12);
    approx::assert_relative_eq!(filter.covariance()[(1, 1)], 1.2, max_relative = 1e-12);
    assert_eq!(filter.covariance()[(0, 1)], 0.);

    // Linear drift, X = F.X.F' + Q with F = [1 0.5; 0 1]
    let mut filter = new_filter(d).with_transition(drift::<D>);
    filter.predict(&noise(d, [0.1, 0.2])).unwrap();
    let x = filter.state();
    approx::assert_relative_eq!(x[0], 2., max_relative = 1e-12);
    approx::assert_relative_eq!(x[1], 2., max_relative = 1e-12);
    let X = filter.covariance();
    approx::assert_abs_diff_eq!(X[(0, 0)], 1.35, epsilon = 1e-9);
    approx::assert_abs_diff_eq!(X[(0, 1)], 0.5, epsilon = 1e-9);
    approx::assert_abs_diff_eq!(X[(1, 0)], 0.5, epsilon = 1e-9);
    approx::assert_abs_diff_eq!(X[(1, 1)], 1.2, epsilon = 1e-9);
}

#[test]
fn test_observe_linear() {
    observe_linear(U2);
    observe_linear(Dynamic::new(2));
}

fn observe_linear<D: Dim>(d: D)
where
    DefaultAllocator: Allocator<f64, D, D> + Allocator<f64, D>,
{
    let a = matrix(d, [2., 1., 0., 1.]);
    let h = |x: &VectorN<f64, D>| Some(&a * x);
    let z = vector(d, [10., 10.]);

    // Weak observation leaves the prediction in place
    let mut filter = new_filter(d);
    filter.predict(&noise(d, [0.1, 0.1])).unwrap();
    filter.observe(&z, h, &noise(d, [1e12, 1e12])).unwrap();
    let x = filter.state();
    approx::assert_abs_diff_eq!(x[0], 1., epsilon = 1e-8);
    approx::assert_abs_diff_eq!(x[1], 2., epsilon = 1e-8);
    let innovation = filter.innovation().unwrap();
    approx::assert_relative_eq!(innovation[0], 6., max_relative = 1e-12);
    approx::assert_relative_eq!(innovation[1], 8., max_relative = 1e-12);
    let prediction = filter.prediction().unwrap();
    approx::assert_relative_eq!(prediction[0], 4., max_relative = 1e-12);
    approx::assert_relative_eq!(prediction[1], 2., max_relative = 1e-12);

    // Precise observation of an invertible map is matched
    let mut filter = new_filter(d);
    filter.predict(&noise(d, [0.1, 0.1])).unwrap();
    filter.observe(&z, h, &noise(d, [1e-10, 1e-10])).unwrap();
    let ax = &a * filter.state();
    approx::assert_abs_diff_eq!(ax[0], 10., epsilon = 1e-6);
    approx::assert_abs_diff_eq!(ax[1], 10., epsilon = 1e-6);
    approx::assert_abs_diff_eq!(filter.state()[0], 0., epsilon = 1e-6);
    approx::assert_abs_diff_eq!(filter.state()[1], 10., epsilon = 1e-6);
}

#[test]
fn test_zero_innovation() {
    zero_innovation(U2);
    zero_innovation(Dynamic::new(2));
}

fn zero_innovation<D: Dim>(d: D)
where
    DefaultAllocator: Allocator<f64, D, D> + Allocator<f64, D>,
{
    let a = matrix(d, [2., 1., 0., 1.]);
    let h = |x: &VectorN<f64, D>| Some(&a * x);

    let mut filter = new_filter(d);
    filter.predict(&noise(d, [0.1, 0.1])).unwrap();
    let x_pred = filter.state();
    let z = &a * &x_pred;
    filter.observe(&z, h, &noise(d, [0.5, 0.5])).unwrap();

    assert_eq!(filter.state(), x_pred);
    let X = filter.covariance();
    assert!(X[(0, 0)] < 1.1);
    assert!(X[(1, 1)] < 1.1);
    assert_eq!(X[(0, 1)], X[(1, 0)]);
}

#[test]
fn test_bounds() {
    bounds(U2);
    bounds(Dynamic::new(2));
}

fn bounds<D: Dim>(d: D)
where
    DefaultAllocator: Allocator<f64, D, D> + Allocator<f64, D>,
{
    let h = |x: &VectorN<f64, D>| Some(x.clone());
    let z = vector(d, [100., -100.]);
    let r = noise(d, [1e-6, 1e-6]);

    let state_bounds = StateBounds::new(vector(d, [0., 0.]), vector(d, [1.5, 2.5])).unwrap();
    let mut bounded = new_filter(d).with_bounds(state_bounds).unwrap();
    bounded.observe(&z, h, &r).unwrap();
    assert_eq!(bounded.state(), vector(d, [1.5, 0.]));

    let mut unbounded = new_filter(d);
    unbounded.observe(&z, h, &r).unwrap();
    assert!(unbounded.state()[0] > 99.);
    assert!(unbounded.state()[1] < -99.);

    // Clamping leaves the covariance alone
    assert_eq!(bounded.covariance(), unbounded.covariance());

    assert!(StateBounds::new(vector(d, [1., 0.]), vector(d, [1., 1.])).is_err());
}

#[test]
fn test_singular_innovation() {
    singular_innovation(U2);
    singular_innovation(Dynamic::new(2));
}

fn singular_innovation<D: Dim>(d: D)
where
    DefaultAllocator: Allocator<f64, D, D> + Allocator<f64, D>,
{
    // Observation independent of the state with no observation noise
    let h = |_x: &VectorN<f64, D>| Some(vector(d, [3., 4.]));
    let r = CorrelatedNoise {
        Q: MatrixN::zeros_generic(d, d),
    };

    let mut filter = new_filter(d);
    let prior = filter.kalman_state();
    let result = filter.observe(&vector(d, [3., 5.]), h, &r);
    assert!(matches!(result, Err(Error::SingularCovariance(_))));
    assert_eq!(filter.kalman_state(), prior);
    assert!(filter.innovation().is_none());

    // Acceptable for the default condition limit, not for a strict one
    let a = matrix(d, [2., 1., 0., 1.]);
    let h = |x: &VectorN<f64, D>| Some(&a * x);
    let r = noise(d, [1e-10, 1e-10]);
    let mut filter = new_filter(d).with_min_rcond(0.5);
    let result = filter.observe(&vector(d, [10., 10.]), h, &r);
    assert!(matches!(result, Err(Error::SingularCovariance(_))));
    assert_eq!(filter.kalman_state(), prior);

    let mut filter = new_filter(d);
    assert!(filter.observe(&vector(d, [10., 10.]), h, &r).is_ok());
}

#[test]
fn test_observation_unavailable() {
    observation_unavailable(U2);
    observation_unavailable(Dynamic::new(2));
}

fn observation_unavailable<D: Dim>(d: D)
where
    DefaultAllocator: Allocator<f64, D, D> + Allocator<f64, D>,
{
    let r = noise(d, [1., 1.]);
    let z = vector(d, [1., 1.]);

    // Undefined at the state itself
    let mut filter = new_filter(d);
    let prior = filter.kalman_state();
    let result = filter.observe(&z, |_x: &VectorN<f64, D>| None, &r);
    assert!(matches!(result, Err(Error::ObservationUnavailable(_))));
    assert_eq!(filter.kalman_state(), prior);

    // Defined only at the state, no difference possible
    let result = filter.observe(
        &z,
        |x: &VectorN<f64, D>| if x[0] == 1. { Some(x.clone()) } else { None },
        &r,
    );
    assert!(matches!(result, Err(Error::ObservationUnavailable(_))));
    assert_eq!(filter.kalman_state(), prior);

    // Non finite prediction
    let result = filter.observe(&z, |_x: &VectorN<f64, D>| Some(vector(d, [f64::NAN, 1.])), &r);
    assert!(matches!(result, Err(Error::ObservationUnavailable(_))));
    assert_eq!(filter.kalman_state(), prior);
}

#[test]
fn test_one_sided_jacobian() {
    one_sided_jacobian(U2);
    one_sided_jacobian(Dynamic::new(2));
}

fn one_sided_jacobian<D: Dim>(d: D)
where
    DefaultAllocator: Allocator<f64, D, D> + Allocator<f64, D>,
{
    let a = matrix(d, [2., 1., 0., 1.]);
    // Undefined below x[0] = 1
    let h = |x: &VectorN<f64, D>| if x[0] >= 1. { Some(&a * x) } else { None };

    let x = vector(d, [1., 2.]);
    let hx = &a * &x;
    let H = numerical_jacobian(&h, &x, &hx, &JacobianStep::default()).unwrap();
    for i in 0..2 {
        for j in 0..2 {
            approx::assert_abs_diff_eq!(H[(i, j)], a[(i, j)], epsilon = 1e-9);
        }
    }

    let mut filter = new_filter(d);
    filter.observe(&vector(d, [10., 10.]), h, &noise(d, [1e-10, 1e-10])).unwrap();
    let ax = &a * filter.state();
    approx::assert_abs_diff_eq!(ax[0], 10., epsilon = 1e-6);
    approx::assert_abs_diff_eq!(ax[1], 10., epsilon = 1e-6);
}

fn reciprocal_exp(x: &VectorN<f64, U2>) -> Option<VectorN<f64, U2>> {
    Some(VectorN::<f64, U2>::new(1. / x[0], x[1].exp()))
}

/// Largest relative error of the numerical Jacobian of (1/x0, exp(x1)).
fn jacobian_error(x0: f64, x1: f64, step: &JacobianStep<f64>) -> f64 {
    let x = VectorN::<f64, U2>::new(x0, x1);
    let hx = reciprocal_exp(&x).unwrap();
    let H = numerical_jacobian(&reciprocal_exp, &x, &hx, step).unwrap();

    assert_eq!(H[(0, 1)], 0.);
    assert_eq!(H[(1, 0)], 0.);
    let d0 = -1. / (x0 * x0);
    let d1 = x1.exp();
    ((H[(0, 0)] - d0) / d0).abs().max(((H[(1, 1)] - d1) / d1).abs())
}

#[test]
fn test_jacobian_scales() {
    // Central differences of 1/x have relative error (eps/x)^2
    let step = JacobianStep::default();
    for &(x0, x1) in &[(1e3, 0.1), (1., 1.), (1e-2, 3.), (1e-3, 5.)] {
        let error = jacobian_error(x0, x1, &step);
        assert!(error < 1e-5, "x = [{}, {}], error {}", x0, x1, error);
    }

    // Below floor / relative the step no longer follows the scale of x
    let error = jacobian_error(1e-5, 1., &step);
    assert!(error > 1e-3, "error {}", error);

    let step = JacobianStep::new(1e-3, 1e-12).unwrap();
    for &x0 in &[1e-3, 1e-5, 2e-6, 1e-8] {
        let error = jacobian_error(x0, 1., &step);
        assert!(error < 1e-5, "x0 = {}, error {}", x0, error);
    }
}

#[test]
fn test_jacobian_step() {
    let step = JacobianStep::new(1e-4, 1e-8).unwrap();
    assert_eq!(step.step(2.), 2e-4);
    assert_eq!(step.step(-2.), 2e-4);
    assert_eq!(step.step(0.), 1e-8);
    assert!(JacobianStep::new(0., 1e-8).is_err());
    assert!(JacobianStep::new(1e-3, 0.).is_err());
}

#[test]
fn test_init() {
    let d = Dynamic::new(2);
    let mut filter = new_filter(d);
    filter
        .observe(&vector(d, [1., 1.]), |x: &VectorN<f64, Dynamic>| Some(x.clone()), &noise(d, [1., 1.]))
        .unwrap();
    assert!(filter.innovation().is_some());

    let state = KalmanState {
        x: vector(d, [5., 6.]),
        X: matrix(d, [2., 0.5, 0.5, 2.]),
    };
    filter.init(&state).unwrap();
    assert_eq!(filter.kalman_state(), state);
    assert!(filter.innovation().is_none());

    // Not symmetric
    let asymmetric = KalmanState {
        x: vector(d, [5., 6.]),
        X: matrix(d, [2., 0.5, 0.4, 2.]),
    };
    assert!(matches!(filter.init(&asymmetric), Err(Error::InvalidConfiguration(_))));
    assert_eq!(filter.kalman_state(), state);

    // Dimension changed
    let bigger = KalmanState::new_zero(Dynamic::new(3));
    assert!(matches!(filter.init(&bigger), Err(Error::InvalidConfiguration(_))));
}

#[test]
fn test_noise_dimensions() {
    let d = Dynamic::new(2);
    let mut filter = new_filter(d);
    let prior = filter.kalman_state();

    let q3 = CorrelatedNoise {
        Q: MatrixN::<f64, Dynamic>::identity(3, 3),
    };
    assert!(matches!(filter.predict(&q3), Err(Error::InvalidConfiguration(_))));
    let result = filter.observe(&vector(d, [1., 1.]), |x: &VectorN<f64, Dynamic>| Some(x.clone()), &q3);
    assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    assert_eq!(filter.kalman_state(), prior);
}
