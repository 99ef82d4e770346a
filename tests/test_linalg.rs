//! Test the UdU' factorisation and positive definite inversion used for the innovation covariance.

use na::{Matrix2, Matrix3, DMatrix};
use nalgebra as na;

use queue_calibrate::linalg::cholesky::{inverse_pd, UdUfactor};
use queue_calibrate::linalg::rcond::rcond_symmetric;

#[test]
fn test_udu_factor() {
    let mut m = Matrix2::new(4., 2., 2., 3.);
    let rcond = UdUfactor(&mut m);

    approx::assert_relative_eq!(m[(1, 1)], 3., max_relative = 1e-12);
    approx::assert_relative_eq!(m[(0, 1)], 2. / 3., max_relative = 1e-12);
    approx::assert_relative_eq!(m[(0, 0)], 8. / 3., max_relative = 1e-12);
    approx::assert_relative_eq!(rcond, 8. / 9., max_relative = 1e-12);
}

#[test]
fn test_inverse_pd() {
    let mut m = Matrix2::new(4., 2., 2., 3.);
    let rcond = inverse_pd(&mut m);
    assert!(rcond > 0.);

    approx::assert_relative_eq!(m[(0, 0)], 0.375, max_relative = 1e-12);
    approx::assert_relative_eq!(m[(0, 1)], -0.25, max_relative = 1e-12);
    approx::assert_relative_eq!(m[(1, 0)], -0.25, max_relative = 1e-12);
    approx::assert_relative_eq!(m[(1, 1)], 0.5, max_relative = 1e-12);

    let a = Matrix3::new(4., 2., 1., 2., 3., 0.5, 1., 0.5, 2.);
    let mut ai = a;
    assert!(inverse_pd(&mut ai) > 0.);
    let identity = a * ai;
    for i in 0..3 {
        for j in 0..3 {
            let expect = if i == j { 1. } else { 0. };
            approx::assert_abs_diff_eq!(identity[(i, j)], expect, epsilon = 1e-12);
        }
    }
}

#[test]
fn test_inverse_dynamic() {
    let a = DMatrix::from_row_slice(3, 3, &[4., 2., 1., 2., 3., 0.5, 1., 0.5, 2.]);
    let mut ai = a.clone();
    assert!(inverse_pd(&mut ai) > 0.);

    approx::assert_relative_eq!(ai[(0, 0)], 5.75 / 14., max_relative = 1e-12);
    approx::assert_relative_eq!(ai[(0, 1)], -0.25, max_relative = 1e-12);
    approx::assert_abs_diff_eq!(ai[(1, 2)], 0., epsilon = 1e-12);
    approx::assert_relative_eq!(ai[(2, 2)], 8. / 14., max_relative = 1e-12);
}

#[test]
fn test_not_positive_definite() {
    // Negative diagonal
    let mut m = Matrix2::new(-1., 0., 0., 1.);
    assert!(inverse_pd(&mut m) < 0.);

    // Zero, semi-definite
    let mut m = Matrix2::<f64>::zeros();
    assert_eq!(inverse_pd(&mut m), 0.);

    // Indefinite, definiteness lost in elimination
    let mut m = Matrix2::new(1., 2., 2., 1.);
    assert!(inverse_pd(&mut m) < 0.);

    // NaN
    let mut m = Matrix2::new(f64::NAN, 0., 0., 1.);
    assert!(inverse_pd(&mut m) < 0.);
}

#[test]
fn test_rcond_symmetric() {
    assert_eq!(rcond_symmetric(&Matrix2::new(2., 0., 0., 8.)), 0.25);
    assert_eq!(rcond_symmetric(&Matrix2::new(0., 0., 0., 0.)), 0.);
    assert!(rcond_symmetric(&Matrix2::new(-2., 0., 0., 8.)) < 0.);
    assert_eq!(rcond_symmetric(&DMatrix::<f64>::zeros(0, 0)), 0.);
}
