#![allow(non_snake_case)]

//! Estimation models.
//!
//! State representations are modeled as structs.
//! The estimation operations of the filter, prediction and observation, are defined as traits.

use nalgebra as na;
use na::storage::Storage;
use na::{allocator::Allocator, DefaultAllocator, Dim, MatrixN, RealField, VectorN, U1};

use crate::error::{Error, Result};
use crate::noise::CorrelatedNoise;

/// Kalman State.
///
/// Linear representation as a state vector and the state covariance (symmetric positive semi-definite) matrix.
#[derive(Debug, PartialEq, Clone)]
pub struct KalmanState<N: RealField, D: Dim>
where
    DefaultAllocator: Allocator<N, D, D> + Allocator<N, D>,
{
    /// State vector
    pub x: VectorN<N, D>,
    /// State covariance matrix (symmetric positive semi-definite)
    pub X: MatrixN<N, D>,
}

/// Box constraint on the state vector.
#[derive(Debug, PartialEq, Clone)]
pub struct StateBounds<N: RealField, D: Dim>
where
    DefaultAllocator: Allocator<N, D>,
{
    pub min: VectorN<N, D>,
    pub max: VectorN<N, D>,
}

/// A state estimator.
pub trait Estimator<N: RealField, D: Dim>
where
    DefaultAllocator: Allocator<N, D>,
{
    /// The estimator's estimate of the system's state.
    fn state(&self) -> VectorN<N, D>;
}

/// A Kalman filter (estimator).
///
/// The linear Kalman state representation x,X is used to represent the system.
pub trait KalmanEstimator<N: RealField, D: Dim>: Estimator<N, D>
where
    DefaultAllocator: Allocator<N, D, D> + Allocator<N, D>,
{
    /// Initialise the estimator with a KalmanState.
    fn init(&mut self, state: &KalmanState<N, D>) -> Result<()>;

    /// The estimator's estimate of the system's KalmanState.
    fn kalman_state(&self) -> KalmanState<N, D>;
}

/// A functional predictor.
///
/// Uses the estimator's (possibly non-linear) transition with additive noise.
pub trait ExtendedPredictor<N: RealField, D: Dim>
where
    DefaultAllocator: Allocator<N, D, D> + Allocator<N, D>,
{
    fn predict(&mut self, noise: &CorrelatedNoise<N, D>) -> Result<()>;
}

/// A functional observer with correlated observation noise.
///
/// The observation function may be undefined at some states, it then returns None.
pub trait ExtendedObserver<N: RealField, D: Dim, ZD: Dim>
where
    DefaultAllocator: Allocator<N, ZD, ZD> + Allocator<N, D> + Allocator<N, ZD>,
{
    fn observe<H>(&mut self, z: &VectorN<N, ZD>, h: H, noise: &CorrelatedNoise<N, ZD>) -> Result<()>
    where
        H: Fn(&VectorN<N, D>) -> Option<VectorN<N, ZD>>;
}

impl<N: RealField, D: Dim> KalmanState<N, D>
where
    DefaultAllocator: Allocator<N, D, D> + Allocator<N, D>,
{
    pub fn new_zero(d: D) -> KalmanState<N, D> {
        KalmanState {
            x: VectorN::zeros_generic(d, U1),
            X: MatrixN::zeros_generic(d, d),
        }
    }

    /// Checks dimensions agree and X is symmetric with a non negative diagonal.
    pub fn check(&self) -> Result<()> {
        let n = self.x.nrows();
        if self.X.nrows() != n || self.X.ncols() != n {
            return Err(Error::invalid_configuration(format!(
                "covariance {}x{} does not match state dimension {}",
                self.X.nrows(),
                self.X.ncols(),
                n
            )));
        }
        if self.x.iter().any(|xi| !xi.is_finite()) {
            return Err(Error::invalid_configuration("state not finite"));
        }
        for i in 0..n {
            if !(self.X[(i, i)] >= N::zero()) {
                return Err(Error::invalid_configuration(format!("covariance diagonal element {} negative", i)));
            }
            for j in 0..i {
                if self.X[(i, j)] != self.X[(j, i)] {
                    return Err(Error::invalid_configuration("covariance not symmetric"));
                }
            }
        }
        Ok(())
    }
}

impl<N: RealField, D: Dim> Estimator<N, D> for KalmanState<N, D>
where
    DefaultAllocator: Allocator<N, D, D> + Allocator<N, D>,
{
    fn state(&self) -> VectorN<N, D> {
        self.x.clone()
    }
}

impl<N: RealField, D: Dim> StateBounds<N, D>
where
    DefaultAllocator: Allocator<N, D>,
{
    pub fn new(min: VectorN<N, D>, max: VectorN<N, D>) -> Result<Self> {
        if min.nrows() != max.nrows() {
            return Err(Error::invalid_configuration("state bounds differ in dimension"));
        }
        for i in 0..min.nrows() {
            if !(min[i] < max[i]) {
                return Err(Error::invalid_configuration(format!("state bound {} empty", i)));
            }
        }
        Ok(StateBounds { min, max })
    }

    pub fn dim(&self) -> D {
        self.min.data.shape().0
    }

    pub fn contains(&self, x: &VectorN<N, D>) -> bool {
        (0..x.nrows()).all(|i| x[i] >= self.min[i] && x[i] <= self.max[i])
    }

    /// Clamps each element of x into [min, max].
    pub fn clamp(&self, x: &mut VectorN<N, D>) {
        for i in 0..x.nrows() {
            if x[i] < self.min[i] {
                x[i] = self.min[i];
            } else if x[i] > self.max[i] {
                x[i] = self.max[i];
            }
        }
    }
}
