#![allow(non_snake_case)]

//! Extended Kalman filter.
//!
//! A discrete Bayesian estimator that uses the [`KalmanState`] linear representation of the system.
//! Non-linear prediction and observation functions are linearised about the predicted state, with
//! Jacobians computed by finite differences.
//!
//! Prediction uses the identity transition unless a custom transition function is set.
//! Observation computes the innovation covariance S = Hx.X.Hx' + R and inverts it through a UdU'
//! factorisation whose reciprocal condition number guards against singular S.
//!
//! Failures never modify the filter: the estimate from before the failed operation is kept.
//!
//! [`KalmanState`]: ../../models/struct.KalmanState.html

use nalgebra as na;
use na::storage::Storage;
use na::{allocator::Allocator, DefaultAllocator, Dim, MatrixN, RealField, VectorN};
use tracing::trace;

use crate::error::{Error, Result};
use crate::estimators::jacobian::{numerical_jacobian, JacobianStep};
use crate::linalg::cholesky;
use crate::models::{Estimator, ExtendedObserver, ExtendedPredictor, KalmanEstimator, KalmanState, StateBounds};
use crate::noise::CorrelatedNoise;

/// State transition function.
pub type TransitionFn<N, D> = fn(&VectorN<N, D>) -> VectorN<N, D>;

/// Extended Kalman filter over a state of dimension D observed with dimension ZD.
#[derive(Clone)]
pub struct ExtendedKalmanFilter<N: RealField, D: Dim, ZD: Dim>
where
    DefaultAllocator: Allocator<N, D, D> + Allocator<N, D> + Allocator<N, ZD>,
{
    state: KalmanState<N, D>,
    bounds: Option<StateBounds<N, D>>,
    transition: Option<TransitionFn<N, D>>,
    step: JacobianStep<N>,
    min_rcond: N,
    innovation: Option<VectorN<N, ZD>>,
    prediction: Option<VectorN<N, ZD>>,
}

impl<N: RealField, D: Dim, ZD: Dim> ExtendedKalmanFilter<N, D, ZD>
where
    DefaultAllocator: Allocator<N, D, D> + Allocator<N, D> + Allocator<N, ZD>,
{
    pub fn new(state: KalmanState<N, D>) -> Result<Self> {
        state.check()?;
        Ok(ExtendedKalmanFilter {
            state,
            bounds: None,
            transition: None,
            step: JacobianStep::default(),
            min_rcond: N::default_epsilon(),
            innovation: None,
            prediction: None,
        })
    }

    /// Limit the state to bounds after each observation.
    pub fn with_bounds(mut self, bounds: StateBounds<N, D>) -> Result<Self> {
        if bounds.min.nrows() != self.state.x.nrows() {
            return Err(Error::invalid_configuration(format!(
                "bounds dimension {} does not match state dimension {}",
                bounds.min.nrows(),
                self.state.x.nrows()
            )));
        }
        self.bounds = Some(bounds);
        Ok(self)
    }

    /// Predict with x = f(x) instead of the identity.
    pub fn with_transition(mut self, f: TransitionFn<N, D>) -> Self {
        self.transition = Some(f);
        self
    }

    pub fn with_jacobian_step(mut self, step: JacobianStep<N>) -> Self {
        self.step = step;
        self
    }

    /// Smallest acceptable reciprocal condition number of the innovation covariance.
    pub fn with_min_rcond(mut self, min_rcond: N) -> Self {
        self.min_rcond = min_rcond;
        self
    }

    pub fn bounds(&self) -> Option<&StateBounds<N, D>> {
        self.bounds.as_ref()
    }

    pub fn jacobian_step(&self) -> &JacobianStep<N> {
        &self.step
    }

    /// Innovation z - h(x) of the last successful observation.
    pub fn innovation(&self) -> Option<&VectorN<N, ZD>> {
        self.innovation.as_ref()
    }

    /// Predicted observation h(x) of the last successful observation.
    pub fn prediction(&self) -> Option<&VectorN<N, ZD>> {
        self.prediction.as_ref()
    }

    /// State covariance.
    pub fn covariance(&self) -> &MatrixN<N, D> {
        &self.state.X
    }

    /// Replace the Kalman state without checks, used to roll back an aborted cycle.
    pub(crate) fn restore(&mut self, state: KalmanState<N, D>) {
        self.state = state;
    }
}

impl<N: RealField, D: Dim, ZD: Dim> Estimator<N, D> for ExtendedKalmanFilter<N, D, ZD>
where
    DefaultAllocator: Allocator<N, D, D> + Allocator<N, D> + Allocator<N, ZD>,
{
    fn state(&self) -> VectorN<N, D> {
        self.state.x.clone()
    }
}

impl<N: RealField, D: Dim, ZD: Dim> KalmanEstimator<N, D> for ExtendedKalmanFilter<N, D, ZD>
where
    DefaultAllocator: Allocator<N, D, D> + Allocator<N, D> + Allocator<N, ZD>,
{
    fn init(&mut self, state: &KalmanState<N, D>) -> Result<()> {
        if state.x.nrows() != self.state.x.nrows() {
            return Err(Error::invalid_configuration("state dimension changed"));
        }
        state.check()?;
        self.state = state.clone();
        self.innovation = None;
        self.prediction = None;
        Ok(())
    }

    fn kalman_state(&self) -> KalmanState<N, D> {
        self.state.clone()
    }
}

impl<N: RealField, D: Dim, ZD: Dim> ExtendedPredictor<N, D> for ExtendedKalmanFilter<N, D, ZD>
where
    DefaultAllocator: Allocator<N, D, D> + Allocator<N, D> + Allocator<N, ZD>,
{
    fn predict(&mut self, noise: &CorrelatedNoise<N, D>) -> Result<()> {
        let n = self.state.x.nrows();
        if noise.Q.nrows() != n || noise.Q.ncols() != n {
            return Err(Error::invalid_configuration(format!(
                "process noise {}x{} does not match state dimension {}",
                noise.Q.nrows(),
                noise.Q.ncols(),
                n
            )));
        }

        let mut X = self.state.X.clone();
        let x_pred = match self.transition {
            None => self.state.x.clone(),
            Some(f) => {
                let x_pred = f(&self.state.x);
                let Fx = numerical_jacobian(&|x: &VectorN<N, D>| Some(f(x)), &self.state.x, &x_pred, &self.step)?;
                // X = Fx.X.Fx'
                X.quadform_tr(N::one(), &Fx, &self.state.X, N::zero());
                x_pred
            }
        };
        // + Q
        X += &noise.Q;

        self.state.x = x_pred;
        self.state.X = X;
        Ok(())
    }
}

impl<N: RealField, D: Dim, ZD: Dim> ExtendedObserver<N, D, ZD> for ExtendedKalmanFilter<N, D, ZD>
where
    DefaultAllocator: Allocator<N, D, D>
        + Allocator<N, ZD, ZD>
        + Allocator<N, ZD, D>
        + Allocator<N, D, ZD>
        + Allocator<N, D>
        + Allocator<N, ZD>,
{
    fn observe<H>(&mut self, z: &VectorN<N, ZD>, h: H, noise: &CorrelatedNoise<N, ZD>) -> Result<()>
    where
        H: Fn(&VectorN<N, D>) -> Option<VectorN<N, ZD>>,
    {
        let m = z.nrows();
        if noise.Q.nrows() != m || noise.Q.ncols() != m {
            return Err(Error::invalid_configuration(format!(
                "observation noise {}x{} does not match observation dimension {}",
                noise.Q.nrows(),
                noise.Q.ncols(),
                m
            )));
        }

        let x = &self.state.x;
        let hx = h(x).ok_or_else(|| Error::observation_unavailable("observation undefined at predicted state"))?;
        if hx.nrows() != m {
            return Err(Error::invalid_configuration(format!(
                "observation function gives {} values, {} observed",
                hx.nrows(),
                m
            )));
        }
        if hx.iter().any(|v| !v.is_finite()) {
            return Err(Error::observation_unavailable("predicted observation not finite"));
        }

        let Hx = numerical_jacobian(&h, x, &hx, &self.step)?;

        // Innovation
        let s = z - &hx;

        let XHt = &self.state.X * Hx.transpose();
        // S = Hx.X.Hx' + R
        let S = &Hx * &XHt + &noise.Q;

        // Inverse innovation covariance
        let mut SI = S;
        let rcond = cholesky::inverse_pd(&mut SI);
        trace!(rcond = ?rcond, "innovation covariance conditioning");
        if !(rcond > N::zero()) || rcond < self.min_rcond {
            return Err(Error::SingularCovariance(format!("reciprocal condition number {:?}", rcond)));
        }

        // Kalman gain, X*Hx'*SI
        let W = &XHt * SI;

        // State update
        let mut x = &self.state.x + &W * &s;
        // X = (I - W.Hx).X, symmetrised against rounding drift
        let d = self.state.x.data.shape().0;
        let X = (MatrixN::identity_generic(d, d) - &W * &Hx) * &self.state.X;
        let half: N = na::convert(0.5);
        let X = (&X + X.transpose()) * half;

        if let Some(bounds) = &self.bounds {
            bounds.clamp(&mut x);
        }

        self.state.x = x;
        self.state.X = X;
        self.innovation = Some(s);
        self.prediction = Some(hx);
        Ok(())
    }
}
