//! Calibration engine.
//!
//! A [`Tuner`] owns one extended Kalman filter, its noise configuration and the queueing model used
//! as observation function. Each call to [`Tuner::run`] takes a fresh [`Environment`], predicts,
//! then corrects the estimate with the environment's observations.
//!
//! The environment is held by the tuner itself and handed to the observation function per cycle,
//! so independent tuners share nothing and may run on separate threads.

use std::fmt;

use nalgebra::{DMatrix, DVector, Dynamic};
use tracing::{debug, info, trace, warn};

use crate::config::ConfigData;
use crate::configurator::Configurator;
use crate::display::{mat_string, vec_string};
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::estimators::extended::ExtendedKalmanFilter;
use crate::models::{Estimator, ExtendedObserver, ExtendedPredictor, KalmanEstimator, KalmanState};
use crate::observation::QueueModel;

pub struct Tuner {
    configurator: Configurator,
    model: QueueModel,
    filter: ExtendedKalmanFilter<f64, Dynamic, Dynamic>,
    env: Option<Environment>,
}

impl Tuner {
    pub fn new(configurator: Configurator, model: QueueModel) -> Result<Self> {
        if configurator.num_states() != model.state_dim() {
            return Err(Error::invalid_configuration(format!(
                "{} model has {} states, configuration has {}",
                model.kind(),
                model.state_dim(),
                configurator.num_states()
            )));
        }
        if configurator.num_observations() != model.observation_dim() {
            return Err(Error::invalid_configuration(format!(
                "{} model has {} observations, configuration has {}",
                model.kind(),
                model.observation_dim(),
                configurator.num_observations()
            )));
        }

        let state = KalmanState {
            x: configurator.x0().clone(),
            X: configurator.p0().clone(),
        };
        let mut filter = ExtendedKalmanFilter::new(state)?.with_jacobian_step(configurator.jacobian_step());
        if let Some(bounds) = configurator.bounds() {
            filter = filter.with_bounds(bounds.clone())?;
        }

        info!(
            model = %model.kind(),
            states = configurator.num_states(),
            bounded = configurator.bounds().is_some(),
            adaptive = configurator.is_adaptive(),
            "tuner created"
        );
        Ok(Tuner {
            configurator,
            model,
            filter,
            env: None,
        })
    }

    pub fn from_config_data(config: &ConfigData, model: QueueModel) -> Result<Self> {
        Tuner::new(Configurator::from_config_data(config)?, model)
    }

    /// One predict and update cycle with the environment's observations.
    ///
    /// On failure the estimate from before the cycle is kept and the error returned.
    pub fn run(&mut self, env: Environment) -> Result<()> {
        let prior = self.filter.kalman_state();
        let result = self.cycle(&env);
        self.env = Some(env);

        match result {
            Ok(()) => {
                let x = self.filter.state();
                debug!(
                    x = ?x.as_slice(),
                    innovation = ?self.filter.innovation().map(|s| s.as_slice()),
                    "tuner cycle complete"
                );
                Ok(())
            }
            Err(e) => {
                self.filter.restore(prior);
                warn!(error = %e, "tuner cycle skipped");
                Err(e)
            }
        }
    }

    fn cycle(&mut self, env: &Environment) -> Result<()> {
        let noise = self.configurator.process_noise(&self.filter.state());
        self.filter.predict(&noise)?;

        let z = env.observations();
        let model = &self.model;
        let h = |x: &DVector<f64>| match model.observe(x, env) {
            Ok(hx) => Some(hx),
            Err(e) => {
                trace!(error = %e, "observation function undefined");
                None
            }
        };
        self.filter.observe(&z, h, self.configurator.r())
    }

    /// Current state estimate.
    pub fn x(&self) -> DVector<f64> {
        self.filter.state()
    }

    /// Model parameters, the current state estimate.
    pub fn params(&self) -> DVector<f64> {
        self.x()
    }

    /// Innovation of the last successful cycle.
    pub fn innovation(&self) -> Option<&DVector<f64>> {
        self.filter.innovation()
    }

    /// Observation predicted in the last successful cycle.
    pub fn predicted_observation(&self) -> Option<&DVector<f64>> {
        self.filter.prediction()
    }

    /// State covariance.
    pub fn p(&self) -> &DMatrix<f64> {
        self.filter.covariance()
    }

    /// Environment of the last cycle.
    pub fn environment(&self) -> Option<&Environment> {
        self.env.as_ref()
    }

    pub fn model(&self) -> &QueueModel {
        &self.model
    }

    pub fn configurator(&self) -> &Configurator {
        &self.configurator
    }
}

impl fmt::Display for Tuner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tuner: ")?;
        writeln!(f, "{}", self.model)?;
        writeln!(f, "{}", self.configurator)?;
        writeln!(f, "{}", vec_string("X", &self.x()))?;
        writeln!(f, "{}", mat_string("P", self.p()))?;
        if let Some(innovation) = self.innovation() {
            writeln!(f, "{}", vec_string("Delta", innovation))?;
        }
        if let Some(env) = &self.env {
            writeln!(f, "{}", env)?;
        }
        Ok(())
    }
}
