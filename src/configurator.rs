//! Concrete filter configuration.
//!
//! A [`Configurator`] holds the matrices a tuner is built from: initial state and covariance,
//! process and measurement noise, optional bounds and the Jacobian step. It is either given the
//! matrices directly or derives them from [`ConfigData`] through the noise mapping below.
//!
//! Process noise, per state element, for a predicted percent change c between cycles:
//! ```text
//! q_i = (c/100 · |x_i|)²
//! ```
//! Measurement noise, per observation with expected level e_j, where the error level ε is the
//! relative half width of a confidence interval whose tail value is t, scaled by the gamma factor g:
//! ```text
//! r_j = g · (ε · e_j / t)²
//! ```
//! The initial covariance is the process noise at the initial state.

use std::fmt;

use nalgebra::{DMatrix, DVector, Dynamic};

use crate::config::ConfigData;
use crate::display::{mat_string, vec_string};
use crate::error::{Error, Result};
use crate::estimators::jacobian::JacobianStep;
use crate::models::StateBounds;
use crate::noise::{CorrelatedNoise, UncorrelatedNoise};

/// Process noise floor, so that a parameter at zero may still move.
pub const MIN_PROCESS_VARIANCE: f64 = 1e-9;

/// Process noise variances for a percent change of the state x.
pub fn process_variance(x: &DVector<f64>, percent_change: f64) -> DVector<f64> {
    x.map(|xi| (percent_change / 100. * xi.abs()).powi(2).max(MIN_PROCESS_VARIANCE))
}

/// Measurement noise variances for expected observation levels.
pub fn measurement_variance(
    expected: &DVector<f64>,
    gamma_factor: f64,
    error_level: f64,
    student_percentile: f64,
) -> DVector<f64> {
    expected.map(|e| gamma_factor * (error_level * e / student_percentile).powi(2))
}

fn diagonal(variance: DVector<f64>) -> CorrelatedNoise<f64, Dynamic> {
    CorrelatedNoise::from_uncorrelated(&UncorrelatedNoise { q: variance })
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if value > 0. && value.is_finite() {
        Ok(())
    } else {
        Err(Error::invalid_configuration(format!("{} must be positive, got {}", name, value)))
    }
}

#[derive(Debug, Clone)]
pub struct Configurator {
    x0: DVector<f64>,
    p0: DMatrix<f64>,
    q: CorrelatedNoise<f64, Dynamic>,
    r: CorrelatedNoise<f64, Dynamic>,
    bounds: Option<StateBounds<f64, Dynamic>>,
    step: JacobianStep<f64>,
    /// Percent change used to recompute Q from the current state
    adaptive_percent_change: Option<f64>,
}

impl Configurator {
    /// Configuration from explicit matrices.
    pub fn new(x0: DVector<f64>, p0: DMatrix<f64>, q: DMatrix<f64>, r: DMatrix<f64>) -> Result<Self> {
        let n = x0.len();
        if n == 0 {
            return Err(Error::invalid_configuration("empty initial state"));
        }
        if x0.iter().any(|x| !x.is_finite()) {
            return Err(Error::invalid_configuration("initial state not finite"));
        }
        if p0.shape() != (n, n) {
            return Err(Error::invalid_configuration(format!(
                "initial covariance {:?} does not match state dimension {}",
                p0.shape(),
                n
            )));
        }
        if q.shape() != (n, n) {
            return Err(Error::invalid_configuration(format!(
                "process noise {:?} does not match state dimension {}",
                q.shape(),
                n
            )));
        }

        let q = CorrelatedNoise { Q: q };
        q.check_psd("process noise")?;
        let r = CorrelatedNoise { Q: r };
        r.check_pd("measurement noise")?;

        Ok(Configurator {
            x0,
            p0,
            q,
            r,
            bounds: None,
            step: JacobianStep::default(),
            adaptive_percent_change: None,
        })
    }

    /// Limit the state to [min, max], the initial state must lie within.
    pub fn with_bounds(mut self, min: DVector<f64>, max: DVector<f64>) -> Result<Self> {
        if min.len() != self.x0.len() || max.len() != self.x0.len() {
            return Err(Error::invalid_configuration(format!(
                "bounds of dimension {} and {} for state dimension {}",
                min.len(),
                max.len(),
                self.x0.len()
            )));
        }
        let bounds = StateBounds::new(min, max)?;
        if !bounds.contains(&self.x0) {
            return Err(Error::invalid_configuration("initial state outside bounds"));
        }
        self.bounds = Some(bounds);
        Ok(self)
    }

    /// Relative finite difference step, in (0, 1). The absolute floor is kept.
    pub fn with_step_size(self, step_size: f64) -> Result<Self> {
        let floor = self.step.absolute_floor;
        self.with_jacobian_step(step_size, floor)
    }

    /// Relative finite difference step, in (0, 1), and its absolute floor.
    ///
    /// State elements smaller than `absolute_floor / relative` in magnitude are differenced with the
    /// floor, so the floor should lie well below the smallest parameter scale.
    pub fn with_jacobian_step(mut self, relative: f64, absolute_floor: f64) -> Result<Self> {
        if !(relative > 0. && relative < 1.) {
            return Err(Error::invalid_configuration(format!("step size {} not in (0, 1)", relative)));
        }
        check_positive("min step size", absolute_floor)?;
        self.step = JacobianStep::new(relative, absolute_floor)?;
        Ok(self)
    }

    /// Recompute process noise from the current state with the given percent change.
    pub fn with_adaptive_noise(mut self, percent_change: f64) -> Result<Self> {
        check_positive("percent change", percent_change)?;
        self.adaptive_percent_change = Some(percent_change);
        Ok(self)
    }

    /// Configuration derived from tuner configuration data.
    pub fn from_config_data(config: &ConfigData) -> Result<Self> {
        let filter = &config.filter_data;
        let model = &config.model_data;

        check_positive("gamma factor", filter.gamma_factor)?;
        check_positive("error level", filter.error_level)?;
        check_positive("student percentile", filter.student_percentile)?;
        check_positive("percent change", filter.percent_change)?;

        let x0 = DVector::from_vec(model.init_state.clone());
        let expected = DVector::from_vec(model.expected_observations.clone());
        if expected.len() == 0 || expected.iter().any(|e| !(*e > 0.) || !e.is_finite()) {
            return Err(Error::invalid_configuration("expected observations must be positive"));
        }

        let q = DMatrix::from_diagonal(&process_variance(&x0, filter.percent_change));
        let r = DMatrix::from_diagonal(&measurement_variance(
            &expected,
            filter.gamma_factor,
            filter.error_level,
            filter.student_percentile,
        ));
        let p0 = q.clone();

        let mut configurator = Configurator::new(x0, p0, q, r)?.with_jacobian_step(filter.step_size, filter.min_step_size)?;
        if model.bounded_state {
            configurator = configurator.with_bounds(
                DVector::from_vec(model.min_state.clone()),
                DVector::from_vec(model.max_state.clone()),
            )?;
        }
        if filter.adaptive_noise {
            configurator = configurator.with_adaptive_noise(filter.percent_change)?;
        }
        Ok(configurator)
    }

    pub fn num_states(&self) -> usize {
        self.x0.len()
    }

    pub fn num_observations(&self) -> usize {
        self.r.dim()
    }

    pub fn x0(&self) -> &DVector<f64> {
        &self.x0
    }

    pub fn p0(&self) -> &DMatrix<f64> {
        &self.p0
    }

    pub fn q(&self) -> &CorrelatedNoise<f64, Dynamic> {
        &self.q
    }

    pub fn r(&self) -> &CorrelatedNoise<f64, Dynamic> {
        &self.r
    }

    pub fn bounds(&self) -> Option<&StateBounds<f64, Dynamic>> {
        self.bounds.as_ref()
    }

    pub fn jacobian_step(&self) -> JacobianStep<f64> {
        self.step
    }

    pub fn is_adaptive(&self) -> bool {
        self.adaptive_percent_change.is_some()
    }

    /// Process noise for a prediction from state x.
    pub fn process_noise(&self, x: &DVector<f64>) -> CorrelatedNoise<f64, Dynamic> {
        match self.adaptive_percent_change {
            Some(percent_change) => diagonal(process_variance(x, percent_change)),
            None => self.q.clone(),
        }
    }
}

impl fmt::Display for Configurator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Configurator: nX={}; nZ={}", self.num_states(), self.num_observations())?;
        writeln!(f, "{}", vec_string("X0", &self.x0))?;
        writeln!(f, "{}", mat_string("P0", &self.p0))?;
        writeln!(f, "{}", mat_string("Q", &self.q.Q))?;
        writeln!(f, "{}", mat_string("R", &self.r.Q))?;
        if let Some(bounds) = &self.bounds {
            writeln!(f, "{}", vec_string("Xmin", &bounds.min))?;
            writeln!(f, "{}", vec_string("Xmax", &bounds.max))?;
        }
        write!(
            f,
            "stepSize={}; minStepSize={}; adaptive={}",
            self.step.relative,
            self.step.absolute_floor,
            self.is_adaptive()
        )
    }
}
