//! Queueing observation models.
//!
//! A [`QueueModel`] maps a candidate parameter vector and an [`Environment`] to the latencies the
//! queue would exhibit, by building the state dependent service rates and solving the chain.
//!
//! Decode, state `[α, β]`: a batch iteration with n requests takes `α + β n` msec and a request
//! needs T iterations (T output tokens), so
//! ```text
//! μ_n = n / (α + β n) / T
//! ```
//! and the prediction is [queueing time W, per token time S/T].
//!
//! Prefill-decode, state `[α, β, γ, δ]`: each request first spends `P = γ + δ I` msec in prefill
//! (I input tokens), so
//! ```text
//! μ_n = n / (P + T (α + β n))
//! ```
//! and the prediction is [prefill time P, per token decode time (S - P)/T].

use std::fmt;
use std::str::FromStr;

use nalgebra::DVector;

use crate::environment::{DecodeEnvironment, Environment, EnvironmentBase, PrefillDecodeEnvironment, NUM_OBSERVATIONS};
use crate::error::{Error, Result};
use crate::queueing::{QueueConfig, QueueMetrics, StateDependentQueue};

/// Queue capacity as a multiple of the max batch size.
pub const DEFAULT_MAX_QUEUE_FACTOR: usize = 10;

/// Requests per minute to requests per msec.
const RPM_TO_PER_MSEC: f64 = 1. / 60_000.;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueModelKind {
    Decode,
    PrefillDecode,
}

/// Observation function selecting a queueing model variant.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueModel {
    kind: QueueModelKind,
    max_queue_factor: usize,
}

impl QueueModelKind {
    pub fn state_dim(self) -> usize {
        match self {
            QueueModelKind::Decode => 2,
            QueueModelKind::PrefillDecode => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            QueueModelKind::Decode => "decode",
            QueueModelKind::PrefillDecode => "prefill-decode",
        }
    }
}

impl FromStr for QueueModelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "decode" => Ok(QueueModelKind::Decode),
            "prefill-decode" => Ok(QueueModelKind::PrefillDecode),
            _ => Err(Error::invalid_configuration(format!("unknown queueing model kind: {}", s))),
        }
    }
}

impl fmt::Display for QueueModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl QueueModel {
    pub fn new(kind: QueueModelKind) -> Self {
        QueueModel {
            kind,
            max_queue_factor: DEFAULT_MAX_QUEUE_FACTOR,
        }
    }

    pub fn decode() -> Self {
        QueueModel::new(QueueModelKind::Decode)
    }

    pub fn prefill_decode() -> Self {
        QueueModel::new(QueueModelKind::PrefillDecode)
    }

    /// Use a queue capacity of `factor` times the max batch size.
    pub fn with_max_queue_factor(mut self, factor: usize) -> Result<Self> {
        if factor == 0 {
            return Err(Error::invalid_configuration("max queue factor must be positive"));
        }
        self.max_queue_factor = factor;
        Ok(self)
    }

    pub fn kind(&self) -> QueueModelKind {
        self.kind
    }

    pub fn state_dim(&self) -> usize {
        self.kind.state_dim()
    }

    pub fn observation_dim(&self) -> usize {
        NUM_OBSERVATIONS
    }

    /// Predicted observation h(x, env).
    pub fn observe(&self, x: &DVector<f64>, env: &Environment) -> Result<DVector<f64>> {
        if x.len() != self.state_dim() {
            return Err(Error::observation_unavailable(format!(
                "{} model expects {} states, got {}",
                self.kind,
                self.state_dim(),
                x.len()
            )));
        }
        if !env.valid() {
            return Err(Error::observation_unavailable("invalid environment"));
        }
        if x.iter().any(|xi| !xi.is_finite()) {
            return Err(Error::observation_unavailable("state not finite"));
        }

        match (self.kind, env) {
            (QueueModelKind::Decode, Environment::Decode(env)) => self.observe_decode(x, env),
            (QueueModelKind::PrefillDecode, Environment::PrefillDecode(env)) => self.observe_prefill_decode(x, env),
            _ => Err(Error::observation_unavailable(format!("{} model cannot use this environment", self.kind))),
        }
    }

    fn observe_decode(&self, x: &DVector<f64>, env: &DecodeEnvironment) -> Result<DVector<f64>> {
        let (alpha, beta) = (x[0], x[1]);
        let tokens = env.avg_output_tokens;

        let rates = (1..=env.base.max_batch_size)
            .map(|n| {
                let n = n as f64;
                n / (alpha + beta * n) / tokens
            })
            .collect();
        let metrics = self.solve(&env.base, rates, tokens)?;

        Ok(DVector::from_vec(vec![metrics.avg_wait_time, metrics.avg_unit_service_time]))
    }

    fn observe_prefill_decode(&self, x: &DVector<f64>, env: &PrefillDecodeEnvironment) -> Result<DVector<f64>> {
        let (alpha, beta, gamma, delta) = (x[0], x[1], x[2], x[3]);
        let tokens = env.avg_output_tokens;

        let prefill_time = gamma + delta * env.avg_input_tokens;
        if !(prefill_time >= 0.) {
            return Err(Error::observation_unavailable(format!("negative prefill time {}", prefill_time)));
        }

        let rates = (1..=env.base.max_batch_size)
            .map(|n| {
                let n = n as f64;
                n / (prefill_time + tokens * (alpha + beta * n))
            })
            .collect();
        let metrics = self.solve(&env.base, rates, tokens)?;

        let token_time = (metrics.avg_service_time - prefill_time) / tokens;
        Ok(DVector::from_vec(vec![prefill_time, token_time]))
    }

    fn solve(&self, base: &EnvironmentBase, rates: Vec<f64>, tokens: f64) -> Result<QueueMetrics> {
        let max_batch_size = base.max_batch_size;
        let config = QueueConfig::new(max_batch_size, self.max_queue_factor * max_batch_size, rates, tokens)
            .map_err(|e| Error::observation_unavailable(e.to_string()))?;

        StateDependentQueue::new(config)?
            .solve(base.arrival_rate * RPM_TO_PER_MSEC)
            .map_err(|e| Error::observation_unavailable(e.to_string()))
    }
}

impl fmt::Display for QueueModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueueModel: kind={}; maxQueueFactor={}", self.kind, self.max_queue_factor)
    }
}
