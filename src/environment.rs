//! Operating environment of a served model.
//!
//! An [`Environment`] is a snapshot of traffic conditions and measured latencies taken once per
//! calibration cycle. The variant decides which latencies make up the observation vector.

use std::fmt;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Measurements common to every environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentBase {
    /// Request arrival rate (per minute)
    pub arrival_rate: f64,
    /// Observed mean batch occupancy
    pub batch_size: f64,
    /// Observed mean queueing time (msec)
    pub avg_queue_time: f64,
    /// Maximum batch size
    pub max_batch_size: usize,
}

/// Decode only serving: one request stage producing output tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeEnvironment {
    #[serde(flatten)]
    pub base: EnvironmentBase,
    /// Mean number of output tokens per request
    pub avg_output_tokens: f64,
    /// Observed mean inter token latency (msec)
    pub avg_token_time: f64,
}

/// Two stage serving: a prefill stage on the input followed by decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefillDecodeEnvironment {
    #[serde(flatten)]
    pub base: EnvironmentBase,
    /// Mean number of input tokens per request
    pub avg_input_tokens: f64,
    /// Mean number of output tokens per request
    pub avg_output_tokens: f64,
    /// Observed mean prefill time (msec)
    pub avg_prefill_time: f64,
    /// Observed mean inter token latency (msec)
    pub avg_token_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Environment {
    Decode(DecodeEnvironment),
    PrefillDecode(PrefillDecodeEnvironment),
}

/// Number of observations either variant produces.
pub const NUM_OBSERVATIONS: usize = 2;

fn finite_all(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

impl EnvironmentBase {
    pub fn new(arrival_rate: f64, batch_size: f64, avg_queue_time: f64, max_batch_size: usize) -> Self {
        EnvironmentBase {
            arrival_rate,
            batch_size,
            avg_queue_time,
            max_batch_size,
        }
    }

    pub fn valid(&self) -> bool {
        finite_all(&[self.arrival_rate, self.batch_size, self.avg_queue_time])
            && self.arrival_rate > 0.
            && self.batch_size >= 0.
            && self.avg_queue_time >= 0.
            && self.max_batch_size > 0
    }
}

impl DecodeEnvironment {
    pub fn valid(&self) -> bool {
        self.base.valid()
            && finite_all(&[self.avg_output_tokens, self.avg_token_time])
            && self.avg_output_tokens > 0.
            && self.avg_token_time > 0.
    }
}

impl PrefillDecodeEnvironment {
    pub fn valid(&self) -> bool {
        self.base.valid()
            && finite_all(&[self.avg_input_tokens, self.avg_output_tokens, self.avg_prefill_time, self.avg_token_time])
            && self.avg_input_tokens >= 0.
            && self.avg_output_tokens > 0.
            && self.avg_prefill_time >= 0.
            && self.avg_token_time > 0.
    }
}

impl Environment {
    pub fn decode(
        arrival_rate: f64,
        batch_size: f64,
        avg_queue_time: f64,
        max_batch_size: usize,
        avg_output_tokens: f64,
        avg_token_time: f64,
    ) -> Self {
        Environment::Decode(DecodeEnvironment {
            base: EnvironmentBase::new(arrival_rate, batch_size, avg_queue_time, max_batch_size),
            avg_output_tokens,
            avg_token_time,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn prefill_decode(
        arrival_rate: f64,
        batch_size: f64,
        avg_queue_time: f64,
        max_batch_size: usize,
        avg_input_tokens: f64,
        avg_output_tokens: f64,
        avg_prefill_time: f64,
        avg_token_time: f64,
    ) -> Self {
        Environment::PrefillDecode(PrefillDecodeEnvironment {
            base: EnvironmentBase::new(arrival_rate, batch_size, avg_queue_time, max_batch_size),
            avg_input_tokens,
            avg_output_tokens,
            avg_prefill_time,
            avg_token_time,
        })
    }

    pub fn base(&self) -> &EnvironmentBase {
        match self {
            Environment::Decode(env) => &env.base,
            Environment::PrefillDecode(env) => &env.base,
        }
    }

    pub fn valid(&self) -> bool {
        match self {
            Environment::Decode(env) => env.valid(),
            Environment::PrefillDecode(env) => env.valid(),
        }
    }

    /// The observation vector Z consumed by the filter.
    ///
    /// Decode observes [queueing time, token time], prefill-decode observes [prefill time, token time].
    pub fn observations(&self) -> DVector<f64> {
        match self {
            Environment::Decode(env) => DVector::from_vec(vec![env.base.avg_queue_time, env.avg_token_time]),
            Environment::PrefillDecode(env) => DVector::from_vec(vec![env.avg_prefill_time, env.avg_token_time]),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment: ")?;
        match self {
            Environment::Decode(env) => write!(
                f,
                "rpm={:5.2}; avgOutTokens={:6.2}; batchSize={:6.2}; maxBatch={}; avgWait={:10.6}; avgITL={:10.6}",
                env.base.arrival_rate,
                env.avg_output_tokens,
                env.base.batch_size,
                env.base.max_batch_size,
                env.base.avg_queue_time,
                env.avg_token_time
            ),
            Environment::PrefillDecode(env) => write!(
                f,
                "rpm={:5.2}; avgInTokens={:6.2}; avgOutTokens={:6.2}; batchSize={:6.2}; maxBatch={}; avgWait={:10.6}; avgPrefill={:10.6}; avgITL={:10.6}",
                env.base.arrival_rate,
                env.avg_input_tokens,
                env.avg_output_tokens,
                env.base.batch_size,
                env.base.max_batch_size,
                env.base.avg_queue_time,
                env.avg_prefill_time,
                env.avg_token_time
            ),
        }
    }
}
