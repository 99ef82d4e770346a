//! Simulated measurement source.
//!
//! Produces environments from known ground truth parameters by solving the same queueing chain the
//! tuner uses as observation model, then perturbing the measured latencies with uniform relative
//! noise. Steps with prefill truth yield prefill-decode environments, the others decode
//! environments. Each call advances one time step; the last step repeats once the schedule is
//! exhausted.

use rand_core::RngCore;
use rand_distr::{Distribution, Uniform};

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::queueing::{QueueConfig, QueueMetrics, StateDependentQueue};

/// Queue capacity of the simulated server as a multiple of its max batch size.
pub const SIMULATED_MAX_QUEUE_FACTOR: usize = 100;

/// Prefill ground truth, a request spends `gamma + delta * avg_input_tokens` msec in prefill.
#[derive(Debug, Clone, PartialEq)]
pub struct PrefillTruth {
    pub gamma: f64,
    pub delta: f64,
    pub avg_input_tokens: f64,
}

/// Traffic and ground truth parameters of one time step.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationStep {
    /// Request rate (per minute)
    pub rpm: f64,
    pub avg_output_tokens: f64,
    pub alpha: f64,
    pub beta: f64,
    pub prefill: Option<PrefillTruth>,
    /// Relative noise amplitude on measured latencies
    pub percent_noise: f64,
    /// Relative noise amplitude on the request rate, the perturbed rate is the one reported
    pub rpm_noise: f64,
    pub max_batch_size: usize,
}

impl SimulationStep {
    /// Decode step without noise.
    pub fn decode(rpm: f64, avg_output_tokens: f64, alpha: f64, beta: f64, max_batch_size: usize) -> Self {
        SimulationStep {
            rpm,
            avg_output_tokens,
            alpha,
            beta,
            prefill: None,
            percent_noise: 0.,
            rpm_noise: 0.,
            max_batch_size,
        }
    }

    pub fn with_prefill(mut self, gamma: f64, delta: f64, avg_input_tokens: f64) -> Self {
        self.prefill = Some(PrefillTruth {
            gamma,
            delta,
            avg_input_tokens,
        });
        self
    }

    pub fn with_noise(mut self, percent_noise: f64, rpm_noise: f64) -> Self {
        self.percent_noise = percent_noise;
        self.rpm_noise = rpm_noise;
        self
    }

    fn prefill_time(&self) -> f64 {
        self.prefill
            .as_ref()
            .map_or(0., |p| p.gamma + p.delta * p.avg_input_tokens)
    }
}

pub struct SimulatedObserver<R: RngCore> {
    steps: Vec<SimulationStep>,
    time_step: usize,
    max_queue_factor: usize,
    noise: Uniform<f64>,
    rng: R,
}

impl<R: RngCore> SimulatedObserver<R> {
    pub fn new(steps: Vec<SimulationStep>, rng: R) -> Result<Self> {
        if steps.is_empty() {
            return Err(Error::invalid_configuration("simulation needs at least one step"));
        }
        Ok(SimulatedObserver {
            steps,
            time_step: 0,
            max_queue_factor: SIMULATED_MAX_QUEUE_FACTOR,
            noise: Uniform::new_inclusive(-1., 1.),
            rng,
        })
    }

    pub fn time_step(&self) -> usize {
        self.time_step
    }

    /// Environment of the current time step, then advance.
    pub fn environment(&mut self) -> Result<Environment> {
        let i = self.time_step.min(self.steps.len() - 1);
        let step = self.steps[i].clone();

        let rpm = if step.rpm_noise > 0. {
            self.perturb(step.rpm, step.rpm_noise)
        } else {
            step.rpm
        };
        let metrics = self.solve(&step, rpm)?;

        let env = match &step.prefill {
            None => {
                let avg_wait_time = self.perturb(metrics.avg_wait_time, step.percent_noise);
                let avg_token_time = self.perturb(metrics.avg_unit_service_time, step.percent_noise);
                Environment::decode(
                    rpm,
                    metrics.avg_num_in_service,
                    avg_wait_time,
                    step.max_batch_size,
                    step.avg_output_tokens,
                    avg_token_time,
                )
            }
            Some(prefill) => {
                let prefill_time = step.prefill_time();
                let token_time = (metrics.avg_service_time - prefill_time) / step.avg_output_tokens;

                let avg_wait_time = self.perturb(metrics.avg_wait_time, step.percent_noise);
                let avg_prefill_time = self.perturb(prefill_time, step.percent_noise);
                let avg_token_time = self.perturb(token_time, step.percent_noise);
                Environment::prefill_decode(
                    rpm,
                    metrics.avg_num_in_service,
                    avg_wait_time,
                    step.max_batch_size,
                    prefill.avg_input_tokens,
                    step.avg_output_tokens,
                    avg_prefill_time,
                    avg_token_time,
                )
            }
        };

        self.time_step += 1;
        Ok(env)
    }

    fn solve(&self, step: &SimulationStep, rpm: f64) -> Result<QueueMetrics> {
        let tokens = step.avg_output_tokens;
        let prefill_time = step.prefill_time();
        let rates = (1..=step.max_batch_size)
            .map(|n| {
                let n = n as f64;
                match step.prefill {
                    None => n / (step.alpha + step.beta * n) / tokens,
                    Some(_) => n / (prefill_time + tokens * (step.alpha + step.beta * n)),
                }
            })
            .collect();
        let config = QueueConfig::new(
            step.max_batch_size,
            self.max_queue_factor * step.max_batch_size,
            rates,
            tokens,
        )?;
        StateDependentQueue::new(config)?.solve(rpm / 60_000.)
    }

    fn perturb(&mut self, value: f64, percent_noise: f64) -> f64 {
        let noisy = value * (1. + percent_noise * self.noise.sample(&mut self.rng));
        noisy.max(0.)
    }
}
