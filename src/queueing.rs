//! Finite capacity, state dependent birth-death queue.
//!
//! The chain has states 0..=M. Arrivals occur at rate λ in every state below M and are blocked at M.
//! Service in state n completes at rate μ[min(n, K)], K being the maximum batch size: the server
//! is saturated once its batch is full and additional requests wait.
//!
//! The stationary distribution is found from the product form
//! ```text
//! π_n = π_0 Π_{k=1..n} λ/μ_k
//! ```
//! accumulated as logarithms so that long chains neither overflow nor underflow before normalisation.

use std::fmt;

use tracing::trace;

use crate::error::{Error, Result};

/// Arrival rates at or below this are treated as an idle system.
pub const IDLE_ARRIVAL_RATE: f64 = 1e-12;

/// Queue shape and service rates.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// Maximum number of requests served concurrently (K).
    pub max_batch_size: usize,
    /// Maximum number of requests in the system (M), arrivals beyond are blocked.
    pub max_queue_size: usize,
    /// Service rate μ[n] with n requests in service, index 0 holds μ[1].
    pub service_rates: Vec<f64>,
    /// Mean number of work units (output tokens) per request.
    pub units_per_request: f64,
}

/// Steady state performance of the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMetrics {
    /// Offered arrival rate λ
    pub arrival_rate: f64,
    /// Accepted arrival rate λ(1 - π_M)
    pub throughput: f64,
    /// Probability an arrival is blocked, π_M
    pub blocking_probability: f64,
    /// L
    pub avg_num_in_system: f64,
    /// Mean number of requests in service (batch occupancy)
    pub avg_num_in_service: f64,
    /// Mean number of requests waiting
    pub avg_queue_length: f64,
    /// W, mean time waiting before service
    pub avg_wait_time: f64,
    /// Mean time in service per request
    pub avg_service_time: f64,
    /// Mean service time per work unit
    pub avg_unit_service_time: f64,
    /// Mean batch occupancy over K
    pub utilization: f64,
    /// Stationary distribution π_0..π_M
    pub distribution: Vec<f64>,
}

impl QueueMetrics {
    pub fn avg_response_time(&self) -> f64 {
        self.avg_wait_time + self.avg_service_time
    }
}

impl QueueConfig {
    pub fn new(max_batch_size: usize, max_queue_size: usize, service_rates: Vec<f64>, units_per_request: f64) -> Result<Self> {
        let config = QueueConfig {
            max_batch_size,
            max_queue_size,
            service_rates,
            units_per_request,
        };
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(Error::invalid_configuration("max batch size must be positive"));
        }
        if self.max_queue_size < self.max_batch_size {
            return Err(Error::invalid_configuration(format!(
                "max queue size {} smaller than max batch size {}",
                self.max_queue_size, self.max_batch_size
            )));
        }
        if self.service_rates.len() != self.max_batch_size {
            return Err(Error::invalid_configuration(format!(
                "{} service rates for max batch size {}",
                self.service_rates.len(),
                self.max_batch_size
            )));
        }
        if let Some(k) = self.service_rates.iter().position(|mu| !(*mu > 0.) || !mu.is_finite()) {
            return Err(Error::invalid_configuration(format!(
                "service rate mu[{}] = {} not positive",
                k + 1,
                self.service_rates[k]
            )));
        }
        if !(self.units_per_request > 0.) || !self.units_per_request.is_finite() {
            return Err(Error::invalid_configuration("units per request must be positive"));
        }
        Ok(())
    }
}

/// Birth-death queue with service rates depending on the number in service.
#[derive(Debug, Clone)]
pub struct StateDependentQueue {
    config: QueueConfig,
}

impl StateDependentQueue {
    pub fn new(config: QueueConfig) -> Result<Self> {
        config.check()?;
        Ok(StateDependentQueue { config })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Service rate with n requests in the system.
    fn mu(&self, n: usize) -> f64 {
        let k = self.config.max_batch_size;
        self.config.service_rates[n.min(k) - 1]
    }

    /// Steady state metrics at arrival rate lambda.
    pub fn solve(&self, lambda: f64) -> Result<QueueMetrics> {
        if !(lambda >= 0.) || !lambda.is_finite() {
            return Err(Error::invalid_configuration(format!("arrival rate {} not valid", lambda)));
        }
        if lambda <= IDLE_ARRIVAL_RATE {
            return Ok(self.idle());
        }

        let distribution = self.stationary(lambda)?;
        Ok(self.metrics(lambda, distribution))
    }

    /// Normalised stationary distribution via log domain products.
    ///
    /// With λ and every μ_k positive and finite, each term ln λ - ln μ_k is bounded by about 1500
    /// in magnitude, so the running sum stays finite for any chain that fits in memory. After
    /// shifting by the largest log term every weight lies in [0, 1] and one equals 1, so the
    /// normalising sum lies in [1, M + 1]. The `Unstable` checks guard these bounds.
    fn stationary(&self, lambda: f64) -> Result<Vec<f64>> {
        let m = self.config.max_queue_size;
        let log_lambda = lambda.ln();

        let mut log_p = Vec::with_capacity(m + 1);
        log_p.push(0.);
        let mut max_log = 0f64;
        for n in 1..=m {
            let next = log_p[n - 1] + log_lambda - self.mu(n).ln();
            if !next.is_finite() {
                return Err(Error::Unstable(format!("log probability diverged at state {}", n)));
            }
            max_log = max_log.max(next);
            log_p.push(next);
        }

        let mut distribution: Vec<f64> = log_p.iter().map(|lp| (lp - max_log).exp()).collect();
        let sum: f64 = distribution.iter().sum();
        if !sum.is_finite() || sum <= 0. {
            return Err(Error::Unstable(format!("normalising sum {} not usable", sum)));
        }
        for p in distribution.iter_mut() {
            *p /= sum;
        }
        Ok(distribution)
    }

    fn metrics(&self, lambda: f64, distribution: Vec<f64>) -> QueueMetrics {
        let k = self.config.max_batch_size;
        let m = self.config.max_queue_size;

        let mut avg_num_in_system = 0.;
        let mut avg_num_in_service = 0.;
        for (n, p) in distribution.iter().enumerate() {
            avg_num_in_system += n as f64 * p;
            avg_num_in_service += n.min(k) as f64 * p;
        }
        let avg_queue_length = (avg_num_in_system - avg_num_in_service).max(0.);

        let blocking_probability = distribution[m];
        let throughput = lambda * (1. - blocking_probability);

        let (avg_wait_time, avg_service_time) = if throughput > IDLE_ARRIVAL_RATE {
            (avg_queue_length / throughput, avg_num_in_service / throughput)
        } else {
            // Everything blocked, nothing flows through
            trace!(lambda, blocking_probability, "queue throughput vanished");
            (0., 1. / self.mu(1))
        };

        QueueMetrics {
            arrival_rate: lambda,
            throughput,
            blocking_probability,
            avg_num_in_system,
            avg_num_in_service,
            avg_queue_length,
            avg_wait_time,
            avg_service_time,
            avg_unit_service_time: avg_service_time / self.config.units_per_request,
            utilization: avg_num_in_service / k as f64,
            distribution,
        }
    }

    /// No arrivals, the system is always empty.
    ///
    /// Service time is the λ → 0 limit of L_s/λ_eff, a lone request served at μ[1].
    fn idle(&self) -> QueueMetrics {
        let mut distribution = vec![0.; self.config.max_queue_size + 1];
        distribution[0] = 1.;
        let avg_service_time = 1. / self.mu(1);
        QueueMetrics {
            arrival_rate: 0.,
            throughput: 0.,
            blocking_probability: 0.,
            avg_num_in_system: 0.,
            avg_num_in_service: 0.,
            avg_queue_length: 0.,
            avg_wait_time: 0.,
            avg_service_time,
            avg_unit_service_time: avg_service_time / self.config.units_per_request,
            utilization: 0.,
            distribution,
        }
    }
}

impl fmt::Display for QueueMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lambda={:.6e}; throughput={:.6e}; blocking={:.4e}; L={:.4}; Ls={:.4}; W={:.4}; S={:.4}; unit={:.4}",
            self.arrival_rate,
            self.throughput,
            self.blocking_probability,
            self.avg_num_in_system,
            self.avg_num_in_service,
            self.avg_wait_time,
            self.avg_service_time,
            self.avg_unit_service_time
        )
    }
}
