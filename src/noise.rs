#![allow(non_snake_case)]

//! Additive noise models.
//!
//! Process and measurement noise are represented as covariance matrices. Diagonal noise, the usual
//! case for calibration, is built from a vector of variances.

use nalgebra as na;
use na::storage::Storage;
use na::{allocator::Allocator, DefaultAllocator, Dim, MatrixN, RealField, VectorN};

use crate::error::{Error, Result};

/// Additive noise.
///
/// Noise represented as a the noise variance vector.
#[derive(Debug, Clone, PartialEq)]
pub struct UncorrelatedNoise<N: RealField, QD: Dim>
where
    DefaultAllocator: Allocator<N, QD>,
{
    /// Noise variance
    pub q: VectorN<N, QD>,
}

/// Additive noise.
///
/// Noise represented as a the noise covariance matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelatedNoise<N: RealField, D: Dim>
where
    DefaultAllocator: Allocator<N, D, D>,
{
    /// Noise covariance
    pub Q: MatrixN<N, D>,
}

impl<N: RealField, QD: Dim> CorrelatedNoise<N, QD>
where
    DefaultAllocator: Allocator<N, QD, QD> + Allocator<N, QD>,
{
    /// Creates a CorrelatedNoise from an UncorrelatedNoise.
    pub fn from_uncorrelated(uncorrelated: &UncorrelatedNoise<N, QD>) -> Self {
        let z_size = uncorrelated.q.data.shape().0;
        let mut correlated = CorrelatedNoise {
            Q: MatrixN::zeros_generic(z_size, z_size),
        };
        for i in 0..uncorrelated.q.nrows() {
            correlated.Q[(i, i)] = uncorrelated.q[i];
        }

        correlated
    }

    pub fn dim(&self) -> usize {
        self.Q.nrows()
    }

    /// Checks the covariance is square with a non negative diagonal.
    pub fn check_psd(&self, name: &str) -> Result<()> {
        self.check_diagonal(name, |d| d >= N::zero(), "negative")
    }

    /// Checks the covariance is square with a strictly positive diagonal.
    pub fn check_pd(&self, name: &str) -> Result<()> {
        self.check_diagonal(name, |d| d > N::zero(), "non positive")
    }

    fn check_diagonal(&self, name: &str, ok: impl Fn(N) -> bool, what: &str) -> Result<()> {
        if self.Q.nrows() != self.Q.ncols() {
            return Err(Error::invalid_configuration(format!("{} not square", name)));
        }
        for i in 0..self.Q.nrows() {
            // NaN fails every comparison
            if !ok(self.Q[(i, i)]) {
                return Err(Error::invalid_configuration(format!("{} has {} diagonal element {}", name, what, i)));
            }
        }
        Ok(())
    }
}
