//! Linear algebra support for the filter.
//!
//! Positive definite inversion through a UdU' factorisation, reporting a reciprocal condition number
//! so that an ill conditioned innovation covariance is detected before it is inverted.

pub mod cholesky;
pub mod rcond;
