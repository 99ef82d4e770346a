//! State estimators.
//!
//! The extended Kalman filter and the numerical linearisation it relies on.

pub mod extended;
pub mod jacobian;
