//! Queue Calibrate, online calibration of queueing model parameters.
//! Copyright (c) 2020 Michael Stevens
//!
//! A served model's latency is governed by a few hidden service time coefficients: a fixed cost per
//! batch iteration, a marginal cost per request in the batch and, for two stage serving, the cost
//! of prefilling the input. These cannot be measured directly, but the latencies they cause can.
//!
//! The coefficients are estimated with an extended Kalman filter. Its observation function is the
//! steady state of a finite capacity birth-death queue whose state dependent service rates are
//! built from the current estimate and the observed traffic. Each cycle the filter predicts,
//! compares the queue's predicted latencies with measured ones, and corrects the estimate.
//!
//! Filter operations are defined as traits in [`models`], implemented by the estimators in
//! [`estimators`] which are numerically generic using nalgebra. The [`tuner`] binds a filter to a
//! stream of [`environment`] snapshots.
//!
//! # Licensing
//!
//! Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction,
//! including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software,
//! and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
//!
//! The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
//!
//! THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//! FITNESS FOR A PARTICULAR PURPOSE AND NON INFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY,
//! WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

pub mod config;
pub mod configurator;
pub mod display;
pub mod environment;
pub mod error;
pub mod estimators;
pub mod linalg;
pub mod models;
pub mod noise;
pub mod observation;
pub mod observer;
pub mod queueing;
pub mod tuner;

pub use error::{Error, Result};
