#![allow(non_snake_case)]

//! Finite difference Jacobians.
//!
//! The observation function of a queueing model has no closed form derivative, so it is linearised
//! numerically. Steps are relative to the magnitude of each state element with an absolute floor
//! for elements near zero.

use nalgebra as na;
use na::storage::Storage;
use na::{allocator::Allocator, DefaultAllocator, Dim, MatrixMN, RealField, VectorN};
use tracing::trace;

use crate::error::{Error, Result};

/// Perturbation size for finite differences.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JacobianStep<N: RealField> {
    /// Step as a fraction of |x_i|
    pub relative: N,
    /// Smallest step used, applies when x_i is near zero
    pub absolute_floor: N,
}

impl<N: RealField> JacobianStep<N> {
    pub fn new(relative: N, absolute_floor: N) -> Result<Self> {
        if !(relative > N::zero()) || !(absolute_floor > N::zero()) {
            return Err(Error::invalid_configuration("jacobian steps must be positive"));
        }
        Ok(JacobianStep {
            relative,
            absolute_floor,
        })
    }

    /// Step for a state element of value xi.
    pub fn step(&self, xi: N) -> N {
        let eps = self.relative * xi.abs();
        if eps > self.absolute_floor {
            eps
        } else {
            self.absolute_floor
        }
    }
}

impl<N: RealField> Default for JacobianStep<N> {
    fn default() -> Self {
        JacobianStep {
            relative: na::convert(1e-3),
            absolute_floor: na::convert(1e-6),
        }
    }
}

fn evaluate<N, D, ZD, H>(h: &H, x: &VectorN<N, D>, rows: usize) -> Option<VectorN<N, ZD>>
where
    N: RealField,
    D: Dim,
    ZD: Dim,
    H: Fn(&VectorN<N, D>) -> Option<VectorN<N, ZD>>,
    DefaultAllocator: Allocator<N, D> + Allocator<N, ZD>,
{
    h(x).filter(|hx| hx.nrows() == rows && hx.iter().all(|v| v.is_finite()))
}

/// Jacobian of h at x by central differences.
///
/// hx is h(x), used for a one sided difference when h is undefined on one side of x.
/// Fails if h is undefined on both sides of some element.
pub fn numerical_jacobian<N, D, ZD, H>(
    h: &H,
    x: &VectorN<N, D>,
    hx: &VectorN<N, ZD>,
    step: &JacobianStep<N>,
) -> Result<MatrixMN<N, ZD, D>>
where
    N: RealField,
    D: Dim,
    ZD: Dim,
    H: Fn(&VectorN<N, D>) -> Option<VectorN<N, ZD>>,
    DefaultAllocator: Allocator<N, D> + Allocator<N, ZD> + Allocator<N, ZD, D>,
{
    let rows = hx.nrows();
    let mut Hx = MatrixMN::zeros_generic(hx.data.shape().0, x.data.shape().0);

    for i in 0..x.nrows() {
        let eps = step.step(x[i]);
        let mut xp = x.clone();
        xp[i] += eps;
        let mut xm = x.clone();
        xm[i] -= eps;

        let column = match (evaluate(h, &xp, rows), evaluate(h, &xm, rows)) {
            (Some(hp), Some(hm)) => (hp - hm) / (eps + eps),
            (Some(hp), None) => {
                trace!(element = i, "backward evaluation undefined, using forward difference");
                (hp - hx) / eps
            }
            (None, Some(hm)) => {
                trace!(element = i, "forward evaluation undefined, using backward difference");
                (hx - hm) / eps
            }
            (None, None) => {
                return Err(Error::observation_unavailable(format!(
                    "observation undefined on both sides of state element {}",
                    i
                )))
            }
        };
        Hx.set_column(i, &column);
    }

    Ok(Hx)
}
