use nalgebra::{allocator::Allocator, DefaultAllocator, Dim, MatrixN, RealField};

/**
 * Numerical comparison of reciprocal condition numbers.
 *
 * Estimate the reciprocal condition number of a diagonal matrix for inversion, the diagonal
 * being that of the d factor of a UdU' factorisation.
 *
 * The condition number is defined from a matrix norm.
 *  Choose max element of d as the norm of the original matrix.
 *  Assume this norm for the inverse matrix is min element of d.
 *  Therefore rcond = min/max
 *
 * Note:
 *  Defined to be 0 for semi-definite and 0 for an empty matrix
 *  Defined to be 0 for max and min infinite
 *  Defined to be <0 for negative matrix (d element a value < 0)
 *  Defined to be <0 with any NaN element
 */
pub fn rcond_symmetric<N: RealField, D: Dim>(sm: &MatrixN<N, D>) -> N
where
    DefaultAllocator: Allocator<N, D, D>,
{
    let n = sm.nrows();
    if n == 0 {
        return N::zero();
    }

    let mut mind = sm[(0, 0)];
    let mut maxd = mind;
    for i in 0..n {
        let d = sm[(i, i)];
        if d != d {
            // NaN
            return -N::one();
        }
        if d < mind {
            mind = d;
        }
        if d > maxd {
            maxd = d;
        }
    }

    rcond_min_max(mind, maxd)
}

fn rcond_min_max<N: RealField>(mind: N, maxd: N) -> N {
    if mind < N::zero() {
        // matrix is negative, mind does not represent a rcond
        return mind;
    }
    let rcond = mind / maxd;
    if rcond != rcond {
        // NaN, singular due to (mind == maxd) == (zero or infinity)
        N::zero()
    } else {
        rcond
    }
}
