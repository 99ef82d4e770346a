#![allow(non_snake_case)]

//! Modified Cholesky factorisation and positive definite inversion.
//!
//! UdU' factorisation of a positive semi-definite matrix, where
//! U is unit upper triangular and d is diagonal.
//!
//! Storage, UD format of the UdU' factor:
//! strict_upper_triangle(UD) = strict_upper_triangle(U), diagonal(UD) = d, strict_lower_triangle(UD) ignored

use nalgebra::{allocator::Allocator, DefaultAllocator, Dim, MatrixN, RealField};

use super::rcond;

/// In place modified upper triangular Cholesky factor of a positive definite or semi-definite matrix M.
///
/// Reference: A+G p.219 right side of table
///
/// Input: M, strict lower triangle of M is ignored in computation
///
/// Output: M as UdU' factor
///
/// Return: reciprocal condition number, -1 if negative, 0 if semi-definite (including zero)
pub fn UdUfactor<N: RealField, D: Dim>(M: &mut MatrixN<N, D>) -> N
where
    DefaultAllocator: Allocator<N, D, D>,
{
    let n = M.nrows();
    for j in (0..n).rev() {
        let mut d = M[(j, j)];

        if d > N::zero() {
            // Positive definite
            for i in (0..=j).rev() {
                let mut e = M[(i, j)];
                for k in j + 1..n {
                    e -= M[(i, k)] * M[(k, k)] * M[(j, k)];
                }
                if i == j {
                    d = e;
                    M[(i, j)] = e;
                } else {
                    M[(i, j)] = e / d;
                }
            }
            if !(d > N::zero()) {
                // Lost definiteness during elimination
                return -N::one();
            }
        } else if d == N::zero() {
            // Possibly semi-definite, whole row must be identically zero
            for k in j + 1..n {
                if M[(j, k)] != N::zero() {
                    return -N::one();
                }
            }
        } else {
            // Negative or NaN
            return -N::one();
        }
    }

    rcond::rcond_symmetric(M)
}

/// In place (destructive) inversion of the diagonal and unit upper triangular factors in UD.
///
/// This is NOT the inverse of UdU', it yields inv(U) and inv(d) for recomposition as U'dU.
///
/// Return: false if d has a zero element, UD is then only partially inverted
fn UdUinverse<N: RealField, D: Dim>(UD: &mut MatrixN<N, D>) -> bool
where
    DefaultAllocator: Allocator<N, D, D>,
{
    let n = UD.nrows();

    // Invert U in place
    if n > 1 {
        for i in (0..n - 1).rev() {
            for j in (i + 1..n).rev() {
                let mut UDij = -UD[(i, j)];
                for k in i + 1..j {
                    UDij -= UD[(i, k)] * UD[(k, j)];
                }
                UD[(i, j)] = UDij;
            }
        }
    }

    // Invert d in place
    for i in 0..n {
        let UDii = UD[(i, i)];
        if UDii == N::zero() {
            return false;
        }
        UD[(i, i)] = N::one() / UDii;
    }
    true
}

/// In place recomposition of a symmetric matrix from its U'dU factor stored in UD format.
///
/// Reference: A+G p.223
fn UdUrecompose_transpose<N: RealField, D: Dim>(M: &mut MatrixN<N, D>)
where
    DefaultAllocator: Allocator<N, D, D>,
{
    let n = M.nrows();

    for i in (0..n).rev() {
        // (U' d) row i of lower triangle from upper triangle
        for j in 0..i {
            M[(i, j)] = M[(j, i)] * M[(j, j)];
        }
        // (U' d) U in place
        for j in (i..n).rev() {
            if j > i {
                // Unit diagonal of U
                let mii = M[(i, i)];
                M[(i, j)] *= mii;
            }
            for k in 0..i {
                let t = M[(i, k)] * M[(k, j)];
                M[(i, j)] += t;
            }
            M[(j, i)] = M[(i, j)];
        }
    }
}

/// Inverse of a symmetric positive definite matrix.
///
/// Output: M inverse of M, only meaningful if return value > 0
///
/// Return: reciprocal condition number, -1 if negative, 0 if semi-definite (including zero)
pub fn inverse_pd<N: RealField, D: Dim>(M: &mut MatrixN<N, D>) -> N
where
    DefaultAllocator: Allocator<N, D, D>,
{
    let rcond = UdUfactor(M);
    if rcond > N::zero() {
        if !UdUinverse(M) {
            return N::zero();
        }
        UdUrecompose_transpose(M);
    }
    rcond
}
