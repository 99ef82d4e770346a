//! Compact text rendering of vectors and matrices for summaries and logs.
//!
//! Elements print in fixed point unless they are small, then in exponent form.

use std::fmt::Write;

use nalgebra::storage::Storage;
use nalgebra::{Dim, Matrix};

fn push_element(out: &mut String, v: f64) {
    // Writing to a String cannot fail
    let _ = if v.abs() < 0.01 {
        write!(out, "{:10.3E} ", v)
    } else {
        write!(out, "{:10.3} ", v)
    };
}

/// `name=[ x0 x1 ... ]`
pub fn vec_string<R: Dim, C: Dim, S: Storage<f64, R, C>>(name: &str, v: &Matrix<f64, R, C, S>) -> String {
    let mut out = format!("{}=[", name);
    for x in v.iter() {
        push_element(&mut out, *x);
    }
    out.push(']');
    out
}

/// `name=[[ row0 ][ row1 ]...]`
pub fn mat_string<R: Dim, C: Dim, S: Storage<f64, R, C>>(name: &str, m: &Matrix<f64, R, C, S>) -> String {
    let mut out = format!("{}=[", name);
    for i in 0..m.nrows() {
        out.push('[');
        for j in 0..m.ncols() {
            push_element(&mut out, m[(i, j)]);
        }
        out.push(']');
    }
    out.push(']');
    out
}
