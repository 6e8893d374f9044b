//! Sign convention for factor columns.
//!
//! Eigenvectors are only defined up to sign. A column whose loadings sum to a
//! negative number is negated, so most variables load positively on every
//! factor. This reproduces SPSS output and carries no statistical meaning.

use ndarray::{Array1, Array2, Axis};

/// Negates every column of `loadings` whose sum is strictly negative and
/// returns the applied signs (`1.0` or `-1.0` per column).
pub fn reflect_columns(loadings: &mut Array2<f64>) -> Array1<f64> {
    let signs = loadings
        .sum_axis(Axis(0))
        .mapv(|column_sum| if column_sum < 0.0 { -1.0 } else { 1.0 });
    *loadings *= &signs;
    signs
}
