// src/diagnostics.rs

//! Consistency checks on a finished factor solution.
//!
//! Nothing here runs inside the engine. The checks recompute quantities from
//! the stored z-scores and report the largest deviation from each identity
//! the solution should satisfy.

use ndarray::{Array2, ArrayView2, Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{FactorError, Result};
use crate::factor::FactorResult;
use crate::linalg_backends::{BackendEigh, NdarrayLinAlgBackend};
use crate::spectrum::correlation_matrix;

/// Maximum deviations found by [`check_consistency`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    /// Column sums of squared loadings vs retained eigenvalues.
    pub eigenvalue_error: f64,
    /// Stored communalities vs row sums of squared loadings.
    pub communality_error: f64,
    /// Stored scores vs `Z · weights`.
    pub score_error: f64,
    /// `|raw whitening scores|` vs `|Z · weights|`.
    pub score_equivalence_error: f64,
    /// Smallest column sum over the unrotated and rotated component matrices.
    /// Reflection makes this non-negative.
    pub min_factor_sum: f64,
    /// Total rotated communality vs total unrotated communality.
    pub rotated_communality_drift: Option<f64>,
    /// Stored rotated scores vs `Z · weights_rot`.
    pub rotated_score_error: Option<f64>,
    /// `weights_rotᵗ · L_rot` vs the identity.
    pub rotated_weight_identity_error: Option<f64>,
}

impl ConsistencyReport {
    /// Largest of the error fields (the reflection sum is not an error).
    pub fn max_deviation(&self) -> f64 {
        [
            Some(self.eigenvalue_error),
            Some(self.communality_error),
            Some(self.score_error),
            Some(self.score_equivalence_error),
            self.rotated_communality_drift,
            self.rotated_score_error,
            self.rotated_weight_identity_error,
        ]
        .into_iter()
        .flatten()
        .fold(0.0, f64::max)
    }

    pub fn is_consistent(&self, tolerance: f64) -> bool {
        self.max_deviation() <= tolerance && self.min_factor_sum >= -tolerance
    }
}

fn max_abs_diff(a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> f64 {
    Zip::from(a)
        .and(b)
        .fold(0.0, |acc, &x, &y| acc.max((x - y).abs()))
}

fn min_column_sum(matrix: &Array2<f64>) -> f64 {
    matrix
        .sum_axis(Axis(0))
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min)
}

/// Checks `result` with the default backend.
pub fn check_consistency(result: &FactorResult) -> Result<ConsistencyReport> {
    check_consistency_with(&NdarrayLinAlgBackend, result)
}

/// Checks `result`, recomputing the raw whitening scores with `backend`.
pub fn check_consistency_with<B: BackendEigh>(
    backend: &B,
    result: &FactorResult,
) -> Result<ConsistencyReport> {
    let z_inputs = result.z_inputs();
    let loadings = result.component_matrix();
    let squared = loadings.mapv(|x| x * x);

    let eigenvalue_error = Zip::from(&squared.sum_axis(Axis(0)))
        .and(result.eigenvalues())
        .fold(0.0, |acc: f64, &x, &y| acc.max((x - y).abs()));
    let communality_error = Zip::from(&squared.sum_axis(Axis(1)))
        .and(result.communalities())
        .fold(0.0, |acc: f64, &x, &y| acc.max((x - y).abs()));

    let recomputed_scores = z_inputs.dot(result.weights());
    let score_error = max_abs_diff(result.scores().view(), recomputed_scores.view());

    // Raw whitening scores straight from a fresh eigen-decomposition, before
    // any sign convention is applied.
    let decomposition = backend
        .eigh_lower(&correlation_matrix(z_inputs.view()))
        .map_err(FactorError::linalg("eigen-decomposition of the correlation matrix"))?;
    let mut order: Vec<usize> = (0..decomposition.eigenvalues.len()).collect();
    order.sort_by(|&a, &b| {
        decomposition.eigenvalues[b].total_cmp(&decomposition.eigenvalues[a])
    });
    order.truncate(result.n_factors());
    let values = decomposition.eigenvalues.select(Axis(0), &order);
    let vectors = decomposition.eigenvectors.select(Axis(1), &order);
    let raw_scores = z_inputs.dot(&(&vectors / &values.mapv(f64::sqrt)));
    let score_equivalence_error = max_abs_diff(
        raw_scores.mapv(f64::abs).view(),
        recomputed_scores.mapv(f64::abs).view(),
    );

    let mut min_factor_sum = min_column_sum(loadings);
    let mut report = ConsistencyReport {
        eigenvalue_error,
        communality_error,
        score_error,
        score_equivalence_error,
        ..ConsistencyReport::default()
    };

    if let Some(rotated) = result.rotated() {
        let rotated_loadings = rotated.component_matrix();
        min_factor_sum = min_factor_sum.min(min_column_sum(rotated_loadings));

        let total_rotated = rotated_loadings.mapv(|x| x * x).sum();
        report.rotated_communality_drift = Some((total_rotated - squared.sum()).abs());

        let rotated_recomputed = z_inputs.dot(rotated.weights());
        report.rotated_score_error = Some(max_abs_diff(
            rotated.scores().view(),
            rotated_recomputed.view(),
        ));

        let identity = Array2::<f64>::eye(rotated_loadings.ncols());
        let product = rotated.weights().t().dot(rotated_loadings);
        report.rotated_weight_identity_error =
            Some(max_abs_diff(product.view(), identity.view()));
    }
    report.min_factor_sum = min_factor_sum;

    Ok(report)
}
