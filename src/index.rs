//! Composite vulnerability index built on top of a factor solution.
//!
//! The index of an entity is the unweighted sum of its factor scores (rotated
//! when a rotation was computed). Entities are ranked by the magnitude of
//! that sum, and each variable's net contribution is the sum of its score
//! weights across factors.

use float_cmp::approx_eq;
use ndarray::{Array1, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::factor::FactorResult;

/// Absolute index values this many ULPs apart share a rank.
const TIE_ULPS: i64 = 4;

/// Row sums of the index scores: one value per observation.
pub fn composite_index(result: &FactorResult) -> Array1<f64> {
    result.index_scores().sum_axis(Axis(1))
}

/// Row sums of the index weights: one value per input variable.
pub fn variable_contributions(result: &FactorResult) -> Array1<f64> {
    result.index_weights().sum_axis(Axis(1))
}

/// Ranks values by descending absolute value, 1 being the largest.
///
/// Tied values receive the mean of the ranks they occupy, so two values
/// sharing positions 2 and 3 both get 2.5. NaN values get a NaN rank and do
/// not occupy a position.
pub fn rank_by_magnitude(values: ArrayView1<'_, f64>) -> Array1<f64> {
    let mut order: Vec<usize> = (0..values.len())
        .filter(|&i| !values[i].is_nan())
        .collect();
    order.sort_by(|&a, &b| values[b].abs().total_cmp(&values[a].abs()));

    let mut ranks = Array1::from_elem(values.len(), f64::NAN);
    let mut start = 0;
    while start < order.len() {
        let lead = values[order[start]].abs();
        let mut end = start + 1;
        while end < order.len()
            && approx_eq!(f64, values[order[end]].abs(), lead, ulps = TIE_ULPS)
        {
            end += 1;
        }
        // Positions start..end hold ranks start+1 ..= end.
        let average = (start + 1 + end) as f64 / 2.0;
        for &i in &order[start..end] {
            ranks[i] = average;
        }
        start = end;
    }
    ranks
}

/// Index values, ranks and variable contributions of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityIndex {
    /// Composite index per observation.
    pub scores: Array1<f64>,
    /// Rank of each observation by `|score|`, average ranks for ties.
    pub ranks: Array1<f64>,
    /// Net weight of each variable in the index.
    pub contributions: Array1<f64>,
}

impl VulnerabilityIndex {
    pub fn from_result(result: &FactorResult) -> Self {
        let scores = composite_index(result);
        let ranks = rank_by_magnitude(scores.view());
        Self {
            scores,
            ranks,
            contributions: variable_contributions(result),
        }
    }

    /// Observation indices ordered from rank 1 downwards; NaN scores last.
    pub fn ranking(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.ranks.len()).collect();
        order.sort_by(|&a, &b| {
            let (ra, rb) = (self.ranks[a], self.ranks[b]);
            match (ra.is_nan(), rb.is_nan()) {
                (false, false) => ra.total_cmp(&rb),
                (a_nan, b_nan) => a_nan.cmp(&b_nan),
            }
        });
        order
    }
}
