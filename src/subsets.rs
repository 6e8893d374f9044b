//! Independent analyses over labelled subsets of the observations.
//!
//! Each label (a region, a state, ...) gets its own engine call on the rows
//! carrying that label. Calls share nothing and run in parallel.

use std::collections::BTreeMap;
use std::fmt::Debug;

use log::info;
use ndarray::{ArrayView2, Axis};
use rayon::prelude::*;

use crate::error::{FactorError, Result};
use crate::factor::{run_factor_analysis, FactorConfig, FactorResult};
use crate::index::VulnerabilityIndex;

/// Result of one subset's analysis.
#[derive(Debug, Clone)]
pub struct SubsetIndex<K> {
    pub label: K,
    /// Positions of the subset's observations in the full input matrix.
    pub rows: Vec<usize>,
    pub result: FactorResult,
    pub index: VulnerabilityIndex,
}

/// Groups row positions by label, ordered by label.
pub fn partition_rows<K: Ord + Clone>(labels: &[K]) -> BTreeMap<K, Vec<usize>> {
    let mut partitions: BTreeMap<K, Vec<usize>> = BTreeMap::new();
    for (row, label) in labels.iter().enumerate() {
        partitions.entry(label.clone()).or_default().push(row);
    }
    partitions
}

/// Runs one factor analysis per distinct label.
///
/// `labels[i]` is the label of row `i` of `inputs`. Output is ordered by
/// label. If any subset fails, the whole call fails with that subset's label.
pub fn analyze_subsets<K>(
    inputs: ArrayView2<'_, f64>,
    labels: &[K],
    config: &FactorConfig,
) -> Result<Vec<SubsetIndex<K>>>
where
    K: Ord + Clone + Debug + Send + Sync,
{
    if labels.len() != inputs.nrows() {
        return Err(FactorError::DimensionMismatch {
            expected: inputs.nrows(),
            actual: labels.len(),
        });
    }
    config.validate()?;

    let partitions: Vec<(K, Vec<usize>)> = partition_rows(labels).into_iter().collect();
    info!("Analyzing {} subsets in parallel", partitions.len());

    partitions
        .into_par_iter()
        .map(|(label, rows)| {
            let subset = inputs.select(Axis(0), &rows);
            match run_factor_analysis(subset.view(), config) {
                Ok(result) => {
                    let index = VulnerabilityIndex::from_result(&result);
                    Ok(SubsetIndex {
                        label,
                        rows,
                        result,
                        index,
                    })
                }
                Err(source) => Err(FactorError::Subset {
                    label: format!("{:?}", label),
                    source: Box::new(source),
                }),
            }
        })
        .collect()
}
