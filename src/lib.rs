// SPSS-style principal component analysis for composite indices

#![doc = include_str!("../README.md")]

pub mod diagnostics;
pub mod error;
pub mod factor;
pub mod index;
pub mod linalg_backends;
pub mod reflection;
pub mod spectrum;
pub mod standardize;
pub mod subsets;
pub mod varimax;

pub use error::{FactorError, Result};
pub use factor::{run_factor_analysis, FactorAnalysis, FactorConfig, FactorResult, RotatedSolution};
pub use index::{composite_index, rank_by_magnitude, variable_contributions, VulnerabilityIndex};
pub use subsets::{analyze_subsets, SubsetIndex};
pub use varimax::{VarimaxConfig, VarimaxConvergence};

#[cfg(test)]
mod factor_tests;
