//! Eigen-decomposition of the correlation matrix and the retention policy.

use log::debug;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{FactorError, Result};
use crate::linalg_backends::BackendEigh;

/// Retained eigenvalues at or below this are treated as zero. Correlation
/// eigenvalues sum to k, so an absolute bound is scale-free.
const SINGULAR_EIGENVALUE_TOLERANCE: f64 = 1e-12;

/// Which factors survive into the working spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Retention {
    /// Keep all k factors.
    All,
    /// Keep factors whose eigenvalue is strictly greater than `min_eigenvalue`.
    Kaiser { min_eigenvalue: f64 },
}

impl Retention {
    fn count(&self, sorted_eigenvalues: ArrayView1<'_, f64>) -> usize {
        match *self {
            Self::All => sorted_eigenvalues.len(),
            Self::Kaiser { min_eigenvalue } => sorted_eigenvalues
                .iter()
                .filter(|&&value| value > min_eigenvalue)
                .count(),
        }
    }
}

/// `Zᵗ·Z / n` for population z-scores, i.e. the Pearson correlation matrix.
///
/// The eigenvalues therefore sum to k. Tools that take the n−1 covariance of
/// the z-scores instead report eigenvalues n/(n−1) larger and scores
/// √((n−1)/n) smaller.
pub fn correlation_matrix(z_inputs: ArrayView2<'_, f64>) -> Array2<f64> {
    let n_obs = z_inputs.nrows() as f64;
    let mut corr = z_inputs.t().dot(&z_inputs);
    corr /= n_obs;
    // Symmetrize rounding noise so either triangle gives the same answer.
    let transposed = corr.t().to_owned();
    corr += &transposed;
    corr *= 0.5;
    corr
}

/// Full and working eigen-spectrum of a correlation matrix.
#[derive(Debug, Clone)]
pub struct Spectrum {
    all_eigenvalues: Array1<f64>,
    eigenvalues: Array1<f64>,
    eigenvectors: Array2<f64>,
}

impl Spectrum {
    /// Decomposes the correlation matrix of `z_inputs` and applies `retention`.
    ///
    /// Eigenpairs are sorted by descending eigenvalue with a stable sort, so
    /// ties keep the backend's order and every vector stays with its value.
    pub fn decompose<B: BackendEigh>(
        backend: &B,
        z_inputs: ArrayView2<'_, f64>,
        retention: Retention,
    ) -> Result<Self> {
        let corr = correlation_matrix(z_inputs);
        let decomposition = backend
            .eigh_lower(&corr)
            .map_err(FactorError::linalg("eigen-decomposition of the correlation matrix"))?;

        let mut order: Vec<usize> = (0..decomposition.eigenvalues.len()).collect();
        order.sort_by(|&a, &b| {
            decomposition.eigenvalues[b].total_cmp(&decomposition.eigenvalues[a])
        });

        let all_eigenvalues = decomposition.eigenvalues.select(Axis(0), &order);
        let all_eigenvectors = decomposition.eigenvectors.select(Axis(1), &order);

        let n_factors = retention.count(all_eigenvalues.view());
        debug!(
            "Retention {:?} keeps {} of {} factors",
            retention,
            n_factors,
            all_eigenvalues.len()
        );
        if n_factors == 0 {
            let min_eigenvalue = match retention {
                Retention::Kaiser { min_eigenvalue } => min_eigenvalue,
                Retention::All => f64::NAN,
            };
            return Err(FactorError::NoRetainedFactors {
                min_eigenvalue,
                largest: all_eigenvalues.get(0).copied().unwrap_or(f64::NAN),
            });
        }

        let eigenvalues = all_eigenvalues.slice(ndarray::s![..n_factors]).to_owned();
        if let Some((factor, &eigenvalue)) = eigenvalues
            .iter()
            .enumerate()
            .find(|(_, value)| **value <= SINGULAR_EIGENVALUE_TOLERANCE)
        {
            return Err(FactorError::SingularCorrelation { factor, eigenvalue });
        }
        let eigenvectors = all_eigenvectors.slice(ndarray::s![.., ..n_factors]).to_owned();

        Ok(Self {
            all_eigenvalues,
            eigenvalues,
            eigenvectors,
        })
    }

    /// All k eigenvalues, descending.
    pub fn all_eigenvalues(&self) -> &Array1<f64> {
        &self.all_eigenvalues
    }

    /// Retained eigenvalues, descending.
    pub fn eigenvalues(&self) -> &Array1<f64> {
        &self.eigenvalues
    }

    /// Unit eigenvectors of the retained factors, one per column.
    pub fn eigenvectors(&self) -> &Array2<f64> {
        &self.eigenvectors
    }

    pub fn n_factors(&self) -> usize {
        self.eigenvalues.len()
    }

    /// Component loadings: each eigenvector scaled by the square root of its
    /// eigenvalue, so squared loadings sum to the eigenvalue down a column.
    pub fn loadings(&self) -> Array2<f64> {
        &self.eigenvectors * &self.eigenvalues.mapv(f64::sqrt)
    }
}
