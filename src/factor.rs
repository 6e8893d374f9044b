//! The factor engine: correlation-matrix PCA with SPSS conventions.
//!
//! One call standardizes the inputs, decomposes their correlation matrix,
//! optionally drops factors by the Kaiser criterion, reflects signs, and
//! optionally applies a Kaiser-normalized varimax rotation. The engine keeps
//! no state between calls.

use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{FactorError, Result};
use crate::linalg_backends::{BackendEigh, BackendSVD, NdarrayLinAlgBackend};
use crate::reflection::reflect_columns;
use crate::spectrum::{Retention, Spectrum};
use crate::standardize::standardize;
use crate::varimax::{kaiser_varimax, VarimaxConfig, VarimaxConvergence};

/// Smallest accepted ratio between the extreme eigenvalues of `LᵗL` when
/// forming rotated score weights.
const RANK_TOLERANCE: f64 = 1e-10;

/// Parameters of one engine call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorConfig {
    /// Keep only factors whose eigenvalue exceeds `min_eigenvalue`.
    pub reduce: bool,
    /// Kaiser threshold; ignored unless `reduce` is set.
    pub min_eigenvalue: f64,
    /// Compute the varimax-rotated solution as well.
    pub varimax: bool,
    /// Stopping rule for the rotation.
    pub rotation: VarimaxConfig,
}

impl Default for FactorConfig {
    fn default() -> Self {
        Self {
            reduce: false,
            min_eigenvalue: 1.0,
            varimax: false,
            rotation: VarimaxConfig::default(),
        }
    }
}

impl FactorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables Kaiser reduction with the given threshold.
    pub fn with_reduction(mut self, min_eigenvalue: f64) -> Self {
        self.reduce = true;
        self.min_eigenvalue = min_eigenvalue;
        self
    }

    pub fn with_varimax(mut self, enabled: bool) -> Self {
        self.varimax = enabled;
        self
    }

    pub fn with_rotation(mut self, rotation: VarimaxConfig) -> Self {
        self.rotation = rotation;
        self
    }

    /// The recipe used for composite vulnerability indices: Kaiser reduction
    /// at 1.0 followed by varimax.
    pub fn sovi() -> Self {
        Self::default().with_reduction(1.0).with_varimax(true)
    }

    pub fn retention(&self) -> Retention {
        if self.reduce {
            Retention::Kaiser {
                min_eigenvalue: self.min_eigenvalue,
            }
        } else {
            Retention::All
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.reduce && !self.min_eigenvalue.is_finite() {
            return Err(FactorError::InvalidConfig(format!(
                "min_eigenvalue must be finite, got {}",
                self.min_eigenvalue
            )));
        }
        if self.varimax {
            self.rotation.validate()?;
        }
        Ok(())
    }
}

/// Varimax-rotated loadings, weights and scores, with factors ordered by
/// descending sum of squared loadings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotatedSolution {
    component_matrix: Array2<f64>,
    scores: Array2<f64>,
    weights: Array2<f64>,
    sum_sq_loadings: Array1<f64>,
    convergence: VarimaxConvergence,
}

impl RotatedSolution {
    /// Rotated, reordered and reflected loadings (k × m).
    pub fn component_matrix(&self) -> &Array2<f64> {
        &self.component_matrix
    }

    /// Rotated factor scores (n × m).
    pub fn scores(&self) -> &Array2<f64> {
        &self.scores
    }

    /// `L·(LᵗL)⁻¹`, mapping z-scores onto the rotated scores (k × m).
    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    /// Variance explained by each rotated factor, descending.
    pub fn sum_sq_loadings(&self) -> &Array1<f64> {
        &self.sum_sq_loadings
    }

    pub fn convergence(&self) -> &VarimaxConvergence {
        &self.convergence
    }
}

/// Everything one engine call produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorResult {
    z_inputs: Array2<f64>,
    component_matrix: Array2<f64>,
    scores: Array2<f64>,
    eigenvalues_all: Array1<f64>,
    eigenvalues: Array1<f64>,
    weights: Array2<f64>,
    communalities: Array1<f64>,
    sum_sq_loadings: Array1<f64>,
    rotated: Option<RotatedSolution>,
}

impl FactorResult {
    /// Population z-scores of the inputs (n × k).
    pub fn z_inputs(&self) -> &Array2<f64> {
        &self.z_inputs
    }

    /// Reflected unrotated loadings (k × m).
    pub fn component_matrix(&self) -> &Array2<f64> {
        &self.component_matrix
    }

    /// Unrotated factor scores, `Z · weights` (n × m).
    pub fn scores(&self) -> &Array2<f64> {
        &self.scores
    }

    /// All k eigenvalues of the correlation matrix, descending.
    pub fn eigenvalues_all(&self) -> &Array1<f64> {
        &self.eigenvalues_all
    }

    /// Eigenvalues of the retained factors, descending.
    pub fn eigenvalues(&self) -> &Array1<f64> {
        &self.eigenvalues
    }

    /// Component score coefficients: loadings divided by their eigenvalue (k × m).
    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    /// Per-variable sum of squared loadings over the retained factors.
    pub fn communalities(&self) -> &Array1<f64> {
        &self.communalities
    }

    /// Per-factor sum of squared loadings; equals the retained eigenvalues.
    pub fn sum_sq_loadings(&self) -> &Array1<f64> {
        &self.sum_sq_loadings
    }

    /// The rotated solution, present only when varimax was requested.
    pub fn rotated(&self) -> Option<&RotatedSolution> {
        self.rotated.as_ref()
    }

    pub fn n_observations(&self) -> usize {
        self.z_inputs.nrows()
    }

    pub fn n_variables(&self) -> usize {
        self.z_inputs.ncols()
    }

    pub fn n_factors(&self) -> usize {
        self.eigenvalues.len()
    }

    /// Fraction of total standardized variance carried by each retained factor.
    pub fn variance_explained(&self) -> Array1<f64> {
        &self.sum_sq_loadings / self.n_variables() as f64
    }

    /// Scores that feed the composite index: rotated when available.
    pub fn index_scores(&self) -> &Array2<f64> {
        self.rotated
            .as_ref()
            .map_or(&self.scores, |rotated| &rotated.scores)
    }

    /// Weights matching [`index_scores`](Self::index_scores).
    pub fn index_weights(&self) -> &Array2<f64> {
        self.rotated
            .as_ref()
            .map_or(&self.weights, |rotated| &rotated.weights)
    }
}

/// Runs the factor analysis with a fixed configuration.
#[derive(Debug, Clone)]
pub struct FactorAnalysis<B = NdarrayLinAlgBackend> {
    config: FactorConfig,
    backend: B,
}

impl FactorAnalysis<NdarrayLinAlgBackend> {
    pub fn new(config: FactorConfig) -> Self {
        Self {
            config,
            backend: NdarrayLinAlgBackend,
        }
    }
}

impl<B: BackendEigh + BackendSVD> FactorAnalysis<B> {
    pub fn with_backend(config: FactorConfig, backend: B) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &FactorConfig {
        &self.config
    }

    /// Computes the factor solution for `inputs` (observations × variables).
    ///
    /// # Errors
    /// Input validation failures (empty, n ≤ k, non-finite or constant
    /// columns), an invalid configuration, no factor passing the Kaiser
    /// threshold, a singular correlation matrix, a zero communality before
    /// rotation, rank-deficient rotated loadings, or a backend failure.
    pub fn run(&self, inputs: ArrayView2<'_, f64>) -> Result<FactorResult> {
        self.config.validate()?;
        let (n_obs, n_vars) = inputs.dim();
        info!(
            "Factor analysis on {} observations x {} variables (reduce: {}, varimax: {})",
            n_obs, n_vars, self.config.reduce, self.config.varimax
        );

        let z_inputs = standardize(inputs)?;
        let spectrum = Spectrum::decompose(&self.backend, z_inputs.view(), self.config.retention())?;
        let eigenvalues = spectrum.eigenvalues().clone();

        let mut component_matrix = spectrum.loadings();
        let signs = reflect_columns(&mut component_matrix);
        let flipped: Vec<usize> = signs
            .iter()
            .enumerate()
            .filter(|(_, sign)| **sign < 0.0)
            .map(|(factor, _)| factor)
            .collect();
        debug!("Reflected unrotated factors {:?}", flipped);

        let squared = component_matrix.mapv(|x| x * x);
        let communalities = squared.sum_axis(Axis(1));
        let sum_sq_loadings = squared.sum_axis(Axis(0));
        let weights = &component_matrix / &eigenvalues;
        let scores = z_inputs.dot(&weights);

        let rotated = if self.config.varimax {
            Some(self.rotate(z_inputs.view(), &component_matrix, &communalities)?)
        } else {
            None
        };

        info!(
            "Retained {} of {} factors explaining {:.1}% of variance",
            eigenvalues.len(),
            n_vars,
            100.0 * eigenvalues.sum() / n_vars as f64
        );

        Ok(FactorResult {
            z_inputs,
            component_matrix,
            scores,
            eigenvalues_all: spectrum.all_eigenvalues().clone(),
            eigenvalues,
            weights,
            communalities,
            sum_sq_loadings,
            rotated,
        })
    }

    fn rotate(
        &self,
        z_inputs: ArrayView2<'_, f64>,
        loadings: &Array2<f64>,
        communalities: &Array1<f64>,
    ) -> Result<RotatedSolution> {
        let (rotated, convergence) = kaiser_varimax(
            &self.backend,
            loadings.view(),
            communalities.view(),
            &self.config.rotation,
        )?;

        let column_ss = rotated.mapv(|x| x * x).sum_axis(Axis(0));
        let mut order: Vec<usize> = (0..column_ss.len()).collect();
        // Stable, so equal variances keep their unrotated order.
        order.sort_by(|&a, &b| column_ss[b].total_cmp(&column_ss[a]));
        debug!("Rotated factor order {:?}", order);

        let sum_sq_loadings = column_ss.select(Axis(0), &order);
        let mut component_matrix = rotated.select(Axis(1), &order);
        reflect_columns(&mut component_matrix);

        let weights = projection_weights(&self.backend, component_matrix.view())?;
        let scores = z_inputs.dot(&weights);

        Ok(RotatedSolution {
            component_matrix,
            scores,
            weights,
            sum_sq_loadings,
            convergence,
        })
    }
}

/// Runs one factor analysis with the default LAPACK backend.
///
/// # Examples
///
/// ```
/// use ndarray::array;
/// use sovi_pca::{run_factor_analysis, FactorConfig};
///
/// let inputs = array![
///     [1.0, 2.0, 0.5],
///     [2.0, 3.5, 1.0],
///     [3.0, 3.0, 2.5],
///     [4.0, 5.5, 2.0],
///     [5.0, 6.0, 4.0],
/// ];
/// let result = run_factor_analysis(inputs.view(), &FactorConfig::sovi()).unwrap();
/// assert!(result.rotated().is_some());
/// ```
pub fn run_factor_analysis(inputs: ArrayView2<'_, f64>, config: &FactorConfig) -> Result<FactorResult> {
    FactorAnalysis::new(config.clone()).run(inputs)
}

/// Score weights `L·(LᵗL)⁻¹` for a loadings matrix `L` (k × m).
///
/// `LᵗL` is inverted through its eigen-decomposition. If its smallest
/// eigenvalue is not positive, or is below `1e-10` times the largest, the
/// loadings are rank deficient and the call fails.
pub fn projection_weights<B: BackendEigh>(backend: &B, loadings: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
    let gram = loadings.t().dot(&loadings);
    let decomposition = backend
        .eigh_lower(&gram)
        .map_err(FactorError::linalg("eigen-decomposition of LᵗL"))?;

    let values = &decomposition.eigenvalues;
    let smallest = values.iter().copied().fold(f64::INFINITY, f64::min);
    let largest = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(smallest > 0.0) || smallest < RANK_TOLERANCE * largest {
        return Err(FactorError::RankDeficient { smallest, largest });
    }

    let vectors = &decomposition.eigenvectors;
    let inverse = (vectors / values).dot(&vectors.t());
    Ok(loadings.dot(&inverse))
}
