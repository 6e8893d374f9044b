//! Orthogonal varimax rotation with Kaiser row normalization.

use log::{debug, trace, warn};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{FactorError, Result};
use crate::linalg_backends::BackendSVD;

/// Orthomax parameter; 1.0 is varimax.
const GAMMA: f64 = 1.0;

/// Stopping rule for the varimax iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VarimaxConfig {
    /// Upper bound on SVD updates of the rotation matrix.
    pub max_iterations: usize,
    /// Stop once the criterion grows by a relative amount smaller than this.
    pub tolerance: f64,
}

impl Default for VarimaxConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-6,
        }
    }
}

impl VarimaxConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(FactorError::InvalidConfig(
                "varimax max_iterations must be at least 1".to_string(),
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(FactorError::InvalidConfig(format!(
                "varimax tolerance must be positive and finite, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// How the iteration ended. Hitting the cap is reported here, not as an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VarimaxConvergence {
    pub converged: bool,
    pub iterations: usize,
    /// Sum of singular values at the last update.
    pub criterion: f64,
}

/// Output of [`varimax`].
#[derive(Debug, Clone)]
pub struct VarimaxRotation {
    /// `phi · rotation`
    pub rotated: Array2<f64>,
    /// Orthogonal m×m rotation matrix.
    pub rotation: Array2<f64>,
    pub convergence: VarimaxConvergence,
}

/// Rotates `phi` (variables × factors) towards simple structure.
///
/// Each pass computes the gradient `Φᵗ(Λ³ − (γ/p)·Λ·diag(ΛᵗΛ))` with
/// `Λ = Φ·R` and replaces `R` by the orthogonal factor `U·Vᵗ` of its SVD.
/// The loop stops when the sum of singular values grows by less than
/// `tolerance` relative to the previous pass, or after `max_iterations`
/// passes. When the cap is hit, the rotation with the largest varimax
/// objective seen so far is returned; the identity counts as a candidate. A
/// single factor is returned unrotated.
pub fn varimax<B: BackendSVD>(
    backend: &B,
    phi: ArrayView2<'_, f64>,
    config: &VarimaxConfig,
) -> Result<VarimaxRotation> {
    config.validate()?;
    let (n_vars, n_factors) = phi.dim();

    let mut rotation = Array2::<f64>::eye(n_factors);
    if n_factors < 2 {
        // A single factor has nothing to rotate against.
        debug!("Varimax skipped for {} factor(s)", n_factors);
        return Ok(VarimaxRotation {
            rotated: phi.to_owned(),
            rotation,
            convergence: VarimaxConvergence {
                converged: true,
                iterations: 0,
                criterion: 0.0,
            },
        });
    }

    let mut criterion = 0.0;
    let mut converged = false;
    let mut iterations = 0;
    let mut best_objective = varimax_objective(phi.view(), n_vars);
    let mut best_rotation = rotation.clone();

    for iteration in 0..config.max_iterations {
        iterations = iteration + 1;
        let previous = criterion;

        let lambda = phi.dot(&rotation);
        let column_ss = lambda.mapv(|x| x * x).sum_axis(Axis(0));
        let target =
            lambda.mapv(|x| x.powi(3)) - &(&lambda * &column_ss) * (GAMMA / n_vars as f64);
        let gradient = phi.t().dot(&target);

        let svd = backend
            .svd_into(gradient, true, true)
            .map_err(FactorError::linalg("SVD of the varimax gradient"))?;
        let u = svd
            .u
            .ok_or_else(|| missing_vectors("left singular vectors"))?;
        let vt = svd
            .vt
            .ok_or_else(|| missing_vectors("right singular vectors"))?;
        rotation = u.dot(&vt);
        criterion = svd.s.sum();
        let objective = varimax_objective(phi.dot(&rotation).view(), n_vars);
        trace!(
            "varimax pass {}: criterion {:.12}, objective {:.12}",
            iterations, criterion, objective
        );
        if objective > best_objective {
            best_objective = objective;
            best_rotation.assign(&rotation);
        }

        if previous != 0.0 && criterion / previous < 1.0 + config.tolerance {
            converged = true;
            break;
        }
    }

    if converged {
        debug!("Varimax converged after {} passes", iterations);
    } else {
        warn!(
            "Varimax did not converge within {} passes (tolerance {}); using the best rotation (objective {:.12})",
            config.max_iterations, config.tolerance, best_objective
        );
        rotation = best_rotation;
    }

    Ok(VarimaxRotation {
        rotated: phi.dot(&rotation),
        rotation,
        convergence: VarimaxConvergence {
            converged,
            iterations,
            criterion,
        },
    })
}

/// Orthomax objective `Σⱼ [Σᵢ λᵢⱼ⁴ − (γ/p)(Σᵢ λᵢⱼ²)²]` of a loadings matrix.
pub fn varimax_objective(lambda: ArrayView2<'_, f64>, n_vars: usize) -> f64 {
    let quartic = lambda.mapv(|x| x.powi(4)).sum();
    let column_ss = lambda.mapv(|x| x * x).sum_axis(Axis(0));
    quartic - GAMMA / n_vars as f64 * column_ss.mapv(|x| x * x).sum()
}

fn missing_vectors(which: &str) -> FactorError {
    FactorError::Linalg {
        operation: "SVD of the varimax gradient",
        source: format!("backend returned no {}", which).into(),
    }
}

/// Varimax with Kaiser normalization: rows are scaled to unit length by
/// `sqrt(communality)`, rotated, then scaled back.
pub fn kaiser_varimax<B: BackendSVD>(
    backend: &B,
    loadings: ArrayView2<'_, f64>,
    communalities: ArrayView1<'_, f64>,
    config: &VarimaxConfig,
) -> Result<(Array2<f64>, VarimaxConvergence)> {
    if loadings.nrows() != communalities.len() {
        return Err(FactorError::DimensionMismatch {
            expected: loadings.nrows(),
            actual: communalities.len(),
        });
    }
    if let Some((variable, &communality)) = communalities
        .iter()
        .enumerate()
        .find(|(_, value)| !(**value > 0.0))
    {
        return Err(FactorError::ZeroCommunality {
            variable,
            communality,
        });
    }

    let row_norms: Array2<f64> = communalities.mapv(f64::sqrt).insert_axis(Axis(1));
    let normalized = &loadings / &row_norms;

    let result = varimax(backend, normalized.view(), config)?;
    Ok((result.rotated * &row_norms, result.convergence))
}
