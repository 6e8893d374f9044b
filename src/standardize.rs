//! Column-wise z-scoring of the observation matrix.

use ndarray::{Array2, ArrayView2, Axis};

use crate::error::{FactorError, Result};

/// Relative threshold below which a column's standard deviation counts as zero.
const CONSTANT_COLUMN_TOLERANCE: f64 = 1e-12;

/// Checks the shape and contents of an observation matrix (rows = observations,
/// columns = variables) before any arithmetic is done on it.
pub fn validate_inputs(inputs: ArrayView2<'_, f64>) -> Result<()> {
    let (n_obs, n_vars) = inputs.dim();
    if n_obs == 0 || n_vars == 0 {
        return Err(FactorError::EmptyInput {
            observations: n_obs,
            variables: n_vars,
        });
    }
    if n_vars < 2 {
        return Err(FactorError::TooFewVariables { variables: n_vars });
    }
    if n_obs <= n_vars {
        return Err(FactorError::TooFewObservations {
            observations: n_obs,
            variables: n_vars,
        });
    }
    if let Some(((row, column), &value)) = inputs.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(FactorError::NonFiniteValue { row, column, value });
    }
    Ok(())
}

/// Population z-scores of every column.
///
/// Uses the population standard deviation (ddof = 0), so `Zᵗ·Z / n` is the
/// correlation matrix of the inputs. Constant columns are rejected instead of
/// producing NaN.
pub fn standardize(inputs: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
    validate_inputs(inputs)?;

    let mean_vector = inputs
        .mean_axis(Axis(0))
        .ok_or(FactorError::EmptyInput {
            observations: inputs.nrows(),
            variables: inputs.ncols(),
        })?;
    let mut z_inputs = &inputs - &mean_vector;

    let std_dev_vector = z_inputs.map_axis(Axis(0), |column| column.std(0.0));
    for (column, (&std_dev, &mean)) in std_dev_vector.iter().zip(mean_vector.iter()).enumerate() {
        if std_dev <= CONSTANT_COLUMN_TOLERANCE * mean.abs().max(1.0) {
            return Err(FactorError::ConstantColumn { column, std_dev });
        }
    }

    z_inputs /= &std_dev_vector;
    Ok(z_inputs)
}
