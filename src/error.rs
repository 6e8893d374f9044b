//! Error types for the factor engine.

use thiserror::Error;

/// Boxed error returned by the linear algebra backends.
pub type ThreadSafeStdError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for factor engine operations.
pub type Result<T> = std::result::Result<T, FactorError>;

/// Errors that can occur while computing a factor solution.
///
/// A call either returns a complete result or one of these; there is no
/// partial result.
#[derive(Debug, Error)]
pub enum FactorError {
    /// The observation matrix has no rows or no columns.
    #[error("Input matrix is empty ({observations} observations x {variables} variables)")]
    EmptyInput {
        /// Number of rows supplied
        observations: usize,
        /// Number of columns supplied
        variables: usize,
    },

    /// Fewer than two variables were supplied.
    #[error("At least 2 variables are required, got {variables}")]
    TooFewVariables {
        /// Number of columns supplied
        variables: usize,
    },

    /// The correlation matrix is not well posed unless n > k.
    #[error("More observations than variables are required: {observations} observations for {variables} variables")]
    TooFewObservations {
        /// Number of rows supplied
        observations: usize,
        /// Number of columns supplied
        variables: usize,
    },

    /// NaN or infinite cell in the input.
    #[error("Non-finite value {value} at row {row}, column {column}")]
    NonFiniteValue {
        /// Row of the offending cell
        row: usize,
        /// Column of the offending cell
        column: usize,
        /// The offending value
        value: f64,
    },

    /// A column has zero variance and cannot be z-scored.
    #[error("Column {column} is constant (standard deviation {std_dev}); remove it before the analysis")]
    ConstantColumn {
        /// Index of the constant column
        column: usize,
        /// Population standard deviation that was computed
        std_dev: f64,
    },

    /// Two related inputs disagree in length.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected length
        expected: usize,
        /// Supplied length
        actual: usize,
    },

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The Kaiser criterion rejected every factor.
    #[error("No eigenvalue exceeds the retention threshold {min_eigenvalue} (largest is {largest})")]
    NoRetainedFactors {
        /// Threshold in effect
        min_eigenvalue: f64,
        /// Largest eigenvalue of the correlation matrix
        largest: f64,
    },

    /// A retained eigenvalue is zero or negative, so its weights are undefined.
    #[error("Correlation matrix is singular: retained factor {factor} has eigenvalue {eigenvalue}")]
    SingularCorrelation {
        /// Zero-based factor index
        factor: usize,
        /// The non-positive eigenvalue
        eigenvalue: f64,
    },

    /// A variable has no variance explained by the retained factors.
    #[error("Variable {variable} has communality {communality}; Kaiser normalization is undefined")]
    ZeroCommunality {
        /// Zero-based variable index
        variable: usize,
        /// The communality that was computed
        communality: f64,
    },

    /// `LᵗL` cannot be inverted for the rotated score weights.
    #[error("Rotated loadings are rank deficient (eigenvalues of LᵗL range from {smallest} to {largest})")]
    RankDeficient {
        /// Smallest eigenvalue of the Gram matrix
        smallest: f64,
        /// Largest eigenvalue of the Gram matrix
        largest: f64,
    },

    /// A backend decomposition failed.
    #[error("Linear algebra failure during {operation}: {source}")]
    Linalg {
        /// Which decomposition was running
        operation: &'static str,
        /// Backend error
        #[source]
        source: ThreadSafeStdError,
    },

    /// One subset of a partitioned analysis failed.
    #[error("Analysis of subset {label} failed: {source}")]
    Subset {
        /// Debug rendering of the subset label
        label: String,
        /// Underlying failure
        #[source]
        source: Box<FactorError>,
    },
}

impl FactorError {
    pub(crate) fn linalg(operation: &'static str) -> impl FnOnce(ThreadSafeStdError) -> Self {
        move |source| Self::Linalg { operation, source }
    }
}
