//! Error types for the composable-jsdm library.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum JsdmError {
    /// Input file missing, unreadable or malformed.
    #[error("Failed to load '{path}': {reason}")]
    Load { path: String, reason: String },

    /// A transform was applied outside its valid domain.
    #[error("Domain error in column '{column}': {reason}")]
    Domain { column: String, reason: String },

    /// Inconsistent model configuration.
    #[error("Model specification error: {0}")]
    Spec(String),

    /// The fitting collaborator could not produce a usable handle.
    #[error("Fit error: {0}")]
    Fit(String),

    #[error("Missing column '{0}'")]
    MissingColumn(String),

    #[error("Formula parse error: {0}")]
    FormulaParse(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl JsdmError {
    pub(crate) fn load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Load {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn domain(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Domain {
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that indicate invalid pipeline preconditions
    /// (load, domain and specification errors).
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::Load { .. } | Self::Domain { .. } | Self::Spec(_) | Self::MissingColumn(_)
        )
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, JsdmError>;
