//! Common errors across the ncagg-rs crate.
use std::path::{Path, PathBuf};

pub type AggResult<T> = Result<T, AggError>;

/// Possible errors while planning or evaluating an aggregation.
///
/// Most error types have a similarly named associated function
/// that creates it with some generics to make it more convenient
/// to use.
#[derive(Debug, thiserror::Error)]
pub enum AggError {
    /// The product configuration is malformed: bad references, bad
    /// strategy names, bad bound expressions, or invalid JSON. Raised
    /// before any data I/O happens.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A granule's schema contradicts the configuration, e.g. a fixed
    /// dimension with a different size or a variable with a different
    /// datatype.
    #[error("Schema mismatch in {}: {reason}", .path.display())]
    SchemaMismatch { path: PathBuf, reason: String },

    /// The `index_by` variable for an unlimited dimension could not be
    /// projected to sortable numeric values.
    #[error("Index variable '{variable}' in {} cannot be projected to numeric values", .path.display())]
    IndexVarNonNumeric { path: PathBuf, variable: String },

    /// The input file list was empty.
    #[error("No input granules were given")]
    NoInputs,

    /// A global attribute using the `constant` strategy changed between
    /// granules.
    #[error("Global attribute '{name}' uses the 'constant' strategy but {} has a different value than earlier inputs", .path.display())]
    AttrNotConstant { name: String, path: PathBuf },

    /// A failure in the underlying reader or writer.
    #[error("I/O error on {}: {reason}", .path.display())]
    Io { path: PathBuf, reason: String },

    /// The aggregation was cancelled cooperatively. The partial output
    /// is discarded.
    #[error("Aggregation cancelled")]
    Cancelled,

    /// An invariant inside the engine was violated.
    #[error("Internal aggregation error: {0} (this is a bug)")]
    Internal(String),
}

impl AggError {
    pub fn config_invalid<S: Into<String>>(reason: S) -> Self {
        Self::ConfigInvalid(reason.into())
    }

    pub fn schema_mismatch<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        Self::SchemaMismatch {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn index_var_non_numeric<P: Into<PathBuf>, S: Into<String>>(path: P, variable: S) -> Self {
        Self::IndexVarNonNumeric {
            path: path.into(),
            variable: variable.into(),
        }
    }

    pub fn attr_not_constant<S: Into<String>, P: Into<PathBuf>>(name: S, path: P) -> Self {
        Self::AttrNotConstant {
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn io<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        Self::Io {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn io_from<P: AsRef<Path>>(path: P, err: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            reason: err.to_string(),
        }
    }

    pub fn internal<S: Into<String>>(reason: S) -> Self {
        Self::Internal(reason.into())
    }
}
