use std::path::{Path, PathBuf};

/// Failure surfaces of the `ncagg` command line, one per stage a run
/// can die in. The aggregation engine reports its own errors below
/// these in the chain.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// The command line itself was inconsistent.
    #[error("{0}")]
    Usage(String),

    #[error("Could not load the product configuration from {}", .0.display())]
    Config(PathBuf),

    #[error("Could not derive a configuration from sample granule {}", .0.display())]
    Sample(PathBuf),

    #[error("Could not gather input granules under {}", .0.display())]
    Discovery(PathBuf),

    #[error("Could not render the derived configuration as JSON")]
    TemplateRender,

    #[error("Could not write the configuration template to {}", .0.display())]
    Template(PathBuf),

    #[error("Aggregation into {} did not complete", .0.display())]
    Aggregation(PathBuf),
}

impl CliError {
    pub(crate) fn usage<S: ToString>(msg: S) -> Self {
        Self::Usage(msg.to_string())
    }

    pub(crate) fn config<P: AsRef<Path>>(path: P) -> Self {
        Self::Config(path.as_ref().to_path_buf())
    }

    pub(crate) fn sample<P: AsRef<Path>>(path: P) -> Self {
        Self::Sample(path.as_ref().to_path_buf())
    }

    pub(crate) fn discovery<P: AsRef<Path>>(path: P) -> Self {
        Self::Discovery(path.as_ref().to_path_buf())
    }

    pub(crate) fn template<P: AsRef<Path>>(path: P) -> Self {
        Self::Template(path.as_ref().to_path_buf())
    }

    pub(crate) fn aggregation<P: AsRef<Path>>(path: P) -> Self {
        Self::Aggregation(path.as_ref().to_path_buf())
    }
}
