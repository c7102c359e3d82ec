use crate::worker::WorkerId;

/// All errors that can occur within shoal.
///
/// Every variant is raised synchronously by the call that violates its
/// contract. Iterating over a loader never produces one of these: a pass
/// either yields batches or ends.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid construction input: a zero batch size, an empty shard list,
    /// a worker registered twice, and similar.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A lookup named a worker the federated dataset does not hold.
    #[error("worker not found: {worker}")]
    NotFound { worker: WorkerId },

    /// Features and labels disagree on the number of samples.
    #[error("sample count mismatch: {features} feature rows, {labels} label rows")]
    SampleCountMismatch { features: usize, labels: usize },
}

impl Error {
    /// Create a configuration error.
    pub fn config(s: impl Into<String>) -> Self {
        Error::Configuration(s.into())
    }

    /// Whether this error belongs to the configuration class.
    ///
    /// A feature/label count mismatch is a malformed construction input, so
    /// it counts as a configuration failure too.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_) | Error::SampleCountMismatch { .. }
        )
    }

    /// Whether this error is a failed worker lookup.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

/// Convenience Result type used throughout shoal.
pub type Result<T> = std::result::Result<T, Error>;

/// Early return with a formatted configuration error.
/// Usage: `bail_config!("batch_size must be >= 1, got {}", bs)`
#[macro_export]
macro_rules! bail_config {
    ($($arg:tt)*) => {
        return Err($crate::Error::Configuration(format!($($arg)*)))
    };
}
