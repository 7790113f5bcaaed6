/// Errors that can occur when building, querying, or persisting an index.
#[derive(thiserror::Error, Debug)]
pub enum LpqError {
    /// Returned when coordinate counts, group widths, or row counts do not line up.
    #[error("invalid dimension: {0}")]
    InvalidDimension(String),
    /// Returned for an unknown metric name, or a metric the operation cannot use.
    #[error("unsupported metric: {0}")]
    UnsupportedMetric(String),
    /// Returned when a query is issued before `fit` or `load_index`.
    #[error("index is not fitted; call `fit` or `load_index` first")]
    NotFitted,
    /// Returned when an invalid configuration or search parameter is supplied.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Returned when persistence encounters an I/O failure.
    #[error("i/o error while reading or writing an index: {0}")]
    Io(#[from] std::io::Error),
    /// Returned when the persisted bytes are inconsistent or corrupt.
    #[error("invalid persisted index: {0}")]
    InvalidPersistence(&'static str),
    /// Returned when the worker pool for a batch search cannot be created.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, LpqError>;
