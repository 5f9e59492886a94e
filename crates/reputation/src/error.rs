use filsync_interfaces::DatastoreError;

/// Result alias for [`ReputationError`].
pub type ReputationResult<T> = Result<T, ReputationError>;

/// Errors of the reputation engine.
#[derive(Debug, thiserror::Error)]
pub enum ReputationError {
    /// More top miners were requested than are ranked.
    #[error("requested the top {requested} miners but only {available} are ranked")]
    NotEnoughMiners {
        /// Number of miners requested.
        requested: usize,
        /// Number of miners in the score table.
        available: usize,
    },
    /// A source id must be a non-empty single key segment.
    #[error("invalid source id {0:?}")]
    InvalidSourceId(String),
    /// A source with the same id is already registered.
    #[error("source {0} is already registered")]
    DuplicateSource(String),
    /// Source weights must lie in `[0, 1]`.
    #[error("source weight {0} is outside of [0, 1]")]
    InvalidWeight(f64),
    /// The datastore failed.
    #[error(transparent)]
    Datastore(#[from] DatastoreError),
}
