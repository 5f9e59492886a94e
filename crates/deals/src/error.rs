use filsync_interfaces::{ChainError, DatastoreError};

/// Result alias for [`DealsError`].
pub type DealsResult<T> = Result<T, DealsError>;

/// Errors of the deal services.
#[derive(Debug, thiserror::Error)]
pub enum DealsError {
    /// A watch was requested without any proposal.
    #[error("no deal proposals to watch")]
    NoProposals,
    /// The chain client failed.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// The datastore failed.
    #[error(transparent)]
    Datastore(#[from] DatastoreError),
    /// Data could not be spooled to a temporary file before importing it.
    #[error("failed to spool data for import: {0}")]
    Spool(#[from] std::io::Error),
}
