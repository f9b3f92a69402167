//! Error taxonomy shared by the registry, associations, endpoints and elements.

use crate::data_plane::message::AssociationId;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MuxError {
    /// The registry already holds `limit` associations.
    #[error("association table at capacity ({limit} associations)")]
    ResourceExhausted { limit: usize },

    /// Release or lookup on an id nothing is bound to.
    #[error("association {0} is not bound")]
    NotFound(AssociationId),

    /// The association has been torn down.
    #[error("association {0} is closed")]
    Closed(AssociationId),

    /// A consumer wait expired without data.
    #[error("no data within {0:?}")]
    Timeout(Duration),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// A worker thread or runtime could not be started.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl MuxError {
    /// Outcomes a well-behaved caller runs into during normal operation.
    pub fn is_expected(&self) -> bool {
        matches!(self, MuxError::Timeout(_) | MuxError::Closed(_))
    }
}

pub type Result<T> = std::result::Result<T, MuxError>;
