use thiserror::Error;

use crate::channel::ChannelError;

/// Errors raised while locating points or exchanging located values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocatorError {
    /// A message to or from the partner failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// A buffer or message holds the wrong number of values.
    #[error("{what}: expected {expected} values, found {found}")]
    CountMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// The partner claimed a point this rank never offered an element for.
    #[error("rank {rank} claimed point {point}, which has no local element")]
    InvalidClaim { rank: usize, point: usize },
}
