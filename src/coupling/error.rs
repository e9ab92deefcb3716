use thiserror::Error;

use crate::{channel::ChannelError, locator::LocatorError};

/// Errors raised by coupling setup and field exchanges.
///
/// Every variant is fatal to the run. The caller decides how to stop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouplingError {
    /// Neither face nor cell selection criteria were given.
    #[error("coupling needs face or cell selection criteria")]
    NoSelection,

    /// Selection criteria matched no element on any rank.
    #[error("selection criteria {criteria:?} match no element")]
    EmptySelection { criteria: String },

    /// The partner requested an incompatible coupling type.
    #[error("incompatible coupling types: local {local:?}, partner {remote:?}")]
    Negotiation { local: String, remote: String },

    /// Some local query points were not found on the partner.
    #[error("{n_exterior} point(s) of mesh {mesh:?} were not located on the partner")]
    NotLocated { n_exterior: usize, mesh: String },

    /// The partner sent something other than the expected token.
    #[error("unexpected message from partner: {received:?}")]
    UnexpectedMessage { received: String },

    /// An operation was called before its prerequisite stage was reached.
    #[error("{operation} called at stage {stage:?}")]
    Stage {
        operation: &'static str,
        stage: super::Stage,
    },

    /// A field buffer does not match the coupled element count.
    #[error("buffer {name} holds {found} values, expected {expected}")]
    BufferLength {
        name: &'static str,
        expected: usize,
        found: usize,
    },

    /// No coupling with this id is registered.
    #[error("no coupling with id {id}")]
    UnknownCoupling { id: usize },

    /// Options cannot change once a coupling has negotiated.
    #[error("coupling options are locked after negotiation")]
    OptionsLocked,

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Locator(#[from] LocatorError),
}
