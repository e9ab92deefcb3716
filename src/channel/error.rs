use std::ops::Range;

use thiserror::Error;

use super::Tag;

/// Errors raised by the coupling transport and channel.
///
/// None of these are recoverable: a failed message means the two programs no
/// longer agree on the protocol state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The operation needs a partner program but the channel is detached.
    #[error("channel is detached from any partner program")]
    Detached,

    /// The peer rank dropped its end of the link.
    #[error("rank {peer} disconnected")]
    Disconnected { peer: usize },

    /// A message arrived on the link with an unexpected tag.
    #[error("message from rank {peer} has tag {found:?}, expected {expected:?}")]
    Tag { peer: usize, expected: Tag, found: Tag },

    /// A payload does not hold a whole number of values.
    #[error("payload of {len} bytes is not a whole number of {size}-byte values")]
    Payload { len: usize, size: usize },

    /// A rank that is not part of the partner program was addressed.
    #[error("rank {rank} does not belong to the partner program")]
    NotAPartner { rank: usize },

    /// The partner advertised a rank range that is inconsistent with the
    /// configured partner root or overlaps the local program.
    #[error("partner rank range {distant:?} is inconsistent with root rank {partner_root}")]
    RangeMismatch {
        partner_root: usize,
        distant: Range<usize>,
    },
}
