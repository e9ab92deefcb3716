//! Private communication channel between the flow solver and its partner.
//!
//! A [`Transport`] is the process universe both programs live in: it moves
//! tagged byte messages between world ranks. A [`Channel`] is carved out of
//! it for one coupling. It knows which contiguous range of world ranks belongs
//! to the local program and which belongs to the partner, and it provides the
//! intra-program collectives the coupling protocol needs (leader broadcast and
//! sums).
//!
//! A channel built without a transport is *detached*: the coupling still
//! extracts its geometry, but every step that would talk to the partner is
//! skipped.

mod error;
pub mod universe;
pub(crate) mod wire;

pub use error::ChannelError;

use std::{ops::Range, sync::Arc};

use bytemuck::Pod;
use num_traits::Zero;
use tracing::debug;

use wire::RankRange;

/// Message class, used to detect protocol desynchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// Traffic between the two coupled programs.
    Coupling,

    /// Collectives within one program.
    Program,
}

/// Point-to-point messaging within a universe of ranks.
///
/// Implementations must deliver messages between a given pair of ranks in the
/// order they were sent. `recv` blocks until a message arrives; there is no
/// timeout.
pub trait Transport: Send + Sync {
    /// World rank of the caller.
    fn rank(&self) -> usize;

    /// World ranks of the program the caller belongs to.
    fn program_ranks(&self) -> Range<usize>;

    /// Sends a payload to a world rank.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError`] if the destination is unreachable.
    fn send(&self, dest: usize, tag: Tag, payload: Vec<u8>) -> Result<(), ChannelError>;

    /// Receives the next payload from a world rank.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError`] if the source disconnected or the next
    /// message carries a different tag.
    fn recv(&self, source: usize, tag: Tag) -> Result<Vec<u8>, ChannelError>;
}

/// Communication channel between this program and one partner program.
#[derive(Clone)]
pub struct Channel {
    link: Option<Link>,
}

#[derive(Clone)]
struct Link {
    transport: Arc<dyn Transport>,
    local: Range<usize>,
    distant: Range<usize>,
    partner_root: usize,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.link {
            Some(link) => f
                .debug_struct("Channel")
                .field("rank", &link.transport.rank())
                .field("local", &link.local)
                .field("distant", &link.distant)
                .finish(),
            None => f.write_str("Channel(detached)"),
        }
    }
}

impl Channel {
    /// Creates a channel with no partner program.
    #[must_use]
    pub fn detached() -> Self {
        Self { link: None }
    }

    /// Connects to the partner program whose leader is `partner_root`.
    ///
    /// Every rank of the local program must call this. The local leader sends
    /// the local rank range to the partner root and receives the partner's
    /// range in return, then shares it with the other local ranks.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError`] if `partner_root` is a local rank, if the
    /// partner's range is inconsistent, or if a message fails.
    pub fn connect(
        transport: Arc<dyn Transport>,
        partner_root: usize,
    ) -> Result<Self, ChannelError> {
        let local = transport.program_ranks();
        if local.contains(&partner_root) {
            return Err(ChannelError::NotAPartner { rank: partner_root });
        }

        let mut link = Link {
            transport,
            local: local.clone(),
            distant: partner_root..partner_root + 1,
            partner_root,
        };

        let reply = if link.is_leader() {
            link.transport.send(
                partner_root,
                Tag::Coupling,
                wire::encode(&[RankRange::from_range(&local)]),
            )?;
            Some(link.transport.recv(partner_root, Tag::Coupling)?)
        } else {
            None
        };

        let reply = link.broadcast(reply)?;
        let distant = wire::decode_one::<RankRange>(&reply)?.to_range();

        let overlaps = distant.start < local.end && local.start < distant.end;
        if !distant.contains(&partner_root) || overlaps {
            return Err(ChannelError::RangeMismatch {
                partner_root,
                distant,
            });
        }

        debug!(rank = link.transport.rank(), ?local, ?distant, "channel connected");

        link.distant = distant;
        Ok(Self { link: Some(link) })
    }

    /// Returns `true` if a partner program is attached.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Returns `true` on the rank that talks to the partner during handshakes.
    ///
    /// A detached channel is its own leader.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.link.as_ref().is_none_or(Link::is_leader)
    }

    /// World rank of the caller, or `None` when detached.
    #[must_use]
    pub fn rank(&self) -> Option<usize> {
        self.link.as_ref().map(|link| link.transport.rank())
    }

    /// World ranks of the local program (empty when detached).
    #[must_use]
    pub fn local_ranks(&self) -> Range<usize> {
        self.link
            .as_ref()
            .map_or(0..0, |link| link.local.clone())
    }

    /// World ranks of the partner program (empty when detached).
    #[must_use]
    pub fn distant_ranks(&self) -> Range<usize> {
        self.link
            .as_ref()
            .map_or(0..0, |link| link.distant.clone())
    }

    /// Sends a payload to one rank of the partner program.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError`] if detached, if `dest` is not a partner rank,
    /// or if the send fails.
    pub fn send(&self, dest: usize, payload: Vec<u8>) -> Result<(), ChannelError> {
        let link = self.partner_link(dest)?;
        link.transport.send(dest, Tag::Coupling, payload)
    }

    /// Receives the next payload from one rank of the partner program.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError`] if detached, if `source` is not a partner
    /// rank, or if the receive fails.
    pub fn recv(&self, source: usize) -> Result<Vec<u8>, ChannelError> {
        let link = self.partner_link(source)?;
        link.transport.recv(source, Tag::Coupling)
    }

    /// Sends `payload` to the partner root and receives its reply.
    ///
    /// Only the local leader talks to the partner; the reply is then
    /// broadcast so every local rank returns the same bytes. Non-leader
    /// payloads are ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError`] if detached or if a message fails.
    pub fn exchange_with_partner(&self, payload: Vec<u8>) -> Result<Vec<u8>, ChannelError> {
        let link = self.link.as_ref().ok_or(ChannelError::Detached)?;

        let reply = if link.is_leader() {
            link.transport
                .send(link.partner_root, Tag::Coupling, payload)?;
            Some(link.transport.recv(link.partner_root, Tag::Coupling)?)
        } else {
            None
        };

        link.broadcast(reply)
    }

    /// Sums a value over the local program, returning the total on the leader.
    ///
    /// Other ranks receive `None`.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError`] if a message fails.
    pub fn reduce_to_leader<T: Pod + Zero>(&self, value: T) -> Result<Option<T>, ChannelError> {
        match &self.link {
            Some(link) => link.reduce_to_leader(value),
            None => Ok(Some(value)),
        }
    }

    /// Sums a value over the local program and returns the total everywhere.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError`] if a message fails.
    pub fn sum<T: Pod + Zero>(&self, value: T) -> Result<T, ChannelError> {
        let Some(link) = &self.link else {
            return Ok(value);
        };
        let total = link.reduce_to_leader(value)?;
        let bytes = link.broadcast(total.map(|total| wire::encode(&[total])))?;
        wire::decode_one(&bytes)
    }

    fn partner_link(&self, rank: usize) -> Result<&Link, ChannelError> {
        let link = self.link.as_ref().ok_or(ChannelError::Detached)?;
        if link.distant.contains(&rank) {
            Ok(link)
        } else {
            Err(ChannelError::NotAPartner { rank })
        }
    }
}

impl Link {
    fn leader(&self) -> usize {
        self.local.start
    }

    fn is_leader(&self) -> bool {
        self.transport.rank() == self.leader()
    }

    fn followers(&self) -> impl Iterator<Item = usize> + '_ {
        let leader = self.leader();
        self.local.clone().filter(move |&rank| rank != leader)
    }

    fn broadcast(&self, payload: Option<Vec<u8>>) -> Result<Vec<u8>, ChannelError> {
        if self.is_leader() {
            let payload = payload.unwrap_or_default();
            for rank in self.followers() {
                self.transport.send(rank, Tag::Program, payload.clone())?;
            }
            Ok(payload)
        } else {
            self.transport.recv(self.leader(), Tag::Program)
        }
    }

    fn reduce_to_leader<T: Pod + Zero>(&self, value: T) -> Result<Option<T>, ChannelError> {
        if !self.is_leader() {
            self.transport
                .send(self.leader(), Tag::Program, wire::encode(&[value]))?;
            return Ok(None);
        }

        let mut total = value;
        for rank in self.followers() {
            let bytes = self.transport.recv(rank, Tag::Program)?;
            total = total + wire::decode_one::<T>(&bytes)?;
        }
        Ok(Some(total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;

    use universe::Universe;

    fn spawn_all<R, F>(endpoints: Vec<universe::Endpoint>, f: F) -> Vec<R>
    where
        R: Send + 'static,
        F: Fn(Arc<dyn Transport>) -> R + Send + Sync + Clone + 'static,
    {
        let handles: Vec<_> = endpoints
            .into_iter()
            .map(|endpoint| {
                let f = f.clone();
                thread::spawn(move || {
                    let transport: Arc<dyn Transport> = Arc::new(endpoint);
                    f(transport)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("rank thread panicked"))
            .collect()
    }

    #[test]
    fn detached_channel_is_its_own_program() {
        let channel = Channel::detached();

        assert!(!channel.is_connected());
        assert!(channel.is_leader());
        assert_eq!(channel.rank(), None);
        assert_eq!(channel.sum(3.5_f64).unwrap(), 3.5);
        assert_eq!(channel.reduce_to_leader(7_u64).unwrap(), Some(7));
        assert_eq!(channel.distant_ranks(), 0..0);
        assert_eq!(
            channel.exchange_with_partner(Vec::new()).unwrap_err(),
            ChannelError::Detached
        );
    }

    #[test]
    fn connect_learns_partner_range() {
        let endpoints = Universe::launch(&[("fluid", 2), ("solid", 3)]);

        let ranges = spawn_all(endpoints, |transport| {
            let transport_rank = transport.rank();
            let partner_root = if transport_rank < 2 { 2 } else { 0 };
            let channel = Channel::connect(transport, partner_root).unwrap();
            assert_eq!(channel.rank(), Some(transport_rank));
            (channel.local_ranks(), channel.distant_ranks())
        });

        assert_eq!(ranges[0], (0..2, 2..5));
        assert_eq!(ranges[1], (0..2, 2..5));
        for range in &ranges[2..] {
            assert_eq!(*range, (2..5, 0..2));
        }
    }

    #[test]
    fn connect_rejects_local_partner_root() {
        let mut endpoints = Universe::launch(&[("fluid", 2), ("solid", 1)]);
        let transport: Arc<dyn Transport> = Arc::new(endpoints.remove(0));

        let err = Channel::connect(transport, 1).unwrap_err();
        assert_eq!(err, ChannelError::NotAPartner { rank: 1 });
    }

    #[test]
    fn collectives_cover_every_local_rank() {
        let endpoints = Universe::launch(&[("fluid", 3), ("solid", 1)]);

        let results = spawn_all(endpoints, |transport| {
            let rank = transport.rank();
            let partner_root = if rank < 3 { 3 } else { 0 };
            let channel = Channel::connect(transport, partner_root).unwrap();

            #[allow(clippy::cast_precision_loss)]
            let total = channel.sum(rank as f64 + 1.0).unwrap();
            let reply = channel
                .exchange_with_partner(vec![u8::try_from(rank).unwrap()])
                .unwrap();
            (total, reply)
        });

        for result in &results[..3] {
            assert_eq!(result.0, 6.0);
            assert_eq!(result.1, vec![3]);
        }
        assert_eq!(results[3], (4.0, vec![0]));
    }

    #[test]
    fn partner_sends_are_bounded_to_partner_ranks() {
        let endpoints = Universe::launch(&[("fluid", 1), ("solid", 1)]);

        let errors = spawn_all(endpoints, |transport| {
            let rank = transport.rank();
            let channel = Channel::connect(transport, 1 - rank).unwrap();
            channel.send(rank, Vec::new()).unwrap_err()
        });

        assert_eq!(errors[0], ChannelError::NotAPartner { rank: 0 });
        assert_eq!(errors[1], ChannelError::NotAPartner { rank: 1 });
    }
}
