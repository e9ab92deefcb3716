//! In-process process universe.
//!
//! Every rank of every program is represented by an [`Endpoint`], normally
//! moved onto its own thread. Each ordered pair of ranks is linked by an
//! unbounded FIFO queue, so sends never block and messages between two ranks
//! arrive in the order they were sent.

use std::ops::Range;

use crossbeam_channel::{Receiver, Sender, unbounded};

use super::{ChannelError, Tag, Transport};

/// Description of one program within the universe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    /// Program name, for logging.
    pub name: String,

    /// World ranks owned by this program.
    pub ranks: Range<usize>,
}

/// Builder for a set of programs sharing one rank numbering.
pub struct Universe;

impl Universe {
    /// Creates the endpoints of a universe made of the given programs.
    ///
    /// Programs receive consecutive world rank ranges in declaration order.
    /// The returned endpoints are indexed by world rank.
    ///
    /// ```
    /// use conjugate_coupling::channel::{Transport, universe::Universe};
    ///
    /// let endpoints = Universe::launch(&[("fluid", 2), ("solid", 1)]);
    /// assert_eq!(endpoints.len(), 3);
    /// assert_eq!(endpoints[2].program_ranks(), 2..3);
    /// ```
    #[must_use]
    pub fn launch(programs: &[(&str, usize)]) -> Vec<Endpoint> {
        let n_ranks: usize = programs.iter().map(|(_, n)| n).sum();

        let mut layout = Vec::with_capacity(programs.len());
        let mut next = 0;
        for (name, n) in programs {
            layout.push(Program {
                name: (*name).to_string(),
                ranks: next..next + n,
            });
            next += n;
        }

        let mut outgoing: Vec<Vec<Sender<Envelope>>> =
            (0..n_ranks).map(|_| Vec::with_capacity(n_ranks)).collect();
        let mut incoming: Vec<Vec<Receiver<Envelope>>> =
            (0..n_ranks).map(|_| Vec::with_capacity(n_ranks)).collect();

        for sender in outgoing.iter_mut() {
            for receiver in incoming.iter_mut() {
                let (tx, rx) = unbounded();
                sender.push(tx);
                receiver.push(rx);
            }
        }

        outgoing
            .into_iter()
            .zip(incoming)
            .enumerate()
            .map(|(rank, (outgoing, incoming))| {
                let program = layout
                    .iter()
                    .find(|program| program.ranks.contains(&rank))
                    .cloned()
                    .unwrap_or(Program {
                        name: String::new(),
                        ranks: rank..rank + 1,
                    });
                Endpoint {
                    rank,
                    program,
                    outgoing,
                    incoming,
                }
            })
            .collect()
    }
}

#[derive(Debug)]
struct Envelope {
    tag: Tag,
    payload: Vec<u8>,
}

/// One rank's view of an in-process universe.
#[derive(Debug)]
pub struct Endpoint {
    rank: usize,
    program: Program,
    outgoing: Vec<Sender<Envelope>>,
    incoming: Vec<Receiver<Envelope>>,
}

impl Endpoint {
    /// Returns the program this rank belongs to.
    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }
}

impl Transport for Endpoint {
    fn rank(&self) -> usize {
        self.rank
    }

    fn program_ranks(&self) -> Range<usize> {
        self.program.ranks.clone()
    }

    fn send(&self, dest: usize, tag: Tag, payload: Vec<u8>) -> Result<(), ChannelError> {
        let link = self
            .outgoing
            .get(dest)
            .ok_or(ChannelError::Disconnected { peer: dest })?;
        link.send(Envelope { tag, payload })
            .map_err(|_| ChannelError::Disconnected { peer: dest })
    }

    fn recv(&self, source: usize, tag: Tag) -> Result<Vec<u8>, ChannelError> {
        let link = self
            .incoming
            .get(source)
            .ok_or(ChannelError::Disconnected { peer: source })?;
        let envelope = link
            .recv()
            .map_err(|_| ChannelError::Disconnected { peer: source })?;

        if envelope.tag != tag {
            return Err(ChannelError::Tag {
                peer: source,
                expected: tag,
                found: envelope.tag,
            });
        }

        Ok(envelope.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn programs_get_consecutive_ranges() {
        let endpoints = Universe::launch(&[("fluid", 3), ("solid", 2)]);

        assert_eq!(endpoints.len(), 5);
        assert_eq!(endpoints[0].program().name, "fluid");
        assert_eq!(endpoints[2].program_ranks(), 0..3);
        assert_eq!(endpoints[3].program().name, "solid");
        assert_eq!(endpoints[4].program_ranks(), 3..5);
    }

    #[test]
    fn messages_keep_their_order() {
        let endpoints = Universe::launch(&[("a", 1), ("b", 1)]);

        endpoints[0].send(1, Tag::Coupling, vec![1]).unwrap();
        endpoints[0].send(1, Tag::Coupling, vec![2, 3]).unwrap();

        assert_eq!(endpoints[1].recv(0, Tag::Coupling).unwrap(), vec![1]);
        assert_eq!(endpoints[1].recv(0, Tag::Coupling).unwrap(), vec![2, 3]);
    }

    #[test]
    fn tag_mismatch_is_reported() {
        let endpoints = Universe::launch(&[("a", 1), ("b", 1)]);

        endpoints[1].send(0, Tag::Program, Vec::new()).unwrap();
        let err = endpoints[0].recv(1, Tag::Coupling).unwrap_err();

        assert_eq!(
            err,
            ChannelError::Tag {
                peer: 1,
                expected: Tag::Coupling,
                found: Tag::Program,
            }
        );
    }

    #[test]
    fn dropped_peer_is_disconnected() {
        let mut endpoints = Universe::launch(&[("a", 1), ("b", 1)]);
        let peer = endpoints.pop().unwrap();
        drop(peer);

        let err = endpoints[0].recv(1, Tag::Coupling).unwrap_err();
        assert_eq!(err, ChannelError::Disconnected { peer: 1 });
    }
}
