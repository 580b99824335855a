//! Communication between the ranks that share one hierarchy.
//!
//! Ranks exchange byte payloads through a collective [`Communicator::exchange`]:
//! every rank calls it the same number of times in the same order, passing one
//! payload per destination rank, and receives one payload per source rank.
//!
//! [`SingleProcess`] is the trivial one-rank group. [`local_group`] builds a
//! group of in-process ranks connected by channels, meant to be driven from
//! one thread per rank.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use tracing::trace;

use crate::error::{ContourError, ContourResult};

/// Default time a rank waits for its peers in one exchange.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);

/// A group of ranks that can exchange messages collectively.
pub trait Communicator: Send {
    /// Rank of the calling process, `0..size()`.
    fn rank(&self) -> usize;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Send `outgoing[r]` to every rank `r` and return what every rank sent
    /// to this one, indexed by source rank.
    ///
    /// `outgoing` must hold exactly `size()` payloads; the entry for this rank
    /// is returned to it unchanged.
    fn exchange(&mut self, outgoing: &[Vec<u8>]) -> ContourResult<Vec<Vec<u8>>>;

    /// Send the same payload to every rank and collect all payloads.
    fn all_gather(&mut self, payload: &[u8]) -> ContourResult<Vec<Vec<u8>>> {
        let outgoing = vec![payload.to_vec(); self.size()];
        self.exchange(&outgoing)
    }
}

/// The communicator of a run without peers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn exchange(&mut self, outgoing: &[Vec<u8>]) -> ContourResult<Vec<Vec<u8>>> {
        if outgoing.len() != 1 {
            return Err(ContourError::communication(
                0,
                format!("expected 1 payload, got {}", outgoing.len()),
            ));
        }
        Ok(outgoing.to_vec())
    }
}

#[derive(Debug)]
struct Envelope {
    source: usize,
    round: u64,
    payload: Vec<u8>,
}

/// One rank of an in-process group created by [`local_group`].
#[derive(Debug)]
pub struct LocalCommunicator {
    rank: usize,
    peers: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    // Messages from peers that are already one round ahead.
    pending: Vec<Envelope>,
    round: u64,
    timeout: Duration,
}

/// Create `size` connected ranks.
///
/// Each communicator is meant to move to its own thread. An exchange fails
/// with [`ContourError::Communication`] when a peer does not deliver within
/// the timeout or has been dropped.
pub fn local_group(size: usize) -> Vec<LocalCommunicator> {
    let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| mpsc::channel()).unzip();

    receivers
        .into_iter()
        .enumerate()
        .map(|(rank, inbox)| LocalCommunicator {
            rank,
            peers: senders.clone(),
            inbox,
            pending: Vec::new(),
            round: 0,
            timeout: DEFAULT_EXCHANGE_TIMEOUT,
        })
        .collect()
}

impl LocalCommunicator {
    /// Set how long an exchange waits for each peer.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn fail(&self, details: impl Into<String>) -> ContourError {
        ContourError::communication(self.rank, details)
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn exchange(&mut self, outgoing: &[Vec<u8>]) -> ContourResult<Vec<Vec<u8>>> {
        let size = self.size();
        if outgoing.len() != size {
            return Err(self.fail(format!(
                "expected {} payloads, got {}",
                size,
                outgoing.len()
            )));
        }

        let round = self.round;
        self.round += 1;

        for (dest, payload) in outgoing.iter().enumerate() {
            if dest == self.rank {
                continue;
            }
            let envelope = Envelope {
                source: self.rank,
                round,
                payload: payload.clone(),
            };
            self.peers[dest]
                .send(envelope)
                .map_err(|_| self.fail(format!("rank {} has left the group", dest)))?;
        }

        let mut incoming: Vec<Option<Vec<u8>>> = vec![None; size];
        incoming[self.rank] = Some(outgoing[self.rank].clone());
        let mut missing = size - 1;

        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].round == round {
                let envelope = self.pending.swap_remove(i);
                incoming[envelope.source] = Some(envelope.payload);
                missing -= 1;
            } else {
                i += 1;
            }
        }

        while missing > 0 {
            let envelope = match self.inbox.recv_timeout(self.timeout) {
                Ok(envelope) => envelope,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(self.fail(format!(
                        "timed out after {:?} waiting for {} peer(s) in round {}",
                        self.timeout, missing, round
                    )));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(self.fail("all peers disconnected"));
                }
            };

            if envelope.round == round {
                if incoming[envelope.source].is_some() {
                    return Err(self.fail(format!(
                        "duplicate message from rank {} in round {}",
                        envelope.source, round
                    )));
                }
                incoming[envelope.source] = Some(envelope.payload);
                missing -= 1;
            } else if envelope.round > round {
                self.pending.push(envelope);
            } else {
                return Err(self.fail(format!(
                    "stale message from rank {} (round {} < {})",
                    envelope.source, envelope.round, round
                )));
            }
        }

        trace!(rank = self.rank, round = round, "Exchange complete");

        Ok(incoming.into_iter().map(Option::unwrap_or_default).collect())
    }
}
