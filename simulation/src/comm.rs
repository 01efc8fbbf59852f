//! Inter-unit message layer
//!
//! Each compute unit runs on its own thread with private memory. Units are
//! wired by a full mesh of point-to-point channels, one per ordered pair, and
//! only ever see each other through tagged, bincode-encoded messages.
//!
//! Sends are buffered, so a paired `sendrecv` never deadlocks as long as both
//! sides reach it. A unit that stops participating blocks its peers; a unit
//! that exits drops its channel ends and peers see `PeerDisconnected`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, Sender};

use crate::error::CommError;

/// Unit that owns the authoritative season and collects reductions.
pub const ROOT_RANK: usize = 0;

/// Message kind, checked on receipt to catch protocol drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tag {
    Season,
    Halo,
    MigrationCount,
    MigrationPayload,
    Reduce,
    Barrier,
}

#[derive(Debug)]
struct Envelope {
    tag: Tag,
    payload: Vec<u8>,
}

/// Values that can be summed across units.
pub trait Reduce: Serialize + DeserializeOwned {
    fn combine(self, other: Self) -> Self;
}

impl Reduce for () {
    fn combine(self, _other: Self) -> Self {}
}

/// Vertical neighbours of a band; `None` at the global edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Neighbors {
    pub up: Option<usize>,
    pub down: Option<usize>,
}

/// One unit's endpoint into the mesh.
#[derive(Debug)]
pub struct Communicator {
    rank: usize,
    size: usize,
    /// Indexed by destination rank.
    outboxes: Vec<Sender<Envelope>>,
    /// Indexed by source rank.
    inboxes: Vec<Receiver<Envelope>>,
}

/// Build endpoints for `size` units; element `r` belongs to rank `r`.
pub fn mesh(size: usize) -> Vec<Communicator> {
    let mut outboxes: Vec<Vec<Sender<Envelope>>> =
        (0..size).map(|_| Vec::with_capacity(size)).collect();
    let mut inboxes: Vec<Vec<Receiver<Envelope>>> =
        (0..size).map(|_| Vec::with_capacity(size)).collect();

    // Channel (src -> dst): sender lives with src, receiver with dst.
    // Iterating src in the outer loop keeps each inbox list ordered by src.
    for src in 0..size {
        for dst in 0..size {
            let (tx, rx) = mpsc::channel();
            outboxes[src].push(tx);
            inboxes[dst].push(rx);
        }
    }

    outboxes
        .into_iter()
        .zip(inboxes)
        .enumerate()
        .map(|(rank, (outboxes, inboxes))| Communicator {
            rank,
            size,
            outboxes,
            inboxes,
        })
        .collect()
}

impl Communicator {
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_root(&self) -> bool {
        self.rank == ROOT_RANK
    }

    /// Up is rank-1, down is rank+1.
    pub fn neighbors(&self) -> Neighbors {
        Neighbors {
            up: self.rank.checked_sub(1),
            down: Some(self.rank + 1).filter(|&r| r < self.size),
        }
    }

    pub fn send<T>(&self, dest: usize, tag: Tag, value: &T) -> Result<(), CommError>
    where
        T: Serialize + ?Sized,
    {
        let payload = bincode::serialize(value)?;
        self.outboxes[dest]
            .send(Envelope { tag, payload })
            .map_err(|_| CommError::PeerDisconnected { peer: dest })
    }

    pub fn recv<T: DeserializeOwned>(&self, source: usize, tag: Tag) -> Result<T, CommError> {
        let envelope = self.inboxes[source]
            .recv()
            .map_err(|_| CommError::PeerDisconnected { peer: source })?;
        if envelope.tag != tag {
            return Err(CommError::UnexpectedTag {
                peer: source,
                expected: tag,
                got: envelope.tag,
            });
        }
        Ok(bincode::deserialize(&envelope.payload)?)
    }

    /// Send our half and wait for the peer's half of the same exchange.
    pub fn sendrecv<S, R>(&self, peer: usize, tag: Tag, value: &S) -> Result<R, CommError>
    where
        S: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.send(peer, tag, value)?;
        self.recv(peer, tag)
    }

    /// Root's `value` wins; every other unit's argument is ignored.
    pub fn broadcast<T>(&self, root: usize, tag: Tag, value: T) -> Result<T, CommError>
    where
        T: Serialize + DeserializeOwned,
    {
        if self.rank == root {
            for dest in (0..self.size).filter(|&r| r != root) {
                self.send(dest, tag, &value)?;
            }
            Ok(value)
        } else {
            self.recv(root, tag)
        }
    }

    /// Combine every unit's contribution in rank order at the root, then hand
    /// the total back to everyone. Rank ordering keeps float sums identical
    /// from run to run.
    pub fn all_reduce<T: Reduce>(&self, tag: Tag, value: T) -> Result<T, CommError> {
        let total = if self.is_root() {
            let mut acc = value;
            for source in (0..self.size).filter(|&r| r != ROOT_RANK) {
                let part: T = self.recv(source, tag)?;
                acc = acc.combine(part);
            }
            acc
        } else {
            self.send(ROOT_RANK, tag, &value)?;
            value
        };
        self.broadcast(ROOT_RANK, tag, total)
    }

    /// No unit returns until every unit has arrived.
    pub fn barrier(&self) -> Result<(), CommError> {
        self.all_reduce(Tag::Barrier, ())
    }
}
