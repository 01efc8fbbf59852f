//! Migration Exchanger
//!
//! Hands agents that crossed a band edge to the neighbouring unit. Two
//! rounds per neighbour: first the counts, then the agents themselves. The
//! counts let the receiver size its store before the payload arrives and
//! give a cheap consistency check on the payload.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::comm::{Communicator, Tag};
use crate::components::Agent;
use crate::error::{CommError, SimError};
use crate::partition::Partition;
use crate::systems::stepper::Outgoing;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStats {
    pub sent_up: u64,
    pub sent_down: u64,
    pub received_up: u64,
    pub received_down: u64,
}

impl MigrationStats {
    pub fn sent(&self) -> u64 {
        self.sent_up + self.sent_down
    }

    pub fn received(&self) -> u64 {
        self.received_up + self.received_down
    }
}

fn exchange_count(
    comm: &Communicator,
    peer: Option<usize>,
    outgoing: &[Agent],
) -> Result<u64, CommError> {
    match peer {
        Some(peer) => comm.sendrecv(peer, Tag::MigrationCount, &(outgoing.len() as u64)),
        None => Ok(0),
    }
}

fn exchange_payload(
    comm: &Communicator,
    peer: Option<usize>,
    outgoing: &[Agent],
    announced: u64,
) -> Result<Vec<Agent>, CommError> {
    let Some(peer) = peer else {
        return Ok(Vec::new());
    };
    let incoming: Vec<Agent> = comm.sendrecv(peer, Tag::MigrationPayload, outgoing)?;
    if incoming.len() as u64 != announced {
        return Err(CommError::CountMismatch {
            peer,
            announced,
            received: incoming.len() as u64,
        });
    }
    Ok(incoming)
}

/// Send `outgoing` to the neighbours and take in whatever they send back.
/// Returns only once every unit has finished its own exchange.
pub fn migrate(
    partition: &mut Partition,
    comm: &Communicator,
    outgoing: Outgoing,
) -> Result<MigrationStats, SimError> {
    let neighbors = partition.neighbors;

    let from_up = exchange_count(comm, neighbors.up, &outgoing.up)?;
    let from_down = exchange_count(comm, neighbors.down, &outgoing.down)?;

    let mut arrivals_up = exchange_payload(comm, neighbors.up, &outgoing.up, from_up)?;
    let mut arrivals_down = exchange_payload(comm, neighbors.down, &outgoing.down, from_down)?;

    // Arrivals from above enter at our first row, from below at our last.
    // Global coordinates already say where they are.
    let last_row = partition.local_height as i32 - 1;
    for agent in &mut arrivals_up {
        agent.y = 0;
    }
    for agent in &mut arrivals_down {
        agent.y = last_row;
    }

    let total = partition.agents.len() + arrivals_up.len() + arrivals_down.len();
    partition.ensure_capacity(total)?;
    partition.agents.append(&mut arrivals_up);
    partition.agents.append(&mut arrivals_down);

    debug_assert!(partition
        .agents
        .iter()
        .all(|a| partition.in_bounds(a) && a.gy == partition.offset_y + a.y));

    let stats = MigrationStats {
        sent_up: outgoing.up.len() as u64,
        sent_down: outgoing.down.len() as u64,
        received_up: from_up,
        received_down: from_down,
    };
    comm.barrier()?;
    debug!(rank = comm.rank(), ?stats, "migration complete");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::mesh;
    use crate::components::Season;
    use std::thread;
    use std::time::{Duration, Instant};

    const WIDTH: usize = 5;
    const LOCAL_HEIGHT: usize = 2;

    fn band(comm: &Communicator) -> Partition {
        let mut p = Partition::allocate(WIDTH, LOCAL_HEIGHT).unwrap();
        p.neighbors = comm.neighbors();
        p.initialize(0, (comm.rank() * LOCAL_HEIGHT) as i32, Season::Dry);
        p
    }

    #[test]
    fn test_crossing_down_lands_on_row_zero() {
        // Unit 0 owns global rows 0-1, unit 1 rows 2-3. An agent on unit 0's
        // last row steps down once.
        let results: Vec<(Partition, MigrationStats)> = thread::scope(|s| {
            let handles: Vec<_> = mesh(2)
                .into_iter()
                .map(|comm| {
                    s.spawn(move || {
                        let mut p = band(&comm);
                        let mut outgoing = Outgoing::default();
                        if comm.rank() == 0 {
                            let mut agent = Agent { id: 7, x: 0, y: 1, gx: 0, gy: 1, energy: 3.0 };
                            agent.shift(0, 1);
                            outgoing.down.push(agent);
                        }
                        let stats = migrate(&mut p, &comm, outgoing).unwrap();
                        (p, stats)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let (upper, upper_stats) = &results[0];
        let (lower, lower_stats) = &results[1];
        assert!(upper.agents.is_empty());
        assert_eq!(upper_stats.sent_down, 1);
        assert_eq!(lower_stats.received_up, 1);

        let arrived = lower.agents[0];
        assert_eq!(arrived.id, 7);
        assert_eq!(arrived.y, 0);
        assert_eq!(arrived.gy, lower.offset_y);
        assert_eq!(arrived.gy, 2);
        assert_eq!(arrived.energy, 3.0);
    }

    #[test]
    fn test_crossing_up_lands_on_last_row() {
        let results: Vec<Partition> = thread::scope(|s| {
            let handles: Vec<_> = mesh(2)
                .into_iter()
                .map(|comm| {
                    s.spawn(move || {
                        let mut p = band(&comm);
                        let mut outgoing = Outgoing::default();
                        if comm.rank() == 1 {
                            let mut agent = Agent { id: 9, x: 4, y: 0, gx: 4, gy: 2, energy: 1.0 };
                            agent.shift(0, -1);
                            outgoing.up.push(agent);
                        }
                        migrate(&mut p, &comm, outgoing).unwrap();
                        p
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let arrived = results[0].agents[0];
        assert_eq!((arrived.x, arrived.y, arrived.gx, arrived.gy), (4, 1, 4, 1));
        assert!(results[1].agents.is_empty());
    }

    #[test]
    fn test_counts_balance_across_units() {
        let stats: Vec<MigrationStats> = thread::scope(|s| {
            let handles: Vec<_> = mesh(4)
                .into_iter()
                .map(|comm| {
                    s.spawn(move || {
                        let mut p = band(&comm);
                        let n = comm.neighbors();
                        let rank = comm.rank() as i32;
                        let offset = rank * LOCAL_HEIGHT as i32;
                        let mut outgoing = Outgoing::default();
                        if n.up.is_some() {
                            for i in 0..(rank + 1) {
                                outgoing.up.push(Agent {
                                    id: i as u64,
                                    x: 0,
                                    y: -1,
                                    gx: 0,
                                    gy: offset - 1,
                                    energy: 0.0,
                                });
                            }
                        }
                        if n.down.is_some() {
                            for i in 0..(2 * rank + 1) {
                                outgoing.down.push(Agent {
                                    id: 100 + i as u64,
                                    x: 1,
                                    y: LOCAL_HEIGHT as i32,
                                    gx: 1,
                                    gy: offset + LOCAL_HEIGHT as i32,
                                    energy: 0.0,
                                });
                            }
                        }
                        let stats = migrate(&mut p, &comm, outgoing).unwrap();
                        assert_eq!(p.agents.len() as u64, stats.received());
                        stats
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let sent: u64 = stats.iter().map(|s| s.sent()).sum();
        let received: u64 = stats.iter().map(|s| s.received()).sum();
        assert_eq!(sent, received);
        assert!(sent > 0);
    }

    #[test]
    fn test_migration_phase_waits_for_slowest_unit() {
        let spans: Vec<(Instant, Instant)> = thread::scope(|s| {
            let handles: Vec<_> = mesh(3)
                .into_iter()
                .map(|comm| {
                    s.spawn(move || {
                        let mut p = band(&comm);
                        if comm.rank() == 2 {
                            thread::sleep(Duration::from_millis(300));
                        }
                        let entered = Instant::now();
                        migrate(&mut p, &comm, Outgoing::default()).unwrap();
                        (entered, Instant::now())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let last_entry = spans.iter().map(|(entered, _)| *entered).max().unwrap();
        assert!(spans.iter().all(|(_, left)| *left >= last_entry));
    }
}
