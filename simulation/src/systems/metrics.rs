//! Metrics Reducer
//!
//! Local sums run on the unit's pool, then one all-reduce combines them
//! across units in rank order.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::comm::{Communicator, Reduce, Tag};
use crate::components::Season;
use crate::error::CommError;
use crate::partition::Partition;
use crate::systems::migration::MigrationStats;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub agents: u64,
    pub energy: f64,
    pub resource: f64,
    pub migrated_out: u64,
    pub migrated_in: u64,
}

impl Reduce for Totals {
    fn combine(self, other: Self) -> Self {
        Self {
            agents: self.agents + other.agents,
            energy: self.energy + other.energy,
            resource: self.resource + other.resource,
            migrated_out: self.migrated_out + other.migrated_out,
            migrated_in: self.migrated_in + other.migrated_in,
        }
    }
}

/// One line of the metrics stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub cycle: u64,
    pub season: Season,
    pub total_agents: u64,
    pub total_energy: f64,
    pub total_resource: f64,
    pub migrated_out: u64,
    pub migrated_in: u64,
}

impl CycleRecord {
    pub fn new(cycle: u64, season: Season, totals: Totals) -> Self {
        Self {
            cycle,
            season,
            total_agents: totals.agents,
            total_energy: totals.energy,
            total_resource: totals.resource,
            migrated_out: totals.migrated_out,
            migrated_in: totals.migrated_in,
        }
    }
}

/// Sum this unit's agents, energy and cell resource. Call inside the unit's
/// pool so the parallel sums use its workers.
pub fn local_totals(partition: &Partition, migration: &MigrationStats) -> Totals {
    Totals {
        agents: partition.agents.len() as u64,
        energy: partition.agents.par_iter().map(|a| a.energy).sum(),
        resource: partition.cells.par_iter().map(|c| c.resource.load()).sum(),
        migrated_out: migration.sent(),
        migrated_in: migration.received(),
    }
}

pub fn global_totals(comm: &Communicator, local: Totals) -> Result<Totals, CommError> {
    comm.all_reduce(Tag::Reduce, local)
}
