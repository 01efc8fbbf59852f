//! Observer hooks
//!
//! Read-only callbacks for display and logging. Units call them from their
//! own threads, so implementations must be `Sync`.

use tracing::{debug, info};

use crate::components::{Agent, Cell};
use crate::systems::CycleRecord;

/// What a unit exposes to the render hook once per cycle.
#[derive(Debug, Clone, Copy)]
pub struct PartitionView<'a> {
    pub rank: usize,
    pub width: usize,
    pub local_height: usize,
    pub offset_y: i32,
    pub cells: &'a [Cell],
    pub agents: &'a [Agent],
}

pub trait Observer: Sync {
    /// Every unit, every cycle.
    fn on_partition(&self, _view: &PartitionView<'_>) {}

    /// Root unit only, once per cycle, with the global totals.
    fn on_cycle(&self, _record: &CycleRecord) {}
}

/// Discards everything.
impl Observer for () {}

/// Writes cycle totals to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_partition(&self, view: &PartitionView<'_>) {
        debug!(
            rank = view.rank,
            first_row = view.offset_y,
            last_row = view.offset_y + view.local_height as i32 - 1,
            agents = view.agents.len(),
            "partition state"
        );
    }

    fn on_cycle(&self, record: &CycleRecord) {
        info!(
            cycle = record.cycle,
            season = record.season.label(),
            agents = record.total_agents,
            energy = record.total_energy,
            resource = record.total_resource,
            "cycle complete"
        );
    }
}
