//! Season Controller
//!
//! The root unit owns the authoritative season. Every `period` cycles it
//! flips the value and broadcasts it; the other units only ever change their
//! replica by receiving that broadcast.

use tracing::info;

use crate::comm::{Communicator, Tag, ROOT_RANK};
use crate::components::Season;
use crate::error::CommError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeasonClock {
    current: Season,
    period: u64,
}

impl SeasonClock {
    pub fn new(initial: Season, period: u64) -> Self {
        Self { current: initial, period }
    }

    pub fn current(&self) -> Season {
        self.current
    }

    pub fn flips_at(&self, cycle: u64) -> bool {
        cycle > 0 && self.period > 0 && cycle % self.period == 0
    }

    /// Run the season step for `cycle`. Every unit must call this with the
    /// same cycle number. Returns the new season when it changed; on those
    /// cycles no unit returns before every replica has been updated.
    pub fn advance(
        &mut self,
        cycle: u64,
        comm: &Communicator,
    ) -> Result<Option<Season>, CommError> {
        if !self.flips_at(cycle) {
            return Ok(None);
        }

        let proposal = if comm.is_root() {
            self.current.toggled()
        } else {
            self.current
        };
        let season = comm.broadcast(ROOT_RANK, Tag::Season, proposal)?;

        if comm.is_root() {
            info!(cycle, season = season.label(), "season changed");
        }
        self.current = season;
        comm.barrier()?;
        Ok(Some(season))
    }
}
