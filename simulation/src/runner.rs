//! Runner - spawns one thread per compute unit and drives them to the end
//!
//! Each unit thread builds its `UnitWorld`, ticks it `cycles` times and
//! returns its records. The root's records form the metrics stream. If any
//! unit fails, its peers lose the link to it and fail in turn; the run as a
//! whole reports the first failure that is not just a lost peer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::comm::{self, ROOT_RANK};
use crate::config::SimConfig;
use crate::error::SimError;
use crate::observer::Observer;
use crate::systems::CycleRecord;
use crate::world::UnitWorld;

/// Everything a finished run leaves behind.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub units: usize,
    pub threads_per_unit: usize,
    pub cycles: u64,
    pub records: Vec<CycleRecord>,
    #[serde(serialize_with = "as_secs")]
    pub elapsed: Duration,
    /// Resident memory of the process after the run, when the OS reports it.
    pub memory_bytes: Option<u64>,
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl RunReport {
    pub fn last(&self) -> Option<&CycleRecord> {
        self.records.last()
    }
}

fn run_unit<O: Observer + ?Sized>(
    config: &SimConfig,
    comm: comm::Communicator,
    observer: &O,
) -> Result<Vec<CycleRecord>, SimError> {
    let mut world = UnitWorld::new(config, comm)?;
    let mut records = Vec::new();

    for _ in 0..config.cycles {
        records.push(world.tick(observer)?);
    }

    world.finish();
    Ok(records)
}

/// Run the whole simulation and return the root's metrics stream.
pub fn run<O: Observer + ?Sized>(config: &SimConfig, observer: &O) -> Result<RunReport, SimError> {
    // Reject bad shapes before the mesh is built; its size is quadratic in
    // the unit count.
    config.validate()?;

    let started_at = Utc::now();
    let start = Instant::now();

    let outcomes: Vec<Result<Vec<CycleRecord>, SimError>> = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(config.units);
        for comm in comm::mesh(config.units) {
            let rank = comm.rank();
            let handle = thread::Builder::new()
                .name(format!("unit{}", rank))
                .spawn_scoped(scope, move || run_unit(config, comm, observer));
            handles.push((rank, handle));
        }

        handles
            .into_iter()
            .map(|(rank, handle)| match handle {
                Ok(h) => h.join().unwrap_or_else(|_| Err(SimError::UnitPanicked { rank })),
                Err(err) => Err(SimError::Spawn(err)),
            })
            .collect()
    });

    let elapsed = start.elapsed();

    let mut root_records = None;
    let mut failure: Option<SimError> = None;
    for (rank, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(records) if rank == ROOT_RANK => root_records = Some(records),
            Ok(_) => {}
            Err(err) => {
                warn!(rank, %err, "unit failed");
                // Prefer the root cause over the knock-on disconnects.
                if failure.as_ref().map_or(true, |f| f.is_peer_loss() && !err.is_peer_loss()) {
                    failure = Some(err);
                }
            }
        }
    }
    if let Some(err) = failure {
        return Err(err);
    }

    let records = root_records.unwrap_or_default();
    info!(cycles = records.len(), elapsed = ?elapsed, "simulation complete");

    Ok(RunReport {
        started_at,
        units: config.units,
        threads_per_unit: config.resolved_threads(),
        cycles: config.cycles,
        records,
        elapsed,
        memory_bytes: memory_stats::memory_stats().map(|stats| stats.physical_mem as u64),
    })
}
