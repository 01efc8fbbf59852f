//! Run configuration
//!
//! Fixed before the first cycle. Loaded from TOML when a file is given;
//! every field has a default so partial files are fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::components::Season;
use crate::error::SimError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    /// Global grid width in cells.
    pub width: usize,
    /// Global grid height; must divide evenly by `units`.
    pub height: usize,
    /// Agents across all units.
    pub agents: u64,
    pub cycles: u64,
    /// Cycles between season flips.
    pub season_period: u64,
    pub initial_season: Season,
    /// Number of compute units (horizontal bands).
    pub units: usize,
    /// Worker threads per unit; defaults to the hardware concurrency.
    pub threads_per_unit: Option<usize>,
    pub seed: u64,
    pub initial_energy: f64,
    /// Resource an agent tries to take from its cell each cycle.
    pub desired_consumption: f64,
    /// Energy every agent burns each cycle.
    pub cycle_cost: f64,
    pub regen_dry: f64,
    pub regen_flood: f64,
    /// Busy-loop iterations per unit of cell resource.
    pub workload_scale: f64,
    pub max_workload_iterations: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 1000,
            agents: 5000,
            cycles: 100,
            season_period: 25,
            initial_season: Season::Dry,
            units: 4,
            threads_per_unit: None,
            seed: 42,
            initial_energy: 10.0,
            desired_consumption: 2.0,
            cycle_cost: 1.0,
            regen_dry: 0.5,
            regen_flood: 2.0,
            workload_scale: 1000.0,
            max_workload_iterations: 1_000_000,
        }
    }
}

impl SimConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// Startup preconditions. Every unit runs this before its first cycle.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.units == 0 {
            return Err(SimError::InvalidConfig("units must be at least 1".into()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(SimError::InvalidConfig("grid dimensions must be non-zero".into()));
        }
        if i32::try_from(self.width).is_err() || i32::try_from(self.height).is_err() {
            return Err(SimError::InvalidConfig("grid dimensions exceed i32 coordinates".into()));
        }
        if self.height % self.units != 0 {
            return Err(SimError::IndivisibleHeight {
                height: self.height,
                units: self.units,
            });
        }
        if self.season_period == 0 {
            return Err(SimError::InvalidConfig("season_period must be at least 1".into()));
        }
        if self.threads_per_unit == Some(0) {
            return Err(SimError::InvalidConfig("threads_per_unit must be at least 1".into()));
        }
        let rates = [
            self.initial_energy,
            self.desired_consumption,
            self.cycle_cost,
            self.regen_dry,
            self.regen_flood,
            self.workload_scale,
        ];
        if rates.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(SimError::InvalidConfig("rates must be finite and non-negative".into()));
        }
        Ok(())
    }

    pub fn local_height(&self) -> usize {
        self.height / self.units.max(1)
    }

    /// Agents seeded on `rank`. The remainder goes one each to the lowest
    /// ranks so the shares always add up to `agents`.
    pub fn agent_share(&self, rank: usize) -> u64 {
        let units = self.units.max(1) as u64;
        let rank = rank as u64;
        self.agents / units + u64::from(rank < self.agents % units)
    }

    /// Global id of the first agent seeded on `rank`.
    pub fn first_agent_id(&self, rank: usize) -> u64 {
        (0..rank).map(|r| self.agent_share(r)).sum()
    }

    pub fn resolved_threads(&self) -> usize {
        self.threads_per_unit.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn regeneration(&self, season: Season) -> f64 {
        match season {
            Season::Dry => self.regen_dry,
            Season::Flood => self.regen_flood,
        }
    }
}
