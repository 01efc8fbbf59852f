//! Core data types shared by every phase of a cycle
//!
//! Cells, agents and the season value. Everything here is plain data; the
//! phases that mutate it live in `systems`.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// Terrain
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Terrain {
    Village,
    Fishing,
    Gathering,
    Farmland,
    Restricted,
}

impl Terrain {
    pub const ALL: [Terrain; 5] = [
        Terrain::Village,
        Terrain::Fishing,
        Terrain::Gathering,
        Terrain::Farmland,
        Terrain::Restricted,
    ];
}

// ============================================================================
// Season
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    #[default]
    Dry,
    Flood,
}

impl Season {
    pub fn toggled(self) -> Self {
        match self {
            Season::Dry => Season::Flood,
            Season::Flood => Season::Dry,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Season::Dry => "DRY",
            Season::Flood => "FLOOD",
        }
    }
}

// ============================================================================
// Cell
// ============================================================================

/// An `f64` that many stepper threads may draw from at once.
///
/// Stored as raw bits in an `AtomicU64`. Exclusive phases (initialization,
/// regeneration) go through `update` and skip the atomics entirely.
#[derive(Debug, Default)]
pub struct AtomicResource(AtomicU64);

impl AtomicResource {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, value: f64) {
        self.0.store(value.max(0.0).to_bits(), Ordering::Release);
    }

    /// Rewrite the value through exclusive access, no atomics involved.
    pub fn update(&mut self, f: impl FnOnce(f64) -> f64) {
        let slot = self.0.get_mut();
        *slot = f(f64::from_bits(*slot)).max(0.0).to_bits();
    }

    /// Take up to `desired` units, never driving the value below zero.
    ///
    /// The read of the current level and the subtraction form one
    /// compare-and-swap, so concurrent consumers can never both take the
    /// last units. Returns the amount actually taken.
    pub fn consume(&self, desired: f64) -> f64 {
        if desired <= 0.0 {
            return 0.0;
        }

        let mut taken = 0.0;
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                let available = f64::from_bits(bits);
                taken = desired.min(available).max(0.0);
                if taken == 0.0 {
                    return None;
                }
                Some((available - taken).max(0.0).to_bits())
            });
        taken
    }
}

#[derive(Debug)]
pub struct Cell {
    pub terrain: Terrain,
    pub resource: AtomicResource,
    pub accessible: bool,
}

impl Cell {
    pub fn new(terrain: Terrain, resource: f64, accessible: bool) -> Self {
        Self {
            terrain,
            resource: AtomicResource::new(resource),
            accessible,
        }
    }
}

// ============================================================================
// Agent
// ============================================================================

/// A forager. `x`/`y` are local to the owning partition, `gx`/`gy` global.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: u64,
    pub x: i32,
    pub y: i32,
    pub gx: i32,
    pub gy: i32,
    pub energy: f64,
}

impl Agent {
    pub fn shift(&mut self, dx: i32, dy: i32) {
        self.x += dx;
        self.y += dy;
        self.gx += dx;
        self.gy += dy;
    }
}
