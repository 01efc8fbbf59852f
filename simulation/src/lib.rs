//! Partitioned Forage Simulation Engine
//!
//! Agents forage over a grid split into horizontal bands, one per compute
//! unit. Units share nothing and talk only through explicit messages; inside
//! a unit, agent and cell work runs on a rayon pool.

pub mod comm;
pub mod components;
pub mod config;
pub mod error;
pub mod observer;
pub mod partition;
pub mod runner;
pub mod systems;
pub mod terrain;
pub mod world;

pub use components::*;
pub use config::SimConfig;
pub use error::{CommError, SimError};
pub use observer::{Observer, PartitionView, TracingObserver};
pub use runner::{run, RunReport};
pub use world::UnitWorld;
