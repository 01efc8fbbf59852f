//! Cycle phases - each runs once per cycle on every unit
//!
//! Order within a cycle: season, halo, stepper, migration, regeneration
//! (on the partition), metrics.

pub mod season;
pub mod halo;
pub mod stepper;
pub mod migration;
pub mod metrics;

pub use season::SeasonClock;
pub use halo::halo_exchange;
pub use stepper::{step_agents, Outgoing, StepParams};
pub use migration::{migrate, MigrationStats};
pub use metrics::{global_totals, local_totals, CycleRecord, Totals};
