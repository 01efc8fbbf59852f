//! Parallel Agent Stepper
//!
//! One pass over the local agents on the unit's rayon pool. Per agent:
//! synthetic workload, consumption from the occupied cell, a random step,
//! then sorting into stay / up / down.
//!
//! Each rayon split owns its own buffers; they are merged serially once the
//! parallel pass is over. The only state shared between workers during the
//! pass is each cell's atomic resource.

use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Uniform};
use rayon::prelude::*;
use std::hint::black_box;

use crate::components::{Agent, Cell};
use crate::config::SimConfig;
use crate::error::SimError;
use crate::partition::Partition;

/// Per-agent knobs, copied out of the config once per unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepParams {
    pub desired_consumption: f64,
    pub cycle_cost: f64,
    pub workload_scale: f64,
    pub max_workload_iterations: u64,
}

impl From<&SimConfig> for StepParams {
    fn from(config: &SimConfig) -> Self {
        Self {
            desired_consumption: config.desired_consumption,
            cycle_cost: config.cycle_cost,
            workload_scale: config.workload_scale,
            max_workload_iterations: config.max_workload_iterations,
        }
    }
}

/// Agents that left the band this cycle, still in sender-local coordinates.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Outgoing {
    pub up: Vec<Agent>,
    pub down: Vec<Agent>,
}

impl Outgoing {
    pub fn len(&self) -> usize {
        self.up.len() + self.down.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
struct SplitBuffers {
    stay: Vec<Agent>,
    up: Vec<Agent>,
    down: Vec<Agent>,
}

/// Read-only view of the band handed to the workers.
#[derive(Clone, Copy)]
struct Band<'a> {
    cells: &'a [Cell],
    width: i32,
    local_height: i32,
    open_up: bool,
    open_down: bool,
}

/// Busy loop sized by the cell's resource. Returns the accumulator so the
/// optimizer can't drop it.
pub fn synthetic_workload(resource: f64, params: &StepParams) -> f64 {
    let wanted = (resource.max(0.0) * params.workload_scale) as u64;
    let iterations = wanted.min(params.max_workload_iterations);

    let mut acc = 0.0f64;
    for c in 0..iterations {
        acc = black_box(acc + c as f64 * 0.0001);
    }
    acc
}

/// Stream seed for one agent in one cycle. Independent of which worker
/// picks the agent up, so every agent walks the same path on every run.
pub fn agent_seed(run_seed: u64, cycle: u64, agent_id: u64) -> u64 {
    // splitmix64 finalizer over the combined key
    let mut z = run_seed
        ^ cycle.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ agent_id.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Step one agent in place: workload, consumption, movement.
fn step_agent(band: Band<'_>, params: &StepParams, agent: &mut Agent, rng: &mut SmallRng) {
    let cell = &band.cells[agent.y as usize * band.width as usize + agent.x as usize];

    black_box(synthetic_workload(cell.resource.load(), params));

    let consumed = cell.resource.consume(params.desired_consumption);
    agent.energy += consumed - params.cycle_cost;

    let step = Uniform::new_inclusive(-1, 1);
    let dx = step.sample(rng);
    let dy = step.sample(rng);

    let nx = (agent.x + dx).clamp(0, band.width - 1);
    let mut ny = agent.y + dy;
    if !band.open_up {
        ny = ny.max(0);
    }
    if !band.open_down {
        ny = ny.min(band.local_height - 1);
    }

    agent.shift(nx - agent.x, ny - agent.y);
}

/// Process every resident agent for `cycle`. Stayers are written back into
/// the partition's store; leavers are returned for migration.
pub fn step_agents(
    partition: &mut Partition,
    params: &StepParams,
    run_seed: u64,
    cycle: u64,
) -> Result<Outgoing, SimError> {
    let mut agents = std::mem::take(&mut partition.agents);

    let band = Band {
        cells: &partition.cells,
        width: partition.width as i32,
        local_height: partition.local_height as i32,
        open_up: partition.neighbors.up.is_some(),
        open_down: partition.neighbors.down.is_some(),
    };

    let splits: Vec<SplitBuffers> = agents
        .par_iter()
        .fold(SplitBuffers::default, |mut buf, agent| {
            let mut agent = *agent;
            let mut rng = SmallRng::seed_from_u64(agent_seed(run_seed, cycle, agent.id));
            step_agent(band, params, &mut agent, &mut rng);

            if agent.y < 0 {
                buf.up.push(agent);
            } else if agent.y >= band.local_height {
                buf.down.push(agent);
            } else {
                buf.stay.push(agent);
            }
            buf
        })
        .collect();

    // Reuse the old allocation for the stayers.
    agents.clear();
    partition.agents = agents;

    let staying: usize = splits.iter().map(|s| s.stay.len()).sum();
    partition.ensure_capacity(staying)?;

    let mut outgoing = Outgoing::default();
    for split in splits {
        partition.agents.extend(split.stay);
        outgoing.up.extend(split.up);
        outgoing.down.extend(split.down);
    }

    Ok(outgoing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::Neighbors;
    use crate::components::Season;
    use std::collections::HashSet;

    fn params() -> StepParams {
        StepParams {
            desired_consumption: 2.0,
            cycle_cost: 1.0,
            workload_scale: 10.0,
            max_workload_iterations: 100,
        }
    }

    fn partition(width: usize, height: usize, offset_y: i32, neighbors: Neighbors) -> Partition {
        let mut p = Partition::allocate(width, height).unwrap();
        p.neighbors = neighbors;
        p.initialize(0, offset_y, Season::Dry);
        p
    }

    #[test]
    fn test_single_cell_consumption_sequence() {
        // A 1x1 grid at (0,0) is a village: it never regenerates and the
        // agent cannot move off it.
        let mut p = partition(1, 1, 0, Neighbors::default());
        p.cells[0].resource.store(5.0);
        p.agents.push(Agent { id: 0, x: 0, y: 0, gx: 0, gy: 0, energy: 10.0 });

        let mut resources = vec![p.cells[0].resource.load()];
        let mut energies = vec![p.agents[0].energy];
        for cycle in 0..3 {
            let out = step_agents(&mut p, &params(), 1, cycle).unwrap();
            assert!(out.is_empty());
            p.regenerate(5.0);
            resources.push(p.cells[0].resource.load());
            energies.push(p.agents[0].energy);
        }

        assert_eq!(resources, vec![5.0, 3.0, 1.0, 0.0]);
        // +2 -1, +2 -1, +1 -1
        assert_eq!(energies, vec![10.0, 11.0, 12.0, 12.0]);
    }

    #[test]
    fn test_edge_partition_clamps_everything() {
        let mut p = partition(8, 4, 0, Neighbors::default());
        p.agents = (0..200)
            .map(|i| {
                let (x, y) = (i % 8, i % 4);
                Agent { id: i as u64, x, y, gx: x, gy: y, energy: 5.0 }
            })
            .collect();

        for cycle in 0..20 {
            let out = step_agents(&mut p, &params(), 9, cycle).unwrap();
            assert!(out.is_empty());
            assert_eq!(p.agents.len(), 200);
            for a in &p.agents {
                assert!(p.in_bounds(a));
                assert_eq!((a.gx, a.gy), (a.x, a.y));
            }
        }
    }

    #[test]
    fn test_interior_partition_emits_migrants() {
        let neighbors = Neighbors { up: Some(0), down: Some(2) };
        let mut p = partition(4, 2, 2, neighbors);
        p.agents = (0..400)
            .map(|i| {
                let (x, y) = (i % 4, i % 2);
                Agent { id: i as u64, x, y, gx: x, gy: 2 + y, energy: 5.0 }
            })
            .collect();

        let out = step_agents(&mut p, &params(), 5, 0).unwrap();

        assert!(!out.up.is_empty());
        assert!(!out.down.is_empty());
        assert_eq!(p.agents.len() + out.len(), 400);
        assert!(out.up.iter().all(|a| a.y == -1 && a.gy == 1));
        assert!(out.down.iter().all(|a| a.y == 2 && a.gy == 4));
        for a in &p.agents {
            assert!(p.in_bounds(a));
            assert_eq!(a.gy, 2 + a.y);
        }

        let ids: HashSet<u64> = p
            .agents
            .iter()
            .chain(&out.up)
            .chain(&out.down)
            .map(|a| a.id)
            .collect();
        assert_eq!(ids.len(), 400);
    }

    #[test]
    fn test_shared_cell_never_overdrawn() {
        let mut p = partition(1, 1, 0, Neighbors::default());
        p.cells[0].resource.store(50.0);
        p.agents = (0..100)
            .map(|i| Agent { id: i, x: 0, y: 0, gx: 0, gy: 0, energy: 0.0 })
            .collect();

        step_agents(&mut p, &params(), 3, 0).unwrap();

        assert_eq!(p.cells[0].resource.load(), 0.0);
        // 50 units shared out, 100 agents each paid 1.
        let energy: f64 = p.agents.iter().map(|a| a.energy).sum();
        assert_eq!(energy, 50.0 - 100.0);
    }

    #[test]
    fn test_same_seed_same_outcome() {
        let run = || {
            let neighbors = Neighbors { up: Some(0), down: Some(2) };
            let mut p = partition(16, 4, 4, neighbors);
            p.agents = (0..64)
                .map(|i| {
                    let (x, y) = (i % 16, i % 4);
                    Agent { id: i as u64, x, y, gx: x, gy: 4 + y, energy: 1.0 }
                })
                .collect();
            let out = step_agents(&mut p, &params(), 77, 3).unwrap();
            let mut stay = p.agents.clone();
            stay.sort_by_key(|a| a.id);
            (stay, out)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_workload_is_capped() {
        let p = params();
        assert_eq!(synthetic_workload(0.0, &p), 0.0);
        // 1e6 * 10 iterations wanted, only 100 run
        let capped = synthetic_workload(1e6, &p);
        let expected: f64 = (0..100).map(|c| c as f64 * 0.0001).sum();
        assert!((capped - expected).abs() < 1e-9);
    }
}
