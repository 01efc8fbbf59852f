//! Partition - one unit's band of the grid and the agents living on it

use rand::Rng;
use rayon::prelude::*;
use tracing::debug;

use crate::comm::Neighbors;
use crate::components::{Agent, Cell, Season};
use crate::error::SimError;
use crate::terrain;

/// Extra agent slots reserved whenever the store has to grow.
pub const AGENT_CAPACITY_SLACK: usize = 256;

#[derive(Debug)]
pub struct Partition {
    pub width: usize,
    pub local_height: usize,
    pub offset_x: i32,
    pub offset_y: i32,
    pub neighbors: Neighbors,
    pub cells: Vec<Cell>,
    pub agents: Vec<Agent>,
    /// Last row received from the unit above (its bottom row).
    pub halo_up: Option<Vec<f64>>,
    /// First row received from the unit below (its top row).
    pub halo_down: Option<Vec<f64>>,
}

impl Partition {
    /// Reserve the cell grid. Cells are filled by `initialize`.
    pub fn allocate(width: usize, local_height: usize) -> Result<Self, SimError> {
        let count = width * local_height;
        let mut cells = Vec::new();
        cells
            .try_reserve_exact(count)
            .map_err(|_| SimError::CapacityExhausted { requested: count })?;

        Ok(Self {
            width,
            local_height,
            offset_x: 0,
            offset_y: 0,
            neighbors: Neighbors::default(),
            cells,
            agents: Vec::new(),
            halo_up: None,
            halo_down: None,
        })
    }

    /// Fill every cell from the terrain generator. Resource starts at the
    /// terrain's ceiling.
    pub fn initialize(&mut self, offset_x: i32, offset_y: i32, season: Season) {
        self.offset_x = offset_x;
        self.offset_y = offset_y;

        let width = self.width;
        self.cells.clear();
        self.cells.par_extend((0..width * self.local_height).into_par_iter().map(|idx| {
            let gx = offset_x + (idx % width) as i32;
            let gy = offset_y + (idx / width) as i32;
            let t = terrain::terrain(gx, gy);
            Cell::new(t, terrain::ceiling(t), terrain::accessible(t, season))
        }));
    }

    pub fn release(self) {
        debug!(
            offset_y = self.offset_y,
            cells = self.cells.len(),
            agents = self.agents.len(),
            "releasing partition"
        );
    }

    /// Make room for `n` resident agents. Grows by `AGENT_CAPACITY_SLACK`
    /// past `n` rather than to an exact fit.
    pub fn ensure_capacity(&mut self, n: usize) -> Result<(), SimError> {
        if n <= self.agents.capacity() {
            return Ok(());
        }
        let additional = n - self.agents.len() + AGENT_CAPACITY_SLACK;
        self.agents
            .try_reserve_exact(additional)
            .map_err(|_| SimError::CapacityExhausted { requested: n })
    }

    /// Place `count` agents uniformly inside the band, ids from `first_id`.
    pub fn seed_agents<R: Rng>(
        &mut self,
        count: usize,
        first_id: u64,
        energy: f64,
        rng: &mut R,
    ) -> Result<(), SimError> {
        self.ensure_capacity(self.agents.len() + count)?;
        for i in 0..count {
            let x = rng.gen_range(0..self.width) as i32;
            let y = rng.gen_range(0..self.local_height) as i32;
            self.agents.push(Agent {
                id: first_id + i as u64,
                x,
                y,
                gx: self.offset_x + x,
                gy: self.offset_y + y,
                energy,
            });
        }
        Ok(())
    }

    pub fn index(&self, x: i32, y: i32) -> usize {
        y as usize * self.width + x as usize
    }

    pub fn cell(&self, x: i32, y: i32) -> &Cell {
        &self.cells[self.index(x, y)]
    }

    pub fn top_row(&self) -> Vec<f64> {
        self.row(0)
    }

    pub fn bottom_row(&self) -> Vec<f64> {
        self.row(self.local_height - 1)
    }

    fn row(&self, y: usize) -> Vec<f64> {
        let start = y * self.width;
        self.cells[start..start + self.width]
            .iter()
            .map(|c| c.resource.load())
            .collect()
    }

    /// Recompute accessibility after the season changed.
    pub fn apply_season(&mut self, season: Season) {
        self.cells.par_iter_mut().for_each(|cell| {
            cell.accessible = terrain::accessible(cell.terrain, season);
        });
    }

    /// Add `amount` to every regenerating cell, capped at its ceiling.
    pub fn regenerate(&mut self, amount: f64) {
        self.cells.par_iter_mut().for_each(|cell| {
            if terrain::regenerates(cell.terrain) {
                let cap = terrain::ceiling(cell.terrain);
                cell.resource.update(|r| (r + amount).min(cap));
            }
        });
    }

    pub fn in_bounds(&self, agent: &Agent) -> bool {
        agent.x >= 0
            && (agent.x as usize) < self.width
            && agent.y >= 0
            && (agent.y as usize) < self.local_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Terrain;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn band(width: usize, height: usize, offset_y: i32) -> Partition {
        let mut p = Partition::allocate(width, height).unwrap();
        p.initialize(0, offset_y, Season::Dry);
        p
    }

    #[test]
    fn test_initialize_matches_terrain_generator() {
        let p = band(7, 3, 6);
        assert_eq!(p.cells.len(), 21);
        for y in 0..3 {
            for x in 0..7 {
                let cell = p.cell(x, y);
                let t = terrain::terrain(x, 6 + y);
                assert_eq!(cell.terrain, t);
                assert_eq!(cell.resource.load(), terrain::ceiling(t));
                assert_eq!(cell.accessible, terrain::accessible(t, Season::Dry));
            }
        }
    }

    #[test]
    fn test_ensure_capacity_adds_slack() {
        let mut p = band(4, 4, 0);
        p.ensure_capacity(10).unwrap();
        assert!(p.agents.capacity() >= 10 + AGENT_CAPACITY_SLACK);

        let before = p.agents.capacity();
        p.ensure_capacity(before).unwrap();
        assert_eq!(p.agents.capacity(), before);
    }

    #[test]
    fn test_seeded_agents_in_bounds() {
        let mut p = band(5, 2, 4);
        let mut rng = SmallRng::seed_from_u64(3);
        p.seed_agents(50, 100, 10.0, &mut rng).unwrap();
        assert_eq!(p.agents.len(), 50);
        assert_eq!(p.agents[0].id, 100);
        for a in &p.agents {
            assert!(p.in_bounds(a));
            assert_eq!(a.gy, p.offset_y + a.y);
            assert_eq!(a.gx, a.x);
        }
    }

    #[test]
    fn test_regenerate_respects_ceiling_and_exemptions() {
        let mut p = band(10, 10, 0);
        for cell in &p.cells {
            cell.resource.store(0.0);
        }
        for _ in 0..200 {
            p.regenerate(1.5);
        }
        for cell in &p.cells {
            let r = cell.resource.load();
            assert!(r >= 0.0);
            assert!(r <= terrain::ceiling(cell.terrain));
            match cell.terrain {
                Terrain::Village | Terrain::Restricted => assert_eq!(r, 0.0),
                t => assert_eq!(r, terrain::ceiling(t)),
            }
        }
    }

    #[test]
    fn test_apply_season_toggles_fishing() {
        let mut p = band(10, 2, 0);
        let fishing = |p: &Partition| {
            p.cells
                .iter()
                .filter(|c| c.terrain == Terrain::Fishing)
                .all(|c| c.accessible)
        };
        assert!(!fishing(&p));
        p.apply_season(Season::Flood);
        assert!(fishing(&p));
        assert!(p.cells.iter().filter(|c| c.terrain == Terrain::Restricted).all(|c| !c.accessible));
    }
}
