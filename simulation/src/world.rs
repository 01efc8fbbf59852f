//! Unit World - one compute unit's orchestrator
//!
//! Owns the partition, the unit's endpoint into the message mesh, its rayon
//! pool and its season replica. `tick` runs one full cycle.

use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{error, info};

use crate::comm::Communicator;
use crate::config::SimConfig;
use crate::error::SimError;
use crate::observer::{Observer, PartitionView};
use crate::partition::Partition;
use crate::systems::{self, CycleRecord, SeasonClock, StepParams};

pub struct UnitWorld {
    pub comm: Communicator,
    pub partition: Partition,
    pub season: SeasonClock,
    pool: ThreadPool,
    params: StepParams,
    config: SimConfig,
    cycle: u64,
}

impl UnitWorld {
    /// Validate, allocate and seed this unit's band. Every unit checks the
    /// preconditions itself, so a bad config stops them all before any
    /// message is exchanged.
    pub fn new(config: &SimConfig, comm: Communicator) -> Result<Self, SimError> {
        if let Err(err) = config.validate() {
            if comm.is_root() {
                error!(%err, "rejecting configuration");
            }
            return Err(err);
        }

        let rank = comm.rank();
        let threads = config.resolved_threads();
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |i| format!("unit{}-worker{}", rank, i))
            .build()?;

        let local_height = config.local_height();
        let offset_y = (rank * local_height) as i32;

        let mut partition = Partition::allocate(config.width, local_height)?;
        partition.neighbors = comm.neighbors();
        pool.install(|| partition.initialize(0, offset_y, config.initial_season));

        let share = config.agent_share(rank) as usize;
        let unit_seed = config.seed ^ (rank as u64).wrapping_mul(0x2545_F491_4F6C_DD1D);
        let mut rng = SmallRng::seed_from_u64(unit_seed);
        let first_id = config.first_agent_id(rank);
        partition.seed_agents(share, first_id, config.initial_energy, &mut rng)?;

        if comm.is_root() {
            info!(
                units = comm.size(),
                threads_per_unit = threads,
                width = config.width,
                height = config.height,
                local_height,
                agents = config.agents,
                "starting partitioned simulation"
            );
        }

        Ok(Self {
            comm,
            partition,
            season: SeasonClock::new(config.initial_season, config.season_period),
            pool,
            params: StepParams::from(config),
            config: config.clone(),
            cycle: 0,
        })
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Run one cycle. Every unit must call this the same number of times.
    ///
    /// The season broadcast, the halo swap and the migration exchange each
    /// close on a barrier, and so does the cycle itself.
    pub fn tick<O: Observer + ?Sized>(&mut self, observer: &O) -> Result<CycleRecord, SimError> {
        let cycle = self.cycle;

        if let Some(season) = self.season.advance(cycle, &self.comm)? {
            let partition = &mut self.partition;
            self.pool.install(|| partition.apply_season(season));
        }

        systems::halo_exchange(&mut self.partition, &self.comm)?;

        let (partition, params, seed) = (&mut self.partition, &self.params, self.config.seed);
        let outgoing = self.pool.install(|| systems::step_agents(partition, params, seed, cycle))?;

        let migration = systems::migrate(&mut self.partition, &self.comm, outgoing)?;

        let amount = self.config.regeneration(self.season.current());
        let partition = &mut self.partition;
        self.pool.install(|| partition.regenerate(amount));

        let partition = &self.partition;
        let local = self.pool.install(|| systems::local_totals(partition, &migration));
        let totals = systems::global_totals(&self.comm, local)?;
        let record = CycleRecord::new(cycle, self.season.current(), totals);

        observer.on_partition(&self.view());
        if self.comm.is_root() {
            observer.on_cycle(&record);
        }

        self.comm.barrier()?;
        self.cycle += 1;
        Ok(record)
    }

    pub fn view(&self) -> PartitionView<'_> {
        PartitionView {
            rank: self.comm.rank(),
            width: self.partition.width,
            local_height: self.partition.local_height,
            offset_y: self.partition.offset_y,
            cells: &self.partition.cells,
            agents: &self.partition.agents,
        }
    }

    /// Tear down and hand back the communicator.
    pub fn finish(self) -> Communicator {
        self.partition.release();
        self.comm
    }
}
