use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, info};

use crate::assets::SoundSink;
use crate::session::{BoosterField, Cell, EffectState, GridSize, OccupancyHandle, Rgb};
use crate::sync;

use super::kind::BoosterKind;
use super::scheduler::SpawnScheduler;
use super::worker::{
    BoosterWorker, ConsumeMode, EffectContext, SettleDelay, WorkerHandle, WorkerId, WorkerPhase,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub grid: GridSize,
    pub spawn_period: Duration,
    pub settle: SettleDelay,
    pub seed: Option<u64>,
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("booster pool is already initialized")]
    AlreadyInitialized,
    #[error("booster pool has been shut down")]
    ShutDown,
    #[error("at least one booster kind is required")]
    NoKinds,
    #[error("duplicate booster kind: {name}")]
    DuplicateKind { name: String },
    #[error("failed to spawn thread {thread}: {source}")]
    SpawnThread {
        thread: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpawnError {
    #[error("booster pool is not running")]
    NotRunning,
    #[error("booster pool is paused")]
    Paused,
    #[error("unknown booster kind: {name}")]
    UnknownKind { name: String },
    #[error("booster kind {name} is already on the grid")]
    KindBusy { name: String },
    #[error("cell {cell:?} is outside the grid")]
    OutOfBounds { cell: Cell },
    #[error("cell {cell:?} is covered by the snake")]
    BlockedBySnake { cell: Cell },
    #[error("cell {cell:?} already holds a booster")]
    CellOccupied { cell: Cell },
}

/// Result of one scheduler attempt. Everything except `Armed` is a routine
/// skip; the next period simply tries again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    Armed { worker: WorkerId, cell: Cell },
    NotRunning,
    Paused,
    BlockedBySnake(Cell),
    CellOccupied(Cell),
    NoIdleWorker,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub total: usize,
    pub idle: usize,
    pub armed: usize,
    pub consuming: usize,
    pub occupied_cells: usize,
}

#[derive(Debug)]
struct PoolState {
    workers: Vec<Arc<BoosterWorker>>,
    idle: Vec<WorkerId>,
    occupied: HashMap<Cell, WorkerId>,
    paused: bool,
    running: bool,
    shut_down: bool,
    rng: StdRng,
}

impl PoolState {
    fn worker(&self, id: WorkerId) -> Option<&Arc<BoosterWorker>> {
        self.workers.get(id.0 as usize)
    }

    fn check_cell(&self, cell: Cell, occupancy: &OccupancyHandle) -> Result<(), SpawnError> {
        if occupancy.contains(cell) {
            return Err(SpawnError::BlockedBySnake { cell });
        }
        if self.occupied.contains_key(&cell) {
            return Err(SpawnError::CellOccupied { cell });
        }
        Ok(())
    }

    fn arm_idle(&mut self, idle_index: usize, cell: Cell) -> Option<WorkerId> {
        let id = self.idle.swap_remove(idle_index);
        let armed = self
            .worker(id)
            .map(|worker| worker.arm(cell))
            .unwrap_or(false);
        if !armed {
            self.idle.push(id);
            return None;
        }
        self.occupied.insert(cell, id);
        Some(id)
    }
}

#[derive(Debug)]
struct PoolShared {
    state: Mutex<PoolState>,
    idle_signal: Condvar,
    grid: GridSize,
    occupancy: OccupancyHandle,
}

impl PoolShared {
    fn try_spawn(&self) -> SpawnOutcome {
        let mut state = sync::lock(&self.state, "pool_try_spawn");
        if !state.running {
            return SpawnOutcome::NotRunning;
        }
        if state.paused {
            return SpawnOutcome::Paused;
        }

        let cell = Cell::new(
            state.rng.random_range(0..self.grid.width.max(1)) as i32,
            state.rng.random_range(0..self.grid.height.max(1)) as i32,
        );
        match state.check_cell(cell, &self.occupancy) {
            Err(SpawnError::BlockedBySnake { cell }) => {
                debug!(cell = ?cell, "booster_spawn_skipped_snake");
                return SpawnOutcome::BlockedBySnake(cell);
            }
            Err(_) => {
                debug!(cell = ?cell, "booster_spawn_skipped_occupied");
                return SpawnOutcome::CellOccupied(cell);
            }
            Ok(()) => {}
        }
        if state.idle.is_empty() {
            debug!("booster_spawn_skipped_no_idle_worker");
            return SpawnOutcome::NoIdleWorker;
        }

        let idle_count = state.idle.len();
        let idle_index = state.rng.random_range(0..idle_count);
        match state.arm_idle(idle_index, cell) {
            Some(worker) => {
                log_armed(&state, worker, cell);
                SpawnOutcome::Armed { worker, cell }
            }
            None => SpawnOutcome::NotRunning,
        }
    }

    fn arm_kind_at(&self, kind_name: &str, cell: Cell) -> Result<WorkerId, SpawnError> {
        let mut state = sync::lock(&self.state, "pool_arm_at");
        if !state.running {
            return Err(SpawnError::NotRunning);
        }
        if state.paused {
            return Err(SpawnError::Paused);
        }
        if !self.grid.contains(cell) {
            return Err(SpawnError::OutOfBounds { cell });
        }
        let id = state
            .workers
            .iter()
            .find(|worker| worker.kind().name == kind_name)
            .map(|worker| worker.id())
            .ok_or_else(|| SpawnError::UnknownKind {
                name: kind_name.to_string(),
            })?;
        state.check_cell(cell, &self.occupancy)?;
        let idle_index = state
            .idle
            .iter()
            .position(|idle| *idle == id)
            .ok_or_else(|| SpawnError::KindBusy {
                name: kind_name.to_string(),
            })?;
        let worker = state
            .arm_idle(idle_index, cell)
            .ok_or(SpawnError::NotRunning)?;
        log_armed(&state, worker, cell);
        Ok(worker)
    }

    fn consume_at(&self, cell: Cell) -> Option<WorkerId> {
        let state = sync::lock(&self.state, "pool_consume_at");
        let id = *state.occupied.get(&cell)?;
        let worker = state.worker(id)?;
        let mode = if state.paused {
            ConsumeMode::Skip
        } else {
            ConsumeMode::Apply
        };
        worker.request_consume(mode, true).then_some(id)
    }

    /// Called from the worker's own thread once its effect is done.
    fn recycle(&self, id: WorkerId) -> bool {
        let mut state = sync::lock(&self.state, "pool_recycle");
        let Some(worker) = state.worker(id).cloned() else {
            return false;
        };
        if let Some(cell) = worker.mark_idle() {
            if state.occupied.get(&cell) == Some(&id) {
                state.occupied.remove(&cell);
            }
        }
        if !state.idle.contains(&id) {
            state.idle.push(id);
        }
        debug!(worker = id.0, kind = %worker.kind().name, "booster_recycled");
        self.idle_signal.notify_all();
        true
    }

    /// Returns whether the flag changed.
    fn set_paused(&self, paused: bool) -> bool {
        let mut state = sync::lock(&self.state, "pool_set_paused");
        if state.paused == paused {
            return false;
        }
        state.paused = paused;
        if paused {
            let mut drained = 0usize;
            for id in state.occupied.values() {
                if let Some(worker) = state.worker(*id) {
                    if worker.request_consume(ConsumeMode::Skip, false) {
                        drained += 1;
                    }
                }
            }
            info!(drained, "booster_pool_paused");
        } else {
            info!("booster_pool_resumed");
        }
        true
    }
}

fn log_armed(state: &PoolState, worker: WorkerId, cell: Cell) {
    if let Some(armed) = state.worker(worker) {
        info!(
            worker = worker.0,
            kind = %armed.kind().name,
            cell = ?cell,
            "booster_armed"
        );
    }
}

#[derive(Debug, Default)]
struct PoolThreads {
    workers: Vec<WorkerHandle>,
    scheduler: Option<SpawnScheduler>,
}

/// Fixed set of booster threads plus the timer that places them on the grid.
#[derive(Debug)]
pub struct BoosterPool {
    config: PoolConfig,
    shared: Arc<PoolShared>,
    threads: Mutex<PoolThreads>,
}

impl BoosterPool {
    pub fn new(config: PoolConfig, occupancy: OccupancyHandle) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::random()),
        };
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                workers: Vec::new(),
                idle: Vec::new(),
                occupied: HashMap::new(),
                paused: false,
                running: false,
                shut_down: false,
                rng,
            }),
            idle_signal: Condvar::new(),
            grid: config.grid,
            occupancy,
        });
        Self {
            config,
            shared,
            threads: Mutex::new(PoolThreads::default()),
        }
    }

    /// Starts one thread per kind and the spawn timer. Only valid once.
    pub fn initialize(
        &self,
        kinds: Vec<BoosterKind>,
        effects: Arc<EffectState>,
        sounds: Arc<dyn SoundSink>,
    ) -> Result<(), PoolError> {
        let mut threads = sync::lock(&self.threads, "pool_threads");
        {
            let state = sync::lock(&self.shared.state, "pool_initialize");
            if state.shut_down {
                return Err(PoolError::ShutDown);
            }
            if state.running {
                return Err(PoolError::AlreadyInitialized);
            }
        }
        validate_kinds(&kinds)?;
        let worker_seeds: Vec<u64> = {
            let mut state = sync::lock(&self.shared.state, "pool_initialize");
            kinds.iter().map(|_| state.rng.random()).collect()
        };

        let context = EffectContext { effects, sounds };
        let kind_names: Vec<String> = kinds.iter().map(|kind| kind.name.clone()).collect();
        let mut handles = Vec::with_capacity(kinds.len());
        for (index, (kind, seed)) in kinds.into_iter().zip(worker_seeds).enumerate() {
            let thread_name = format!("booster-{}", kind.name);
            let weak = Arc::downgrade(&self.shared);
            let handle = WorkerHandle::spawn(
                WorkerId(index as u32),
                kind,
                self.config.settle,
                StdRng::seed_from_u64(seed),
                context.clone(),
                Box::new(move |id| recycle_into(&weak, id)),
            )
            .map_err(|source| PoolError::SpawnThread {
                thread: thread_name,
                source,
            })?;
            handles.push(handle);
        }

        let weak = Arc::downgrade(&self.shared);
        let scheduler = SpawnScheduler::spawn(self.config.spawn_period, move || {
            match weak.upgrade() {
                Some(shared) => {
                    shared.try_spawn();
                    true
                }
                None => false,
            }
        })
        .map_err(|source| PoolError::SpawnThread {
            thread: "booster-spawner".to_string(),
            source,
        })?;

        {
            let mut state = sync::lock(&self.shared.state, "pool_initialize");
            state.workers = handles
                .iter()
                .map(|handle| Arc::clone(handle.worker()))
                .collect();
            state.idle = state.workers.iter().map(|worker| worker.id()).collect();
            state.running = true;
        }
        threads.workers = handles;
        threads.scheduler = Some(scheduler);

        info!(
            kinds = ?kind_names,
            spawn_period_ms = self.config.spawn_period.as_millis() as u64,
            grid_width = self.config.grid.width,
            grid_height = self.config.grid.height,
            "booster_pool_started"
        );
        Ok(())
    }

    pub fn try_spawn(&self) -> SpawnOutcome {
        self.shared.try_spawn()
    }

    /// Places the booster of `kind_name` on `cell`, bypassing the random pick.
    pub fn arm_at(&self, kind_name: &str, cell: Cell) -> Result<WorkerId, SpawnError> {
        self.shared.arm_kind_at(kind_name, cell)
    }

    pub fn set_paused(&self, paused: bool) {
        let changed = self.shared.set_paused(paused);
        if changed && !paused {
            let threads = sync::lock(&self.threads, "pool_threads");
            if let Some(scheduler) = &threads.scheduler {
                scheduler.reschedule();
            }
        }
    }

    pub fn is_paused(&self) -> bool {
        sync::lock(&self.shared.state, "pool_is_paused").paused
    }

    pub fn is_running(&self) -> bool {
        sync::lock(&self.shared.state, "pool_is_running").running
    }

    pub fn active_snapshot(&self) -> BTreeMap<Cell, Rgb> {
        let state = sync::lock(&self.shared.state, "pool_snapshot");
        state
            .occupied
            .iter()
            .filter_map(|(cell, id)| state.worker(*id).map(|worker| (*cell, worker.kind().color)))
            .collect()
    }

    pub fn stats(&self) -> PoolStats {
        let state = sync::lock(&self.shared.state, "pool_stats");
        let mut stats = PoolStats {
            total: state.workers.len(),
            occupied_cells: state.occupied.len(),
            ..PoolStats::default()
        };
        for worker in &state.workers {
            match worker.phase() {
                WorkerPhase::Idle => stats.idle += 1,
                WorkerPhase::Armed => stats.armed += 1,
                WorkerPhase::Consuming => stats.consuming += 1,
            }
        }
        stats
    }

    pub fn phase_of(&self, id: WorkerId) -> Option<WorkerPhase> {
        let state = sync::lock(&self.shared.state, "pool_phase_of");
        state.worker(id).map(|worker| worker.phase())
    }

    pub fn position_of(&self, id: WorkerId) -> Option<Cell> {
        let state = sync::lock(&self.shared.state, "pool_position_of");
        state.worker(id).and_then(|worker| worker.position())
    }

    /// Waits for an armed booster to finish settling. Never call this from
    /// the tick thread.
    pub fn wait_until_ready(&self, id: WorkerId, timeout: Duration) -> bool {
        let worker = {
            let state = sync::lock(&self.shared.state, "pool_wait_ready");
            state.worker(id).cloned()
        };
        worker.is_some_and(|worker| worker.wait_until_ready(timeout))
    }

    /// Blocks until some worker is idle. Never call this from the tick thread.
    pub fn wait_for_idle(&self, timeout: Duration) -> bool {
        let state = sync::lock(&self.shared.state, "pool_wait_idle");
        let (state, _) = sync::wait_timeout_while(
            &self.shared.idle_signal,
            state,
            timeout,
            "pool_wait_idle",
            |state| state.running && state.idle.is_empty(),
        );
        state.running && !state.idle.is_empty()
    }

    pub fn live_threads(&self) -> usize {
        let threads = sync::lock(&self.threads, "pool_threads");
        threads
            .workers
            .iter()
            .filter(|handle| handle.is_running())
            .count()
    }

    /// Pauses, stops the timer, then stops and joins every worker. Safe to
    /// call on a pool that was never initialized, and more than once.
    pub fn shutdown(&self) {
        let mut threads = sync::lock(&self.threads, "pool_threads");
        let was_running = {
            let mut state = sync::lock(&self.shared.state, "pool_shutdown");
            let was_running = state.running;
            state.paused = true;
            state.running = false;
            state.shut_down = true;
            state.idle.clear();
            state.occupied.clear();
            state.workers.clear();
            self.shared.idle_signal.notify_all();
            was_running
        };

        if let Some(mut scheduler) = threads.scheduler.take() {
            scheduler.stop();
        }
        for handle in threads.workers.iter_mut() {
            handle.shutdown_and_join();
        }
        threads.workers.clear();

        if was_running {
            info!("booster_pool_shutdown");
        }
    }
}

impl BoosterField for BoosterPool {
    fn consume_at(&self, cell: Cell) -> Option<WorkerId> {
        self.shared.consume_at(cell)
    }
}

impl Drop for BoosterPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn recycle_into(pool: &Weak<PoolShared>, id: WorkerId) -> bool {
    pool.upgrade().is_some_and(|shared| shared.recycle(id))
}

fn validate_kinds(kinds: &[BoosterKind]) -> Result<(), PoolError> {
    if kinds.is_empty() {
        return Err(PoolError::NoKinds);
    }
    let mut seen = HashSet::with_capacity(kinds.len());
    for kind in kinds {
        if !seen.insert(kind.name.as_str()) {
            return Err(PoolError::DuplicateKind {
                name: kind.name.clone(),
            });
        }
    }
    Ok(())
}
