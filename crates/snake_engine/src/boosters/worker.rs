use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::assets::SoundSink;
use crate::session::{Cell, EffectState};
use crate::sync;

use super::kind::BoosterKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Idle,
    Armed,
    Consuming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeMode {
    Apply,
    Skip,
}

/// Random delay between arming a booster and it becoming consumable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleDelay {
    pub min: Duration,
    pub max: Duration,
}

impl SettleDelay {
    pub const ZERO: SettleDelay = SettleDelay {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min: min.min(max),
            max: max.max(min),
        }
    }

    fn sample(&self, rng: &mut impl Rng) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        Duration::from_millis(rng.random_range(min_ms..=max_ms))
    }
}

/// Everything a booster thread needs to apply its effect.
#[derive(Clone)]
pub(crate) struct EffectContext {
    pub(crate) effects: Arc<EffectState>,
    pub(crate) sounds: Arc<dyn SoundSink>,
}

/// Returns the worker to its pool. `false` means the pool is gone.
pub(crate) type Recycler = Box<dyn Fn(WorkerId) -> bool + Send + Sync>;

#[derive(Debug)]
struct WorkerSlot {
    phase: WorkerPhase,
    position: Option<Cell>,
    ready: bool,
    pending: Option<ConsumeMode>,
    shutdown: bool,
}

#[derive(Debug)]
pub(crate) struct BoosterWorker {
    id: WorkerId,
    kind: BoosterKind,
    settle: SettleDelay,
    slot: Mutex<WorkerSlot>,
    signal: Condvar,
}

impl BoosterWorker {
    fn new(id: WorkerId, kind: BoosterKind, settle: SettleDelay) -> Self {
        Self {
            id,
            kind,
            settle,
            slot: Mutex::new(WorkerSlot {
                phase: WorkerPhase::Idle,
                position: None,
                ready: false,
                pending: None,
                shutdown: false,
            }),
            signal: Condvar::new(),
        }
    }

    pub(crate) fn id(&self) -> WorkerId {
        self.id
    }

    pub(crate) fn kind(&self) -> &BoosterKind {
        &self.kind
    }

    pub(crate) fn phase(&self) -> WorkerPhase {
        sync::lock(&self.slot, "worker_phase").phase
    }

    pub(crate) fn position(&self) -> Option<Cell> {
        sync::lock(&self.slot, "worker_position").position
    }

    pub(crate) fn is_ready(&self) -> bool {
        sync::lock(&self.slot, "worker_ready").ready
    }

    pub(crate) fn arm(&self, position: Cell) -> bool {
        let mut slot = sync::lock(&self.slot, "worker_arm");
        if slot.shutdown || slot.phase != WorkerPhase::Idle {
            return false;
        }
        slot.phase = WorkerPhase::Armed;
        slot.position = Some(position);
        slot.ready = false;
        slot.pending = None;
        self.signal.notify_all();
        true
    }

    /// Moves an armed worker to `Consuming` and wakes its thread. With
    /// `require_ready` a worker still settling is left alone.
    pub(crate) fn request_consume(&self, mode: ConsumeMode, require_ready: bool) -> bool {
        let mut slot = sync::lock(&self.slot, "worker_consume");
        if slot.shutdown || slot.phase != WorkerPhase::Armed {
            return false;
        }
        if require_ready && !slot.ready {
            return false;
        }
        slot.phase = WorkerPhase::Consuming;
        slot.pending = Some(mode);
        self.signal.notify_all();
        true
    }

    pub(crate) fn mark_idle(&self) -> Option<Cell> {
        let mut slot = sync::lock(&self.slot, "worker_idle");
        slot.phase = WorkerPhase::Idle;
        slot.ready = false;
        slot.pending = None;
        slot.position.take()
    }

    pub(crate) fn shutdown(&self) {
        let mut slot = sync::lock(&self.slot, "worker_shutdown");
        slot.shutdown = true;
        self.signal.notify_all();
    }

    /// Blocks until the booster has settled. Returns `false` on timeout or if
    /// the worker left `Armed` first.
    pub(crate) fn wait_until_ready(&self, timeout: Duration) -> bool {
        let slot = sync::lock(&self.slot, "worker_wait_ready");
        let (slot, _) = sync::wait_timeout_while(
            &self.signal,
            slot,
            timeout,
            "worker_wait_ready",
            |slot| !slot.shutdown && slot.phase == WorkerPhase::Armed && !slot.ready,
        );
        slot.phase == WorkerPhase::Armed && slot.ready
    }

    fn run(&self, context: &EffectContext, recycle: &Recycler, mut rng: StdRng) {
        debug!(worker = self.id.0, kind = %self.kind.name, "booster_worker_started");
        loop {
            let slot = sync::lock(&self.slot, "worker_loop");
            let mut slot = sync::wait_while(&self.signal, slot, "worker_idle_wait", |slot| {
                !slot.shutdown && slot.phase == WorkerPhase::Idle
            });
            if slot.shutdown {
                break;
            }

            if slot.phase == WorkerPhase::Armed && !slot.ready {
                let delay = self.settle.sample(&mut rng);
                let (settled, _) = sync::wait_timeout_while(
                    &self.signal,
                    slot,
                    delay,
                    "worker_settle_wait",
                    |slot| !slot.shutdown && slot.phase == WorkerPhase::Armed,
                );
                slot = settled;
                if slot.shutdown {
                    break;
                }
                if slot.phase == WorkerPhase::Armed {
                    slot.ready = true;
                    self.signal.notify_all();
                    debug!(
                        worker = self.id.0,
                        kind = %self.kind.name,
                        settle_ms = delay.as_millis() as u64,
                        "booster_ready"
                    );
                }
            }

            let mut slot = sync::wait_while(&self.signal, slot, "worker_consume_wait", |slot| {
                !slot.shutdown && slot.pending.is_none()
            });
            if slot.shutdown {
                break;
            }
            let mode = slot.pending.take();
            let position = slot.position;
            drop(slot);

            match mode {
                Some(ConsumeMode::Apply) => {
                    self.kind.effect.apply(&context.effects);
                    context.sounds.play(&self.kind.sound);
                    info!(
                        worker = self.id.0,
                        kind = %self.kind.name,
                        cell = ?position,
                        "booster_consumed"
                    );
                }
                Some(ConsumeMode::Skip) => {
                    debug!(
                        worker = self.id.0,
                        kind = %self.kind.name,
                        cell = ?position,
                        "booster_skipped"
                    );
                }
                None => continue,
            }

            if !recycle(self.id) {
                self.mark_idle();
            }
        }
        debug!(worker = self.id.0, kind = %self.kind.name, "booster_worker_exiting");
    }
}

/// Owning handle for one booster thread.
#[derive(Debug)]
pub(crate) struct WorkerHandle {
    worker: Arc<BoosterWorker>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub(crate) fn spawn(
        id: WorkerId,
        kind: BoosterKind,
        settle: SettleDelay,
        rng: StdRng,
        context: EffectContext,
        recycle: Recycler,
    ) -> io::Result<Self> {
        let worker = Arc::new(BoosterWorker::new(id, kind, settle));
        let thread_worker = Arc::clone(&worker);
        let thread = thread::Builder::new()
            .name(format!("booster-{}", worker.kind.name))
            .spawn(move || thread_worker.run(&context, &recycle, rng))?;

        Ok(Self {
            worker,
            thread: Some(thread),
        })
    }

    pub(crate) fn worker(&self) -> &Arc<BoosterWorker> {
        &self.worker
    }

    pub(crate) fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map(|thread| !thread.is_finished())
            .unwrap_or(false)
    }

    pub(crate) fn shutdown_and_join(&mut self) {
        self.worker.shutdown();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(worker = self.worker.id.0, "booster worker panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}
