mod kind;
mod pool;
mod scheduler;
mod worker;

pub use kind::{BoosterEffect, BoosterKind};
pub use pool::{BoosterPool, PoolConfig, PoolError, PoolStats, SpawnError, SpawnOutcome};
pub use worker::{ConsumeMode, SettleDelay, WorkerId, WorkerPhase};
