mod input;
mod loop_runner;
mod metrics;

pub use input::{ActionStates, InputAction};
pub use loop_runner::{
    play_session, run_session, AppError, InputSource, LoopConfig, SessionSummary, StopReason,
    View, MAX_TICKS_ENV_VAR,
};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};
