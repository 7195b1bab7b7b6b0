use std::env;
use std::io;
use std::num::ParseIntError;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::assets::SoundSink;
use crate::session::{Frame, GameSession, SessionConfig, SessionError, TickReport};
use crate::StartupError;

use super::input::{ActionStates, InputAction};
use super::metrics::{MetricsAccumulator, MetricsHandle};

pub const MAX_TICKS_ENV_VAR: &str = "SNAKE_MAX_TICKS";

#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// `None` runs until game over or quit.
    pub max_ticks: Option<u64>,
    pub max_tick_delta: Duration,
    pub max_ticks_per_wake: u32,
    pub metrics_log_interval: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_ticks: None,
            max_tick_delta: Duration::from_millis(250),
            max_ticks_per_wake: 3,
            metrics_log_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to start sound preloader: {0}")]
    SpawnPreloader(#[source] io::Error),
}

/// Supplies the actions for the next tick.
pub trait InputSource {
    fn poll(&mut self, frame: &Frame, actions: &mut ActionStates);
}

/// Receives every frame after it has been advanced.
pub trait View {
    fn present(&mut self, frame: &Frame, report: &TickReport);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    GameOver,
    Quit,
    TickLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub reason: StopReason,
    pub ticks: u64,
    pub steps: u64,
    pub length: usize,
}

/// Starts a session, drives it to completion, and shuts it down.
pub fn play_session(
    config: &LoopConfig,
    session_config: SessionConfig,
    sounds: Arc<dyn SoundSink>,
    input: &mut dyn InputSource,
    view: &mut dyn View,
    metrics: &MetricsHandle,
) -> Result<SessionSummary, AppError> {
    let mut session = GameSession::start(session_config, sounds)?;
    let summary = run_session(config, &mut session, input, view, metrics);
    session.shutdown();
    Ok(summary)
}

/// Fixed-step loop whose step length follows the session's current tick
/// interval. Paused steps count toward `max_ticks` but do not move the snake.
pub fn run_session(
    config: &LoopConfig,
    session: &mut GameSession,
    input: &mut dyn InputSource,
    view: &mut dyn View,
    metrics: &MetricsHandle,
) -> SessionSummary {
    let max_tick_delta =
        normalize_non_zero_duration(config.max_tick_delta, Duration::from_millis(250));
    let max_ticks_per_wake = config.max_ticks_per_wake.max(1);
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let max_ticks = resolve_max_ticks(config.max_ticks);
    info!(
        max_ticks = max_ticks.unwrap_or(0),
        max_tick_delta_ms = max_tick_delta.as_millis() as u64,
        max_ticks_per_wake,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        "loop_config"
    );

    let mut actions = ActionStates::default();
    let mut accumulator = Duration::ZERO;
    let mut last_wake = Instant::now();
    let mut metrics_accumulator = MetricsAccumulator::new(metrics_log_interval);
    let mut steps = 0u64;

    let reason = 'run: loop {
        let interval = session.tick_interval();
        let now = Instant::now();
        accumulator = accumulator.saturating_add(clamp_tick_delta(
            now.saturating_duration_since(last_wake),
            max_tick_delta,
        ));
        last_wake = now;

        let step_plan = plan_steps(accumulator, interval, max_ticks_per_wake);
        for _ in 0..step_plan.ticks_to_run {
            if max_ticks.is_some_and(|limit| steps >= limit) {
                break 'run StopReason::TickLimit;
            }
            steps += 1;

            let tick_start = Instant::now();
            actions.clear();
            input.poll(&session.frame(), &mut actions);
            if actions.is_down(InputAction::Quit) {
                info!(reason = "quit_action", "shutdown_requested");
                break 'run StopReason::Quit;
            }
            if actions.is_down(InputAction::TogglePause) {
                let paused = !session.is_paused();
                session.set_paused(paused);
            }
            if let Some(direction) = actions.direction() {
                session.set_direction(direction);
            }

            let report = session.advance();
            let frame = session.frame();
            view.present(&frame, &report);
            metrics_accumulator.record_tick(tick_start.elapsed());

            if report.game_over {
                break 'run StopReason::GameOver;
            }
        }
        accumulator = step_plan.remaining_accumulator;

        if step_plan.dropped_backlog > Duration::ZERO {
            warn!(
                dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                max_ticks_per_wake, "tick_backlog_dropped"
            );
        }

        let active_boosters = session.pool_stats().occupied_cells;
        if let Some(snapshot) =
            metrics_accumulator.maybe_snapshot(now, session.snake().len(), active_boosters)
        {
            metrics.publish(snapshot);
            info!(
                tps = snapshot.tps,
                tick_time_ms = snapshot.tick_time_ms,
                snake_length = snapshot.snake_length,
                active_boosters = snapshot.active_boosters,
                "loop_metrics"
            );
        }

        let sleep = compute_tick_sleep(accumulator, session.tick_interval());
        if sleep > Duration::ZERO {
            thread::sleep(sleep);
        }
    };

    let summary = SessionSummary {
        reason,
        ticks: session.ticks(),
        steps,
        length: session.snake().len(),
    };
    info!(
        reason = ?summary.reason,
        ticks = summary.ticks,
        length = summary.length,
        "session_finished"
    );
    summary
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_steps(mut accumulator: Duration, step: Duration, max_ticks_per_wake: u32) -> StepPlan {
    let step = normalize_non_zero_duration(step, Duration::from_millis(1));
    let mut ticks_to_run = 0u32;

    while accumulator >= step && ticks_to_run < max_ticks_per_wake {
        accumulator = accumulator.saturating_sub(step);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= step {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_tick_delta(delta: Duration, max_tick_delta: Duration) -> Duration {
    delta.min(max_tick_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn compute_tick_sleep(accumulated: Duration, interval: Duration) -> Duration {
    interval.saturating_sub(accumulated)
}

/// `0` means no limit.
fn parse_tick_limit(value: &str) -> Result<Option<u64>, ParseIntError> {
    let limit = value.trim().parse::<u64>()?;
    Ok((limit > 0).then_some(limit))
}

fn resolve_max_ticks(config_max_ticks: Option<u64>) -> Option<u64> {
    match env::var(MAX_TICKS_ENV_VAR) {
        Ok(value) => match parse_tick_limit(&value) {
            Ok(limit) => limit,
            Err(_) => {
                warn!(
                    env_var = MAX_TICKS_ENV_VAR,
                    value = value.as_str(),
                    "invalid tick limit env var value; falling back to config"
                );
                config_max_ticks
            }
        },
        Err(env::VarError::NotPresent) => config_max_ticks,
        Err(err) => {
            warn!(
                env_var = MAX_TICKS_ENV_VAR,
                error = %err,
                "unable to read tick limit env var; falling back to config"
            );
            config_max_ticks
        }
    }
}
