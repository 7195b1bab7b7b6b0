use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::sync;

// Keeps scaled intervals well inside `Duration` range.
const MIN_SPEED_FACTOR: f32 = 0.05;
const MAX_SPEED_FACTOR: f32 = 100.0;

#[derive(Debug, Clone, Copy)]
struct ActiveBoost {
    factor: f32,
    until: Instant,
}

#[derive(Debug)]
struct SpeedState {
    base_interval: Duration,
    min_interval: Duration,
    boost: Option<ActiveBoost>,
}

/// Cross-thread half of the game state. Booster threads write through these
/// setters; the tick thread reads the results at the start of each tick.
#[derive(Debug)]
pub struct EffectState {
    pending_growth: AtomicBool,
    speed: Mutex<SpeedState>,
}

impl EffectState {
    pub fn new(initial_interval: Duration, min_interval: Duration) -> Self {
        Self {
            pending_growth: AtomicBool::new(false),
            speed: Mutex::new(SpeedState {
                base_interval: initial_interval.max(min_interval),
                min_interval,
                boost: None,
            }),
        }
    }

    pub fn set_pending_growth(&self) {
        self.pending_growth.store(true, Ordering::Release);
    }

    pub fn has_pending_growth(&self) -> bool {
        self.pending_growth.load(Ordering::Acquire)
    }

    pub(crate) fn take_pending_growth(&self) -> bool {
        self.pending_growth.swap(false, Ordering::AcqRel)
    }

    /// Permanently scales the tick rate. `factor > 1.0` speeds the snake up.
    pub fn adjust_speed(&self, factor: f32) {
        if !is_valid_factor(factor) {
            warn!(factor, "ignoring invalid speed factor");
            return;
        }
        let mut speed = sync::lock(&self.speed, "speed_adjust");
        let adjusted = scale_interval(speed.base_interval, factor);
        speed.base_interval = adjusted.max(speed.min_interval);
        debug!(
            factor,
            base_interval_ms = speed.base_interval.as_millis() as u64,
            "speed_adjusted"
        );
    }

    pub fn boost_speed(&self, factor: f32, duration: Duration) {
        self.boost_speed_at(Instant::now(), factor, duration);
    }

    /// A new boost replaces any boost still running, restarting its timer.
    pub fn boost_speed_at(&self, now: Instant, factor: f32, duration: Duration) {
        if !is_valid_factor(factor) {
            warn!(factor, "ignoring invalid speed boost factor");
            return;
        }
        let mut speed = sync::lock(&self.speed, "speed_boost");
        speed.boost = Some(ActiveBoost {
            factor,
            until: now + duration,
        });
        debug!(
            factor,
            duration_ms = duration.as_millis() as u64,
            "speed_boost_started"
        );
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval_at(Instant::now())
    }

    pub fn tick_interval_at(&self, now: Instant) -> Duration {
        let mut speed = sync::lock(&self.speed, "speed_read");
        if let Some(boost) = speed.boost {
            if now >= boost.until {
                speed.boost = None;
                debug!("speed_boost_expired");
            }
        }
        let interval = match speed.boost {
            Some(boost) => scale_interval(speed.base_interval, boost.factor),
            None => speed.base_interval,
        };
        interval.max(speed.min_interval)
    }
}

fn is_valid_factor(factor: f32) -> bool {
    factor.is_finite() && (MIN_SPEED_FACTOR..=MAX_SPEED_FACTOR).contains(&factor)
}

fn scale_interval(interval: Duration, factor: f32) -> Duration {
    let micros = interval.as_micros() as f64 / f64::from(factor);
    Duration::from_micros(micros.round() as u64)
}
