use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::assets::SoundSink;
use crate::boosters::{BoosterPool, PoolStats, SpawnError, WorkerId};

mod config;
mod effects;
mod grid;
mod state;
#[cfg(test)]
mod tests;

pub use config::{SessionConfig, SessionError};
pub use effects::EffectState;
pub use grid::{Cell, Direction, GridSize, Rgb};
pub use state::{BoosterField, OccupancyHandle, Snake, TickReport};

/// What a view needs to draw one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub tick: u64,
    pub grid: GridSize,
    pub snake: Vec<Cell>,
    pub direction: Direction,
    pub boosters: BTreeMap<Cell, Rgb>,
    pub paused: bool,
    pub game_over: bool,
    pub tick_interval: Duration,
}

/// One running game: the snake, the effects boosters write into, and the
/// pool of booster threads. Dropping it stops every thread it started.
pub struct GameSession {
    config: SessionConfig,
    snake: Snake,
    effects: Arc<EffectState>,
    pool: BoosterPool,
    paused: bool,
    ticks: u64,
}

impl GameSession {
    pub fn start(config: SessionConfig, sounds: Arc<dyn SoundSink>) -> Result<Self, SessionError> {
        config.validate()?;

        let effects = Arc::new(EffectState::new(config.initial_tick(), config.min_tick()));
        let occupancy = OccupancyHandle::default();
        let snake = Snake::new(
            config.grid,
            config.grid.center(),
            config.initial_length,
            config.initial_direction,
            Arc::clone(&effects),
            occupancy.clone(),
        );
        let pool = BoosterPool::new(config.pool_config(), occupancy);
        pool.initialize(config.kinds.clone(), Arc::clone(&effects), sounds)?;

        info!(
            grid_width = config.grid.width,
            grid_height = config.grid.height,
            length = snake.len(),
            kinds = config.kinds.len(),
            "session_started"
        );
        Ok(Self {
            config,
            snake,
            effects,
            pool,
            paused: false,
            ticks: 0,
        })
    }

    /// One game tick. A paused or finished session reports without moving.
    /// The tick that ends the game also drains the pool and stops spawning.
    pub fn advance(&mut self) -> TickReport {
        if self.paused || self.snake.is_game_over() {
            return self.snake.status();
        }

        self.ticks += 1;
        let report = self.snake.advance(&self.pool);
        if let Some(worker) = report.consumed {
            debug!(
                tick = self.ticks,
                worker = worker.0,
                head = ?report.head,
                "session_booster_consumed"
            );
        }
        if report.game_over {
            self.pool.set_paused(true);
            info!(tick = self.ticks, length = report.length, "session_game_over");
        }
        report
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.snake.set_direction(direction);
    }

    /// Pausing freezes the snake and drains every armed booster without
    /// applying it. After a game over the pool stays drained either way.
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused == paused {
            return;
        }
        self.paused = paused;
        if !self.snake.is_game_over() {
            self.pool.set_paused(paused);
        }
        info!(paused, tick = self.ticks, "session_paused_changed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_game_over(&self) -> bool {
        self.snake.is_game_over()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn tick_interval(&self) -> Duration {
        self.effects.tick_interval()
    }

    pub fn active_snapshot(&self) -> BTreeMap<Cell, Rgb> {
        self.pool.active_snapshot()
    }

    pub fn frame(&self) -> Frame {
        Frame {
            tick: self.ticks,
            grid: self.config.grid,
            snake: self.snake.body().collect(),
            direction: self.snake.direction(),
            boosters: self.pool.active_snapshot(),
            paused: self.paused,
            game_over: self.snake.is_game_over(),
            tick_interval: self.tick_interval(),
        }
    }

    pub fn arm_at(&self, kind_name: &str, cell: Cell) -> Result<WorkerId, SpawnError> {
        self.pool.arm_at(kind_name, cell)
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn snake(&self) -> &Snake {
        &self.snake
    }

    pub fn effects(&self) -> &Arc<EffectState> {
        &self.effects
    }

    pub fn pool(&self) -> &BoosterPool {
        &self.pool
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn shutdown(&self) {
        self.pool.shutdown();
        info!(tick = self.ticks, length = self.snake.len(), "session_shutdown");
    }
}
