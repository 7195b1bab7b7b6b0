use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::boosters::{BoosterKind, PoolConfig, PoolError, SettleDelay};

use super::grid::{Direction, GridSize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub grid: GridSize,
    pub initial_length: usize,
    pub initial_direction: Direction,
    pub initial_tick_ms: u64,
    pub min_tick_ms: u64,
    pub spawn_period_ms: u64,
    pub settle_min_ms: u64,
    pub settle_max_ms: u64,
    pub seed: Option<u64>,
    pub kinds: Vec<BoosterKind>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grid: GridSize::new(20, 15),
            initial_length: 4,
            initial_direction: Direction::Right,
            initial_tick_ms: 150,
            min_tick_ms: 40,
            spawn_period_ms: 1_500,
            settle_min_ms: 100,
            settle_max_ms: 400,
            seed: None,
            kinds: BoosterKind::default_set(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("grid must be at least 2x2, got {width}x{height}")]
    GridTooSmall { width: u32, height: u32 },
    #[error(
        "grid {width}x{height} exceeds the limit of {max_span} per side and {max_cells} cells"
    )]
    GridTooLarge {
        width: u32,
        height: u32,
        max_span: u32,
        max_cells: u64,
    },
    #[error("initial length {length} does not fit a grid span of {span}")]
    SnakeTooLong { length: usize, span: u32 },
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
    #[error("initial tick {initial_ms}ms is faster than the minimum tick {min_ms}ms")]
    TickBelowMinimum { initial_ms: u64, min_ms: u64 },
    #[error("duplicate booster kind in config: {name}")]
    DuplicateKind { name: String },
    #[error("booster pool failed to start: {0}")]
    Pool(#[from] PoolError),
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.grid.width < 2 || self.grid.height < 2 {
            return Err(SessionError::GridTooSmall {
                width: self.grid.width,
                height: self.grid.height,
            });
        }
        if self.grid.width > GridSize::MAX_SPAN
            || self.grid.height > GridSize::MAX_SPAN
            || self.grid.cell_count() > GridSize::MAX_CELLS
        {
            return Err(SessionError::GridTooLarge {
                width: self.grid.width,
                height: self.grid.height,
                max_span: GridSize::MAX_SPAN,
                max_cells: GridSize::MAX_CELLS,
            });
        }
        let span = match self.initial_direction {
            Direction::Left | Direction::Right => self.grid.width,
            Direction::Up | Direction::Down => self.grid.height,
        };
        if self.initial_length == 0 || self.initial_length >= span as usize {
            return Err(SessionError::SnakeTooLong {
                length: self.initial_length,
                span,
            });
        }
        for (field, value) in [
            ("initial_tick_ms", self.initial_tick_ms),
            ("min_tick_ms", self.min_tick_ms),
            ("spawn_period_ms", self.spawn_period_ms),
        ] {
            if value == 0 {
                return Err(SessionError::ZeroDuration { field });
            }
        }
        if self.initial_tick_ms < self.min_tick_ms {
            return Err(SessionError::TickBelowMinimum {
                initial_ms: self.initial_tick_ms,
                min_ms: self.min_tick_ms,
            });
        }
        let mut seen = HashSet::with_capacity(self.kinds.len());
        for kind in &self.kinds {
            if !seen.insert(kind.name.as_str()) {
                return Err(SessionError::DuplicateKind {
                    name: kind.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn initial_tick(&self) -> Duration {
        Duration::from_millis(self.initial_tick_ms)
    }

    pub fn min_tick(&self) -> Duration {
        Duration::from_millis(self.min_tick_ms)
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            grid: self.grid,
            spawn_period: Duration::from_millis(self.spawn_period_ms),
            settle: SettleDelay::new(
                Duration::from_millis(self.settle_min_ms),
                Duration::from_millis(self.settle_max_ms),
            ),
            seed: self.seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        SessionConfig::default().validate().expect("default config");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{ "grid": { "width": 10, "height": 10 }, "seed": 7 }"#)
                .expect("parse config");

        assert_eq!(config.grid, GridSize::new(10, 10));
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.initial_tick_ms, SessionConfig::default().initial_tick_ms);
        assert_eq!(config.kinds.len(), 2);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let result = serde_json::from_str::<SessionConfig>(r#"{ "grid_size": 10 }"#);

        assert!(result.is_err());
    }

    #[test]
    fn snake_longer_than_row_is_rejected() {
        let config = SessionConfig {
            grid: GridSize::new(4, 10),
            initial_length: 4,
            ..SessionConfig::default()
        };

        assert!(matches!(
            config.validate(),
            Err(SessionError::SnakeTooLong { length: 4, span: 4 })
        ));
    }

    #[test]
    fn oversized_grid_is_rejected() {
        let wide = SessionConfig {
            grid: GridSize::new(u32::MAX, 10),
            ..SessionConfig::default()
        };
        let huge = SessionConfig {
            grid: GridSize::new(4_000, 4_000),
            ..SessionConfig::default()
        };
        let largest = SessionConfig {
            grid: GridSize::new(1_024, 1_024),
            ..SessionConfig::default()
        };

        assert!(matches!(
            wide.validate(),
            Err(SessionError::GridTooLarge {
                width: u32::MAX,
                ..
            })
        ));
        assert!(matches!(
            huge.validate(),
            Err(SessionError::GridTooLarge { .. })
        ));
        largest.validate().expect("grid at the cell limit");
    }

    #[test]
    fn zero_spawn_period_is_rejected() {
        let config = SessionConfig {
            spawn_period_ms: 0,
            ..SessionConfig::default()
        };

        assert!(matches!(
            config.validate(),
            Err(SessionError::ZeroDuration {
                field: "spawn_period_ms"
            })
        ));
    }

    #[test]
    fn duplicate_kind_names_are_rejected() {
        let config = SessionConfig {
            kinds: vec![BoosterKind::growth(), BoosterKind::growth()],
            ..SessionConfig::default()
        };

        assert!(matches!(
            config.validate(),
            Err(SessionError::DuplicateKind { .. })
        ));
    }

    #[test]
    fn pool_config_orders_settle_range() {
        let config = SessionConfig {
            settle_min_ms: 500,
            settle_max_ms: 100,
            ..SessionConfig::default()
        };

        let pool = config.pool_config();
        assert_eq!(pool.settle.min, Duration::from_millis(100));
        assert_eq!(pool.settle.max, Duration::from_millis(500));
    }
}
