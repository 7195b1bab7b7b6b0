use std::collections::HashSet;

use snake_engine::{ActionStates, Cell, Direction, Frame, GridSize, InputAction, InputSource};

const DIRECTIONS: [Direction; 4] = [
    Direction::Up,
    Direction::Down,
    Direction::Left,
    Direction::Right,
];

/// Greedy player: heads for the nearest booster and avoids stepping into
/// its own body when it can.
#[derive(Debug, Default)]
pub(crate) struct Autopilot {
    turns: u64,
}

impl Autopilot {
    pub(crate) fn turns(&self) -> u64 {
        self.turns
    }

    fn choose(&self, frame: &Frame) -> Option<Direction> {
        let head = *frame.snake.first()?;
        let blocked: HashSet<Cell> = frame
            .snake
            .iter()
            .take(frame.snake.len().saturating_sub(1))
            .copied()
            .collect();
        let target = frame
            .boosters
            .keys()
            .min_by_key(|cell| wrapped_distance(frame.grid, head, **cell))
            .copied();

        let safe = DIRECTIONS
            .into_iter()
            .filter(|direction| frame.snake.len() <= 1 || *direction != frame.direction.opposite())
            .filter(|direction| !blocked.contains(&frame.grid.step(head, *direction)));

        match target {
            Some(target) => safe.min_by_key(|direction| {
                let next = frame.grid.step(head, *direction);
                (
                    wrapped_distance(frame.grid, next, target),
                    *direction != frame.direction,
                )
            }),
            None => {
                let safe: Vec<Direction> = safe.collect();
                if safe.contains(&frame.direction) {
                    Some(frame.direction)
                } else {
                    safe.first().copied()
                }
            }
        }
    }
}

impl InputSource for Autopilot {
    fn poll(&mut self, frame: &Frame, actions: &mut ActionStates) {
        if frame.paused || frame.game_over {
            return;
        }
        if let Some(direction) = self.choose(frame) {
            if direction != frame.direction {
                self.turns += 1;
            }
            actions.press(InputAction::from_direction(direction));
        }
    }
}

fn wrapped_distance(grid: GridSize, from: Cell, to: Cell) -> u32 {
    axis_distance(from.x, to.x, grid.width) + axis_distance(from.y, to.y, grid.height)
}

fn axis_distance(from: i32, to: i32, extent: u32) -> u32 {
    let direct = from.abs_diff(to);
    direct.min(extent.saturating_sub(direct))
}
