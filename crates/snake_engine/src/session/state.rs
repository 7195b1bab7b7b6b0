use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::boosters::WorkerId;
use crate::sync;

use super::effects::EffectState;
use super::grid::{Cell, Direction, GridSize};

/// Anything that can hand out the booster sitting on a cell. The pool is the
/// production implementation; tests substitute simple fakes.
pub trait BoosterField {
    /// Hands out a settled booster on `cell`. A booster still settling is
    /// left armed where it is, even under the snake, and can be eaten once
    /// the head comes back to it.
    fn consume_at(&self, cell: Cell) -> Option<WorkerId>;
}

/// Read-mostly view of the snake body for threads other than the tick thread.
/// The tick thread updates it incrementally, one head and one tail per tick.
#[derive(Clone, Debug, Default)]
pub struct OccupancyHandle {
    cells: Arc<RwLock<HashSet<Cell>>>,
}

impl OccupancyHandle {
    pub fn contains(&self, cell: Cell) -> bool {
        sync::read(&self.cells, "occupancy_read").contains(&cell)
    }

    pub fn len(&self) -> usize {
        sync::read(&self.cells, "occupancy_read").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn replace_all(&self, cells: impl IntoIterator<Item = Cell>) {
        let mut guard = sync::write(&self.cells, "occupancy_write");
        guard.clear();
        guard.extend(cells);
    }

    fn apply_move(&self, head: Cell, vacated: Option<Cell>) {
        let mut guard = sync::write(&self.cells, "occupancy_write");
        if let Some(tail) = vacated {
            guard.remove(&tail);
        }
        guard.insert(head);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub game_over: bool,
    pub head: Cell,
    pub length: usize,
    pub grew: bool,
    pub consumed: Option<WorkerId>,
}

/// Tick-owned half of the game state.
#[derive(Debug)]
pub struct Snake {
    grid: GridSize,
    body: VecDeque<Cell>,
    cells: HashSet<Cell>,
    direction: Direction,
    queued_direction: Option<Direction>,
    game_over: bool,
    effects: Arc<EffectState>,
    occupancy: OccupancyHandle,
}

impl Snake {
    /// Lays the body out in a straight line behind `head`, facing `direction`.
    pub fn new(
        grid: GridSize,
        head: Cell,
        length: usize,
        direction: Direction,
        effects: Arc<EffectState>,
        occupancy: OccupancyHandle,
    ) -> Self {
        let mut body = VecDeque::with_capacity(length.max(1));
        let mut cells = HashSet::with_capacity(length.max(1));
        let mut cursor = head;
        for _ in 0..length.max(1) {
            if !cells.insert(cursor) {
                break;
            }
            body.push_back(cursor);
            cursor = grid.step(cursor, direction.opposite());
        }
        occupancy.replace_all(body.iter().copied());

        Self {
            grid,
            body,
            cells,
            direction,
            queued_direction: None,
            game_over: false,
            effects,
            occupancy,
        }
    }

    pub fn body(&self) -> impl Iterator<Item = Cell> + '_ {
        self.body.iter().copied()
    }

    pub fn head(&self) -> Cell {
        self.body.front().copied().unwrap_or_else(|| self.grid.center())
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn contains(&self, cell: Cell) -> bool {
        self.cells.contains(&cell)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    pub fn effects(&self) -> &Arc<EffectState> {
        &self.effects
    }

    /// Current state without moving.
    pub fn status(&self) -> TickReport {
        self.report(false, None)
    }

    /// Takes effect on the next `advance`. Turning straight back into the
    /// body is ignored.
    pub fn set_direction(&mut self, direction: Direction) {
        self.queued_direction = Some(direction);
    }

    pub fn advance(&mut self, field: &dyn BoosterField) -> TickReport {
        if self.game_over {
            return self.report(false, None);
        }

        if let Some(next_direction) = self.queued_direction.take() {
            if self.body.len() <= 1 || next_direction != self.direction.opposite() {
                self.direction = next_direction;
            }
        }

        let next_head = self.grid.step(self.head(), self.direction);
        let grow = self.effects.has_pending_growth();
        let vacating_tail = if grow { None } else { self.body.back().copied() };
        let hits_body = self.cells.contains(&next_head) && vacating_tail != Some(next_head);
        if hits_body {
            self.game_over = true;
            info!(
                head = ?next_head,
                length = self.body.len(),
                "snake_self_collision"
            );
            return self.report(false, None);
        }

        // Growth set after the peek above waits for the next tick.
        if grow {
            self.effects.take_pending_growth();
        }
        let consumed = field.consume_at(next_head);
        if let Some(worker) = consumed {
            debug!(worker = worker.0, cell = ?next_head, "booster_hit");
        }

        if let Some(tail) = vacating_tail {
            self.body.pop_back();
            self.cells.remove(&tail);
        }
        self.body.push_front(next_head);
        self.cells.insert(next_head);
        self.occupancy.apply_move(next_head, vacating_tail);

        self.report(grow, consumed)
    }

    fn report(&self, grew: bool, consumed: Option<WorkerId>) -> TickReport {
        TickReport {
            game_over: self.game_over,
            head: self.head(),
            length: self.body.len(),
            grew,
            consumed,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::time::Duration;

    use super::*;

    #[derive(Default)]
    struct FakeField {
        boosters: RefCell<Vec<(Cell, WorkerId)>>,
        consumed: RefCell<Vec<WorkerId>>,
    }

    impl BoosterField for FakeField {
        fn consume_at(&self, cell: Cell) -> Option<WorkerId> {
            let mut boosters = self.boosters.borrow_mut();
            let index = boosters.iter().position(|(at, _)| *at == cell)?;
            let (_, id) = boosters.remove(index);
            self.consumed.borrow_mut().push(id);
            Some(id)
        }
    }

    fn snake(length: usize, direction: Direction) -> (Snake, OccupancyHandle) {
        let grid = GridSize::new(10, 10);
        let effects = Arc::new(EffectState::new(
            Duration::from_millis(100),
            Duration::from_millis(20),
        ));
        let occupancy = OccupancyHandle::default();
        let snake = Snake::new(
            grid,
            grid.center(),
            length,
            direction,
            effects,
            occupancy.clone(),
        );
        (snake, occupancy)
    }

    #[test]
    fn new_lays_body_behind_head() {
        let (snake, occupancy) = snake(4, Direction::Right);

        let body: Vec<Cell> = snake.body().collect();
        assert_eq!(
            body,
            vec![
                Cell::new(5, 5),
                Cell::new(4, 5),
                Cell::new(3, 5),
                Cell::new(2, 5)
            ]
        );
        assert_eq!(occupancy.len(), 4);
    }

    #[test]
    fn advance_moves_without_growing() {
        let (mut snake, occupancy) = snake(4, Direction::Right);

        let report = snake.advance(&FakeField::default());

        assert!(!report.game_over);
        assert_eq!(report.head, Cell::new(6, 5));
        assert_eq!(report.length, 4);
        assert!(occupancy.contains(Cell::new(6, 5)));
        assert!(!occupancy.contains(Cell::new(2, 5)));
    }

    #[test]
    fn pending_growth_keeps_tail_for_exactly_one_tick() {
        let (mut snake, _) = snake(4, Direction::Right);
        let field = FakeField::default();
        snake.effects().set_pending_growth();

        let grown = snake.advance(&field);
        let next = snake.advance(&field);

        assert!(grown.grew);
        assert_eq!(grown.length, 5);
        assert!(!next.grew);
        assert_eq!(next.length, 5);
    }

    #[test]
    fn reverse_direction_is_ignored() {
        let (mut snake, _) = snake(4, Direction::Right);

        snake.set_direction(Direction::Left);
        let report = snake.advance(&FakeField::default());

        assert_eq!(snake.direction(), Direction::Right);
        assert_eq!(report.head, Cell::new(6, 5));
    }

    #[test]
    fn turning_into_body_ends_the_game() {
        let (mut snake, _) = snake(5, Direction::Right);
        let field = FakeField::default();

        snake.set_direction(Direction::Up);
        snake.advance(&field);
        snake.set_direction(Direction::Left);
        snake.advance(&field);
        snake.set_direction(Direction::Down);
        let report = snake.advance(&field);

        assert!(report.game_over);
        assert!(snake.is_game_over());
        assert_eq!(report.length, 5);
        assert_eq!(snake.advance(&field), report);
    }

    #[test]
    fn fatal_tick_keeps_pending_growth() {
        let (mut snake, _) = snake(5, Direction::Right);
        let field = FakeField::default();

        snake.set_direction(Direction::Up);
        snake.advance(&field);
        snake.set_direction(Direction::Left);
        snake.advance(&field);
        snake.effects().set_pending_growth();
        snake.set_direction(Direction::Down);
        let report = snake.advance(&field);

        assert!(report.game_over);
        assert!(!report.grew);
        assert!(snake.effects().has_pending_growth());
    }

    #[test]
    fn moving_into_vacating_tail_is_allowed() {
        let (mut snake, _) = snake(4, Direction::Right);
        let field = FakeField::default();

        snake.set_direction(Direction::Up);
        snake.advance(&field);
        snake.set_direction(Direction::Left);
        snake.advance(&field);
        snake.set_direction(Direction::Down);
        let report = snake.advance(&field);

        assert!(!report.game_over);
        assert_eq!(report.head, Cell::new(4, 5));
    }

    #[test]
    fn advance_consumes_booster_on_next_head() {
        let (mut snake, _) = snake(4, Direction::Right);
        let field = FakeField::default();
        field
            .boosters
            .borrow_mut()
            .push((Cell::new(6, 5), WorkerId(3)));

        let report = snake.advance(&field);

        assert_eq!(report.consumed, Some(WorkerId(3)));
        assert_eq!(*field.consumed.borrow(), vec![WorkerId(3)]);
    }

    #[test]
    fn body_wraps_around_grid_edges() {
        let (mut snake, _) = snake(2, Direction::Right);
        let field = FakeField::default();

        for _ in 0..5 {
            snake.advance(&field);
        }

        assert_eq!(snake.head(), Cell::new(0, 5));
        assert_eq!(snake.len(), 2);
    }
}
