use snake_engine::{Cell, Frame, TickReport, View};
use tracing::{debug, info};

const BOARD_LOG_EVERY_TICKS: u64 = 100;

/// Headless view: logs growth and boosters, and dumps the board now and then.
#[derive(Debug, Default)]
pub(crate) struct LogView {
    boosters_eaten: u32,
    longest: usize,
}

impl LogView {
    pub(crate) fn boosters_eaten(&self) -> u32 {
        self.boosters_eaten
    }

    pub(crate) fn longest(&self) -> usize {
        self.longest
    }
}

impl View for LogView {
    fn present(&mut self, frame: &Frame, report: &TickReport) {
        self.longest = self.longest.max(report.length);
        if let Some(worker) = report.consumed {
            self.boosters_eaten += 1;
            info!(
                tick = frame.tick,
                worker = worker.0,
                cell = ?report.head,
                "booster_eaten"
            );
        }
        if report.grew {
            info!(tick = frame.tick, length = report.length, "snake_grew");
        }
        if frame.game_over || (frame.tick > 0 && frame.tick % BOARD_LOG_EVERY_TICKS == 0) {
            debug!(tick = frame.tick, board = %render_board(frame), "board");
        }
    }
}

/// One text row per grid row: `@` head, `o` body, `*` booster, `.` empty.
pub(crate) fn render_board(frame: &Frame) -> String {
    let width = frame.grid.width as usize;
    let height = frame.grid.height as usize;
    let mut rows = vec![vec!['.'; width]; height];

    let mut put = |cell: Cell, glyph: char| {
        if frame.grid.contains(cell) {
            rows[cell.y as usize][cell.x as usize] = glyph;
        }
    };
    for cell in frame.boosters.keys() {
        put(*cell, '*');
    }
    for cell in frame.snake.iter().skip(1) {
        put(*cell, 'o');
    }
    if let Some(head) = frame.snake.first() {
        put(*head, '@');
    }

    let mut board = String::with_capacity((width + 1) * height);
    for row in rows {
        board.push('\n');
        board.extend(row);
    }
    board
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use snake_engine::{Direction, GridSize, Rgb, WorkerId};

    use super::*;

    fn frame() -> Frame {
        let mut boosters = BTreeMap::new();
        boosters.insert(Cell::new(3, 0), Rgb::new(0, 255, 0));
        Frame {
            tick: 4,
            grid: GridSize::new(4, 2),
            snake: vec![Cell::new(1, 1), Cell::new(0, 1)],
            direction: Direction::Right,
            boosters,
            paused: false,
            game_over: false,
            tick_interval: Duration::from_millis(100),
        }
    }

    #[test]
    fn board_marks_head_body_and_boosters() {
        assert_eq!(render_board(&frame()), "\n...*\no@..");
    }

    #[test]
    fn view_tracks_eaten_boosters_and_length() {
        let mut view = LogView::default();
        let report = TickReport {
            game_over: false,
            head: Cell::new(1, 1),
            length: 6,
            grew: true,
            consumed: Some(WorkerId(0)),
        };

        view.present(&frame(), &report);

        assert_eq!(view.boosters_eaten(), 1);
        assert_eq!(view.longest(), 6);
    }
}
