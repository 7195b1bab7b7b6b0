use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Sender};

use super::*;
use crate::boosters::{BoosterKind, SpawnOutcome, WorkerPhase};

#[derive(Default)]
struct RecordingSink {
    played: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn played(&self) -> Vec<String> {
        self.played.lock().expect("sink lock").clone()
    }
}

impl SoundSink for RecordingSink {
    fn play(&self, name: &str) {
        self.played.lock().expect("sink lock").push(name.to_string());
    }
}

struct SlowSink {
    started: Sender<()>,
    delay: Duration,
}

impl SoundSink for SlowSink {
    fn play(&self, _name: &str) {
        let _ = self.started.try_send(());
        thread::sleep(self.delay);
    }
}

fn config() -> SessionConfig {
    SessionConfig {
        grid: GridSize::new(10, 10),
        initial_length: 4,
        initial_direction: Direction::Right,
        initial_tick_ms: 100,
        min_tick_ms: 20,
        spawn_period_ms: 3_600_000,
        settle_min_ms: 0,
        settle_max_ms: 0,
        seed: Some(11),
        kinds: vec![BoosterKind::growth()],
    }
}

fn wait_for(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[test]
fn snake_eats_booster_in_front_of_it() {
    let sink = Arc::new(RecordingSink::default());
    let mut session = GameSession::start(config(), sink.clone()).expect("start session");
    assert_eq!(session.snake().head(), Cell::new(5, 5));

    let worker = session
        .arm_at("growth", Cell::new(6, 5))
        .expect("arm growth booster");
    assert!(session
        .pool()
        .wait_until_ready(worker, Duration::from_secs(5)));

    let report = session.advance();
    assert_eq!(report.head, Cell::new(6, 5));
    assert_eq!(report.consumed, Some(worker));
    assert!(!report.game_over);
    assert_ne!(session.pool().phase_of(worker), Some(WorkerPhase::Armed));

    assert!(wait_for(Duration::from_secs(5), || {
        session.pool().phase_of(worker) == Some(WorkerPhase::Idle)
    }));
    assert!(session.effects().has_pending_growth());
    assert_eq!(sink.played(), vec!["eat".to_string()]);
    assert!(session.active_snapshot().is_empty());

    let grew = session.advance();
    assert!(grew.grew);
    assert_eq!(grew.length, 5);

    let steady = session.advance();
    assert!(!steady.grew);
    assert_eq!(steady.length, 5);
    assert_eq!(sink.played().len(), 1);
}

#[test]
fn frame_shows_armed_booster_color() {
    let session =
        GameSession::start(config(), Arc::new(RecordingSink::default())).expect("start session");

    session
        .arm_at("growth", Cell::new(1, 1))
        .expect("arm growth booster");

    let frame = session.frame();
    assert_eq!(frame.snake.len(), 4);
    assert_eq!(
        frame.boosters.get(&Cell::new(1, 1)),
        Some(&BoosterKind::growth().color)
    );
    assert!(!frame.paused);
    assert_eq!(frame.tick_interval, Duration::from_millis(100));
}

#[test]
fn pausing_drains_boosters_without_applying_them() {
    let sink = Arc::new(RecordingSink::default());
    let mut session = GameSession::start(config(), sink.clone()).expect("start session");
    let worker = session
        .arm_at("growth", Cell::new(8, 2))
        .expect("arm growth booster");
    assert!(session
        .pool()
        .wait_until_ready(worker, Duration::from_secs(5)));

    session.set_paused(true);

    assert!(wait_for(Duration::from_secs(5), || {
        session.pool().phase_of(worker) == Some(WorkerPhase::Idle)
    }));
    assert!(!session.effects().has_pending_growth());
    assert!(sink.played().is_empty());
    assert!(session.active_snapshot().is_empty());

    let report = session.advance();
    assert_eq!(report.head, Cell::new(5, 5));
    assert_eq!(session.ticks(), 0);
    assert!(matches!(
        session.arm_at("growth", Cell::new(8, 2)),
        Err(SpawnError::Paused)
    ));

    session.set_paused(false);
    session
        .arm_at("growth", Cell::new(8, 2))
        .expect("arm after resume");
}

fn end_game_by_turning_into_body(session: &mut GameSession) -> TickReport {
    session.set_direction(Direction::Up);
    session.advance();
    session.set_direction(Direction::Left);
    session.advance();
    session.set_direction(Direction::Down);
    session.advance()
}

#[test]
fn game_over_drains_pool_and_stops_spawning() {
    let sink = Arc::new(RecordingSink::default());
    let mut session = GameSession::start(
        SessionConfig {
            initial_length: 5,
            ..config()
        },
        sink.clone(),
    )
    .expect("start session");
    let worker = session
        .arm_at("growth", Cell::new(1, 8))
        .expect("arm growth booster");
    assert!(session
        .pool()
        .wait_until_ready(worker, Duration::from_secs(5)));

    let report = end_game_by_turning_into_body(&mut session);

    assert!(report.game_over);
    assert!(session.is_game_over());
    assert!(wait_for(Duration::from_secs(5), || {
        session.pool().phase_of(worker) == Some(WorkerPhase::Idle)
    }));
    assert!(session.active_snapshot().is_empty());
    assert!(!session.effects().has_pending_growth());
    assert!(sink.played().is_empty());
    for _ in 0..50 {
        assert_eq!(session.pool().try_spawn(), SpawnOutcome::Paused);
    }

    session.set_paused(true);
    session.set_paused(false);
    assert_eq!(session.pool().try_spawn(), SpawnOutcome::Paused);
    assert!(!session.frame().paused);
    assert!(session.frame().game_over);
}

#[test]
fn shutdown_during_consumption_returns_promptly() {
    let (started, started_rx) = bounded(1);
    let sink = Arc::new(SlowSink {
        started,
        delay: Duration::from_millis(200),
    });
    let mut session = GameSession::start(config(), sink).expect("start session");
    let worker = session
        .arm_at("growth", Cell::new(6, 5))
        .expect("arm growth booster");
    assert!(session
        .pool()
        .wait_until_ready(worker, Duration::from_secs(5)));

    assert_eq!(session.advance().consumed, Some(worker));
    started_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("worker started applying its effect");

    let start = Instant::now();
    session.shutdown();

    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(session.pool().live_threads(), 0);
    assert!(!session.pool().is_running());
}

#[test]
fn invalid_config_does_not_start_threads() {
    let bad = SessionConfig {
        grid: GridSize::new(1, 10),
        ..config()
    };

    let result = GameSession::start(bad, Arc::new(RecordingSink::default()));

    assert!(matches!(result, Err(SessionError::GridTooSmall { .. })));
}

#[test]
fn empty_kind_list_fails_pool_start() {
    let empty = SessionConfig {
        kinds: Vec::new(),
        ..config()
    };

    let result = GameSession::start(empty, Arc::new(RecordingSink::default()));

    assert!(matches!(result, Err(SessionError::Pool(_))));
}
