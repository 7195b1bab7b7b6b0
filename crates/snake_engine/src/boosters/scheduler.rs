use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{select, tick, unbounded, Sender};
use tracing::{debug, warn};

const MIN_SPAWN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchedulerCommand {
    Reschedule,
}

enum Wake {
    Command(SchedulerCommand),
    Disconnected,
    Tick,
}

/// Repeating timer thread. Dropping the control sender stops it; a pending
/// tick is abandoned rather than waited for.
#[derive(Debug)]
pub(crate) struct SpawnScheduler {
    control: Option<Sender<SchedulerCommand>>,
    thread: Option<JoinHandle<()>>,
}

impl SpawnScheduler {
    /// `on_tick` returning `false` ends the thread.
    pub(crate) fn spawn<F>(period: Duration, mut on_tick: F) -> io::Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let period = period.max(MIN_SPAWN_PERIOD);
        let (control_tx, control_rx) = unbounded::<SchedulerCommand>();

        let thread = thread::Builder::new()
            .name("booster-spawner".into())
            .spawn(move || {
                debug!(period_ms = period.as_millis() as u64, "spawn_scheduler_started");
                let mut ticker = tick(period);
                loop {
                    let wake = select! {
                        recv(control_rx) -> message => match message {
                            Ok(command) => Wake::Command(command),
                            Err(_) => Wake::Disconnected,
                        },
                        recv(ticker) -> _ => Wake::Tick,
                    };
                    match wake {
                        Wake::Command(SchedulerCommand::Reschedule) => {
                            ticker = tick(period);
                            debug!("spawn_scheduler_rescheduled");
                        }
                        Wake::Disconnected => break,
                        Wake::Tick => {
                            if !on_tick() {
                                break;
                            }
                        }
                    }
                }
                debug!("spawn_scheduler_stopped");
            })?;

        Ok(Self {
            control: Some(control_tx),
            thread: Some(thread),
        })
    }

    /// Restarts the period from now.
    pub(crate) fn reschedule(&self) {
        if let Some(control) = &self.control {
            let _ = control.send(SchedulerCommand::Reschedule);
        }
    }

    pub(crate) fn stop(&mut self) {
        drop(self.control.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("spawn scheduler panicked");
            }
        }
    }
}

impl Drop for SpawnScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
