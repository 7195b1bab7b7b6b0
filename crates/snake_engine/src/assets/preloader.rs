use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::sync;

use super::gate::ReadinessGate;
use super::types::{SoundClip, SoundLoader, SoundSink};

#[derive(Debug)]
enum LoadRequest {
    Load { name: String, epoch: u64 },
    Finish { epoch: u64 },
}

#[derive(Debug)]
struct PreloadSession {
    epoch: u64,
    ready: bool,
    gate: Arc<ReadinessGate>,
}

struct PreloaderShared {
    session: Mutex<PreloadSession>,
    clips: Mutex<HashMap<String, Arc<dyn SoundClip>>>,
}

impl PreloaderShared {
    fn is_current(&self, epoch: u64) -> bool {
        sync::lock(&self.session, "preload_session").epoch == epoch
    }

    fn is_ready_at(&self, epoch: u64) -> bool {
        let session = sync::lock(&self.session, "preload_session");
        session.epoch == epoch && session.ready
    }

    fn is_loaded(&self, name: &str) -> bool {
        sync::lock(&self.clips, "preload_clips").contains_key(name)
    }

    fn store(&self, epoch: u64, name: String, clip: Arc<dyn SoundClip>) {
        let session = sync::lock(&self.session, "preload_session");
        if session.epoch != epoch {
            debug!(name = %name, "sound_load_discarded_stale");
            return;
        }
        sync::lock(&self.clips, "preload_clips").insert(name, clip);
    }

    fn mark_ready(&self, epoch: u64) {
        let mut session = sync::lock(&self.session, "preload_session");
        if session.epoch != epoch || session.ready {
            return;
        }
        session.ready = true;
        session.gate.release();
        let loaded = sync::lock(&self.clips, "preload_clips").len();
        info!(epoch, loaded, "sound_preload_ready");
    }
}

/// Loads sounds on a background thread. Names are decoded in the order they
/// were enqueued; `finish` blocks until everything before it is done.
pub struct ResourcePreloader {
    shared: Arc<PreloaderShared>,
    requests: Option<Sender<LoadRequest>>,
    consumer: Option<JoinHandle<()>>,
}

impl ResourcePreloader {
    pub fn spawn(loader: Box<dyn SoundLoader>) -> io::Result<Self> {
        let shared = Arc::new(PreloaderShared {
            session: Mutex::new(PreloadSession {
                epoch: 0,
                ready: false,
                gate: Arc::new(ReadinessGate::new()),
            }),
            clips: Mutex::new(HashMap::new()),
        });
        let (requests, queue) = unbounded::<LoadRequest>();
        let consumer_shared = Arc::clone(&shared);
        let consumer = thread::Builder::new()
            .name("sound-preloader".into())
            .spawn(move || run_consumer(loader, queue, consumer_shared))?;

        Ok(Self {
            shared,
            requests: Some(requests),
            consumer: Some(consumer),
        })
    }

    /// Never blocks. Ignored once the current session is ready.
    pub fn enqueue(&self, name: impl Into<String>) {
        let name = name.into();
        let epoch = {
            let session = sync::lock(&self.shared.session, "preload_session");
            if session.ready {
                debug!(name = %name, "sound_enqueue_ignored_ready");
                return;
            }
            session.epoch
        };
        self.send(LoadRequest::Load { name, epoch });
    }

    /// Queues the end-of-session marker and blocks until the consumer has
    /// worked through everything queued before it. Returns `false` if a
    /// `reset` abandoned the preload first or the consumer is gone.
    pub fn finish(&self) -> bool {
        match self.queue_finish() {
            Some((epoch, gate)) => {
                gate.wait();
                self.shared.is_ready_at(epoch)
            }
            None => self.is_ready(),
        }
    }

    /// Like `finish`, giving up after `timeout`.
    pub fn finish_timeout(&self, timeout: Duration) -> bool {
        match self.queue_finish() {
            Some((epoch, gate)) => gate.wait_timeout(timeout) && self.shared.is_ready_at(epoch),
            None => self.is_ready(),
        }
    }

    pub fn is_ready(&self) -> bool {
        sync::lock(&self.shared.session, "preload_session").ready
    }

    pub fn gate(&self) -> Arc<ReadinessGate> {
        Arc::clone(&sync::lock(&self.shared.session, "preload_session").gate)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.shared.is_loaded(name)
    }

    pub fn loaded_count(&self) -> usize {
        sync::lock(&self.shared.clips, "preload_clips").len()
    }

    /// Restarts a loaded clip. Unknown names are ignored.
    pub fn play(&self, name: &str) {
        let clip = sync::lock(&self.shared.clips, "preload_clips")
            .get(name)
            .cloned();
        match clip {
            Some(clip) => clip.play_from_start(),
            None => debug!(name, "sound_play_skipped_not_loaded"),
        }
    }

    /// Session boundary: drops every clip and re-arms a fresh gate. Anyone
    /// still waiting on the old gate is woken and sees the preload abandoned.
    pub fn reset(&self) {
        let mut session = sync::lock(&self.shared.session, "preload_session");
        session.epoch = session.epoch.wrapping_add(1);
        session.ready = false;
        let abandoned = std::mem::replace(&mut session.gate, Arc::new(ReadinessGate::new()));
        abandoned.release();
        let cleared = {
            let mut clips = sync::lock(&self.shared.clips, "preload_clips");
            let cleared = clips.len();
            clips.clear();
            cleared
        };
        info!(epoch = session.epoch, cleared, "sound_preload_reset");
    }

    pub fn shutdown(&mut self) {
        drop(self.requests.take());
        if let Some(consumer) = self.consumer.take() {
            if consumer.join().is_err() {
                warn!("sound preloader thread panicked");
            }
        }
    }

    fn queue_finish(&self) -> Option<(u64, Arc<ReadinessGate>)> {
        let (epoch, gate) = {
            let session = sync::lock(&self.shared.session, "preload_session");
            if session.ready {
                return None;
            }
            (session.epoch, Arc::clone(&session.gate))
        };
        if self.send(LoadRequest::Finish { epoch }) {
            Some((epoch, gate))
        } else {
            None
        }
    }

    fn send(&self, request: LoadRequest) -> bool {
        let Some(requests) = &self.requests else {
            warn!(request = ?request, "sound preloader already shut down");
            return false;
        };
        if requests.send(request).is_err() {
            warn!("sound preloader thread is gone");
            return false;
        }
        true
    }
}

impl SoundSink for ResourcePreloader {
    fn play(&self, name: &str) {
        ResourcePreloader::play(self, name);
    }
}

impl Drop for ResourcePreloader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_consumer(
    mut loader: Box<dyn SoundLoader>,
    queue: Receiver<LoadRequest>,
    shared: Arc<PreloaderShared>,
) {
    debug!("sound_preloader_started");
    while let Ok(request) = queue.recv() {
        match request {
            LoadRequest::Load { name, epoch } => {
                if !shared.is_current(epoch) {
                    debug!(name = %name, "sound_load_skipped_stale");
                    continue;
                }
                if shared.is_loaded(&name) {
                    continue;
                }
                match loader.load(&name) {
                    Ok(clip) => {
                        debug!(name = %name, "sound_loaded");
                        shared.store(epoch, name, clip);
                    }
                    Err(error) => {
                        warn!(name = %name, error = %error, "sound_load_failed");
                    }
                }
            }
            LoadRequest::Finish { epoch } => shared.mark_ready(epoch),
        }
    }
    debug!("sound_preloader_stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::assets::SoundLoadError;

    #[derive(Default)]
    struct CountingClip {
        plays: AtomicUsize,
    }

    impl SoundClip for CountingClip {
        fn play_from_start(&self) {
            self.plays.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct TableLoader {
        clips: HashMap<String, Arc<CountingClip>>,
        delay: Duration,
        loads: Arc<AtomicUsize>,
    }

    impl SoundLoader for TableLoader {
        fn load(&mut self, name: &str) -> Result<Arc<dyn SoundClip>, SoundLoadError> {
            thread::sleep(self.delay);
            self.loads.fetch_add(1, Ordering::SeqCst);
            match self.clips.get(name) {
                Some(clip) => Ok(clip.clone()),
                None => Err(SoundLoadError::NotFound {
                    name: name.to_string(),
                }),
            }
        }
    }

    fn table_loader(
        names: &[&str],
        delay: Duration,
    ) -> (TableLoader, HashMap<String, Arc<CountingClip>>) {
        let clips: HashMap<String, Arc<CountingClip>> = names
            .iter()
            .map(|name| (name.to_string(), Arc::new(CountingClip::default())))
            .collect();
        let loader = TableLoader {
            clips: clips.clone(),
            delay,
            loads: Arc::new(AtomicUsize::new(0)),
        };
        (loader, clips)
    }

    #[test]
    fn finish_waits_for_every_prior_entry() {
        let (loader, _) = table_loader(&["eat", "boost", "die"], Duration::from_millis(20));
        let preloader = ResourcePreloader::spawn(Box::new(loader)).expect("spawn preloader");

        preloader.enqueue("eat");
        preloader.enqueue("boost");
        preloader.enqueue("die");
        assert!(preloader.finish());

        assert!(preloader.is_ready());
        assert!(preloader.gate().is_released());
        assert_eq!(preloader.loaded_count(), 3);
    }

    #[test]
    fn failed_load_is_skipped_and_play_is_noop() {
        let (loader, clips) = table_loader(&["eat"], Duration::ZERO);
        let preloader = ResourcePreloader::spawn(Box::new(loader)).expect("spawn preloader");

        preloader.enqueue("eat");
        preloader.enqueue("missing");
        assert!(preloader.finish_timeout(Duration::from_secs(5)));

        preloader.play("eat");
        preloader.play("missing");
        preloader.play("never_enqueued");

        assert!(!preloader.is_loaded("missing"));
        assert_eq!(clips["eat"].plays.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn enqueue_after_ready_is_ignored() {
        let (loader, _) = table_loader(&["eat", "boost"], Duration::ZERO);
        let loads = Arc::clone(&loader.loads);
        let preloader = ResourcePreloader::spawn(Box::new(loader)).expect("spawn preloader");

        preloader.enqueue("eat");
        preloader.finish();
        preloader.enqueue("boost");
        preloader.finish();

        assert!(!preloader.is_loaded("boost"));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_clears_clips_and_rearms_gate() {
        let (loader, _) = table_loader(&["eat", "boost"], Duration::ZERO);
        let preloader = ResourcePreloader::spawn(Box::new(loader)).expect("spawn preloader");
        preloader.enqueue("eat");
        preloader.finish();
        let first_gate = preloader.gate();

        preloader.reset();

        assert!(!preloader.is_ready());
        assert_eq!(preloader.loaded_count(), 0);
        assert!(first_gate.is_released());
        assert!(!preloader.gate().is_released());

        preloader.enqueue("boost");
        preloader.finish();
        assert!(preloader.is_loaded("boost"));
        assert!(!preloader.is_loaded("eat"));
    }

    #[test]
    fn finish_after_shutdown_returns() {
        let (loader, _) = table_loader(&[], Duration::ZERO);
        let mut preloader = ResourcePreloader::spawn(Box::new(loader)).expect("spawn preloader");
        preloader.shutdown();

        preloader.enqueue("eat");

        assert!(!preloader.finish());
        assert!(!preloader.is_ready());
    }

    struct GatedLoader {
        started: crossbeam_channel::Sender<String>,
        proceed: crossbeam_channel::Receiver<()>,
    }

    impl SoundLoader for GatedLoader {
        fn load(&mut self, name: &str) -> Result<Arc<dyn SoundClip>, SoundLoadError> {
            let _ = self.started.send(name.to_string());
            let _ = self.proceed.recv_timeout(Duration::from_secs(5));
            Ok(Arc::new(CountingClip::default()))
        }
    }

    fn wait_for(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    #[test]
    fn reset_wakes_a_blocked_finish() {
        let (started_tx, started) = crossbeam_channel::unbounded();
        let (proceed, proceed_rx) = crossbeam_channel::bounded::<()>(0);
        let preloader = Arc::new(
            ResourcePreloader::spawn(Box::new(GatedLoader {
                started: started_tx,
                proceed: proceed_rx,
            }))
            .expect("spawn preloader"),
        );
        preloader.enqueue("eat");
        assert_eq!(
            started.recv_timeout(Duration::from_secs(5)).as_deref(),
            Ok("eat")
        );

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let waiter = {
            let preloader = Arc::clone(&preloader);
            thread::spawn(move || {
                let _ = done_tx.send(preloader.finish());
            })
        };
        assert!(wait_for(Duration::from_secs(5), || {
            preloader
                .requests
                .as_ref()
                .is_some_and(|requests| requests.len() == 1)
        }));

        preloader.reset();

        let completed = done_rx
            .recv_timeout(Duration::from_secs(3))
            .expect("finish returned after reset");
        assert!(!completed);
        waiter.join().expect("waiter thread");

        drop(proceed);
        preloader.enqueue("boost");
        assert!(preloader.finish_timeout(Duration::from_secs(5)));
        assert!(preloader.is_loaded("boost"));
        assert!(!preloader.is_loaded("eat"));
    }
}
