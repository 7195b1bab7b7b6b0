use std::sync::Arc;

use thiserror::Error;

/// A decoded sound ready for playback.
pub trait SoundClip: Send + Sync {
    fn play_from_start(&self);
}

/// Turns a sound name into a decoded clip. Runs on the preloader thread.
pub trait SoundLoader: Send {
    fn load(&mut self, name: &str) -> Result<Arc<dyn SoundClip>, SoundLoadError>;
}

/// Where booster threads send their sounds.
pub trait SoundSink: Send + Sync {
    fn play(&self, name: &str);
}

#[derive(Debug, Error)]
pub enum SoundLoadError {
    #[error("sound not found: {name}")]
    NotFound { name: String },
    #[error("failed to read sound {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("sound {name} is malformed: {reason}")]
    Malformed { name: String, reason: String },
}
