mod gate;
mod preloader;
mod types;

pub use gate::ReadinessGate;
pub use preloader::ResourcePreloader;
pub use types::{SoundClip, SoundLoadError, SoundLoader, SoundSink};
