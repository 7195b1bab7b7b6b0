use std::process::ExitCode;
use std::sync::Arc;

use snake_engine::{
    play_session, resolve_app_paths, AppError, MetricsHandle, ResourcePreloader, SessionConfig, SoundSink,
    StartupError,
};
use thiserror::Error;
use tracing::{error, info};

use super::audio::{open_output, MixerHandle};
use super::autopilot::Autopilot;
use super::bootstrap::AppWiring;
use super::config::{load_session_config, ConfigError};
use super::sounds::WavSoundLoader;
use super::view::LogView;

#[derive(Debug, Error)]
enum LaunchError {
    #[error(transparent)]
    App(#[from] AppError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<StartupError> for LaunchError {
    fn from(error: StartupError) -> Self {
        LaunchError::App(AppError::Startup(error))
    }
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    if let Err(err) = run_sessions(&app) {
        error!(error = %err, "startup_failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run_sessions(app: &AppWiring) -> Result<(), LaunchError> {
    let paths = resolve_app_paths()?;
    info!(
        root = %paths.root.display(),
        sounds_dir = %paths.sounds_dir.display(),
        config_path = %paths.config_path.display(),
        "startup"
    );
    let session_config = load_session_config(&paths.config_path)?;

    let mixer = MixerHandle::default();
    let _audio_output = open_output(&mixer);
    let preloader = Arc::new(
        ResourcePreloader::spawn(Box::new(WavSoundLoader::new(
            paths.sounds_dir.clone(),
            mixer,
        )))
        .map_err(AppError::SpawnPreloader)?,
    );
    let metrics = MetricsHandle::default();

    for session_index in 1..=app.sessions {
        if session_index > 1 {
            preloader.reset();
        }
        preload_sounds(&preloader, &session_config);

        let mut input = Autopilot::default();
        let mut view = LogView::default();
        let summary = play_session(
            &app.loop_config,
            session_config.clone(),
            Arc::clone(&preloader) as Arc<dyn SoundSink>,
            &mut input,
            &mut view,
            &metrics,
        )?;
        let last_metrics = metrics.snapshot();
        info!(
            session = session_index,
            reason = ?summary.reason,
            ticks = summary.ticks,
            length = summary.length,
            longest = view.longest(),
            boosters_eaten = view.boosters_eaten(),
            turns = input.turns(),
            tps = last_metrics.tps,
            "session_summary"
        );
    }

    info!("shutdown");
    Ok(())
}

/// Queues every kind's sound and blocks until the preloader has worked
/// through them, so the first booster never plays into a missing clip.
fn preload_sounds(preloader: &ResourcePreloader, config: &SessionConfig) {
    for kind in &config.kinds {
        preloader.enqueue(kind.sound.as_str());
    }
    let ready = preloader.finish();
    info!(
        ready,
        requested = config.kinds.len(),
        loaded = preloader.loaded_count(),
        "sounds_preloaded"
    );
}
