use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod app;
pub mod assets;
pub mod boosters;
pub mod session;
mod sync;

pub use app::{
    play_session, run_session, ActionStates, AppError, InputAction, InputSource, LoopConfig,
    LoopMetricsSnapshot, MetricsHandle, SessionSummary, StopReason, View, MAX_TICKS_ENV_VAR,
};
pub use assets::{
    ReadinessGate, ResourcePreloader, SoundClip, SoundLoadError, SoundLoader, SoundSink,
};
pub use boosters::{
    BoosterEffect, BoosterKind, BoosterPool, ConsumeMode, PoolConfig, PoolError, PoolStats,
    SettleDelay, SpawnError, SpawnOutcome, WorkerId, WorkerPhase,
};
pub use session::{
    BoosterField, Cell, Direction, EffectState, Frame, GameSession, GridSize, OccupancyHandle, Rgb,
    SessionConfig, SessionError, Snake, TickReport,
};

pub const ROOT_ENV_VAR: &str = "SNAKE_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub sounds_dir: PathBuf,
    pub config_path: PathBuf,
}

impl AppPaths {
    pub fn from_root(root: PathBuf) -> Self {
        let sounds_dir = root.join("assets").join("sounds");
        let config_path = root.join("config").join("session.json");
        Self {
            root,
            sounds_dir,
            config_path,
        }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error(
        "SNAKE_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and either crates/ or assets/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and either crates/ or assets/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/snake\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    resolve_root().map(AppPaths::from_root)
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let raw = PathBuf::from(value);
            let normalized = normalize_path(&raw);
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            for candidate in exe_dir.ancestors() {
                if is_repo_marker(candidate) {
                    return Ok(normalize_path(candidate));
                }
            }

            Err(StartupError::RootNotFound {
                start_dir: normalize_path(&exe_dir),
                env_var: ROOT_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_repo_marker(path: &Path) -> bool {
    let cargo_toml = path.join("Cargo.toml").is_file();
    let has_crates = path.join("crates").is_dir();
    let has_assets = path.join("assets").is_dir();

    cargo_toml && (has_crates || has_assets)
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_marker_requires_cargo_toml() {
        let cwd = env::current_dir().expect("cwd");
        assert!(!is_repo_marker(&cwd.join("definitely_not_a_marker")));
    }

    #[test]
    fn workspace_root_is_a_repo_marker() {
        let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        let workspace_root = manifest_dir
            .ancestors()
            .nth(2)
            .expect("workspace root above crates/snake_engine");

        assert!(is_repo_marker(workspace_root));
    }

    #[test]
    fn paths_hang_off_the_root() {
        let paths = AppPaths::from_root(PathBuf::from("/srv/snake"));

        assert_eq!(paths.sounds_dir, Path::new("/srv/snake/assets/sounds"));
        assert_eq!(paths.config_path, Path::new("/srv/snake/config/session.json"));
    }
}
