use std::env;

use snake_engine::LoopConfig;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SESSIONS_ENV_VAR: &str = "SNAKE_SESSIONS";
const DEFAULT_MAX_TICKS: u64 = 3_000;

pub(crate) struct AppWiring {
    pub(crate) loop_config: LoopConfig,
    pub(crate) sessions: u32,
}

pub(crate) fn build_app() -> AppWiring {
    init_tracing();
    info!("=== Snake Startup ===");

    let loop_config = LoopConfig {
        max_ticks: Some(DEFAULT_MAX_TICKS),
        ..LoopConfig::default()
    };

    AppWiring {
        loop_config,
        sessions: parse_session_count(env::var(SESSIONS_ENV_VAR).ok().as_deref()),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn parse_session_count(raw: Option<&str>) -> u32 {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return 1;
    };
    match raw.parse::<u32>() {
        Ok(count) if count > 0 => count,
        _ => {
            warn!(
                env_var = SESSIONS_ENV_VAR,
                value = raw,
                "invalid session count; running one session"
            );
            1
        }
    }
}
