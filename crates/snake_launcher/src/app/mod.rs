mod audio;
mod autopilot;
mod bootstrap;
mod config;
mod loop_runner;
mod sounds;
mod view;

pub(crate) use bootstrap::build_app;
pub(crate) use loop_runner::run;
