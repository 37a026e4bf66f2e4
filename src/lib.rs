#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod config;
pub mod drivers;
pub mod emitter;
pub mod sequencer;
pub mod timing;
pub mod waveform;

#[cfg(target_os = "none")]
pub mod board;
#[cfg(target_os = "none")]
pub mod ipc;
#[cfg(target_os = "none")]
pub mod tasks;

#[cfg(target_os = "none")]
pub use board::Board;
pub use config::{ConfigError, EmulatorConfig, RunPlan};
pub use emitter::{run, Clock, RunContext, RunSummary};
pub use waveform::{WaveformShape, WaveformTable};
