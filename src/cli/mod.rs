//! CLI module for Flyt.
//!
//! This module provides the command-line interface:
//! - `commands`: Command definitions using clap derive
//! - `display`: Output formatting and display logic

pub mod commands;
pub mod display;

pub use commands::{AuthCommand, Cli, Commands, ConfigCommand, RunArgs, SoundPhase, SyncCommand};
pub use display::{Display, StatusReport};
