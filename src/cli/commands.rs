//! Command definitions for the `flyt` CLI.
//!
//! Uses clap derive macro for argument parsing.

use clap::{Args, Parser, Subcommand};

use crate::hotedge::{HotEdge, COOLDOWN_RANGE, DELAY_RANGE, THRESHOLD_RANGE};
use crate::hotkey::HotKeyBinding;
use crate::sound::SoundChoice;

// ============================================================================
// CLI Structure
// ============================================================================

/// Flyt - floating Pomodoro timer core
#[derive(Parser, Debug)]
#[command(
    name = "flyt",
    version,
    about = "フローティング・ポモドーロタイマー",
    long_about = "ホットキーや画面端で呼び出すポモドーロタイマー。\n\
                  完了したセッション数をSupabase経由で複数のMacと同期します。",
    propagate_version = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

// ============================================================================
// Subcommands
// ============================================================================

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the timer with a terminal presenter (commands on stdin)
    Run(RunArgs),

    /// Show settings, today's count and sync state
    Status,

    /// Change a setting
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Sync today's session count
    #[command(subcommand)]
    Sync(SyncCommand),

    /// Manage the signed-in account
    #[command(subcommand)]
    Auth(AuthCommand),

    /// Reset today's session count to zero
    ResetCount,

    /// Generate shell completion scripts
    Completions {
        /// Shell type for completion script
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Arguments for the run command
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Disable completion sounds
    #[arg(long)]
    pub no_sound: bool,

    /// Start a work session immediately
    #[arg(short, long)]
    pub start: bool,
}

// ============================================================================
// Config
// ============================================================================

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    /// Work duration in minutes (1-120)
    Work {
        #[arg(value_parser = clap::value_parser!(u32).range(1..=120))]
        minutes: u32,
    },

    /// Rest duration in minutes (1-60)
    Rest {
        #[arg(value_parser = clap::value_parser!(u32).range(1..=60))]
        minutes: u32,
    },

    /// Continue into the next phase automatically
    AutoContinue {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },

    /// Global hotkey, e.g. ctrl+i or cmd+shift+space
    Hotkey {
        #[arg(value_parser = parse_hotkey)]
        binding: HotKeyBinding,
    },

    /// Screen edge that shows the timer
    HotEdge(HotEdgeArgs),

    /// Completion sound for a phase
    Sound {
        #[arg(value_enum)]
        phase: SoundPhase,
        /// Sound name or "none"
        #[arg(value_parser = parse_sound)]
        sound: SoundChoice,
    },
}

#[derive(Args, Debug, Clone)]
pub struct HotEdgeArgs {
    /// top, bottom, left, right or disabled
    #[arg(value_parser = parse_edge)]
    pub edge: HotEdge,

    /// Distance from the edge in points (1-10)
    #[arg(long, value_parser = parse_threshold)]
    pub threshold: Option<f64>,

    /// Dwell time in seconds (0.1-1.0)
    #[arg(long, value_parser = parse_delay)]
    pub delay: Option<f64>,

    /// Minimum seconds between triggers (0.5-2.0)
    #[arg(long, value_parser = parse_cooldown)]
    pub cooldown: Option<f64>,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundPhase {
    Work,
    Rest,
}

// ============================================================================
// Sync / Auth
// ============================================================================

#[derive(Subcommand, Debug, Clone)]
pub enum SyncCommand {
    /// Download today's count
    Pull {
        /// Accept a remote count lower than the local one
        #[arg(long)]
        allow_decrease: bool,
    },

    /// Upload today's count
    Push,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AuthCommand {
    /// Complete sign-in with the OAuth callback URL
    Login {
        /// void2610flyt://auth-callback#access_token=...
        redirect_url: String,
    },

    /// Sign out
    Logout,

    /// Show the signed-in account
    Whoami,
}

// ============================================================================
// Validation Functions
// ============================================================================

fn parse_hotkey(s: &str) -> Result<HotKeyBinding, String> {
    HotKeyBinding::parse(s)
}

fn parse_edge(s: &str) -> Result<HotEdge, String> {
    HotEdge::parse(s).ok_or_else(|| format!("不明な画面端です: {s}"))
}

fn parse_sound(s: &str) -> Result<SoundChoice, String> {
    SoundChoice::parse(s).map_err(|e| format!("{e} ({})", e.suggestion()))
}

fn parse_in_range(s: &str, (min, max): (f64, f64)) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("数値を指定してください: {s}"))?;
    if !(min..=max).contains(&value) {
        return Err(format!("{min}〜{max}の範囲で指定してください"));
    }
    Ok(value)
}

fn parse_threshold(s: &str) -> Result<f64, String> {
    parse_in_range(s, THRESHOLD_RANGE)
}

fn parse_delay(s: &str) -> Result<f64, String> {
    parse_in_range(s, DELAY_RANGE)
}

fn parse_cooldown(s: &str) -> Result<f64, String> {
    parse_in_range(s, COOLDOWN_RANGE)
}

// ============================================================================
// Tests
// ============================================================================
