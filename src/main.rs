//! Flyt CLI - floating Pomodoro timer core
//!
//! Runs the timer coordinator with a terminal presenter and exposes the
//! settings, sync and auth operations as one-shot subcommands:
//! - `run`: timer loop driven by stdin commands
//! - `status`, `config`, `reset-count`: local state
//! - `sync`, `auth`: Supabase session sync and account

use std::io::BufRead;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser};
use tokio::sync::mpsc;

use flyt::cli::{
    AuthCommand, Cli, Commands, ConfigCommand, Display, RunArgs, SoundPhase, StatusReport,
    SyncCommand,
};
use flyt::config::AppPaths;
use flyt::hotedge::HotEdge;
use flyt::settings::SettingsStore;
use flyt::sync::PullOutcome;
use flyt::timer::{load_config, stored_state};
use flyt::{
    App, AppCommand, AppHandle, AppServices, Clock, HotEdgeConfig, HotKeyBinding, JsonFileStore,
    SoundSettings, SystemClock, TimerEngine, TimerSnapshot,
};

/// Main entry point
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_tracing(cli.verbose);

    // Execute command
    if let Err(e) = execute(cli).await {
        Display::show_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber for logging.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

/// Executes the CLI command.
async fn execute(cli: Cli) -> Result<()> {
    let Some(command) = cli.command else {
        // No command provided, show help
        Cli::command().print_help()?;
        return Ok(());
    };

    if let Commands::Completions { shell } = command {
        generate_completions(shell);
        return Ok(());
    }

    let paths = AppPaths::resolve().context("設定ディレクトリを特定できませんでした")?;
    tracing::debug!(root = %paths.root().display(), "Using settings directory");

    match command {
        Commands::Run(args) => run(&paths, args, cli.verbose).await,
        Commands::Status => status(&paths).await,
        Commands::Config(command) => configure(&paths, command),
        Commands::Sync(command) => sync(&paths, command).await,
        Commands::Auth(command) => auth(&paths, command).await,
        Commands::ResetCount => {
            let services = AppServices::load(&paths, false)?;
            local_timer(&services).reset_session_count();
            Display::show_count_reset();
            Ok(())
        }
        Commands::Completions { .. } => Ok(()),
    }
}

// ============================================================================
// run
// ============================================================================

/// Runs the coordinator until `quit`, end of input or Ctrl-C.
async fn run(paths: &AppPaths, args: RunArgs, verbose: bool) -> Result<()> {
    let services = AppServices::load(paths, !args.no_sound)?;
    let (ui_tx, ui_rx) = crossbeam_channel::unbounded();
    let (app, handle) = App::new(services, ui_tx);

    let presenter = std::thread::spawn(move || {
        for event in ui_rx.iter() {
            Display::show_ui_event(&event, verbose);
        }
    });

    Display::show_run_help();
    if args.start {
        handle.send(AppCommand::Start);
    }

    // Blocking stdin reads stay off the runtime; the thread is left behind
    // at exit.
    let input = handle.clone();
    std::thread::spawn(move || read_commands(std::io::stdin().lock(), &input));

    let signal = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted");
            signal.shutdown();
        }
    });

    app.run().await;
    drop(handle);

    presenter
        .join()
        .map_err(|_| anyhow!("表示スレッドが異常終了しました"))?;
    Ok(())
}

/// Forwards stdin lines to the coordinator. End of input shuts it down.
fn read_commands(reader: impl BufRead, handle: &AppHandle) {
    for line in reader.lines() {
        let Ok(line) = line else { break };
        match parse_input_line(&line) {
            Ok(Some(command)) => {
                if !handle.send(command) {
                    return;
                }
            }
            Ok(None) => {}
            Err(message) => Display::show_error(&message),
        }
    }
    handle.shutdown();
}

/// Maps one stdin line to a command. Blank lines yield `None`.
fn parse_input_line(line: &str) -> Result<Option<AppCommand>, String> {
    let command = match line.trim() {
        "" => return Ok(None),
        "start" => AppCommand::Start,
        "pause" => AppCommand::Pause,
        "reset" => AppCommand::Reset,
        "reset-count" => AppCommand::ResetSessionCount,
        "skip" => AppCommand::SkipToNext,
        "toggle" => AppCommand::Toggle,
        "show" => AppCommand::Show,
        "pull" => AppCommand::Pull {
            allow_decrease: false,
        },
        "pull!" => AppCommand::Pull {
            allow_decrease: true,
        },
        "push" => AppCommand::Push,
        "quit" | "exit" => AppCommand::Shutdown,
        other => return Err(format!("不明なコマンドです: {}", other)),
    };
    Ok(Some(command))
}

// ============================================================================
// One-shot commands
// ============================================================================

/// A timer over the persisted state whose events are discarded.
fn local_timer(services: &AppServices) -> TimerEngine {
    let (tx, _rx) = mpsc::unbounded_channel();
    TimerEngine::new(services.settings.clone(), services.clock.clone(), tx)
}

async fn restore_session(services: &AppServices) {
    if let Err(e) = services.auth.restore().await {
        tracing::warn!(error = %e, "Session restore failed");
    }
}

async fn status(paths: &AppPaths) -> Result<()> {
    let services = AppServices::load(paths, false)?;
    restore_session(&services).await;

    let settings = services.settings.as_ref();
    let state = stored_state(settings, &services.clock.today());
    let report = StatusReport {
        timer: TimerSnapshot::from_timer_state(&state),
        config: state.config.clone(),
        hotkey: HotKeyBinding::load(settings),
        hot_edge: HotEdgeConfig::load(settings),
        sounds: SoundSettings::load(settings),
        identity: services.auth.identity(),
        sync_configured: services.sync.is_configured(),
        last_updated: services.sync.local_last_updated(),
    };
    Display::show_status(&report);
    Ok(())
}

fn configure(paths: &AppPaths, command: ConfigCommand) -> Result<()> {
    let settings: Arc<dyn SettingsStore> = Arc::new(
        JsonFileStore::open(paths.settings_file()).context("設定ファイルを開けませんでした")?,
    );
    let store = settings.as_ref();
    let timer = || {
        let (tx, _rx) = mpsc::unbounded_channel();
        TimerEngine::new(settings.clone(), Arc::new(SystemClock), tx)
    };

    match command {
        ConfigCommand::Work { minutes } => {
            timer().set_work_minutes(minutes).map_err(|e| anyhow!(e))?;
            Display::show_setting_saved("作業時間", &format!("{}分", minutes));
        }
        ConfigCommand::Rest { minutes } => {
            timer().set_rest_minutes(minutes).map_err(|e| anyhow!(e))?;
            Display::show_setting_saved("休憩時間", &format!("{}分", minutes));
        }
        ConfigCommand::AutoContinue { enabled } => {
            timer().set_auto_continue(enabled);
            let label = if enabled { "オン" } else { "オフ" };
            Display::show_setting_saved("自動継続", label);
        }
        ConfigCommand::Hotkey { binding } => {
            binding.save(store);
            Display::show_setting_saved("ホットキー", &binding.display_string());
        }
        ConfigCommand::HotEdge(args) => {
            let mut config = HotEdgeConfig::load(store);
            config.edge = args.edge;
            config.enabled = args.edge != HotEdge::Disabled;
            if let Some(threshold) = args.threshold {
                config.edge_threshold = threshold;
            }
            if let Some(delay) = args.delay {
                config.trigger_delay = delay;
            }
            if let Some(cooldown) = args.cooldown {
                config.cooldown = cooldown;
            }
            config.clamped().save(store);
            Display::show_setting_saved("ホットエッジ", args.edge.label());
        }
        ConfigCommand::Sound { phase, sound } => {
            let mut sounds = SoundSettings::load(store);
            let name = match phase {
                SoundPhase::Work => {
                    sounds.work = sound.clone();
                    "作業完了音"
                }
                SoundPhase::Rest => {
                    sounds.rest = sound.clone();
                    "休憩完了音"
                }
            };
            sounds.save(store)?;
            Display::show_setting_saved(name, sound.label());
        }
    }

    tracing::debug!(config = ?load_config(store), "Settings saved");
    Ok(())
}

async fn sync(paths: &AppPaths, command: SyncCommand) -> Result<()> {
    let services = AppServices::load(paths, false)?;
    restore_session(&services).await;
    if let Err(e) = services.auth.refresh_if_expired().await {
        tracing::warn!(error = %e, "Token refresh failed");
    }
    let mut timer = local_timer(&services);
    let local_count = timer.state().session_count;

    let failed = match command {
        SyncCommand::Pull { allow_decrease } => {
            let outcome = services
                .sync
                .sync_from_cloud(local_count, allow_decrease)
                .await;
            if let PullOutcome::Applied { session_count, .. } = outcome {
                timer.apply_synced_count(session_count);
            }
            Display::show_pull_outcome(&outcome);
            matches!(outcome, PullOutcome::Failed(_) | PullOutcome::Unavailable(_))
        }
        SyncCommand::Push => {
            let outcome = services.sync.sync_to_cloud(local_count).await;
            Display::show_push_outcome(&outcome);
            !outcome.is_success()
        }
    };

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

async fn auth(paths: &AppPaths, command: AuthCommand) -> Result<()> {
    let services = AppServices::load(paths, false)?;

    match command {
        AuthCommand::Login { redirect_url } => {
            let identity = services.auth.sign_in(&redirect_url).await?;
            Display::show_identity(&identity);
        }
        AuthCommand::Logout => {
            restore_session(&services).await;
            let result = services.auth.sign_out().await;
            services.sync.clear_local_timestamp();
            result?;
            Display::show_signed_out();
        }
        AuthCommand::Whoami => {
            restore_session(&services).await;
            Display::show_identity(&services.auth.identity());
        }
    }
    Ok(())
}

/// Generates shell completion scripts.
fn generate_completions(shell: clap_complete::Shell) {
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, &mut io::stdout());
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_args() {
        let cli = Cli::parse_from(["flyt"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parse_verbose() {
        let cli = Cli::parse_from(["flyt", "--verbose", "status"]);
        assert!(cli.verbose);
    }

    #[test]
    fn test_parse_input_line_commands() {
        assert_eq!(parse_input_line("start"), Ok(Some(AppCommand::Start)));
        assert_eq!(
            parse_input_line("  reset-count "),
            Ok(Some(AppCommand::ResetSessionCount))
        );
        assert_eq!(parse_input_line("skip"), Ok(Some(AppCommand::SkipToNext)));
        assert_eq!(parse_input_line("quit"), Ok(Some(AppCommand::Shutdown)));
    }

    #[test]
    fn test_parse_input_line_pull_variants() {
        assert_eq!(
            parse_input_line("pull"),
            Ok(Some(AppCommand::Pull {
                allow_decrease: false
            }))
        );
        assert_eq!(
            parse_input_line("pull!"),
            Ok(Some(AppCommand::Pull {
                allow_decrease: true
            }))
        );
    }

    #[test]
    fn test_parse_input_line_blank_and_unknown() {
        assert_eq!(parse_input_line("   "), Ok(None));
        assert!(parse_input_line("dance").is_err());
    }

    #[test]
    fn test_read_commands_shuts_down_at_end_of_input() {
        let (handle, mut rx) = AppHandle::channel();
        read_commands(std::io::Cursor::new("start\n\nbogus\npush\n"), &handle);

        assert_eq!(rx.try_recv().ok(), Some(AppCommand::Start));
        assert_eq!(rx.try_recv().ok(), Some(AppCommand::Push));
        assert_eq!(rx.try_recv().ok(), Some(AppCommand::Shutdown));
        assert!(rx.try_recv().is_err());
    }
}
