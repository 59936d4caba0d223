//! Display utilities for the Flyt CLI.
//!
//! This module provides formatted output for:
//! - Timer lines printed by the terminal presenter
//! - Status display
//! - Sync and auth results
//! - Error messages

use chrono::{DateTime, Local, Utc};

use crate::app::UiEvent;
use crate::auth::AuthIdentity;
use crate::hotedge::HotEdgeConfig;
use crate::hotkey::HotKeyBinding;
use crate::sound::SoundSettings;
use crate::sync::{PullOutcome, PushOutcome, SyncStatus};
use crate::types::{PomodoroConfig, TimerSnapshot};

// ============================================================================
// StatusReport
// ============================================================================

/// Everything `flyt status` prints.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub timer: TimerSnapshot,
    pub config: PomodoroConfig,
    pub hotkey: HotKeyBinding,
    pub hot_edge: HotEdgeConfig,
    pub sounds: SoundSettings,
    pub identity: AuthIdentity,
    pub sync_configured: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

// ============================================================================
// Display
// ============================================================================

/// Display utilities for CLI output.
pub struct Display;

impl Display {
    /// Shows the commands accepted on stdin by `flyt run`.
    pub fn show_run_help() {
        println!("コマンド: start / pause / reset / reset-count / skip / toggle / show / pull / pull! / push / quit");
    }

    /// Shows one line of timer state.
    pub fn show_timer(snapshot: &TimerSnapshot) {
        println!("{}", Self::format_timer(snapshot));
    }

    /// Shows a coordinator notification. Tick-level timer updates are
    /// printed only when `verbose_ticks` is set.
    pub fn show_ui_event(event: &UiEvent, verbose_ticks: bool) {
        match event {
            UiEvent::Timer(snapshot) if snapshot.is_running && !verbose_ticks => {}
            UiEvent::Timer(snapshot) => Self::show_timer(snapshot),
            UiEvent::ToggleVisibility => println!("◐ 表示を切り替えました"),
            UiEvent::Show => println!("◉ ウィンドウを表示しました"),
            UiEvent::SessionCompleted { session_count } => {
                println!("* 作業セッション完了！ (今日 {}回目)", session_count);
            }
            UiEvent::SyncStatusChanged(status) => {
                if let Some(line) = Self::format_sync_status(status) {
                    println!("{}", line);
                }
            }
            UiEvent::AuthChanged(identity) => println!("{}", Self::format_identity(identity)),
            UiEvent::AuthFailed(message) => Self::show_error(message),
            UiEvent::SettingRejected(message) => Self::show_error(message),
        }
    }

    /// Shows the full status report.
    pub fn show_status(report: &StatusReport) {
        println!("Flyt ステータス");
        println!("─────────────────────────────");
        println!("状態: {}", report.timer.phase.label());
        println!("残り時間: {}", report.timer.time_string);
        println!("今日のセッション: {}", report.timer.session_count);
        println!(
            "作業 / 休憩: {}分 / {}分",
            report.config.work_minutes, report.config.rest_minutes
        );
        println!(
            "自動継続: {}",
            if report.config.auto_continue { "オン" } else { "オフ" }
        );
        println!("ホットキー: {}", report.hotkey.display_string());
        println!("ホットエッジ: {}", Self::format_hot_edge(&report.hot_edge));
        println!(
            "完了音: 作業 {} / 休憩 {}",
            report.sounds.work, report.sounds.rest
        );
        println!("アカウント: {}", Self::format_identity(&report.identity));
        if !report.sync_configured {
            println!("同期: 未設定");
        } else {
            match report.last_updated {
                Some(at) => println!("最終同期: {}", Self::format_timestamp(&at)),
                None => println!("最終同期: なし"),
            }
        }
    }

    /// Shows the result of a pull.
    pub fn show_pull_outcome(outcome: &PullOutcome) {
        match outcome {
            PullOutcome::Failed(e) | PullOutcome::Unavailable(e) => {
                Self::show_error(&e.to_string());
                eprintln!("  {}", e.suggestion());
            }
            other => println!("{}", Self::format_pull_outcome(other)),
        }
    }

    /// Shows the result of a push.
    pub fn show_push_outcome(outcome: &PushOutcome) {
        match outcome {
            PushOutcome::Failed(e) | PushOutcome::Unavailable(e) => {
                Self::show_error(&e.to_string());
                eprintln!("  {}", e.suggestion());
            }
            other => println!("{}", Self::format_push_outcome(other)),
        }
    }

    /// Shows that a setting was saved.
    pub fn show_setting_saved(name: &str, value: &str) {
        println!("* {}を{}に設定しました", name, value);
    }

    pub fn show_count_reset() {
        println!("* 今日のセッション数をリセットしました");
    }

    pub fn show_identity(identity: &AuthIdentity) {
        println!("{}", Self::format_identity(identity));
    }

    pub fn show_signed_out() {
        println!("* ログアウトしました");
    }

    /// Shows an error message.
    pub fn show_error(message: &str) {
        eprintln!("エラー: {}", message);
    }

    // ------------------------------------------------------------------------
    // Formatting
    // ------------------------------------------------------------------------

    fn format_timer(snapshot: &TimerSnapshot) -> String {
        let marker = if snapshot.is_running { "▶" } else { "⏸" };
        format!(
            "{} {} {} (今日 {}回)",
            marker,
            snapshot.phase.label(),
            snapshot.time_string,
            snapshot.session_count
        )
    }

    fn format_hot_edge(config: &HotEdgeConfig) -> String {
        if !config.is_active() {
            return "無効".to_string();
        }
        format!(
            "{} (距離 {}pt, 遅延 {}秒, クールダウン {}秒)",
            config.edge.label(),
            config.edge_threshold,
            config.trigger_delay,
            config.cooldown
        )
    }

    fn format_identity(identity: &AuthIdentity) -> String {
        if !identity.is_authenticated {
            return "未ログイン".to_string();
        }
        match (&identity.email, &identity.user_id) {
            (Some(email), _) => format!("ログイン中: {}", email),
            (None, Some(user_id)) => format!("ログイン中: {}", user_id),
            (None, None) => "ログイン中".to_string(),
        }
    }

    /// `None` when there is nothing to report.
    fn format_sync_status(status: &SyncStatus) -> Option<String> {
        if status.message.is_empty() {
            return None;
        }
        if status.is_syncing {
            return Some(format!("… {}", status.message));
        }
        Some(status.message.clone())
    }

    fn format_pull_outcome(outcome: &PullOutcome) -> String {
        match outcome {
            PullOutcome::Applied { session_count, .. } => {
                format!("* クラウドから取得しました (今日 {}回)", session_count)
            }
            PullOutcome::NoRemoteData => "クラウドに今日のデータはありません".to_string(),
            PullOutcome::SkippedLocalNewer => {
                "ローカルの方が新しいため取得をスキップしました".to_string()
            }
            PullOutcome::SkippedDecrease { local, remote } => format!(
                "クラウドの回数({})がローカル({})より少ないためスキップしました\n  上書きするには --allow-decrease を指定してください",
                remote, local
            ),
            PullOutcome::Discarded => {
                "アカウントが変わったため取得結果を破棄しました".to_string()
            }
            PullOutcome::Unavailable(e) | PullOutcome::Failed(e) => e.to_string(),
        }
    }

    fn format_push_outcome(outcome: &PushOutcome) -> String {
        match outcome {
            PushOutcome::Inserted(record) | PushOutcome::Updated(record) => {
                format!("* クラウドに保存しました (今日 {}回)", record.session_count)
            }
            PushOutcome::Discarded => {
                "アカウントが変わったため保存結果を破棄しました".to_string()
            }
            PushOutcome::Unavailable(e) | PushOutcome::Failed(e) => e.to_string(),
        }
    }

    fn format_timestamp(at: &DateTime<Utc>) -> String {
        at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{Severity, SyncError, SyncRecord};
    use crate::types::TimerPhase;

    fn snapshot(phase: TimerPhase, is_running: bool) -> TimerSnapshot {
        TimerSnapshot {
            phase,
            remaining_seconds: 1499,
            session_count: 3,
            is_running,
            progress: 0.0,
            time_string: "24:59".to_string(),
        }
    }

    // ------------------------------------------------------------------------
    // Format Tests
    // ------------------------------------------------------------------------

    mod format_tests {
        use super::*;

        #[test]
        fn test_format_timer_running() {
            let line = Display::format_timer(&snapshot(TimerPhase::Working, true));
            assert_eq!(line, "▶ 作業中 24:59 (今日 3回)");
        }

        #[test]
        fn test_format_timer_paused() {
            let line = Display::format_timer(&snapshot(TimerPhase::Resting, false));
            assert!(line.starts_with("⏸ 休憩中"));
        }

        #[test]
        fn test_format_hot_edge_disabled() {
            assert_eq!(Display::format_hot_edge(&HotEdgeConfig::default()), "無効");
        }

        #[test]
        fn test_format_hot_edge_active() {
            let config = HotEdgeConfig {
                edge: crate::hotedge::HotEdge::Left,
                enabled: true,
                ..HotEdgeConfig::default()
            };
            assert!(Display::format_hot_edge(&config).starts_with("左"));
        }

        #[test]
        fn test_format_identity() {
            assert_eq!(Display::format_identity(&AuthIdentity::default()), "未ログイン");
            let identity = AuthIdentity {
                user_id: Some("u1".to_string()),
                email: Some("a@example.com".to_string()),
                is_authenticated: true,
            };
            assert_eq!(Display::format_identity(&identity), "ログイン中: a@example.com");
        }

        #[test]
        fn test_format_sync_status() {
            assert_eq!(Display::format_sync_status(&SyncStatus::default()), None);
            let mut status = SyncStatus::new(Severity::Info, "📥 ダウンロード中...");
            status.is_syncing = true;
            assert_eq!(
                Display::format_sync_status(&status),
                Some("… 📥 ダウンロード中...".to_string())
            );
        }

        #[test]
        fn test_format_pull_skipped_decrease_mentions_flag() {
            let line = Display::format_pull_outcome(&PullOutcome::SkippedDecrease {
                local: 5,
                remote: 2,
            });
            assert!(line.contains("--allow-decrease"));
            assert!(line.contains("(2)"));
        }

        #[test]
        fn test_format_push_outcome() {
            let record = SyncRecord {
                id: Some("row-1".to_string()),
                user_id: "u1".to_string(),
                session_date: "2026-10-19".to_string(),
                session_count: 4,
                last_updated: Utc::now(),
                device_id: "d".to_string(),
            };
            let line = Display::format_push_outcome(&PushOutcome::Updated(record));
            assert!(line.contains("4回"));
        }
    }

    // ------------------------------------------------------------------------
    // Show Tests
    // ------------------------------------------------------------------------

    mod show_tests {
        use super::*;

        #[test]
        fn test_show_ui_events() {
            // Should not panic
            Display::show_ui_event(&UiEvent::Timer(snapshot(TimerPhase::Working, true)), false);
            Display::show_ui_event(&UiEvent::ToggleVisibility, false);
            Display::show_ui_event(&UiEvent::SessionCompleted { session_count: 2 }, false);
            Display::show_ui_event(&UiEvent::SettingRejected("x".to_string()), false);
        }

        #[test]
        fn test_show_pull_failure() {
            // Should not panic
            Display::show_pull_outcome(&PullOutcome::Unavailable(SyncError::NotAuthenticated));
        }

        #[test]
        fn test_show_error() {
            // Should not panic
            Display::show_error("テストエラー");
        }
    }
}
