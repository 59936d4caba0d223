//! The coordinator.
//!
//! [`App`] owns every piece of mutable state (timer, bindings, hot-edge
//! monitor, sync triggers) and runs a single `select!` loop over commands,
//! the one-second tick, the hot-edge deadline, local midnight, sync triggers,
//! auth notifications and finished background jobs. Network work runs in
//! spawned tasks; their results come back as [`Job`] messages and are
//! applied here, against whatever the state is by then.

mod event;
mod services;

pub use event::{AppCommand, InputEvent, UiEvent};
pub use services::AppServices;

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{interval_at, sleep, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::auth::{AuthEvent, AuthIdentity, AuthManager, AuthResult};
use crate::clock::{until_next_midnight, Clock};
use crate::hotedge::{HotEdgeConfig, HotEdgeMonitor};
use crate::hotkey::HotKeyBinding;
use crate::settings::SettingsStore;
use crate::sound::{play_choice, SoundPlayer, SoundSettings};
use crate::sync::{PullOutcome, Pushed, SyncEngine, SyncRecord, SyncResult, SyncStatus, SyncTriggers};
use crate::timer::{TimerEngine, TimerEvent};

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Results of spawned background work.
#[derive(Debug)]
enum Job {
    Pulled {
        fetched: SyncResult<Option<SyncRecord>>,
        allow_decrease: bool,
    },
    Pushed(SyncResult<Pushed>),
    SignedIn(AuthResult<AuthIdentity>),
    SignedOut(AuthResult<()>),
}

/// Sends commands to a running [`App`].
#[derive(Debug, Clone)]
pub struct AppHandle {
    tx: mpsc::UnboundedSender<AppCommand>,
}

impl AppHandle {
    /// A handle and the receiving end it feeds.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AppCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns false once the app has stopped.
    pub fn send(&self, command: AppCommand) -> bool {
        self.tx.send(command).is_ok()
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(AppCommand::Shutdown);
    }
}

pub struct App {
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    auth: AuthManager,
    sync: SyncEngine,
    sound: Option<Arc<dyn SoundPlayer>>,

    timer: TimerEngine,
    timer_events: mpsc::UnboundedReceiver<TimerEvent>,
    hotkey: HotKeyBinding,
    hot_edge: HotEdgeMonitor,
    sounds: SoundSettings,
    triggers: SyncTriggers,
    identity: AuthIdentity,

    commands: mpsc::UnboundedReceiver<AppCommand>,
    jobs_tx: mpsc::UnboundedSender<Job>,
    jobs: mpsc::UnboundedReceiver<Job>,
    auth_events: Option<broadcast::Receiver<AuthEvent>>,
    sync_status: watch::Receiver<SyncStatus>,
    ui: Sender<UiEvent>,
}

impl App {
    /// Builds the coordinator. Nothing runs until [`App::run`].
    pub fn new(services: AppServices, ui: Sender<UiEvent>) -> (Self, AppHandle) {
        Self::with_triggers(services, SyncTriggers::new(), ui)
    }

    /// Like [`App::new`] with custom sync triggers.
    pub fn with_triggers(
        services: AppServices,
        triggers: SyncTriggers,
        ui: Sender<UiEvent>,
    ) -> (Self, AppHandle) {
        let AppServices {
            settings,
            clock,
            auth,
            sync,
            sound,
        } = services;

        let (timer_tx, timer_events) = mpsc::unbounded_channel();
        let timer = TimerEngine::new(settings.clone(), clock.clone(), timer_tx);
        let (handle, commands) = AppHandle::channel();
        let (jobs_tx, jobs) = mpsc::unbounded_channel();

        let app = Self {
            hotkey: HotKeyBinding::load(settings.as_ref()),
            hot_edge: HotEdgeMonitor::new(HotEdgeConfig::load(settings.as_ref())),
            sounds: SoundSettings::load(settings.as_ref()),
            auth_events: auth.subscribe(),
            sync_status: sync.subscribe_status(),
            identity: AuthIdentity::default(),
            settings,
            clock,
            auth,
            sync,
            sound,
            timer,
            timer_events,
            triggers,
            commands,
            jobs_tx,
            jobs,
            ui,
        };
        (app, handle)
    }

    /// Runs until [`AppCommand::Shutdown`] or until every handle is dropped.
    pub async fn run(mut self) {
        match self.auth.restore().await {
            Ok(identity) => debug!(authenticated = identity.is_authenticated, "Auth restored"),
            Err(e) => warn!(error = %e, "Session restore failed"),
        }
        self.refresh_identity();
        self.emit(UiEvent::Timer(self.timer.snapshot()));

        let mut ticker = interval_at(Instant::now() + TICK_INTERVAL, TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let midnight = sleep(until_next_midnight(&self.clock.now()));
        tokio::pin!(midnight);

        info!("Coordinator started");
        loop {
            let running = self.timer.state().is_running;
            let edge_deadline = self.hot_edge.next_deadline();

            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    if command == AppCommand::Shutdown {
                        break;
                    }
                    let was_running = self.timer.state().is_running;
                    self.handle_command(command);
                    if !was_running && self.timer.state().is_running {
                        ticker.reset();
                    }
                }
                _ = ticker.tick(), if running => {
                    self.timer.tick();
                }
                Some(event) = self.timer_events.recv() => {
                    self.handle_timer_event(event);
                }
                _ = sleep_until_deadline(edge_deadline), if edge_deadline.is_some() => {
                    if self.hot_edge.poll(Instant::now()) {
                        debug!("Hot edge fired");
                        self.emit(UiEvent::ToggleVisibility);
                    }
                }
                () = &mut midnight => {
                    if self.timer.check_daily_rollover() {
                        info!("Session count rolled over at midnight");
                    }
                    let next = until_next_midnight(&self.clock.now());
                    midnight.as_mut().reset(Instant::now() + next);
                }
                trigger = self.triggers.next_trigger() => {
                    debug!(?trigger, "Sync trigger");
                    self.spawn_pull(false);
                }
                Some(job) = self.jobs.recv() => {
                    self.handle_job(job);
                }
                event = next_auth_event(&mut self.auth_events) => {
                    self.auth.apply_event(event);
                    self.refresh_identity();
                }
                Ok(()) = self.sync_status.changed() => {
                    let status = self.sync_status.borrow_and_update().clone();
                    self.emit(UiEvent::SyncStatusChanged(status));
                }
            }
        }

        self.triggers.stop();
        info!("Coordinator stopped");
    }

    fn handle_command(&mut self, command: AppCommand) {
        match command {
            AppCommand::Start => {
                self.timer.start();
            }
            AppCommand::Pause => self.timer.pause(),
            AppCommand::Reset => self.timer.reset(),
            AppCommand::ResetSessionCount => self.timer.reset_session_count(),
            AppCommand::SkipToNext => {
                self.timer.skip_to_next();
            }
            AppCommand::Toggle => self.emit(UiEvent::ToggleVisibility),
            AppCommand::Show => self.emit(UiEvent::Show),
            AppCommand::Pull { allow_decrease } => self.spawn_pull(allow_decrease),
            AppCommand::Push => self.spawn_push(self.timer.state().session_count),
            AppCommand::Input(input) => self.handle_input(input),
            AppCommand::SetWorkMinutes(minutes) => {
                if let Err(e) = self.timer.set_work_minutes(minutes) {
                    self.emit(UiEvent::SettingRejected(e));
                }
            }
            AppCommand::SetRestMinutes(minutes) => {
                if let Err(e) = self.timer.set_rest_minutes(minutes) {
                    self.emit(UiEvent::SettingRejected(e));
                }
            }
            AppCommand::SetAutoContinue(enabled) => self.timer.set_auto_continue(enabled),
            AppCommand::SetHotKey(binding) => {
                binding.save(self.settings.as_ref());
                info!(binding = %binding.display_string(), "Hotkey updated");
                self.hotkey = binding;
            }
            AppCommand::SetHotEdge(config) => {
                let config = config.clamped();
                config.save(self.settings.as_ref());
                self.hot_edge.set_config(config);
            }
            AppCommand::SetSounds(sounds) => {
                if let Err(e) = sounds.save(self.settings.as_ref()) {
                    warn!(error = %e, "Failed to persist sound settings");
                }
                self.sounds = sounds;
            }
            AppCommand::SignIn { redirect_url } => self.spawn_sign_in(redirect_url),
            AppCommand::SignOut => self.spawn_sign_out(),
            AppCommand::Shutdown => {}
        }
    }

    fn handle_input(&mut self, input: InputEvent) {
        match input {
            InputEvent::KeyDown {
                modifiers,
                key_code,
            } => {
                if self.hotkey.matches(modifiers, key_code) {
                    debug!("Hotkey matched");
                    self.emit(UiEvent::ToggleVisibility);
                }
            }
            InputEvent::PointerMoved { point, screens } => {
                self.hot_edge.on_pointer_moved(point, &screens, Instant::now());
            }
        }
    }

    fn handle_timer_event(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::WorkCompleted { session_count } => {
                play_choice(self.sound.as_deref(), &self.sounds.work);
                self.emit(UiEvent::Show);
                self.emit(UiEvent::SessionCompleted { session_count });
                self.spawn_push(session_count);
            }
            TimerEvent::RestCompleted => {
                play_choice(self.sound.as_deref(), &self.sounds.rest);
            }
            _ => {}
        }
        self.emit(UiEvent::Timer(self.timer.snapshot()));
    }

    fn handle_job(&mut self, job: Job) {
        match job {
            Job::Pulled {
                fetched,
                allow_decrease,
            } => {
                let local = self.timer.state().session_count;
                if let PullOutcome::Applied { session_count, .. } =
                    self.sync.apply_pull(local, fetched, allow_decrease)
                {
                    self.timer.apply_synced_count(session_count);
                }
            }
            Job::Pushed(result) => {
                self.sync.finish_push(result);
            }
            Job::SignedIn(result) => {
                if let Err(e) = result {
                    warn!(error = %e, "Sign-in failed");
                    self.emit(UiEvent::AuthFailed(e.to_string()));
                }
                self.refresh_identity();
            }
            Job::SignedOut(result) => {
                if let Err(e) = result {
                    warn!(error = %e, "Remote sign-out failed");
                }
                self.refresh_identity();
            }
        }
    }

    /// Reacts to identity changes: starts or stops sync.
    fn refresh_identity(&mut self) {
        let identity = self.auth.identity();
        if identity == self.identity {
            return;
        }
        let was_authenticated = self.identity.is_authenticated;
        self.identity = identity.clone();

        if identity.is_authenticated {
            if self.triggers.start(&self.sync) {
                info!("Sync started");
            }
        } else {
            self.triggers.stop();
            if was_authenticated {
                self.sync.clear_local_timestamp();
            }
        }
        self.emit(UiEvent::AuthChanged(identity));
    }

    // ------------------------------------------------------------------------
    // Background jobs
    // ------------------------------------------------------------------------

    fn spawn_pull(&self, allow_decrease: bool) {
        let auth = self.auth.clone();
        let sync = self.sync.clone();
        let jobs = self.jobs_tx.clone();
        tokio::spawn(async move {
            refresh_token(&auth).await;
            let fetched = sync.fetch_today().await;
            let _ = jobs.send(Job::Pulled {
                fetched,
                allow_decrease,
            });
        });
    }

    fn spawn_push(&self, session_count: u32) {
        let auth = self.auth.clone();
        let sync = self.sync.clone();
        let jobs = self.jobs_tx.clone();
        tokio::spawn(async move {
            refresh_token(&auth).await;
            let result = sync.upload(session_count).await;
            let _ = jobs.send(Job::Pushed(result));
        });
    }

    fn spawn_sign_in(&self, redirect_url: String) {
        let auth = self.auth.clone();
        let jobs = self.jobs_tx.clone();
        tokio::spawn(async move {
            let result = auth.sign_in(&redirect_url).await;
            let _ = jobs.send(Job::SignedIn(result));
        });
    }

    fn spawn_sign_out(&self) {
        let auth = self.auth.clone();
        let jobs = self.jobs_tx.clone();
        tokio::spawn(async move {
            let result = auth.sign_out().await;
            let _ = jobs.send(Job::SignedOut(result));
        });
    }

    fn emit(&self, event: UiEvent) {
        if self.ui.send(event).is_err() {
            debug!("Presenter gone; UI event dropped");
        }
    }
}

async fn refresh_token(auth: &AuthManager) {
    if let Err(e) = auth.refresh_if_expired().await {
        warn!(error = %e, "Token refresh failed");
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Next provider notification. Pending forever without a provider.
async fn next_auth_event(events: &mut Option<broadcast::Receiver<AuthEvent>>) -> AuthEvent {
    loop {
        let Some(receiver) = events.as_mut() else {
            return std::future::pending().await;
        };
        match receiver.recv().await {
            Ok(event) => return event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Auth events lagged");
            }
            Err(RecvError::Closed) => {
                *events = None;
            }
        }
    }
}
