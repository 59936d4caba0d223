//! Construction of the production collaborators.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::auth::{AuthManager, AuthProvider, SupabaseAuthProvider};
use crate::clock::{Clock, SystemClock};
use crate::config::{AppPaths, BackendConfig};
use crate::settings::{JsonFileStore, SettingsStore};
use crate::sound::{try_create_player, SoundPlayer};
use crate::sync::{RemoteStore, SupabaseRemoteStore, SyncEngine};

/// Everything the coordinator depends on.
#[derive(Clone)]
pub struct AppServices {
    pub settings: Arc<dyn SettingsStore>,
    pub clock: Arc<dyn Clock>,
    pub auth: AuthManager,
    pub sync: SyncEngine,
    /// `None` when there is no audio device.
    pub sound: Option<Arc<dyn SoundPlayer>>,
}

impl AppServices {
    /// Wires the given collaborators together.
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
        auth: AuthManager,
        remote: Option<Arc<dyn RemoteStore>>,
        sound: Option<Arc<dyn SoundPlayer>>,
    ) -> Self {
        let sync = SyncEngine::new(remote, auth.handle(), settings.clone(), clock.clone());
        Self {
            settings,
            clock,
            auth,
            sync,
            sound,
        }
    }

    /// Builds the real services from the settings directory and backend
    /// configuration. Sync and auth stay disabled when no backend is set.
    pub fn load(paths: &AppPaths, with_sound: bool) -> Result<Self> {
        let settings: Arc<dyn SettingsStore> = Arc::new(
            JsonFileStore::open(paths.settings_file()).context("設定ファイルを開けませんでした")?,
        );
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let backend = match BackendConfig::load(paths) {
            Ok(backend) => backend,
            Err(e) => {
                warn!(error = %e, "Backend configuration ignored");
                None
            }
        };

        let provider: Option<Arc<dyn AuthProvider>> = match &backend {
            Some(config) => Some(Arc::new(
                SupabaseAuthProvider::new(config, settings.clone())
                    .context("認証クライアントの初期化に失敗しました")?,
            )),
            None => {
                info!("No backend configured; sync disabled");
                None
            }
        };
        let auth = AuthManager::new(provider, settings.clone());

        let remote: Option<Arc<dyn RemoteStore>> = match &backend {
            Some(config) => Some(Arc::new(
                SupabaseRemoteStore::new(config, auth.handle())
                    .context("同期クライアントの初期化に失敗しました")?,
            )),
            None => None,
        };

        let sound = if with_sound {
            try_create_player()
        } else {
            None
        };

        Ok(Self::new(settings, clock, auth, remote, sound))
    }
}
