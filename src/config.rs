//! Filesystem layout and backend configuration.
//!
//! Production code uses [`AppPaths::resolve`], which points to `~/.flyt/`
//! unless `FLYT_HOME` overrides it. Tests use [`AppPaths::with_root`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::settings::SettingsError;

/// Environment variable overriding the data directory.
pub const HOME_ENV: &str = "FLYT_HOME";
/// Environment variable holding the Supabase project URL.
pub const SUPABASE_URL_ENV: &str = "FLYT_SUPABASE_URL";
/// Environment variable holding the Supabase anon key.
pub const SUPABASE_ANON_KEY_ENV: &str = "FLYT_SUPABASE_ANON_KEY";

/// OAuth redirect registered for the app.
pub const AUTH_REDIRECT_URL: &str = "void2610flyt://auth-callback";

// ============================================================================
// AppPaths
// ============================================================================

/// All on-disk locations used by Flyt.
#[derive(Debug, Clone)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    /// Resolves the data directory from `FLYT_HOME` or the home directory.
    pub fn resolve() -> Result<Self, SettingsError> {
        if let Some(root) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::with_root(PathBuf::from(root)));
        }
        let home = dirs::home_dir().ok_or(SettingsError::HomeDirNotFound)?;
        Ok(Self::with_root(home.join(".flyt")))
    }

    /// Uses a custom root directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to settings.json (all persisted settings).
    pub fn settings_file(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    /// Path to backend.json (Supabase project credentials).
    pub fn backend_file(&self) -> PathBuf {
        self.root.join("backend.json")
    }
}

// ============================================================================
// BackendConfig
// ============================================================================

/// Errors raised while resolving the backend configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Supabase の URL と anon key は両方指定する必要があります")]
    Incomplete,

    #[error("Supabase URL が不正です: {0}")]
    InvalidUrl(String),

    #[error("バックエンド設定の読み込みに失敗しました: {path}: {message}")]
    File { path: PathBuf, message: String },
}

/// Supabase project credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub supabase_url: String,
    pub anon_key: String,
}

#[derive(Debug, Default, Deserialize)]
struct BackendFile {
    supabase_url: Option<String>,
    anon_key: Option<String>,
}

impl BackendConfig {
    /// Loads the backend configuration.
    ///
    /// Environment variables take precedence over `backend.json`. Returns
    /// `Ok(None)` when neither source names a backend, in which case the app
    /// runs without sync.
    pub fn load(paths: &AppPaths) -> Result<Option<Self>, ConfigError> {
        let file = read_backend_file(&paths.backend_file())?;
        Self::resolve(
            std::env::var(SUPABASE_URL_ENV).ok(),
            std::env::var(SUPABASE_ANON_KEY_ENV).ok(),
            file.supabase_url,
            file.anon_key,
        )
    }

    fn resolve(
        env_url: Option<String>,
        env_key: Option<String>,
        file_url: Option<String>,
        file_key: Option<String>,
    ) -> Result<Option<Self>, ConfigError> {
        let url = normalize_text_option(env_url).or_else(|| normalize_text_option(file_url));
        let key = normalize_text_option(env_key).or_else(|| normalize_text_option(file_key));

        match (url, key) {
            (None, None) => Ok(None),
            (Some(url), Some(anon_key)) => Ok(Some(Self::new(&url, anon_key)?)),
            _ => Err(ConfigError::Incomplete),
        }
    }

    /// Builds a config, validating and normalizing the project URL.
    pub fn new(url: &str, anon_key: impl Into<String>) -> Result<Self, ConfigError> {
        let trimmed = url.trim().trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(url.to_string()));
        }
        Ok(Self {
            supabase_url: trimmed.to_string(),
            anon_key: anon_key.into().trim().to_string(),
        })
    }

    /// Base URL of the auth API.
    pub fn auth_url(&self) -> String {
        format!("{}/auth/v1", self.supabase_url)
    }

    /// Base URL of the PostgREST API.
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.supabase_url)
    }

    /// Realtime websocket endpoint, including the API key.
    pub fn realtime_url(&self) -> String {
        let ws_base = if let Some(rest) = self.supabase_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.supabase_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.supabase_url.clone()
        };
        format!(
            "{ws_base}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            urlencoding::encode(&self.anon_key)
        )
    }
}

fn read_backend_file(path: &Path) -> Result<BackendFile, ConfigError> {
    if !path.exists() {
        return Ok(BackendFile::default());
    }
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::File {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn normalize_text_option(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
