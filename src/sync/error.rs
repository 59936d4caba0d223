//! Sync error types.
//!
//! Errors are cloneable values so they can travel through status updates and
//! job results without losing detail.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// No backend configured; sync is permanently disabled.
    #[error("Supabaseが設定されていません")]
    NotConfigured,

    /// No signed-in user.
    #[error("ログインしていません")]
    NotAuthenticated,

    /// Transport failure.
    #[error("通信エラー: {0}")]
    Http(String),

    /// The backend rejected the request.
    #[error("サーバーエラー: {message}")]
    Api { status: u16, message: String },

    /// The backend answered with something unexpected.
    #[error("レスポンスの解析に失敗しました: {0}")]
    Decode(String),
}

impl SyncError {
    /// Returns true for the "sync is unavailable" preconditions.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::NotConfigured | Self::NotAuthenticated)
    }

    /// Returns true if the failure came from the network or the backend.
    #[must_use]
    pub fn is_remote_failure(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Api { .. } | Self::Decode(_))
    }

    /// Returns a user-friendly suggestion for resolving this error.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NotConfigured => "FLYT_SUPABASE_URL と FLYT_SUPABASE_ANON_KEY を設定してください",
            Self::NotAuthenticated => "flyt auth login でログインしてください",
            Self::Http(_) => "ネットワーク接続を確認してください",
            Self::Api { status: 401, .. } => "再ログインしてください",
            Self::Api { .. } | Self::Decode(_) => "時間をおいて再試行してください",
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
