//! Authentication error types.

use thiserror::Error;

/// Errors raised by auth providers.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No backend is configured for this installation.
    #[error("Supabaseが設定されていません")]
    NotConfigured,

    /// The OAuth redirect URL could not be understood.
    #[error("リダイレクトURLが不正です: {0}")]
    InvalidRedirect(String),

    /// The identity provider reported an error in the redirect.
    #[error("ログインがキャンセルされました: {0}")]
    Denied(String),

    /// HTTP transport failure.
    #[error("通信に失敗しました: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed payload.
    #[error("レスポンスの解析に失敗しました: {0}")]
    Json(#[from] serde_json::Error),

    /// The auth API returned an error.
    #[error("認証APIエラー: {0}")]
    Api(String),

    /// Persisting or clearing the stored session failed.
    #[error("セッションの保存に失敗しました: {0}")]
    Storage(String),
}

impl AuthError {
    /// Returns true when retrying later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_))
    }

    /// Returns a user-friendly suggestion for resolving this error.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NotConfigured => "FLYT_SUPABASE_URL と FLYT_SUPABASE_ANON_KEY を設定してください",
            Self::InvalidRedirect(_) | Self::Denied(_) => "もう一度ログインしてください",
            Self::Http(_) => "ネットワーク接続を確認してください",
            Self::Json(_) | Self::Api(_) => "時間をおいて再試行してください",
            Self::Storage(_) => "設定ディレクトリの権限を確認してください",
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert!(AuthError::NotConfigured
            .to_string()
            .contains("設定されていません"));
        assert!(AuthError::Api("bad token (401)".into())
            .to_string()
            .contains("bad token"));
    }

    #[test]
    fn test_suggestion() {
        assert!(AuthError::NotConfigured
            .suggestion()
            .contains("FLYT_SUPABASE_URL"));
        assert!(!AuthError::Denied("x".into()).is_transient());
    }
}
