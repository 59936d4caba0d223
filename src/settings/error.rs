//! Settings store error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or persisting settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Reading or writing the settings file failed.
    #[error("設定ファイルへのアクセスに失敗しました: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings file exists but is not valid JSON.
    #[error("設定ファイルの解析に失敗しました: {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be converted to JSON.
    #[error("設定値の変換に失敗しました: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The home directory could not be resolved.
    #[error("ホームディレクトリが見つかりません")]
    HomeDirNotFound,
}

impl SettingsError {
    /// Returns true if the error came from the filesystem.
    #[must_use]
    pub fn is_io_error(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::HomeDirNotFound)
    }

    /// Returns a user-friendly suggestion for resolving this error.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Io { .. } => "ディレクトリの権限を確認してください",
            Self::Parse { .. } => "設定ファイルを削除して再起動してください",
            Self::Serialize(_) => "設定値を確認してください",
            Self::HomeDirNotFound => "FLYT_HOME 環境変数で保存先を指定してください",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_contains_path() {
        let err = SettingsError::Io {
            path: PathBuf::from("/tmp/flyt/settings.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/tmp/flyt/settings.json"));
        assert!(err.is_io_error());
        assert!(err.suggestion().contains("権限"));
    }

    #[test]
    fn test_parse_error_is_not_io() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = SettingsError::Parse {
            path: PathBuf::from("settings.json"),
            source,
        };
        assert!(!err.is_io_error());
        assert!(err.suggestion().contains("削除"));
    }
}
