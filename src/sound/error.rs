//! Sound system error types.
//!
//! None of these are fatal: the coordinator logs them and carries on
//! silently.

use thiserror::Error;

/// Sound playback failures.
#[derive(Debug, Error)]
pub enum SoundError {
    /// No output device could be opened.
    #[error("オーディオデバイスが利用できません: {0}")]
    DeviceNotAvailable(String),

    /// No file at the sound's path.
    #[error("サウンドファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("サウンドファイルのデコードに失敗しました: {0}")]
    DecodeError(String),

    #[error("オーディオストリームの作成に失敗しました: {0}")]
    StreamError(String),

    /// The audio thread is gone.
    #[error("サウンド再生エラー: {0}")]
    PlaybackError(String),

    /// Path lies outside the system sound directories.
    #[error("許可されていないサウンドパスです: {0}")]
    InvalidPath(String),

    /// Name is not one of the selectable sounds.
    #[error("不明なサウンドです: {0}")]
    UnknownSound(String),
}

impl SoundError {
    /// What the user can do about it.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::DeviceNotAvailable(_) | Self::StreamError(_) => {
                "出力デバイスを確認するか --no-sound で起動してください"
            }
            Self::FileNotFound(_) | Self::UnknownSound(_) | Self::DecodeError(_) => {
                "flyt config sound で別のサウンドを選択してください"
            }
            Self::PlaybackError(_) => "flyt run を再起動してください",
            Self::InvalidPath(_) => "/System/Library/Sounds 内のサウンドを指定してください",
        }
    }
}
