//! Domain error types.

use std::path::PathBuf;

/// Top-level error type for tradelog.
///
/// Grammar mismatches never surface here: a line that fails to parse is
/// dropped and counted by the extractor instead.
#[derive(Debug, thiserror::Error)]
pub enum TradelogError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("cannot read log {}: {source}", path.display())]
    LogUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write report {}: {reason}", path.display())]
    Report { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TradelogError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        TradelogError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&TradelogError> for std::process::ExitCode {
    fn from(err: &TradelogError) -> Self {
        let code: u8 = match err {
            TradelogError::Io(_) | TradelogError::LogUnreadable { .. } => 1,
            TradelogError::ConfigParse { .. } | TradelogError::ConfigInvalid { .. } => 2,
            TradelogError::Report { .. } => 3,
        };
        std::process::ExitCode::from(code)
    }
}
