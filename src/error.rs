use chrono::{DateTime, Utc};
use thiserror::Error;

/// Error surfaced by the metrics engine.
///
/// `Transient` means the caller should retry the whole report build after a
/// short delay; `Fatal` means authentication cannot succeed with any
/// available credential source and an operator has to step in. The engine
/// itself never retries — retry policy stays a caller concern.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("{reason} (at {instant})")]
    Transient {
        reason: String,
        /// When the error was raised, so a refreshing caller can show
        /// that the page actually reloaded.
        instant: DateTime<Utc>,
    },

    #[error("{reason}")]
    Fatal { reason: String },
}

impl MetricsError {
    pub fn transient(reason: impl Into<String>) -> Self {
        MetricsError::Transient {
            reason: reason.into(),
            instant: Utc::now(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        MetricsError::Fatal {
            reason: reason.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, MetricsError::Transient { .. })
    }
}
