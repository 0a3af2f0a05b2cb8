use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::models::{Channel, Device, Scale, Unit};

/// Errors from the meter-data source itself. The engine maps these onto its
/// transient/fatal taxonomy; the one distinction it needs down here is
/// whether stored authentication state has gone stale.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("token storage: {0}")]
    TokenStore(#[from] std::io::Error),

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("authentication rejected: check credentials")]
    AuthRejected,
}

impl ApiError {
    /// Stale or rejected credentials. Callers clear stored auth state on
    /// this so the next attempt performs a fresh login.
    pub fn is_auth_error(&self) -> bool {
        match self {
            ApiError::AuthRejected => true,
            ApiError::Status { status, .. } => *status == 401,
            ApiError::Transport(err) => err
                .status()
                .map_or(false, |s| s == reqwest::StatusCode::UNAUTHORIZED),
            _ => false,
        }
    }
}

/// Capability contract the engine requires from a meter data source.
///
/// Implementations are expected to be rate-limited upstream, so callers
/// issue requests strictly sequentially and cache device discovery.
#[async_trait]
pub trait MeterDataSource: Send + Sync {
    /// Authenticate, preferring stored tokens and falling back on
    /// credentials. Succeeding twice in a row is a no-op.
    async fn authenticate(&self) -> Result<(), ApiError>;

    /// List all devices visible to the account, unfiltered.
    async fn list_devices(&self) -> Result<Vec<Device>, ApiError>;

    /// Fetch usage samples for one channel over `[start, end)`.
    ///
    /// Returns the sample sequence and the effective window start reported
    /// by the service, which may trail `start` when data is lagging.
    async fn fetch_usage_window(
        &self,
        channel: &Channel,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        scale: Scale,
        unit: Unit,
    ) -> Result<(Vec<Option<f64>>, DateTime<Utc>), ApiError>;

    /// Drop any cached authentication state, forcing re-login on the next
    /// `authenticate` call.
    fn invalidate_auth(&self);
}
