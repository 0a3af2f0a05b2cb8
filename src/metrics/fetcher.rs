use chrono::{DateTime, Utc};
use log::debug;
use std::time::Instant;
use thiserror::Error;

use crate::api::models::{Channel, Scale, Unit};
use crate::api::source::{ApiError, MeterDataSource};
use super::types::ApiTiming;

/// How a single channel fetch can fail. The assembler treats the two
/// differently: no-data aborts the whole build as transient, a transport
/// failure degrades only the affected device.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The service has not flushed any current-hour data yet.
    #[error("no data for hour")]
    NoData,

    #[error(transparent)]
    Transport(#[from] ApiError),
}

/// Fetches the raw per-second usage stream for the hour-to-now window.
pub struct UsageFetcher;

impl UsageFetcher {
    /// Fetch second-granularity kWh samples for one channel over
    /// `[window_start, window_end)`, recording the call's wall-clock
    /// duration under `get_chart_usage/<channel-number>`.
    ///
    /// Seconds data usually lags by a few seconds, sometimes longer; the
    /// returned effective start is whatever window the service actually
    /// answered for.
    pub async fn fetch_window(
        source: &dyn MeterDataSource,
        channel: &Channel,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        timing: &mut ApiTiming,
    ) -> Result<(Vec<Option<f64>>, DateTime<Utc>), FetchError> {
        let started = Instant::now();
        let (samples, effective_start) = source
            .fetch_usage_window(
                channel,
                window_start,
                window_end,
                Scale::Second,
                Unit::KilowattHours,
            )
            .await?;

        if samples.is_empty() || samples[0].is_none() {
            return Err(FetchError::NoData);
        }

        timing.record(
            format!("get_chart_usage/{}", channel.channel_num),
            started.elapsed(),
        );
        debug!(
            "channel {}: {} samples from {}",
            channel.channel_num,
            samples.len(),
            effective_start
        );

        Ok((samples, effective_start))
    }
}
