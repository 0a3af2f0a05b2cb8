use chrono::Utc;
use log::{debug, error};
use std::sync::Arc;
use std::time::Instant;

use crate::api::source::MeterDataSource;
use crate::error::MetricsError;
use super::aggregator::{self, top_of_hour, ScaleWindow};
use super::directory::{DeviceCache, DeviceDirectory};
use super::fetcher::{FetchError, UsageFetcher};
use super::prediction::predict;
use super::types::{ApiTiming, DeviceMetrics, MetricsReport};

/// Trailing samples passed through for sparkline rendering
const CHART_DATA_SECONDS: usize = 300;

/// Builds one `MetricsReport` per call: discovery, per-channel fetch,
/// aggregation, prediction, and API timing, strictly sequentially — the
/// remote service rate-limits, so parallel fetches buy nothing.
pub struct MetricsEngine<S: MeterDataSource> {
    source: S,
    cache: Arc<DeviceCache>,
    debug: bool,
}

impl<S: MeterDataSource> MetricsEngine<S> {
    pub fn new(source: S, cache: Arc<DeviceCache>, debug: bool) -> Self {
        Self {
            source,
            cache,
            debug,
        }
    }

    pub async fn build(&self) -> Result<MetricsReport, MetricsError> {
        let mut timing = ApiTiming::default();

        let started = Instant::now();
        self.source
            .authenticate()
            .await
            .map_err(|err| MetricsError::fatal(format!("authentication failed: {}", err)))?;
        timing.record("auth", started.elapsed());

        // Take the instant after auth, to reduce data lag.
        let instant = Utc::now();

        let devices = self
            .cache
            .get_or_populate(|| DeviceDirectory::discover(&self.source, &mut timing))
            .await?;

        let chart_start = top_of_hour(instant);
        let mut device_metrics = Vec::new();

        for device in &devices {
            let mut metrics = DeviceMetrics::for_device(device);

            for channel in &device.channels {
                debug!("channel: {}", channel.name);
                match UsageFetcher::fetch_window(
                    &self.source,
                    channel,
                    chart_start,
                    instant,
                    &mut timing,
                )
                .await
                {
                    Ok((samples, data_start)) => {
                        metrics.scales = aggregator::build_scales(&samples, data_start, self.debug);
                        metrics.chart_data = samples
                            [samples.len().saturating_sub(CHART_DATA_SECONDS)..]
                            .to_vec();
                    }
                    Err(FetchError::NoData) => {
                        return Err(MetricsError::transient("no data for hour"));
                    }
                    Err(FetchError::Transport(err)) => {
                        // Fake empty data and proceed with the other devices.
                        error!(
                            "error fetching device data: skipping {}: {}",
                            device.device_name, err
                        );
                        metrics.scales.clear();
                        metrics.chart_data.clear();
                        metrics.scales.insert(
                            ScaleWindow::Hour.label(),
                            aggregator::aggregate(&[], chart_start, ScaleWindow::Hour, self.debug),
                        );
                    }
                }
            }

            predict(&mut metrics, instant);
            device_metrics.push(metrics);
        }

        timing.finalize_total();

        debug!("reporting metrics for {} devices", device_metrics.len());
        Ok(MetricsReport {
            instant,
            debug: self.debug,
            api_response: timing,
            devices: device_metrics,
        })
    }
}
