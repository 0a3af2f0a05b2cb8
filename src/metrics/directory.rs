use log::{debug, warn};
use std::future::Future;
use std::sync::RwLock;
use std::time::Instant;

use crate::api::models::Device;
use crate::api::source::MeterDataSource;
use crate::error::MetricsError;
use super::types::ApiTiming;

/// The utility/Zigbee connect model tag. Other device families expose
/// incompatible channel semantics and must not be aggregated.
pub const UTILITY_CONNECT_MODEL: &str = "ZIG001";

/// Process-wide cache of the discovered device set.
///
/// Populated at most once per process lifetime and reused across report
/// builds — a deliberate rate-limiting accommodation. If the devices on
/// the account change, restart the process or call `invalidate`.
/// Population is idempotent, so a racing second populate harmlessly
/// overwrites with its own identical result.
#[derive(Debug, Default)]
pub struct DeviceCache {
    inner: RwLock<Option<Vec<Device>>>,
}

impl DeviceCache {
    pub fn get(&self) -> Option<Vec<Device>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn populate(&self, devices: Vec<Device>) {
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = Some(devices);
    }

    /// Operator hook: force rediscovery on the next build.
    pub fn invalidate(&self) {
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub async fn get_or_populate<F, Fut>(&self, populate: F) -> Result<Vec<Device>, MetricsError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Device>, MetricsError>>,
    {
        if let Some(devices) = self.get() {
            debug!("using cached device set ({} devices)", devices.len());
            return Ok(devices);
        }
        let devices = populate().await?;
        self.populate(devices.clone());
        Ok(devices)
    }
}

/// Discovers which metered devices to track.
pub struct DeviceDirectory;

impl DeviceDirectory {
    /// List devices from the source and filter for eligible ones:
    /// connected, utility-connect model, at least one channel. Retains the
    /// first survivor and stops there — every additional call counts
    /// against the remote rate limit.
    pub async fn discover(
        source: &dyn MeterDataSource,
        timing: &mut ApiTiming,
    ) -> Result<Vec<Device>, MetricsError> {
        let started = Instant::now();
        let devices = match source.list_devices().await {
            Ok(devices) => devices,
            Err(err) => {
                if err.is_auth_error() {
                    // Stale tokens: force login on retry.
                    warn!("invalidating auth tokens: {}", err);
                    source.invalidate_auth();
                } else {
                    warn!("device listing failed: {}", err);
                }
                return Err(MetricsError::transient("get_devices failed"));
            }
        };
        timing.record("get_devices", started.elapsed());

        let mut tracked = Vec::new();
        for device in devices {
            debug!(
                "device {}, connected {}, model {}, channels {}",
                device.device_gid,
                device.connected,
                device.model,
                device.channels.len()
            );
            if !device.connected {
                continue;
            }
            if device.model != UTILITY_CONNECT_MODEL {
                continue;
            }
            if device.channels.is_empty() {
                continue;
            }
            tracked.push(device);
            // Due to rate limiting, stop with the first valid device.
            break;
        }

        Ok(tracked)
    }
}
