use chrono::{DateTime, Duration, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::Duration as StdDuration;

/// Aggregated usage for one time scale.
///
/// `usage` is Watt-hours for the hour scale and a per-minute rate for the
/// trailing-minute scales. `instant` is the as-of time: bucket start plus
/// one second per sample, which trails the capture instant when the
/// service is lagging.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleBucket {
    /// First few raw samples, debug builds of the report only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Option<f64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_start: Option<DateTime<Utc>>,
    pub seconds: usize,
    pub usage: f64,
    pub instant: DateTime<Utc>,
}

/// End-of-hour extrapolation for one device. Only present once the device
/// has both the hour bucket and at least the one-minute bucket.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub minute_predicted: f64,
    pub minutes_remaining: f64,
    pub prediction: f64,
    pub prediction_min: f64,
    pub prediction_max: f64,
    pub seconds_remaining: f64,
    /// Per-scale smoothed predictions, keyed by minute-scale label
    pub smoothing: BTreeMap<String, f64>,
}

/// Per-device output of one report build. Built alongside the wire-level
/// `Device`, which stays untouched.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMetrics {
    pub gid: u64,
    pub name: String,
    pub timezone: String,
    /// Gap between the capture instant and the hour bucket's as-of time.
    /// Never negative.
    #[serde(serialize_with = "serialize_duration_iso8601")]
    pub lag: Duration,
    pub scales: BTreeMap<String, ScaleBucket>,
    /// Trailing raw samples passed through for sparkline rendering
    pub chart_data: Vec<Option<f64>>,
    #[serde(flatten)]
    pub prediction: Option<Prediction>,
}

impl DeviceMetrics {
    pub fn for_device(device: &crate::api::models::Device) -> Self {
        Self {
            gid: device.device_gid,
            name: device.device_name.clone(),
            timezone: device.time_zone.clone(),
            lag: Duration::zero(),
            scales: BTreeMap::new(),
            chart_data: Vec::new(),
            prediction: None,
        }
    }
}

/// Wall-clock duration of every remote call made during one report build,
/// keyed by operation name. Serializes each entry as an ISO-8601 duration.
#[derive(Debug, Default, Clone)]
pub struct ApiTiming {
    ops: BTreeMap<String, StdDuration>,
}

pub const TOTAL_KEY: &str = "total";

impl ApiTiming {
    pub fn record(&mut self, name: impl Into<String>, elapsed: StdDuration) {
        self.ops.insert(name.into(), elapsed);
    }

    pub fn get(&self, name: &str) -> Option<StdDuration> {
        self.ops.get(name).copied()
    }

    /// Sum of all recorded operations, not counting a previously
    /// finalized total.
    pub fn total(&self) -> StdDuration {
        self.ops
            .iter()
            .filter(|(name, _)| name.as_str() != TOTAL_KEY)
            .map(|(_, d)| *d)
            .sum()
    }

    pub fn finalize_total(&mut self) {
        let total = self.total();
        self.ops.insert(TOTAL_KEY.to_string(), total);
    }
}

impl Serialize for ApiTiming {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.ops.len()))?;
        for (name, elapsed) in &self.ops {
            map.serialize_entry(name, &format_iso8601(elapsed.as_secs(), elapsed.subsec_micros()))?;
        }
        map.end()
    }
}

/// The completed report handed to the presentation layer.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    /// Capture time, taken after authentication to minimize data lag
    pub instant: DateTime<Utc>,
    pub debug: bool,
    pub api_response: ApiTiming,
    pub devices: Vec<DeviceMetrics>,
}

/// Render a duration as ISO-8601, e.g. "PT2.170162S" or "PT1H1M1S".
fn format_iso8601(total_secs: u64, micros: u32) -> String {
    if total_secs == 0 && micros == 0 {
        return "PT0S".to_string();
    }

    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let secs = total_secs % 60;

    let mut out = String::from("P");
    if days > 0 {
        out.push_str(&format!("{}D", days));
    }
    if hours > 0 || minutes > 0 || secs > 0 || micros > 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{}H", hours));
        }
        if minutes > 0 {
            out.push_str(&format!("{}M", minutes));
        }
        if micros > 0 {
            let frac = format!("{:06}", micros);
            out.push_str(&format!("{}.{}S", secs, frac.trim_end_matches('0')));
        } else if secs > 0 {
            out.push_str(&format!("{}S", secs));
        }
    }
    out
}

pub(crate) fn serialize_duration_iso8601<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let std = duration.to_std().unwrap_or_default();
    serializer.serialize_str(&format_iso8601(std.as_secs(), std.subsec_micros()))
}
