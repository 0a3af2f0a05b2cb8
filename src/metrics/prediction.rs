use chrono::{DateTime, Duration, Utc};
use log::debug;
use std::collections::BTreeMap;

use super::aggregator::{top_of_hour, HOUR_SCALE, MINUTE_SCALE};
use super::types::{DeviceMetrics, Prediction};

/// Predict consumption or surplus at the end of the current hour.
///
/// Enriches the device metrics in place: lag is set whenever the hour
/// bucket exists; the prediction itself additionally needs the one-minute
/// bucket, so a degraded device keeps `prediction: None`.
///
/// The remaining-time estimate is anchored on the hour bucket's as-of
/// instant, not the capture time, so data-arrival drift widens the
/// remaining window instead of silently biasing the prediction.
pub fn predict(device: &mut DeviceMetrics, capture_instant: DateTime<Utc>) {
    let Some(hour) = device.scales.get(HOUR_SCALE) else {
        return;
    };
    let hour_usage = hour.usage;
    let hour_instant = hour.instant;

    device.lag = if hour_instant < capture_instant {
        capture_instant - hour_instant
    } else {
        Duration::zero()
    };

    let Some(minute_usage) = device.scales.get(MINUTE_SCALE).map(|b| b.usage) else {
        debug!("device {}: no minute data, skipping prediction", device.gid);
        return;
    };

    let hour_next = top_of_hour(capture_instant) + Duration::hours(1);
    let seconds_remaining = duration_seconds(hour_next - hour_instant);

    // strategy: extrapolate the remaining hour from the 1MIN rate
    let minute_predicted = seconds_remaining * minute_usage / 60.0;
    let prediction = hour_usage + minute_predicted;

    // Each minute window is an independent linear extrapolator; their
    // spread is the smoothing band.
    let mut smoothing = BTreeMap::new();
    let mut prediction_min = prediction;
    let mut prediction_max = prediction;
    for (label, bucket) in &device.scales {
        if !label.ends_with("MIN") {
            continue;
        }
        let sval = hour_usage + seconds_remaining * bucket.usage / 60.0;
        prediction_min = prediction_min.min(sval);
        prediction_max = prediction_max.max(sval);
        smoothing.insert(label.clone(), sval);
    }

    device.prediction = Some(Prediction {
        minute_predicted,
        minutes_remaining: seconds_remaining / 60.0,
        prediction,
        prediction_min,
        prediction_max,
        seconds_remaining,
        smoothing,
    });
}

fn duration_seconds(duration: Duration) -> f64 {
    duration
        .num_microseconds()
        .map(|us| us as f64 / 1e6)
        .unwrap_or_else(|| duration.num_milliseconds() as f64 / 1e3)
}
