use chrono::{DateTime, Duration, Timelike, Utc};
use std::collections::BTreeMap;

use super::types::ScaleBucket;

pub const HOUR_SCALE: &str = "1H";
pub const MINUTE_SCALE: &str = "1MIN";

/// Most trailing-minute windows ever built for one device
pub const MAX_MINUTE_WINDOWS: u32 = 10;

/// A named aggregation window: the full hour so far, or the trailing
/// `m` minutes of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleWindow {
    Hour,
    TrailingMinutes(u32),
}

impl ScaleWindow {
    pub fn label(&self) -> String {
        match self {
            ScaleWindow::Hour => HOUR_SCALE.to_string(),
            ScaleWindow::TrailingMinutes(m) => format!("{}MIN", m),
        }
    }
}

/// Truncate an instant to the top of its hour.
pub fn top_of_hour(instant: DateTime<Utc>) -> DateTime<Utc> {
    let time = instant.time();
    instant
        - Duration::minutes(time.minute() as i64)
        - Duration::seconds(time.second() as i64)
        - Duration::nanoseconds(time.nanosecond() as i64)
}

/// Aggregate per-second kWh samples into one scale bucket.
///
/// Pure function of its inputs. Gaps (`None`) count toward the sample
/// count but contribute nothing to the sum — tolerated, not interpolated.
pub fn aggregate(
    samples: &[Option<f64>],
    window_start: DateTime<Utc>,
    window: ScaleWindow,
    debug: bool,
) -> ScaleBucket {
    let seconds = samples.len();

    // Sum to the window total, converting kWh to Wh while we are here.
    let mut usage = 1000.0 * samples.iter().flatten().sum::<f64>();
    if matches!(window, ScaleWindow::TrailingMinutes(_)) && seconds != 0 {
        // seconds: scale to a per-minute rate
        usage = usage * 60.0 / seconds as f64;
    }

    ScaleBucket {
        data: debug.then(|| samples.iter().take(3).copied().collect()),
        data_start: debug.then_some(window_start),
        seconds,
        usage,
        instant: window_start + Duration::seconds(seconds as i64),
    }
}

/// Build the full scale family for one sample stream: the hour bucket from
/// everything, then successively wider trailing-minute windows all ending
/// at the same capture point.
pub fn build_scales(
    samples: &[Option<f64>],
    data_start: DateTime<Utc>,
    debug: bool,
) -> BTreeMap<String, ScaleBucket> {
    let mut scales = BTreeMap::new();
    scales.insert(
        ScaleWindow::Hour.label(),
        aggregate(samples, data_start, ScaleWindow::Hour, debug),
    );

    let data_end = data_start + Duration::seconds(samples.len() as i64);
    let window_count = data_end.minute().clamp(1, MAX_MINUTE_WINDOWS);
    for m in 1..=window_count {
        let window = ScaleWindow::TrailingMinutes(m);
        let take = (60 * m) as usize;
        let offset_data = &samples[samples.len().saturating_sub(take)..];
        let offset_start = data_end - Duration::minutes(m as i64);
        scales.insert(
            window.label(),
            aggregate(offset_data, offset_start, window, debug),
        );
    }

    scales
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // Exactly representable in binary, so sums stay exact.
    const KWH_PER_SEC: f64 = 0.0009765625;

    fn hour_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 8, 27, 18, 0, 0).unwrap()
    }

    fn constant_samples(n: usize) -> Vec<Option<f64>> {
        vec![Some(KWH_PER_SEC); n]
    }

    #[test]
    fn test_full_hour_sum_is_exact() {
        let samples = constant_samples(3600);
        let bucket = aggregate(&samples, hour_start(), ScaleWindow::Hour, false);

        assert_eq!(bucket.usage, 1000.0 * 3600.0 * KWH_PER_SEC);
        assert_eq!(bucket.seconds, 3600);
        assert_eq!(bucket.instant, hour_start() + Duration::seconds(3600));
    }

    #[test]
    fn test_minute_scale_normalizes_to_per_minute_rate() {
        let samples = constant_samples(90);
        let bucket = aggregate(&samples, hour_start(), ScaleWindow::TrailingMinutes(2), false);

        let total_wh = 1000.0 * 90.0 * KWH_PER_SEC;
        assert!((bucket.usage - total_wh * 60.0 / 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_rate_usage_is_window_size_invariant() {
        let one_minute = aggregate(
            &constant_samples(60),
            hour_start(),
            ScaleWindow::TrailingMinutes(1),
            false,
        );
        let three_minutes = aggregate(
            &constant_samples(180),
            hour_start(),
            ScaleWindow::TrailingMinutes(3),
            false,
        );

        assert_eq!(one_minute.usage, three_minutes.usage);
    }

    #[test]
    fn test_aggregate_is_pure() {
        let samples = constant_samples(137);
        let first = aggregate(&samples, hour_start(), ScaleWindow::TrailingMinutes(2), true);
        let second = aggregate(&samples, hour_start(), ScaleWindow::TrailingMinutes(2), true);
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_window() {
        let bucket = aggregate(&[], hour_start(), ScaleWindow::Hour, false);
        assert_eq!(bucket.usage, 0.0);
        assert_eq!(bucket.seconds, 0);
        assert_eq!(bucket.instant, hour_start());

        // Minute scales skip rate normalization on an empty window.
        let minute = aggregate(&[], hour_start(), ScaleWindow::TrailingMinutes(1), false);
        assert_eq!(minute.usage, 0.0);
    }

    #[test]
    fn test_gaps_count_but_do_not_sum() {
        let samples = vec![Some(KWH_PER_SEC), None, Some(KWH_PER_SEC)];
        let bucket = aggregate(&samples, hour_start(), ScaleWindow::Hour, false);

        assert_eq!(bucket.seconds, 3);
        assert_eq!(bucket.usage, 1000.0 * 2.0 * KWH_PER_SEC);
        assert_eq!(bucket.instant, hour_start() + Duration::seconds(3));
    }

    #[test]
    fn test_window_count_at_minute_three() {
        // 3m14s of data: windows 1..=3 exist, no 4MIN.
        let scales = build_scales(&constant_samples(194), hour_start(), false);

        assert!(scales.contains_key("1H"));
        assert!(scales.contains_key("1MIN"));
        assert!(scales.contains_key("3MIN"));
        assert!(!scales.contains_key("4MIN"));
        assert_eq!(scales.len(), 4);
    }

    #[test]
    fn test_window_count_caps_at_ten() {
        let scales = build_scales(&constant_samples(2552), hour_start(), false);

        assert!(scales.contains_key("10MIN"));
        assert!(!scales.contains_key("11MIN"));
        // 1H plus ten minute windows.
        assert_eq!(scales.len(), 11);
    }

    #[test]
    fn test_at_least_one_minute_window() {
        // Under a minute of data still yields the 1MIN window.
        let scales = build_scales(&constant_samples(20), hour_start(), false);
        assert!(scales.contains_key("1MIN"));
        assert_eq!(scales.len(), 2);
        assert_eq!(scales["1MIN"].seconds, 20);
    }

    #[test]
    fn test_minute_windows_are_trailing_slices() {
        // First minute at one rate, second minute at double rate.
        let mut samples = vec![Some(KWH_PER_SEC); 60];
        samples.extend(vec![Some(2.0 * KWH_PER_SEC); 60]);
        let scales = build_scales(&samples, hour_start(), false);

        let data_end = hour_start() + Duration::seconds(120);

        // 1MIN sees only the recent, doubled minute.
        let one = &scales["1MIN"];
        assert_eq!(one.seconds, 60);
        assert_eq!(one.usage, 1000.0 * 60.0 * 2.0 * KWH_PER_SEC);
        assert_eq!(one.instant, data_end);

        // 2MIN spans both minutes, ending at the same capture point.
        let two = &scales["2MIN"];
        assert_eq!(two.seconds, 120);
        assert!((two.usage - 1000.0 * 180.0 * KWH_PER_SEC * 60.0 / 120.0).abs() < 1e-9);
        assert_eq!(two.instant, data_end);
    }

    #[test]
    fn test_debug_payload() {
        let samples = constant_samples(61);
        let bucket = aggregate(&samples, hour_start(), ScaleWindow::Hour, true);

        assert_eq!(bucket.data.as_ref().map(|d| d.len()), Some(3));
        assert_eq!(bucket.data_start, Some(hour_start()));

        let plain = aggregate(&samples, hour_start(), ScaleWindow::Hour, false);
        assert!(plain.data.is_none());
        assert!(plain.data_start.is_none());
    }

    #[test]
    fn test_top_of_hour() {
        let instant = Utc.with_ymd_and_hms(2022, 8, 27, 18, 42, 34).unwrap()
            + Duration::microseconds(170_162);
        assert_eq!(top_of_hour(instant), hour_start());
        assert_eq!(top_of_hour(hour_start()), hour_start());
    }
}
