use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};

/// A metered device as reported by the smart-meter service.
///
/// The engine never mutates these; derived per-device output lives in
/// `metrics::DeviceMetrics` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub device_gid: u64,
    #[serde(default)]
    pub device_name: String,
    pub model: String,
    pub connected: bool,
    #[serde(default)]
    pub time_zone: String,
    #[serde(default)]
    pub channels: Vec<Channel>,
}

/// One channel of a device. Holds only the back-reference to its device,
/// never the device itself. The utility-connect model reports a single
/// combined channel whose number reads like "1,2,3".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub device_gid: u64,
    #[serde(default)]
    pub name: String,
    pub channel_num: String,
}

/// Granularity of a usage query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    Second,
    Minute,
    Hour,
}

impl Scale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scale::Second => "1S",
            Scale::Minute => "1MIN",
            Scale::Hour => "1H",
        }
    }
}

/// Unit of a usage query. Only energy is requested by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    KilowattHours,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::KilowattHours => "KilowattHours",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceListResponse {
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// Per-second usage for one channel window. `usage_list` may contain nulls
/// where the service has no reading for that second.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartUsageResponse {
    pub first_usage_instant: DateTime<Utc>,
    #[serde(default)]
    pub usage_list: Vec<Option<f64>>,
}

/// Stored authentication tokens, persisted between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_deserializes_from_wire_shape() {
        let json = r#"{
            "deviceGid": 12345,
            "deviceName": "Utility meter",
            "model": "ZIG001",
            "connected": true,
            "timeZone": "America/Los_Angeles",
            "channels": [
                {"deviceGid": 12345, "name": "Main", "channelNum": "1,2,3"}
            ]
        }"#;

        let device: Device = serde_json::from_str(json).unwrap();
        assert_eq!(device.device_gid, 12345);
        assert_eq!(device.model, "ZIG001");
        assert!(device.connected);
        assert_eq!(device.channels.len(), 1);
        assert_eq!(device.channels[0].channel_num, "1,2,3");
        assert_eq!(device.channels[0].device_gid, device.device_gid);
    }

    #[test]
    fn test_chart_usage_keeps_nulls() {
        let json = r#"{
            "firstUsageInstant": "2022-08-27T18:00:00Z",
            "usageList": [0.0012, null, 0.0013]
        }"#;

        let resp: ChartUsageResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.usage_list.len(), 3);
        assert!(resp.usage_list[1].is_none());
    }

    #[test]
    fn test_scale_and_unit_labels() {
        assert_eq!(Scale::Second.as_str(), "1S");
        assert_eq!(Scale::Hour.as_str(), "1H");
        assert_eq!(Unit::KilowattHours.as_str(), "KilowattHours");
    }
}
