//! Parser for `btrfs --format json device stats <path>`.

use super::{ParseError, STAT_TYPES};
use crate::registry::LabelKey;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::trace;

const UNKNOWN: &str = "unknown";

#[derive(Debug, Deserialize)]
struct DeviceStatsReport {
    #[serde(rename = "device-stats")]
    device_stats: Option<Vec<Map<String, Value>>>,
}

/// Parses the JSON report into one `(device, devid, stat_type, path)` series
/// per device and error counter.
///
/// Counters whose value is not a number are skipped individually; a missing
/// `device` or `devid` is reported as `"unknown"`.
pub fn parse_device_stats(
    raw: &str,
    path: &str,
) -> Result<Vec<(LabelKey<4>, f64)>, ParseError> {
    let report: DeviceStatsReport = serde_json::from_str(raw)?;
    let devices = report.device_stats.ok_or(ParseError::MissingDeviceStats)?;

    let mut samples = Vec::with_capacity(devices.len() * STAT_TYPES.len());
    for device_stat in &devices {
        let device = label_value(device_stat.get("device"));
        let devid = label_value(device_stat.get("devid"));
        for stat_type in STAT_TYPES {
            let Some(value) = device_stat.get(stat_type).and_then(numeric_value) else {
                trace!(%device, stat_type, "Skipping missing or non-numeric device stat");
                continue;
            };
            let labels = LabelKey::new([
                device.clone(),
                devid.clone(),
                stat_type.to_string(),
                path.to_string(),
            ]);
            samples.push((labels, value));
        }
    }
    Ok(samples)
}

fn label_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

// Counters arrive as numeric strings; plain JSON numbers are accepted too.
fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}
