use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::timezone::parse_timestamp;

/// One reading from the metrics API, as it appears on the wire.
///
/// Every section and every field inside it is optional on decode so that a
/// partially populated snapshot still lands in the series instead of failing
/// the whole batch. The backend stores every column as a nullable float, so
/// counters and byte amounts arrive as `3000.0` as often as `3000`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<DiskStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkStats>,
    // the live endpoint says `gpus`, the history endpoint says `gpu`
    #[serde(default, alias = "gpu", deserialize_with = "gpu_list", skip_serializing_if = "Vec::is_empty")]
    pub gpus: Vec<GpuStats>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuStats {
    #[serde(default, deserialize_with = "gauge")]
    pub percent: Option<f64>,
    #[serde(default, deserialize_with = "whole_number")]
    pub count: Option<u64>,
    #[serde(default, deserialize_with = "gauge")]
    pub freq_current: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    #[serde(default, deserialize_with = "whole_number")]
    pub total: Option<u64>,
    #[serde(default, deserialize_with = "whole_number")]
    pub available: Option<u64>,
    #[serde(default, deserialize_with = "whole_number")]
    pub used: Option<u64>,
    #[serde(default, deserialize_with = "whole_number", skip_serializing_if = "Option::is_none")]
    pub free: Option<u64>,
    #[serde(default, deserialize_with = "gauge")]
    pub percent: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskStats {
    #[serde(default, deserialize_with = "whole_number")]
    pub total: Option<u64>,
    #[serde(default, deserialize_with = "whole_number")]
    pub used: Option<u64>,
    #[serde(default, deserialize_with = "whole_number")]
    pub free: Option<u64>,
    #[serde(default, deserialize_with = "gauge")]
    pub percent: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    #[serde(default, deserialize_with = "whole_number")]
    pub bytes_sent: Option<u64>,
    #[serde(default, deserialize_with = "whole_number")]
    pub bytes_recv: Option<u64>,
    #[serde(default, deserialize_with = "whole_number")]
    pub packets_sent: Option<u64>,
    #[serde(default, deserialize_with = "whole_number")]
    pub packets_recv: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuStats {
    #[serde(default, deserialize_with = "whole_number")]
    pub index: Option<u64>,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "gauge")]
    pub temperature: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub utilization: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub memory_used: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub memory_total: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub memory_percent: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub power_draw: Option<f64>,
}

/// A non-negative integer amount sent as any JSON number. Null, strings,
/// negatives and non-integral values other than whole floats read as `None`.
fn whole_number<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(as_whole_number))
}

fn as_whole_number(value: &Value) -> Option<u64> {
    if let Some(v) = value.as_u64() {
        return Some(v);
    }
    let v = value.as_f64()?;
    // 2^64 itself is not representable as u64
    (v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v < u64::MAX as f64).then_some(v as u64)
}

/// A float reading; anything that is not a finite number reads as `None`.
fn gauge<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(Value::as_f64).filter(|v| v.is_finite()))
}

/// GPU entries that do not decode are skipped rather than failing the row.
fn gpu_list<'de, D>(deserializer: D) -> Result<Vec<GpuStats>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let Some(Value::Array(entries)) = value else {
        return Ok(Vec::new());
    };
    Ok(entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect())
}

/// The four cumulative network counters of a sample.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

/// A positioned counter reading. `counters` is `None` when the snapshot it
/// came from was missing any of the expected counter fields; such a sample
/// keeps its slot in the series but never produces a rate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CounterSample {
    pub timestamp: DateTime<Utc>,
    pub counters: Option<Counters>,
}

impl CounterSample {
    pub fn new(timestamp: DateTime<Utc>, counters: Counters) -> Self {
        Self { timestamp, counters: Some(counters) }
    }

    /// Returns `None` when the timestamp cannot be parsed.
    pub fn from_snapshot(snapshot: &Snapshot) -> Option<Self> {
        let timestamp = parse_timestamp(&snapshot.timestamp)?;
        let counters = snapshot.network.as_ref().and_then(|n| {
            Some(Counters {
                bytes_sent: n.bytes_sent?,
                bytes_recv: n.bytes_recv?,
                packets_sent: n.packets_sent?,
                packets_recv: n.packets_recv?,
            })
        });
        Some(Self { timestamp, counters })
    }
}

/// Per-second rates derived from two adjacent counter samples.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct RateSample {
    pub timestamp: DateTime<Utc>,
    pub sent_rate: Option<f64>,
    pub recv_rate: Option<f64>,
    pub packets_sent_rate: Option<f64>,
    pub packets_recv_rate: Option<f64>,
}

impl RateSample {
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            sent_rate: None,
            recv_rate: None,
            packets_sent_rate: None,
            packets_recv_rate: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sent_rate.is_none()
            && self.recv_rate.is_none()
            && self.packets_sent_rate.is_none()
            && self.packets_recv_rate.is_none()
    }
}
