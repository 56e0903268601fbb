use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::sample::Snapshot;
use crate::timezone::parse_timestamp;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1";

/// Where snapshots come from: one at a time for the live view, or a batch
/// covering a range for the history view.
pub trait SampleSource {
    fn current(&mut self) -> Result<Snapshot>;

    /// Snapshots between `start` and `end`. Callers must not assume the
    /// batch is ordered even though the contract says ascending.
    fn range(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<u32>,
    ) -> Result<Vec<Snapshot>>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn current(&mut self) -> Result<Snapshot> {
        (**self).current()
    }

    fn range(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<u32>,
    ) -> Result<Vec<Snapshot>> {
        (**self).range(start, end, limit)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Batch {
    Envelope { metrics: Vec<Value> },
    Bare(Vec<Value>),
}

/// Accepts both `{"metrics": [...], "count": n}` and a bare array.
///
/// Rows are decoded one at a time: a row that is not a snapshot at all is
/// dropped and the rest of the batch is kept. Only a body that is not a
/// batch fails.
pub fn decode_batch(body: &[u8]) -> Result<Vec<Snapshot>> {
    let rows = match serde_json::from_slice(body)? {
        Batch::Envelope { metrics } => metrics,
        Batch::Bare(metrics) => metrics,
    };
    let total = rows.len();
    let snapshots: Vec<Snapshot> = rows
        .into_iter()
        .enumerate()
        .filter_map(|(row, value)| match serde_json::from_value(value) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                debug!(row, %err, "dropping undecodable snapshot");
                None
            }
        })
        .collect();
    if snapshots.len() < total {
        warn!(dropped = total - snapshots.len(), total, "batch contained undecodable rows");
    }
    Ok(snapshots)
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The metrics REST API.
#[derive(Clone, Debug)]
pub struct HttpSource {
    client: Client,
    base: String,
    token: Option<String>,
}

impl HttpSource {
    pub fn new(base: impl Into<String>, token: Option<String>) -> Result<Self> {
        let client = Client::builder().http1_only().build()?;
        let base = base.into().trim_end_matches('/').to_string();
        Ok(Self { client, base, token })
    }

    fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Bytes> {
        let url = format!("{}{path}", self.base);
        let mut request = self.client.get(&url).query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send()?;
        let status = response.status().as_u16();
        debug!(%url, status, "metrics API response");
        if let Some(err) = Error::from_status(status) {
            return Err(err);
        }
        Ok(response.bytes()?)
    }
}

impl SampleSource for HttpSource {
    fn current(&mut self) -> Result<Snapshot> {
        let body = self.get("/metrics/current", &[])?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn range(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<u32>,
    ) -> Result<Vec<Snapshot>> {
        let mut query = vec![("start_time", iso(start)), ("end_time", iso(end))];
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        let body = self.get("/history/metrics", &query)?;
        decode_batch(&body)
    }
}

/// A recorded batch of snapshots on disk, for offline use.
///
/// `current` replays the snapshots in file order, one per call.
#[derive(Debug)]
pub struct FileSource {
    snapshots: Vec<Snapshot>,
    cursor: usize,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read(path)?;
        Ok(Self::from_snapshots(decode_batch(&raw)?))
    }

    pub fn from_snapshots(snapshots: Vec<Snapshot>) -> Self {
        Self { snapshots, cursor: 0 }
    }
}

impl SampleSource for FileSource {
    fn current(&mut self) -> Result<Snapshot> {
        let snapshot = self
            .snapshots
            .get(self.cursor)
            .cloned()
            .ok_or_else(|| Error::Io(ErrorKind::UnexpectedEof.into()))?;
        self.cursor += 1;
        Ok(snapshot)
    }

    fn range(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<u32>,
    ) -> Result<Vec<Snapshot>> {
        let limit = limit.map_or(usize::MAX, |l| l as usize);
        Ok(self
            .snapshots
            .iter()
            .filter(|s| parse_timestamp(&s.timestamp).is_some_and(|ts| ts >= start && ts <= end))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    use std::collections::VecDeque;

    use super::*;
    use crate::sample::NetworkStats;

    /// Hands out canned responses in order.
    #[derive(Default)]
    pub struct ScriptedSource {
        pub current: VecDeque<Result<Snapshot>>,
        pub ranges: VecDeque<Result<Vec<Snapshot>>>,
    }

    impl SampleSource for ScriptedSource {
        fn current(&mut self) -> Result<Snapshot> {
            self.current
                .pop_front()
                .unwrap_or_else(|| Err(Error::Transport("script exhausted".into())))
        }

        fn range(
            &mut self,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _limit: Option<u32>,
        ) -> Result<Vec<Snapshot>> {
            self.ranges
                .pop_front()
                .unwrap_or_else(|| Err(Error::Transport("script exhausted".into())))
        }
    }

    /// Newest first, float counters, null gauges, one row that is not a
    /// snapshot: what the history endpoint actually serves.
    pub const BACKEND_BATCH: &str = r#"{"metrics": [
        {"timestamp": "2024-03-01T12:00:20.000000",
         "cpu": {"percent": 7.5, "count": 8, "freq_current": null},
         "memory": {"total": 1.6e10, "available": 8.0e9, "used": 8.0e9, "percent": 50.0},
         "disk": {"total": null, "used": null, "free": null, "percent": null},
         "network": {"bytes_sent": 6000.0, "bytes_recv": 12000.0, "packets_sent": 60.0, "packets_recv": 120.0}},
        {"timestamp": "2024-03-01T12:00:10.000000",
         "cpu": {"percent": null, "count": null, "freq_current": null},
         "network": {"bytes_sent": 4000.0, "bytes_recv": 8000.0, "packets_sent": 40.0, "packets_recv": 80.0}},
        {"timestamp": 17, "network": {"bytes_sent": 1.0}},
        {"timestamp": "2024-03-01T12:00:00.000000",
         "cpu": {"percent": 3.0, "count": 8, "freq_current": 2400.0},
         "network": {"bytes_sent": 2000.0, "bytes_recv": 4000.0, "packets_sent": 20.0, "packets_recv": 40.0},
         "gpu": []}
    ], "count": 4}"#;

    pub fn snapshot(timestamp: &str, sent: u64) -> Snapshot {
        Snapshot {
            timestamp: timestamp.to_string(),
            network: Some(NetworkStats {
                bytes_sent: Some(sent),
                bytes_recv: Some(sent * 2),
                packets_sent: Some(sent / 100),
                packets_recv: Some(sent / 50),
            }),
            ..Default::default()
        }
    }
}
