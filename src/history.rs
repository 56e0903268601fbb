use std::thread;

use chrono::{DateTime, Utc};
use crossbeam_channel::{self as channel, Receiver};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chart::{records, ChartPoint};
use crate::error::{Error, Result};
use crate::prefs::DisplayPreference;
use crate::rate::compute_rates;
use crate::sample::{CounterSample, RateSample, Snapshot};
use crate::source::SampleSource;
use crate::units::NetworkUnit;

pub const DEFAULT_LIMIT: u32 = 1000;

/// A range query tagged with the generation it was issued under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryRequest {
    pub generation: u64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub zone: String,
}

/// The result of the last successful query, index-aligned:
/// `snapshots[i]`, `counters[i]` and `rates[i]` describe the same instant.
#[derive(Clone, Debug, Serialize)]
pub struct HistoryWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub zone: String,
    pub snapshots: Vec<Snapshot>,
    pub counters: Vec<CounterSample>,
    pub rates: Vec<RateSample>,
}

impl HistoryWindow {
    pub fn points(&self, unit: NetworkUnit) -> Vec<ChartPoint> {
        let prefs = DisplayPreference { network_unit: unit, timezone: self.zone.clone() };
        records(&self.rates, &prefs)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Applied {
    Fresh,
    /// A newer request was issued since; the response was dropped.
    Stale,
}

/// Owns the history chart state.
///
/// Every `begin` bumps the generation; a response is only applied if it
/// answers the latest generation, so a slow answer to an old range or zone
/// can never overwrite a newer one. A failed query leaves the previous
/// window in place.
pub struct HistoryWindowManager {
    generation: u64,
    pending: Option<u64>,
    max_gap_secs: f64,
    limit: Option<u32>,
    window: Option<HistoryWindow>,
    last_error: Option<String>,
}

impl HistoryWindowManager {
    pub fn new(max_gap_secs: f64, limit: Option<u32>) -> Self {
        Self {
            generation: 0,
            pending: None,
            max_gap_secs,
            limit,
            window: None,
            last_error: None,
        }
    }

    pub fn begin(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        zone: &str,
    ) -> Result<HistoryRequest> {
        if start > end {
            return Err(Error::InvalidRange { start: start.to_rfc3339(), end: end.to_rfc3339() });
        }
        self.generation += 1;
        self.pending = Some(self.generation);
        debug!(generation = self.generation, %start, %end, zone, "history query issued");
        Ok(HistoryRequest { generation: self.generation, start, end, zone: zone.to_string() })
    }

    /// Apply the response to `request`. A failure of the latest request is
    /// returned to the caller and remembered; the window is left untouched.
    pub fn apply(
        &mut self,
        request: &HistoryRequest,
        result: Result<Vec<Snapshot>>,
    ) -> Result<Applied> {
        if request.generation != self.generation {
            debug!(
                generation = request.generation,
                latest = self.generation,
                "discarding stale history response"
            );
            return Ok(Applied::Stale);
        }
        match result {
            Ok(snapshots) => {
                self.install(request, snapshots);
                Ok(Applied::Fresh)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Issue, fetch and apply in one go.
    pub fn query<S: SampleSource + ?Sized>(
        &mut self,
        source: &mut S,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        zone: &str,
    ) -> Result<&HistoryWindow> {
        let request = self.begin(start, end, zone)?;
        match source.range(start, end, self.limit) {
            Ok(snapshots) => Ok(self.install(&request, snapshots)),
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Run the fetch for `request` on a worker thread. The owner receives
    /// the response on the returned channel and hands it to `apply`.
    pub fn spawn_fetch<S>(
        &self,
        request: HistoryRequest,
        mut source: S,
    ) -> Receiver<(HistoryRequest, Result<Vec<Snapshot>>)>
    where
        S: SampleSource + Send + 'static,
    {
        let (tx, rx) = channel::bounded(1);
        let limit = self.limit;
        thread::spawn(move || {
            let result = source.range(request.start, request.end, limit);
            let _ = tx.send((request, result));
        });
        rx
    }

    pub fn window(&self) -> Option<&HistoryWindow> {
        self.window.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn fail(&mut self, err: Error) -> Error {
        warn!(%err, "history query failed, keeping previous data");
        self.pending = None;
        self.last_error = Some(err.to_string());
        err
    }

    fn install(&mut self, request: &HistoryRequest, snapshots: Vec<Snapshot>) -> &HistoryWindow {
        let mut rows: Vec<(CounterSample, Snapshot)> = snapshots
            .into_iter()
            .filter_map(|snapshot| match CounterSample::from_snapshot(&snapshot) {
                Some(sample) => Some((sample, snapshot)),
                None => {
                    debug!(timestamp = %snapshot.timestamp, "dropping history snapshot with unparseable timestamp");
                    None
                }
            })
            .collect();

        if !rows.windows(2).all(|w| w[0].0.timestamp <= w[1].0.timestamp) {
            warn!(count = rows.len(), "history batch is not in ascending order, sorting it");
            rows.sort_by_key(|(sample, _)| sample.timestamp);
        }

        let (counters, snapshots): (Vec<_>, Vec<_>) = rows.into_iter().unzip();
        let rates = compute_rates(&counters, self.max_gap_secs);
        info!(generation = request.generation, samples = counters.len(), "history window updated");

        self.pending = None;
        self.last_error = None;
        self.window.insert(HistoryWindow {
            start: request.start,
            end: request.end,
            zone: request.zone.clone(),
            snapshots,
            counters,
            rates,
        })
    }
}
