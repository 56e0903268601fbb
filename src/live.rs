use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use crossbeam_channel::{self as channel, Receiver};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chart::{records, ChartPoint};
use crate::error::Error;
use crate::poll::{PollTask, Tick};
use crate::prefs::DisplayPreference;
use crate::rate::{compute_rates, rate_between};
use crate::sample::{CounterSample, RateSample, Snapshot};
use crate::source::SampleSource;

/// Number of live samples kept for the rolling chart.
pub const BUFFER_CAPACITY: usize = 60;

/// Rolling window of the most recent live samples.
///
/// Timestamps in the buffer are strictly ascending: a sample that is not
/// newer than the last one kept is dropped on the floor.
pub struct LiveRateTracker {
    buffer: VecDeque<CounterSample>,
    latest: Option<Snapshot>,
    max_gap_secs: f64,
}

impl LiveRateTracker {
    pub fn new(max_gap_secs: f64) -> Self {
        Self {
            buffer: VecDeque::with_capacity(BUFFER_CAPACITY),
            latest: None,
            max_gap_secs,
        }
    }

    /// Feed one polled snapshot. Returns the rate it produced, or `None` if
    /// it was not inserted (unparseable or stale timestamp).
    pub fn push(&mut self, snapshot: Snapshot) -> Option<RateSample> {
        let Some(sample) = CounterSample::from_snapshot(&snapshot) else {
            debug!(timestamp = %snapshot.timestamp, "dropping live snapshot with unparseable timestamp");
            return None;
        };
        let rate = self.push_sample(sample)?;
        self.latest = Some(snapshot);
        Some(rate)
    }

    pub fn push_sample(&mut self, sample: CounterSample) -> Option<RateSample> {
        let prev = self.buffer.back();
        if let Some(prev) = prev {
            if sample.timestamp <= prev.timestamp {
                debug!(
                    last = %prev.timestamp,
                    got = %sample.timestamp,
                    "dropping live sample that is not newer than the buffer"
                );
                return None;
            }
        }
        let rate = rate_between(prev, &sample, self.max_gap_secs);
        self.buffer.push_back(sample);
        while self.buffer.len() > BUFFER_CAPACITY {
            self.buffer.pop_front();
        }
        Some(rate)
    }

    /// Rates for the whole buffer, recomputed from the counters.
    pub fn rates(&self) -> Vec<RateSample> {
        let samples: Vec<CounterSample> = self.buffer.iter().copied().collect();
        compute_rates(&samples, self.max_gap_secs)
    }

    /// The last accepted snapshot, for the gauges that are not rates.
    pub fn latest(&self) -> Option<&Snapshot> {
        self.latest.as_ref()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn frame(&self, prefs: &DisplayPreference, error: Option<String>) -> LiveFrame {
        let points = records(&self.rates(), prefs);
        LiveFrame {
            snapshot: self.latest.clone(),
            latest: points.last().cloned(),
            points,
            error,
        }
    }
}

/// What the live view renders after each tick.
#[derive(Clone, Debug, Serialize)]
pub struct LiveFrame {
    pub snapshot: Option<Snapshot>,
    pub latest: Option<ChartPoint>,
    pub points: Vec<ChartPoint>,
    /// Set while polls are failing; the data above is the last good one.
    pub error: Option<String>,
}

#[derive(Clone, Debug)]
pub enum LiveEvent {
    Frame(LiveFrame),
    /// The API rejected our credentials. Polling has stopped.
    SessionExpired,
}

/// A running live dashboard: the poll task and the frames it publishes.
pub struct LiveView {
    task: PollTask,
    events: Receiver<LiveEvent>,
}

impl LiveView {
    pub fn start<S>(
        mut source: S,
        prefs: DisplayPreference,
        interval: Duration,
        max_gap_secs: f64,
    ) -> io::Result<Self>
    where
        S: SampleSource + Send + 'static,
    {
        let (tx, events) = channel::unbounded();
        let mut tracker = LiveRateTracker::new(max_gap_secs);
        let mut last_error: Option<String> = None;

        let task = PollTask::start("live-metrics", interval, move || {
            match source.current() {
                Ok(snapshot) => {
                    tracker.push(snapshot);
                    last_error = None;
                }
                Err(Error::Unauthorized) => {
                    warn!("live poll rejected, session expired");
                    let _ = tx.send(LiveEvent::SessionExpired);
                    return Tick::Stop;
                }
                Err(err) => {
                    warn!(%err, retryable = err.is_retryable(), "live poll failed, keeping last data");
                    last_error = Some(err.to_string());
                }
            }
            let frame = tracker.frame(&prefs, last_error.clone());
            if tx.send(LiveEvent::Frame(frame)).is_err() {
                // nobody is watching any more
                return Tick::Stop;
            }
            Tick::Continue
        })?;
        info!(?interval, max_gap_secs, "live polling started");
        Ok(Self { task, events })
    }

    pub fn events(&self) -> &Receiver<LiveEvent> {
        &self.events
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    pub fn stop(&mut self) {
        self.task.stop();
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    use super::*;
    use crate::rate::LIVE_MAX_GAP_SECS;
    use crate::sample::Counters;
    use crate::source::scripted::{snapshot, ScriptedSource};

    fn sample(secs: i64, sent: u64) -> CounterSample {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        CounterSample::new(
            t0 + ChronoDuration::seconds(secs),
            Counters { bytes_sent: sent, bytes_recv: sent, packets_sent: sent, packets_recv: sent },
        )
    }

    #[test]
    fn buffer_is_capped_at_sixty() {
        let mut tracker = LiveRateTracker::new(LIVE_MAX_GAP_SECS);
        for i in 0..100 {
            tracker.push_sample(sample(i * 2, i as u64 * 1000));
        }
        assert_eq!(tracker.len(), BUFFER_CAPACITY);
        let rates = tracker.rates();
        assert_eq!(rates.len(), BUFFER_CAPACITY);
        assert_eq!(rates[0].timestamp, sample(80, 0).timestamp);
        // the oldest kept sample lost its predecessor
        assert!(rates[0].is_empty());
        assert_eq!(rates[59].sent_rate, Some(500.0));
    }

    #[test]
    fn stale_samples_are_discarded() {
        let mut tracker = LiveRateTracker::new(LIVE_MAX_GAP_SECS);
        assert!(tracker.push_sample(sample(10, 100)).is_some());
        assert!(tracker.push_sample(sample(10, 200)).is_none());
        assert!(tracker.push_sample(sample(8, 300)).is_none());
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.push_sample(sample(12, 300)).unwrap().sent_rate, Some(100.0));
    }

    #[test]
    fn incremental_rate_matches_recomputation() {
        let mut tracker = LiveRateTracker::new(LIVE_MAX_GAP_SECS);
        let mut last = None;
        for (t, sent) in [(0, 0), (2, 4000), (4, 1000), (60, 9000), (62, 9500)] {
            last = tracker.push_sample(sample(t, sent));
        }
        assert_eq!(tracker.rates().last().copied(), last);
    }

    #[test]
    fn keeps_latest_gauges() {
        let mut tracker = LiveRateTracker::new(LIVE_MAX_GAP_SECS);
        tracker.push(snapshot("2024-03-01T12:00:00", 0));
        tracker.push(snapshot("2024-03-01T12:00:02", 2048));
        assert!(tracker.push(snapshot("garbage", 4096)).is_none());
        assert_eq!(tracker.latest().unwrap().timestamp, "2024-03-01T12:00:02");

        let frame = tracker.frame(&DisplayPreference::default(), None);
        assert_eq!(frame.points.len(), 2);
        assert_eq!(frame.latest.unwrap().sent_label.as_deref(), Some("1.00 KB/s"));
    }

    #[test]
    fn view_survives_transient_errors_and_stops_on_401() {
        let mut source = ScriptedSource::default();
        source.current.push_back(Ok(snapshot("2024-03-01T12:00:00", 0)));
        source.current.push_back(Ok(snapshot("2024-03-01T12:00:02", 2048)));
        source.current.push_back(Err(Error::Status(503)));
        source.current.push_back(Err(Error::Unauthorized));

        let mut view = LiveView::start(
            source,
            DisplayPreference::default(),
            Duration::from_millis(1),
            LIVE_MAX_GAP_SECS,
        )
        .unwrap();
        let events: Vec<LiveEvent> = view.events().iter().collect();
        view.stop();

        assert_eq!(events.len(), 4);
        let LiveEvent::Frame(failed) = &events[2] else {
            panic!("expected a frame, got {:?}", events[2]);
        };
        assert!(failed.error.is_some());
        assert_eq!(failed.points.len(), 2);
        assert_eq!(failed.latest.as_ref().unwrap().sent_label.as_deref(), Some("1.00 KB/s"));
        assert!(matches!(events[3], LiveEvent::SessionExpired));
        assert!(!view.is_running());
    }
}
