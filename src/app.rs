use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use crossbeam_channel::RecvTimeoutError;
use tracing::{info, warn};

use ratewatch::chart::ChartPoint;
use ratewatch::error::Error;
use ratewatch::history::HistoryWindowManager;
use ratewatch::live::{LiveEvent, LiveFrame, LiveView};
use ratewatch::prefs::{DisplayPreference, PreferenceStore};
use ratewatch::source::{FileSource, HttpSource, SampleSource};

use crate::cli::{History, Live, OutputFormat, PrefsAction, SourceArgs};

fn open_source(args: &SourceArgs) -> Result<Box<dyn SampleSource + Send>> {
    match &args.file {
        Some(path) => {
            let source = FileSource::open(path)
                .with_context(|| format!("Reading snapshots from {}", path.display()))?;
            Ok(Box::new(source))
        }
        None => {
            let source = HttpSource::new(args.url.clone(), args.token.clone())
                .context("Building HTTP client")?;
            Ok(Box::new(source))
        }
    }
}

fn dash(v: Option<&str>) -> &str {
    v.unwrap_or("-")
}

fn frame_line(frame: &LiveFrame) -> String {
    let mut line = match &frame.latest {
        Some(p) => format!(
            "{}  sent {:>12}  recv {:>12}",
            p.short_time,
            dash(p.sent_label.as_deref()),
            dash(p.recv_label.as_deref())
        ),
        None => "waiting for data".to_string(),
    };
    if let Some(snap) = &frame.snapshot {
        if let Some(percent) = snap.cpu.as_ref().and_then(|c| c.percent) {
            line.push_str(&format!("  cpu {percent:5.1}%"));
        }
        if let Some(percent) = snap.memory.as_ref().and_then(|m| m.percent) {
            line.push_str(&format!("  mem {percent:5.1}%"));
        }
    }
    if let Some(err) = &frame.error {
        line.push_str(&format!("  (stale: {err})"));
    }
    line
}

fn point_line(p: &ChartPoint) -> String {
    let packets = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"));
    format!(
        "{}\t{}\t{}\t{} pkt/s\t{} pkt/s",
        p.full_date_time,
        dash(p.sent_label.as_deref()),
        dash(p.recv_label.as_deref()),
        packets(p.packets_sent_rate),
        packets(p.packets_recv_rate),
    )
}

pub fn run_live(live: Live, mut prefs: DisplayPreference) -> Result<()> {
    let stop_flag = Arc::new(AtomicBool::new(false));
    {
        let stop = stop_flag.clone();
        let _ = ctrlc::set_handler(move || {
            stop.store(true, Ordering::Relaxed);
        });
    }

    if let Some(unit) = live.unit {
        prefs.network_unit = unit.into();
    }
    let source = open_source(&live.source)?;
    let interval = Duration::from_millis(live.interval_ms);
    let mut view = LiveView::start(source, prefs, interval, live.max_gap_secs)
        .context("Starting live poll task")?;

    let mut frames = 0usize;
    let result = loop {
        if stop_flag.load(Ordering::Relaxed) {
            break Ok(());
        }
        match view.events().recv_timeout(Duration::from_millis(200)) {
            Ok(LiveEvent::Frame(frame)) => {
                match live.format {
                    OutputFormat::Text => println!("{}", frame_line(&frame)),
                    OutputFormat::Json => println!("{}", serde_json::to_string(&frame)?),
                }
                frames += 1;
                if live.ticks.is_some_and(|n| frames >= n) {
                    break Ok(());
                }
            }
            Ok(LiveEvent::SessionExpired) => break Err(Error::Unauthorized),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break Ok(()),
        }
    };

    view.stop();
    info!(frames, "live view closed");
    result.context("Live polling")
}

/// Resolve the queried range: `end` defaults to now, `start` to `hours`
/// before `end`.
fn history_range(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    hours: i64,
) -> ratewatch::error::Result<(DateTime<Utc>, DateTime<Utc>)> {
    let end = end.unwrap_or_else(Utc::now);
    if let Some(start) = start {
        return Ok((start, end));
    }
    let start = TimeDelta::try_hours(hours)
        .and_then(|span| end.checked_sub_signed(span))
        .ok_or_else(|| Error::InvalidRange {
            start: format!("{hours} hours before end"),
            end: end.to_rfc3339(),
        })?;
    Ok((start, end))
}

pub fn run_history(history: History, prefs: DisplayPreference) -> Result<()> {
    let (start, end) = history_range(history.start, history.end, history.hours)
        .context("Resolving history range")?;
    let zone = history.zone.unwrap_or(prefs.timezone);
    let unit = history.unit.map_or(prefs.network_unit, Into::into);

    let mut source = open_source(&history.source)?;
    let mut manager = HistoryWindowManager::new(history.max_gap_secs, Some(history.limit));
    let window = manager
        .query(&mut source, start, end, &zone)
        .with_context(|| format!("Querying history from {start} to {end}"))?;

    let points = window.points(unit);
    match history.format {
        OutputFormat::Text => {
            if points.is_empty() {
                eprintln!("<no samples in range>");
            }
            for p in &points {
                println!("{}", point_line(p));
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&points)?),
    }
    Ok(())
}

pub fn run_prefs<S: PreferenceStore>(
    store: &mut S,
    action: Option<PrefsAction>,
    format: OutputFormat,
) -> Result<()> {
    let mut prefs = DisplayPreference::load(store);
    match action {
        None | Some(PrefsAction::Show) => {}
        Some(PrefsAction::Unit { unit }) => prefs.set_unit(store, unit.into())?,
        Some(PrefsAction::Zone { zone }) => {
            if let Err(err) = prefs.set_timezone(store, &zone) {
                warn!(%err, "timezone not changed");
                return Err(err.into());
            }
        }
    }
    match format {
        OutputFormat::Text => {
            println!("network_unit\t{}", prefs.network_unit);
            println!("timezone\t{}", prefs.timezone);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&prefs)?),
    }
    Ok(())
}
