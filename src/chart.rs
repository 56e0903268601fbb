use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::prefs::DisplayPreference;
use crate::sample::RateSample;
use crate::timezone::Projector;
use crate::units::{format_axis, format_rate, to_major, NetworkUnit};

/// One chart row: the rates of a sample in the display unit, plus the
/// localized axis and tooltip labels. Null rates stay null so the chart
/// shows a gap instead of bridging it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChartPoint {
    pub timestamp: DateTime<Utc>,
    pub short_time: String,
    pub full_date_time: String,
    pub unit: NetworkUnit,
    pub sent: Option<f64>,
    pub recv: Option<f64>,
    pub sent_label: Option<String>,
    pub recv_label: Option<String>,
    /// Axis tick text for `sent`/`recv`; switches units at the same value
    /// as the tooltip labels.
    pub sent_axis: Option<String>,
    pub recv_axis: Option<String>,
    pub packets_sent_rate: Option<f64>,
    pub packets_recv_rate: Option<f64>,
}

pub fn records(rates: &[RateSample], prefs: &DisplayPreference) -> Vec<ChartPoint> {
    let projector = Projector::new(&prefs.timezone);
    rates.iter().map(|r| point(r, &projector, prefs.network_unit)).collect()
}

pub fn point(rate: &RateSample, projector: &Projector, unit: NetworkUnit) -> ChartPoint {
    let projection = projector.project(rate.timestamp);
    let sent = rate.sent_rate.map(|v| to_major(v, unit));
    let recv = rate.recv_rate.map(|v| to_major(v, unit));
    ChartPoint {
        timestamp: rate.timestamp,
        short_time: projection.short_time,
        full_date_time: projection.full_date_time,
        unit,
        sent,
        recv,
        sent_axis: sent.map(|v| format_axis(v, unit)),
        recv_axis: recv.map(|v| format_axis(v, unit)),
        sent_label: rate.sent_rate.map(|v| format_rate(v, unit)),
        recv_label: rate.recv_rate.map(|v| format_rate(v, unit)),
        packets_sent_rate: rate.packets_sent_rate,
        packets_recv_rate: rate.packets_recv_rate,
    }
}
