//! Rate and history aggregation for a metrics dashboard.
//!
//! Cumulative network counters polled from a metrics API are turned into
//! per-second rates ([`rate`]), kept in a rolling live window ([`live`]) or
//! fetched for arbitrary ranges ([`history`]), and rendered for display in
//! the user's unit ([`units`]) and timezone ([`timezone`]).

pub mod chart;
pub mod error;
pub mod history;
pub mod live;
pub mod poll;
pub mod prefs;
pub mod rate;
pub mod sample;
pub mod source;
pub mod timezone;
pub mod units;
