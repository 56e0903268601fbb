use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const KIBI: f64 = 1024.0;
const MEBI: f64 = 1024.0 * 1024.0;

/// How network throughput is displayed. Only affects rendering, the
/// underlying rates are always bytes per second.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkUnit {
    #[default]
    ByteRate,
    BitRate,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown network unit `{0}` (expected byte-rate or bit-rate)")]
pub struct UnknownUnit(pub String);

impl NetworkUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkUnit::ByteRate => "byte-rate",
            NetworkUnit::BitRate => "bit-rate",
        }
    }

    pub fn major_label(&self) -> &'static str {
        match self {
            NetworkUnit::ByteRate => "MB/s",
            NetworkUnit::BitRate => "Mbps",
        }
    }

    pub fn minor_label(&self) -> &'static str {
        match self {
            NetworkUnit::ByteRate => "KB/s",
            NetworkUnit::BitRate => "Kbps",
        }
    }

    fn scale(&self) -> f64 {
        match self {
            NetworkUnit::ByteRate => 1.0,
            NetworkUnit::BitRate => 8.0,
        }
    }
}

impl fmt::Display for NetworkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkUnit {
    type Err = UnknownUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // the dashboard used to persist the major label itself
        match s.trim() {
            "byte-rate" | "MB/s" => Ok(NetworkUnit::ByteRate),
            "bit-rate" | "Mbps" => Ok(NetworkUnit::BitRate),
            other => Err(UnknownUnit(other.to_string())),
        }
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Bytes per second expressed in the major unit of `unit` (MB/s or Mbps).
/// This is the value plotted on chart axes.
pub fn to_major(bytes_per_sec: f64, unit: NetworkUnit) -> f64 {
    sanitize(bytes_per_sec) * unit.scale() / MEBI
}

/// Human readable rate, e.g. `"1.00 MB/s"` or `"512.00 Kbps"`.
///
/// Anything below one major unit is shown in the minor unit. Negative and
/// non-finite input renders as zero.
pub fn format_rate(bytes_per_sec: f64, unit: NetworkUnit) -> String {
    let scaled = sanitize(bytes_per_sec) * unit.scale();
    let major = scaled / MEBI;
    if major >= 1.0 {
        format!("{major:.2} {}", unit.major_label())
    } else {
        format!("{:.2} {}", scaled / KIBI, unit.minor_label())
    }
}

/// Axis tick label for a value already in the major unit (see [`to_major`]).
///
/// Uses the same threshold and the same 1024 step as [`format_rate`] so a
/// tick and a tooltip for the same point never switch units at different
/// values.
pub fn format_axis(major: f64, unit: NetworkUnit) -> String {
    let major = sanitize(major);
    if major >= 1.0 {
        return format!("{major:.2} {}", unit.major_label());
    }
    let minor = major * KIBI;
    match unit {
        NetworkUnit::ByteRate => format!("{minor:.1} {}", unit.minor_label()),
        NetworkUnit::BitRate => format!("{minor:.0} {}", unit.minor_label()),
    }
}
