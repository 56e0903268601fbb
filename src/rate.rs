use crate::sample::{CounterSample, RateSample};

/// Gap tolerated between two live polls before the derivative is dropped.
/// A missed poll on the live loop is an anomaly, so this stays short.
pub const LIVE_MAX_GAP_SECS: f64 = 30.0;

/// Gap tolerated between two points of a history batch. The stored series
/// itself may be coarse, hence an order of magnitude above the live value.
pub const HISTORY_MAX_GAP_SECS: f64 = 300.0;

/// Derive one `RateSample` per input sample, index-aligned.
///
/// `samples` must already be in ascending timestamp order. The first entry
/// has no predecessor and always comes out empty, as does any entry whose
/// interval to its predecessor is non-positive or longer than
/// `max_gap_secs`. A counter that went backwards (reset, wrap) produces a
/// null for that field only.
pub fn compute_rates(samples: &[CounterSample], max_gap_secs: f64) -> Vec<RateSample> {
    let mut out = Vec::with_capacity(samples.len());
    let mut prev: Option<&CounterSample> = None;
    for sample in samples {
        out.push(rate_between(prev, sample, max_gap_secs));
        prev = Some(sample);
    }
    out
}

/// Rate of `cur` relative to `prev`.
pub fn rate_between(
    prev: Option<&CounterSample>,
    cur: &CounterSample,
    max_gap_secs: f64,
) -> RateSample {
    let mut rate = RateSample::empty(cur.timestamp);

    let Some(prev) = prev else {
        return rate;
    };
    let (Some(a), Some(b)) = (prev.counters, cur.counters) else {
        return rate;
    };
    let Some(dt) = interval_secs(prev, cur) else {
        return rate;
    };
    if dt <= 0.0 || dt > max_gap_secs {
        return rate;
    }

    rate.sent_rate = per_second(a.bytes_sent, b.bytes_sent, dt);
    rate.recv_rate = per_second(a.bytes_recv, b.bytes_recv, dt);
    rate.packets_sent_rate = per_second(a.packets_sent, b.packets_sent, dt);
    rate.packets_recv_rate = per_second(a.packets_recv, b.packets_recv, dt);
    rate
}

fn interval_secs(prev: &CounterSample, cur: &CounterSample) -> Option<f64> {
    let micros = (cur.timestamp - prev.timestamp).num_microseconds()?;
    Some(micros as f64 / 1_000_000.0)
}

fn per_second(prev: u64, cur: u64, dt_secs: f64) -> Option<f64> {
    let delta = cur.checked_sub(prev)?;
    Some((delta as f64 / dt_secs).max(0.0))
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::*;
    use crate::sample::Counters;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn at(millis: i64, sent: u64) -> CounterSample {
        CounterSample::new(
            t0() + Duration::milliseconds(millis),
            Counters { bytes_sent: sent, bytes_recv: sent * 2, packets_sent: sent / 10, packets_recv: sent / 5 },
        )
    }

    #[test]
    fn first_rate_is_always_empty() {
        let rates = compute_rates(&[at(0, 1000)], LIVE_MAX_GAP_SECS);
        assert_eq!(rates.len(), 1);
        assert!(rates[0].is_empty());
        assert!(compute_rates(&[], LIVE_MAX_GAP_SECS).is_empty());
    }

    #[test]
    fn steady_counter_gives_delta_over_interval() {
        let rates = compute_rates(&[at(0, 1000), at(2000, 3000)], 10.0);
        assert_eq!(rates[1].sent_rate, Some(1000.0));
        assert_eq!(rates[1].recv_rate, Some(2000.0));
        assert_eq!(rates[1].packets_sent_rate, Some(100.0));
        assert_eq!(rates[1].packets_recv_rate, Some(200.0));
        assert_eq!(rates[1].timestamp, t0() + Duration::seconds(2));
    }

    #[test]
    fn output_is_index_aligned() {
        let input: Vec<_> = (0..10).map(|i| at(i * 2000, 1000 * i as u64)).collect();
        let rates = compute_rates(&input, LIVE_MAX_GAP_SECS);
        assert_eq!(rates.len(), input.len());
        for (r, s) in rates.iter().zip(&input) {
            assert_eq!(r.timestamp, s.timestamp);
        }
        for r in &rates[1..] {
            assert_eq!(r.sent_rate, Some(500.0));
        }
    }

    #[test]
    fn counter_reset_is_null_not_negative() {
        let mut b = at(2000, 500);
        if let Some(c) = b.counters.as_mut() {
            // only bytes_sent resets, the rest keep climbing
            c.bytes_recv = 100_000;
            c.packets_sent = 1_000;
            c.packets_recv = 1_000;
        }
        let rates = compute_rates(&[at(0, 5000), b], 10.0);
        assert_eq!(rates[1].sent_rate, None);
        assert!(rates[1].recv_rate.unwrap() >= 0.0);
        assert!(rates[1].packets_sent_rate.is_some());
    }

    #[test]
    fn gap_above_threshold_is_null_regardless_of_counters() {
        let rates = compute_rates(&[at(0, 5000), at(400_000, 300)], HISTORY_MAX_GAP_SECS);
        assert!(rates[1].is_empty());

        let rates = compute_rates(&[at(0, 1000), at(400_000, 9000)], HISTORY_MAX_GAP_SECS);
        assert!(rates[1].is_empty());
    }

    #[test]
    fn gap_equal_to_threshold_is_kept() {
        let rates = compute_rates(&[at(0, 0), at(10_000, 1000)], 10.0);
        assert_eq!(rates[1].sent_rate, Some(100.0));
    }

    #[test]
    fn duplicate_and_backwards_timestamps_are_null() {
        let rates = compute_rates(&[at(1000, 0), at(1000, 1000), at(500, 2000)], 10.0);
        assert!(rates[1].is_empty());
        assert!(rates[2].is_empty());
    }

    #[test]
    fn sample_without_counters_nulls_itself_and_its_successor() {
        let broken = CounterSample { timestamp: t0() + Duration::seconds(2), counters: None };
        let rates = compute_rates(&[at(0, 0), broken, at(4000, 4000), at(6000, 6000)], 10.0);
        assert!(rates[1].is_empty());
        assert!(rates[2].is_empty());
        assert_eq!(rates[3].sent_rate, Some(1000.0));
    }

    #[test]
    fn thresholds_are_per_caller() {
        let input = [at(0, 0), at(60_000, 60_000)];
        assert!(compute_rates(&input, LIVE_MAX_GAP_SECS)[1].is_empty());
        assert_eq!(compute_rates(&input, HISTORY_MAX_GAP_SECS)[1].sent_rate, Some(1000.0));
    }

    #[test]
    fn recomputation_is_identical() {
        let input: Vec<_> = [0, 1500, 3000, 3000, 700_000, 702_000]
            .iter()
            .zip([10u64, 400, 9000, 9100, 20, 4000])
            .map(|(&t, s)| at(t, s))
            .collect();
        let first = compute_rates(&input, LIVE_MAX_GAP_SECS);
        let second = compute_rates(&input, LIVE_MAX_GAP_SECS);
        assert_eq!(first, second);
    }
}
