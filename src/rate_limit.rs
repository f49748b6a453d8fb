//! Sliding-window limit on outbound sends.
//!
//! Policy: at most [`MAX_SENDS_PER_WINDOW`] sends inside any trailing
//! [`WINDOW_SECS`] interval, judged over a log of the most recent
//! [`HISTORY_CAP`] send timestamps (seconds since the Unix epoch).
//!
//! All functions are pure over caller-supplied state; the clock is an
//! explicit `now` argument so tests control time.

use std::time::{SystemTime, UNIX_EPOCH};

pub const WINDOW_SECS: f64 = 60.0;
pub const MAX_SENDS_PER_WINDOW: usize = 18;
pub const HISTORY_CAP: usize = 20;

/// Seconds since the Unix epoch, fractional.
pub fn epoch_secs(at: SystemTime) -> f64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// True iff a send may proceed: fewer than [`MAX_SENDS_PER_WINDOW`] entries
/// of `log` fall inside the trailing window. Stale entries are filtered here
/// even if the stored log has not been cleaned yet.
pub fn allow(log: &[f64], now: f64) -> bool {
    let fresh = log.iter().filter(|&&t| now - t < WINDOW_SECS).count();
    fresh < MAX_SENDS_PER_WINDOW
}

/// Earliest time a blocked sender may retry, as an epoch timestamp.
///
/// Gating reference is the 18th-from-the-end entry, not the oldest one; the
/// backend's observed behavior keys off that rank and we reproduce it.
/// Returns 0 when the log holds fewer than [`MAX_SENDS_PER_WINDOW`] entries.
pub fn retry_after(log: &[f64]) -> f64 {
    if log.len() < MAX_SENDS_PER_WINDOW {
        return 0.0;
    }
    log[log.len() - MAX_SENDS_PER_WINDOW] + WINDOW_SECS
}

/// Appends `now` and trims the log to the most recent [`HISTORY_CAP`] entries.
pub fn record(log: &mut Vec<f64>, now: f64) {
    log.push(now);
    if log.len() > HISTORY_CAP {
        let excess = log.len() - HISTORY_CAP;
        log.drain(..excess);
    }
}

/// Drops entries outside the window, then trims to [`HISTORY_CAP`].
pub fn clean(log: &mut Vec<f64>, now: f64) {
    log.retain(|&t| now - t < WINDOW_SECS);
    if log.len() > HISTORY_CAP {
        let excess = log.len() - HISTORY_CAP;
        log.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn log_of(count: usize, start: f64, step: f64) -> Vec<f64> {
        (0..count).map(|i| start + i as f64 * step).collect()
    }

    #[test]
    fn allows_up_to_seventeen_sends_in_window() {
        let now = 1_000.0;
        for count in 0..MAX_SENDS_PER_WINDOW {
            let log = log_of(count, now - 59.0, 1.0);
            assert!(allow(&log, now), "count {count} should pass");
        }
    }

    #[test]
    fn blocks_at_eighteenth_send() {
        let now = 1_000.0;
        let log = log_of(18, now - 50.0, 1.0);
        assert!(!allow(&log, now));
        let log = log_of(20, now - 50.0, 1.0);
        assert!(!allow(&log, now));
    }

    #[test]
    fn stale_entries_do_not_count_against_the_cap() {
        let now = 1_000.0;
        // 18 entries, but 5 of them older than the window.
        let mut log = log_of(5, now - 200.0, 1.0);
        log.extend(log_of(13, now - 30.0, 1.0));
        assert!(allow(&log, now));
    }

    #[test]
    fn retry_after_is_zero_below_the_cap() {
        assert_eq!(retry_after(&[]), 0.0);
        assert_eq!(retry_after(&log_of(17, 100.0, 1.0)), 0.0);
    }

    #[test]
    fn retry_after_uses_eighteenth_from_the_end() {
        // 20 entries at 100, 101, ..., 119. The 18th-from-the-end is 102.
        let log = log_of(20, 100.0, 1.0);
        assert_eq!(retry_after(&log), 102.0 + WINDOW_SECS);

        // Exactly 18 entries: the gating entry is the first one.
        let log = log_of(18, 500.0, 2.0);
        assert_eq!(retry_after(&log), 500.0 + WINDOW_SECS);
    }

    #[test]
    fn record_caps_history_at_twenty_most_recent() {
        let mut log = Vec::new();
        for i in 0..30 {
            record(&mut log, i as f64);
        }
        assert_eq!(log.len(), HISTORY_CAP);
        assert_eq!(log[0], 10.0);
        assert_eq!(*log.last().unwrap(), 29.0);
    }

    #[test]
    fn clean_filters_by_window_then_caps() {
        let now = 1_000.0;
        let mut log = log_of(10, now - 300.0, 1.0);
        log.extend(log_of(3, now - 10.0, 1.0));
        clean(&mut log, now);
        assert_eq!(log, log_of(3, now - 10.0, 1.0));
    }
}
