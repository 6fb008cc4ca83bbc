/**
 * WINDOW AGGREGATOR - Uptime, downtime and percentage of a node over a time window
 *
 * ROLE:
 * Pure computation over a node's session history. No store access, no clock:
 * callers hand in the sessions and the window.
 *
 * OPERATION:
 * - Sessions are scanned from the latest start to the earliest
 * - Sessions starting at or after the window end are ignored
 * - Sessions last updated after the window end are clipped to it
 * - Sessions starting inside the window count in full
 * - The first session starting before the window (the straddler) counts only
 *   for its overlap, then the scan stops: anything older either ended
 *   before the straddler started or is overlapped by it
 * - The total is clamped to the window length
 *
 * Two boundary rules exist for the straddler, one per query flavour:
 * - Export: the part of the straddler's run after the window start
 * - MonthToDate: the time between window start and the next session's start,
 *   minus the gap the straddler did not cover
 */

use crate::models::{secs_i64, UptimeSession};
use serde::Serialize;
use time::{Date, Month, OffsetDateTime};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("window end {end} precedes window start {start}")]
    Inverted { start: i64, end: i64 },
    #[error("calendar month out of range: {0}")]
    Calendar(String),
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    start: OffsetDateTime,
    end: OffsetDateTime,
}

impl Window {
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> Result<Self, WindowError> {
        if end < start {
            return Err(WindowError::Inverted {
                start: start.unix_timestamp(),
                end: end.unix_timestamp(),
            });
        }
        Ok(Self { start, end })
    }

    /// Window from unix seconds, as the HTTP query parameters carry them.
    pub fn from_unix(start: i64, end: i64) -> Result<Self, WindowError> {
        let start = OffsetDateTime::from_unix_timestamp(start)
            .map_err(|e| WindowError::Calendar(e.to_string()))?;
        let end = OffsetDateTime::from_unix_timestamp(end)
            .map_err(|e| WindowError::Calendar(e.to_string()))?;
        Self::new(start, end)
    }

    /// `[first instant of month, first instant of next month)` in UTC.
    pub fn calendar_month(year: i32, month: Month) -> Result<Self, WindowError> {
        let start = first_of_month(year, month)?;
        let (next_year, next_month) = match month {
            Month::December => (year + 1, Month::January),
            other => (year, other.next()),
        };
        Self::new(start, first_of_month(next_year, next_month)?)
    }

    /// The whole calendar month before the one containing `now`.
    pub fn previous_month(now: OffsetDateTime) -> Result<Self, WindowError> {
        let now = now.to_offset(time::UtcOffset::UTC);
        let (year, month) = match now.month() {
            Month::January => (now.year() - 1, Month::December),
            other => (now.year(), other.previous()),
        };
        Self::calendar_month(year, month)
    }

    /// From the first instant of the current month up to `now`.
    pub fn month_to_date(now: OffsetDateTime) -> Result<Self, WindowError> {
        let now = now.to_offset(time::UtcOffset::UTC);
        Self::new(first_of_month(now.year(), now.month())?, now)
    }

    pub fn start(&self) -> OffsetDateTime {
        self.start
    }

    pub fn end(&self) -> OffsetDateTime {
        self.end
    }

    pub fn len_secs(&self) -> i64 {
        self.end.unix_timestamp() - self.start.unix_timestamp()
    }
}

fn first_of_month(year: i32, month: Month) -> Result<OffsetDateTime, WindowError> {
    Date::from_calendar_date(year, month, 1)
        .map(|date| date.midnight().assume_utc())
        .map_err(|e| WindowError::Calendar(e.to_string()))
}

/// How the session straddling the window start is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryRule {
    Export,
    MonthToDate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UptimeFigures {
    pub uptime_seconds: u64,
    pub downtime_seconds: u64,
    pub percentage: f64,
}

pub fn aggregate(sessions: &[UptimeSession], window: &Window, rule: BoundaryRule) -> UptimeFigures {
    let window_len = window.len_secs();
    if window_len <= 0 {
        return UptimeFigures::default();
    }
    let window_start = window.start.unix_timestamp();
    let window_end = window.end.unix_timestamp();

    let mut latest_first: Vec<&UptimeSession> = sessions.iter().collect();
    latest_first.sort_by(|a, b| b.start.cmp(&a.start));

    let mut total: i64 = 0;
    // earliest session counted in full so far
    let mut counted: Option<&UptimeSession> = None;

    for session in latest_first {
        let start = session.start.unix_timestamp();
        if start >= window_end {
            continue;
        }

        let mut duration = secs_i64(session.duration_secs);
        if session.updated_at > window.end {
            duration = duration.min(window_end - start);
        }

        if start >= window_start {
            total = total.saturating_add(duration);
            counted = Some(session);
            continue;
        }

        let active_end = start.saturating_add(duration);
        let partial = match (rule, counted) {
            (BoundaryRule::MonthToDate, Some(next)) => {
                let next_start = next.start.unix_timestamp();
                let uncovered = (next_start - active_end).max(0);
                next_start - window_start - uncovered
            }
            // remaining run after the window start; for a live straddler this
            // is its inferred active end minus the window start
            _ => active_end - window_start,
        };
        total = total.saturating_add(partial.max(0));
        break;
    }

    let uptime = total.clamp(0, window_len);
    UptimeFigures {
        uptime_seconds: uptime as u64,
        downtime_seconds: (window_len - uptime) as u64,
        percentage: uptime as f64 / window_len as f64 * 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn at(secs: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(secs).unwrap()
    }

    fn session(id: u64, start: i64, duration_secs: u64) -> UptimeSession {
        UptimeSession { id, start: at(start), duration_secs, updated_at: at(start + duration_secs as i64) }
    }

    fn window(start: i64, end: i64) -> Window {
        Window::from_unix(start, end).unwrap()
    }

    #[test]
    fn test_restart_scenario() {
        let sessions = vec![session(1, 900, 100), session(2, 1250, 50)];
        let figures = aggregate(&sessions, &window(900, 1300), BoundaryRule::Export);
        assert_eq!(figures.uptime_seconds, 150);
        assert_eq!(figures.downtime_seconds, 250);
        assert!((figures.percentage - 37.5).abs() < 1e-9);
    }

    #[test]
    fn test_order_of_input_does_not_matter() {
        let sessions = vec![session(2, 1250, 50), session(1, 900, 100)];
        let figures = aggregate(&sessions, &window(900, 1300), BoundaryRule::Export);
        assert_eq!(figures.uptime_seconds, 150);
    }

    #[test]
    fn test_live_straddler_counts_overlap() {
        let sessions = vec![session(1, 500, 1000)];
        let figures = aggregate(&sessions, &window(800, 1800), BoundaryRule::Export);
        assert_eq!(figures.uptime_seconds, 700);
        assert_eq!(figures.downtime_seconds, 300);
    }

    #[test]
    fn test_straddler_clamped_to_window_length() {
        let sessions = vec![session(1, 500, 5000)];
        let figures = aggregate(&sessions, &window(800, 1800), BoundaryRule::Export);
        assert_eq!(figures.uptime_seconds, 1000);
        assert_eq!(figures.downtime_seconds, 0);
        assert!((figures.percentage - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_session_updated_after_window_is_clipped() {
        // counted in full would be 1000s inside a 500s tail
        let sessions = vec![session(1, 1000, 1000)];
        let figures = aggregate(&sessions, &window(0, 1500), BoundaryRule::Export);
        assert_eq!(figures.uptime_seconds, 500);
    }

    #[test]
    fn test_only_one_straddler_counts() {
        let sessions = vec![session(1, 100, 300), session(2, 500, 400), session(3, 1000, 100)];
        // session 2 straddles 800; session 1 must be ignored
        let figures = aggregate(&sessions, &window(800, 1200), BoundaryRule::Export);
        assert_eq!(figures.uptime_seconds, 100 + 100);
    }

    #[test]
    fn test_straddler_ending_before_window_counts_nothing() {
        let sessions = vec![session(1, 100, 200), session(2, 1000, 100)];
        let figures = aggregate(&sessions, &window(800, 1200), BoundaryRule::Export);
        assert_eq!(figures.uptime_seconds, 100);
    }

    #[test]
    fn test_sessions_after_window_are_skipped() {
        let sessions = vec![session(1, 2000, 100)];
        let figures = aggregate(&sessions, &window(800, 1200), BoundaryRule::Export);
        assert_eq!(figures.uptime_seconds, 0);
        assert_eq!(figures.downtime_seconds, 400);
    }

    #[test]
    fn test_window_before_history_is_zero() {
        let sessions = vec![session(1, 5000, 100)];
        let figures = aggregate(&sessions, &window(0, 1000), BoundaryRule::Export);
        assert_eq!(figures.uptime_seconds, 0);
    }

    #[test]
    fn test_no_sessions() {
        let figures = aggregate(&[], &window(0, 1000), BoundaryRule::MonthToDate);
        assert_eq!(figures, UptimeFigures { uptime_seconds: 0, downtime_seconds: 1000, percentage: 0.0 });
    }

    #[test]
    fn test_empty_window_is_all_zero() {
        let sessions = vec![session(1, 0, 5000)];
        let figures = aggregate(&sessions, &window(1000, 1000), BoundaryRule::Export);
        assert_eq!(figures, UptimeFigures::default());
    }

    #[test]
    fn test_month_to_date_straddler_before_counted_session() {
        // straddler runs 700..850, next session starts at 900
        let sessions = vec![session(1, 700, 150), session(2, 900, 100)];
        let figures = aggregate(&sessions, &window(800, 1000), BoundaryRule::MonthToDate);
        // 100 (inside) + (900 - 800) - (900 - 850)
        assert_eq!(figures.uptime_seconds, 150);
    }

    #[test]
    fn test_month_to_date_straddler_that_ended_early() {
        let sessions = vec![session(1, 100, 200), session(2, 900, 100)];
        let figures = aggregate(&sessions, &window(800, 1000), BoundaryRule::MonthToDate);
        assert_eq!(figures.uptime_seconds, 100);
    }

    #[test]
    fn test_uptime_plus_downtime_is_window_length() {
        let sessions = vec![session(1, 100, 250), session(2, 400, 90), session(3, 600, 1000)];
        for (start, end) in [(0, 2000), (150, 450), (420, 700), (650, 651), (5000, 6000)] {
            for rule in [BoundaryRule::Export, BoundaryRule::MonthToDate] {
                let w = window(start, end);
                let figures = aggregate(&sessions, &w, rule);
                assert_eq!(figures.uptime_seconds + figures.downtime_seconds, w.len_secs() as u64);
                assert!(figures.uptime_seconds <= w.len_secs() as u64);
            }
        }
    }

    #[test]
    fn test_inverted_window_rejected() {
        assert!(matches!(Window::from_unix(10, 5), Err(WindowError::Inverted { .. })));
    }

    #[test]
    fn test_calendar_month_bounds() {
        let feb = Window::calendar_month(2024, Month::February).unwrap();
        assert_eq!(feb.start(), datetime!(2024-02-01 0:00 UTC));
        assert_eq!(feb.end(), datetime!(2024-03-01 0:00 UTC));
        assert_eq!(feb.len_secs(), 29 * 86_400);

        let dec = Window::calendar_month(2023, Month::December).unwrap();
        assert_eq!(dec.end(), datetime!(2024-01-01 0:00 UTC));
    }

    #[test]
    fn test_previous_month_rolls_back_year() {
        let w = Window::previous_month(datetime!(2025-01-15 10:00 UTC)).unwrap();
        assert_eq!(w.start(), datetime!(2024-12-01 0:00 UTC));
        assert_eq!(w.end(), datetime!(2025-01-01 0:00 UTC));
    }

    #[test]
    fn test_month_to_date() {
        let now = datetime!(2025-06-03 12:00 UTC);
        let w = Window::month_to_date(now).unwrap();
        assert_eq!(w.start(), datetime!(2025-06-01 0:00 UTC));
        assert_eq!(w.end(), now);
    }
}
