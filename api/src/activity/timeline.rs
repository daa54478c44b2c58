//! Hourly usage timeline and top-process ranking.
//!
//! Sessions may overlap (agent retries, duplicated beats), so per-hour
//! coverage is computed with a sweep merge over hour-sliced sub-intervals.
//! The top-apps ranking is intentionally additive per process: focus time
//! sums even when windows overlapped on the clock.

use db::models::activity_session;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

const HOUR: i64 = 3600;
const TOP_APPS: usize = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppUsage {
    pub name: String,
    pub total_seconds: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageTimeline {
    /// Local hour of day (0-23) -> merged active minutes in that hour.
    pub hours: BTreeMap<u32, f64>,
    pub top_apps: Vec<AppUsage>,
    pub total_active_hours: f64,
}

/// Builds the dashboard timeline for the window `[now_ts - window_hours, now_ts]`.
///
/// `tz_offset_seconds` shifts hour boundaries and bucket labels into the
/// viewer's local time. Order-invariant over the input session list.
pub fn build_timeline(
    sessions: &[activity_session::Model],
    window_hours: u32,
    tz_offset_seconds: i32,
    now_ts: i64,
) -> UsageTimeline {
    let window_start = now_ts - i64::from(window_hours) * HOUR;

    // hour-start (local epoch seconds) -> sub-intervals in local time
    let mut buckets: HashMap<i64, Vec<(i64, i64)>> = HashMap::new();
    for s in sessions {
        let start = s.start_time.max(window_start);
        let end = s.end_time.min(now_ts);
        if end <= start {
            continue;
        }
        let mut cursor = start + i64::from(tz_offset_seconds);
        let local_end = end + i64::from(tz_offset_seconds);
        while cursor < local_end {
            let hour_start = cursor.div_euclid(HOUR) * HOUR;
            let slice_end = local_end.min(hour_start + HOUR);
            buckets.entry(hour_start).or_default().push((cursor, slice_end));
            cursor = slice_end;
        }
    }

    let mut hours = BTreeMap::new();
    let mut covered_seconds = 0i64;
    for (hour_start, mut intervals) in buckets {
        let merged = merge_coverage(&mut intervals);
        covered_seconds += merged;
        let hour_of_day = (hour_start.div_euclid(HOUR)).rem_euclid(24) as u32;
        *hours.entry(hour_of_day).or_insert(0.0) += merged as f64 / 60.0;
    }

    UsageTimeline {
        hours,
        top_apps: rank_top_apps(sessions),
        total_active_hours: covered_seconds as f64 / 3600.0,
    }
}

/// Sweep merge: total covered seconds of a set of possibly-overlapping
/// intervals.
fn merge_coverage(intervals: &mut [(i64, i64)]) -> i64 {
    if intervals.is_empty() {
        return 0;
    }
    intervals.sort_by_key(|iv| iv.0);

    let mut total = 0;
    let (mut current_start, mut current_end) = intervals[0];
    for &(start, end) in &intervals[1..] {
        if start < current_end {
            current_end = current_end.max(end);
        } else {
            total += current_end - current_start;
            current_start = start;
            current_end = end;
        }
    }
    total + (current_end - current_start)
}

fn rank_top_apps(sessions: &[activity_session::Model]) -> Vec<AppUsage> {
    let mut by_process: HashMap<&str, i64> = HashMap::new();
    for s in sessions {
        *by_process.entry(s.process_name.as_str()).or_insert(0) += s.duration_seconds;
    }
    let total: i64 = by_process.values().sum();

    let mut ranked: Vec<(&str, i64)> = by_process.into_iter().collect();
    // secondary key keeps the ranking deterministic under input permutation
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(TOP_APPS)
        .map(|(name, seconds)| AppUsage {
            name: name.to_string(),
            total_seconds: seconds,
            percentage: if total > 0 {
                seconds as f64 * 100.0 / total as f64
            } else {
                0.0
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: i64, start: i64, end: i64, proc: &str) -> activity_session::Model {
        activity_session::Model {
            id,
            machine_id: "m1".into(),
            start_time: start,
            end_time: end,
            duration_seconds: end - start,
            process_name: proc.into(),
            active_window: "w".into(),
            username: None,
            heartbeat_count: 1,
        }
    }

    #[test]
    fn overlapping_sessions_merge_instead_of_double_counting() {
        let sessions = vec![session(1, 0, 600, "code"), session(2, 300, 900, "code")];
        let tl = build_timeline(&sessions, 24, 0, 24 * 3600);

        // [0,600] and [300,900] merge into one 900s span = 15 minutes
        assert_eq!(tl.hours.get(&0).copied(), Some(15.0));
        assert!((tl.total_active_hours - 0.25).abs() < 1e-9);
    }

    #[test]
    fn sessions_are_sliced_at_hour_boundaries() {
        // 30 minutes each side of the 01:00 boundary
        let sessions = vec![session(1, 1800, 5400, "code")];
        let tl = build_timeline(&sessions, 24, 0, 24 * 3600);

        assert_eq!(tl.hours.get(&0).copied(), Some(30.0));
        assert_eq!(tl.hours.get(&1).copied(), Some(30.0));
    }

    #[test]
    fn timezone_offset_shifts_bucket_labels() {
        let sessions = vec![session(1, 0, 3600, "code")];
        // UTC hour 0 labeled as local hour 2
        let tl = build_timeline(&sessions, 24, 2 * 3600, 24 * 3600);
        assert_eq!(tl.hours.get(&2).copied(), Some(60.0));
        assert_eq!(tl.hours.get(&0), None);
    }

    #[test]
    fn hour_minutes_are_order_invariant() {
        let a = vec![
            session(1, 0, 600, "code"),
            session(2, 300, 900, "chrome"),
            session(3, 7200, 7800, "slack"),
        ];
        let mut b = a.clone();
        b.reverse();

        let ta = build_timeline(&a, 24, 0, 24 * 3600);
        let tb = build_timeline(&b, 24, 0, 24 * 3600);
        assert_eq!(ta.hours, tb.hours);
        assert!((ta.total_active_hours - tb.total_active_hours).abs() < 1e-9);
    }

    #[test]
    fn top_apps_are_additive_and_permutation_stable() {
        let a = vec![
            session(1, 0, 600, "code"),
            session(2, 300, 900, "code"), // overlaps, still counts fully
            session(3, 2000, 2300, "chrome"),
        ];
        let mut b = a.clone();
        b.swap(0, 2);

        let ta = build_timeline(&a, 24, 0, 24 * 3600);
        let tb = build_timeline(&b, 24, 0, 24 * 3600);

        assert_eq!(ta.top_apps.len(), 2);
        assert_eq!(ta.top_apps[0].name, "code");
        assert_eq!(ta.top_apps[0].total_seconds, 1200);
        assert!((ta.top_apps[0].percentage - 80.0).abs() < 1e-9);
        assert_eq!(ta.top_apps[1].name, "chrome");

        let names_a: Vec<_> = ta.top_apps.iter().map(|x| x.name.clone()).collect();
        let names_b: Vec<_> = tb.top_apps.iter().map(|x| x.name.clone()).collect();
        assert_eq!(names_a, names_b);
    }

    #[test]
    fn ranking_caps_at_five_processes() {
        let sessions: Vec<_> = (0..8)
            .map(|i| session(i, i * 1000, i * 1000 + 100 + i, &format!("proc-{i}")))
            .collect();
        let tl = build_timeline(&sessions, 24, 0, 24 * 3600);
        assert_eq!(tl.top_apps.len(), 5);
        // longest duration first
        assert_eq!(tl.top_apps[0].name, "proc-7");
    }

    #[test]
    fn empty_input_is_a_quiet_timeline() {
        let tl = build_timeline(&[], 24, 0, 24 * 3600);
        assert!(tl.hours.is_empty());
        assert!(tl.top_apps.is_empty());
        assert_eq!(tl.total_active_hours, 0.0);
    }
}
