//! Human-readable presence strings for dashboards.
//!
//! Pure functions of a supplied clock so every tier is testable without
//! waiting for real time to pass.

use super::resolver::ConnectionStatus;
use chrono::{DateTime, Utc};

/// Reference heartbeat period for the Online countdown.
const HEARTBEAT_PERIOD_SECONDS: i64 = 60;
/// "lost Nm ago" is only shown while the loss is this fresh.
const UNSTABLE_FRESH_MINUTES: i64 = 10;

pub fn format_status(
    status: ConnectionStatus,
    last_seen: Option<DateTime<Utc>>,
    last_ping_success: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> String {
    match status {
        ConnectionStatus::Online => online_text(last_seen, now),
        ConnectionStatus::Reachable => reachable_text(last_ping_success, now),
        ConnectionStatus::Unstable => unstable_text(last_seen, now),
        ConnectionStatus::Offline => offline_text(last_seen, now),
    }
}

fn online_text(last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(seen) = last_seen else {
        return "Online".to_string();
    };
    let elapsed = (now - seen).num_seconds().max(0);
    let remaining = (HEARTBEAT_PERIOD_SECONDS - elapsed).max(0);
    format!("Online, next heartbeat in {remaining}s")
}

fn reachable_text(last_ping_success: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(success) = last_ping_success else {
        return "Responding to ping".to_string();
    };
    let minutes = (now - success).num_minutes();
    if minutes < 5 {
        "Responding to ping just now".to_string()
    } else if minutes < 60 {
        format!("Responding to ping {minutes}m ago")
    } else {
        format!("Responding to ping at {}", success.format("%H:%M"))
    }
}

fn unstable_text(last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    if let Some(seen) = last_seen {
        let minutes = (now - seen).num_minutes();
        if minutes <= UNSTABLE_FRESH_MINUTES {
            return format!("Connection lost {minutes}m ago");
        }
    }
    "Connection unstable".to_string()
}

fn offline_text(last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(seen) = last_seen else {
        return "Offline".to_string();
    };
    let elapsed = now - seen;
    if elapsed.num_hours() < 1 {
        format!("Offline for {}m", elapsed.num_minutes())
    } else if elapsed.num_days() < 1 {
        format!("Offline for {}h", elapsed.num_hours())
    } else {
        format!("Last seen {}", seen.format("%H:%M on %d %b"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 20, 12, 0, 0).unwrap()
    }

    #[test]
    fn online_counts_down_to_next_heartbeat() {
        let now = fixed_now();
        let text = format_status(
            ConnectionStatus::Online,
            Some(now - Duration::seconds(15)),
            None,
            now,
        );
        assert_eq!(text, "Online, next heartbeat in 45s");
    }

    #[test]
    fn online_countdown_clamps_at_zero() {
        let now = fixed_now();
        let text = format_status(
            ConnectionStatus::Online,
            Some(now - Duration::seconds(90)),
            None,
            now,
        );
        assert_eq!(text, "Online, next heartbeat in 0s");
    }

    #[test]
    fn reachable_tiers() {
        let now = fixed_now();
        assert_eq!(
            format_status(
                ConnectionStatus::Reachable,
                None,
                Some(now - Duration::minutes(2)),
                now
            ),
            "Responding to ping just now"
        );
        assert_eq!(
            format_status(
                ConnectionStatus::Reachable,
                None,
                Some(now - Duration::minutes(25)),
                now
            ),
            "Responding to ping 25m ago"
        );
        assert_eq!(
            format_status(
                ConnectionStatus::Reachable,
                None,
                Some(now - Duration::hours(3)),
                now
            ),
            "Responding to ping at 09:00"
        );
    }

    #[test]
    fn unstable_is_specific_only_while_fresh() {
        let now = fixed_now();
        assert_eq!(
            format_status(
                ConnectionStatus::Unstable,
                Some(now - Duration::minutes(4)),
                None,
                now
            ),
            "Connection lost 4m ago"
        );
        assert_eq!(
            format_status(
                ConnectionStatus::Unstable,
                Some(now - Duration::minutes(25)),
                None,
                now
            ),
            "Connection unstable"
        );
    }

    #[test]
    fn offline_tiers() {
        let now = fixed_now();
        assert_eq!(
            format_status(
                ConnectionStatus::Offline,
                Some(now - Duration::minutes(42)),
                None,
                now
            ),
            "Offline for 42m"
        );
        assert_eq!(
            format_status(
                ConnectionStatus::Offline,
                Some(now - Duration::hours(7)),
                None,
                now
            ),
            "Offline for 7h"
        );
        assert_eq!(
            format_status(
                ConnectionStatus::Offline,
                Some(now - Duration::days(3)),
                None,
                now
            ),
            "Last seen 12:00 on 17 Jan"
        );
        assert_eq!(
            format_status(ConnectionStatus::Offline, None, None, now),
            "Offline"
        );
    }
}
