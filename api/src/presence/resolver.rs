//! The single shared connection-state predicate.
//!
//! Presence is always recomputed from `last_seen` plus the latest ping
//! health; it is never stored as ground truth. Every broadcast site, the
//! REST status route and the ping scheduler call [`resolve`] so the
//! classification cannot drift between surfaces.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Online,
    Unstable,
    Offline,
    /// Offline on the socket, but answering ICMP.
    Reachable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub is_online: bool,
    pub status: ConnectionStatus,
}

/// Last known ICMP result, decoded from the `ping_health` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingHealth {
    Reachable,
    Unreachable,
}

impl PingHealth {
    pub fn from_column(value: Option<&str>) -> Option<PingHealth> {
        match value {
            Some("reachable") => Some(PingHealth::Reachable),
            Some("unreachable") => Some(PingHealth::Unreachable),
            _ => None,
        }
    }
}

/// Classifies a machine's connection state.
///
/// Thresholds use strict `<`: a machine exactly one interval behind is no
/// longer Online. Offline is promoted to Reachable when the last probe
/// succeeded, but `is_online` stays false — ICMP proves the host is up,
/// not that the agent is reporting. Unstable is never promoted.
pub fn resolve(
    last_seen: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    ping_interval_seconds: i64,
    ping_health: Option<PingHealth>,
) -> Presence {
    let Some(seen) = last_seen else {
        return offline(ping_health);
    };

    let elapsed = (now - seen).num_seconds();
    if elapsed < ping_interval_seconds {
        Presence {
            is_online: true,
            status: ConnectionStatus::Online,
        }
    } else if elapsed < 3 * ping_interval_seconds {
        Presence {
            is_online: false,
            status: ConnectionStatus::Unstable,
        }
    } else {
        offline(ping_health)
    }
}

fn offline(ping_health: Option<PingHealth>) -> Presence {
    let status = match ping_health {
        Some(PingHealth::Reachable) => ConnectionStatus::Reachable,
        _ => ConnectionStatus::Offline,
    };
    Presence {
        is_online: false,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const INTERVAL: i64 = 30;

    fn at(now: DateTime<Utc>, seconds_ago: i64) -> Option<DateTime<Utc>> {
        Some(now - Duration::seconds(seconds_ago))
    }

    #[test]
    fn no_last_seen_is_offline() {
        let now = Utc::now();
        let p = resolve(None, now, INTERVAL, None);
        assert!(!p.is_online);
        assert_eq!(p.status, ConnectionStatus::Offline);
    }

    #[test]
    fn online_below_interval_strictly() {
        let now = Utc::now();
        let p = resolve(at(now, INTERVAL - 1), now, INTERVAL, None);
        assert!(p.is_online);
        assert_eq!(p.status, ConnectionStatus::Online);

        // exactly one interval behind is no longer Online
        let p = resolve(at(now, INTERVAL), now, INTERVAL, None);
        assert!(!p.is_online);
        assert_eq!(p.status, ConnectionStatus::Unstable);
    }

    #[test]
    fn unstable_until_three_intervals() {
        let now = Utc::now();
        let p = resolve(at(now, 3 * INTERVAL - 1), now, INTERVAL, None);
        assert_eq!(p.status, ConnectionStatus::Unstable);

        let p = resolve(at(now, 3 * INTERVAL), now, INTERVAL, None);
        assert_eq!(p.status, ConnectionStatus::Offline);
    }

    #[test]
    fn offline_promotes_to_reachable_on_ping_success() {
        let now = Utc::now();
        let p = resolve(
            at(now, 10 * INTERVAL),
            now,
            INTERVAL,
            Some(PingHealth::Reachable),
        );
        assert!(!p.is_online);
        assert_eq!(p.status, ConnectionStatus::Reachable);
    }

    #[test]
    fn unreachable_ping_does_not_promote() {
        let now = Utc::now();
        let p = resolve(
            at(now, 10 * INTERVAL),
            now,
            INTERVAL,
            Some(PingHealth::Unreachable),
        );
        assert_eq!(p.status, ConnectionStatus::Offline);
    }

    #[test]
    fn unstable_is_never_promoted() {
        let now = Utc::now();
        let p = resolve(
            at(now, 2 * INTERVAL),
            now,
            INTERVAL,
            Some(PingHealth::Reachable),
        );
        assert_eq!(p.status, ConnectionStatus::Unstable);
    }

    #[test]
    fn end_to_end_lifecycle_per_heartbeat_then_probe() {
        let t0 = Utc::now();
        let seen = Some(t0);

        // t=0: fresh heartbeat
        let p = resolve(seen, t0, 30, None);
        assert_eq!(p.status, ConnectionStatus::Online);

        // t=40: one missed heartbeat
        let p = resolve(seen, t0 + Duration::seconds(40), 30, None);
        assert_eq!(p.status, ConnectionStatus::Unstable);

        // t=200: silent past three intervals
        let p = resolve(seen, t0 + Duration::seconds(200), 30, None);
        assert_eq!(p.status, ConnectionStatus::Offline);

        // sweep at t=200 finds the host answering ICMP
        let p = resolve(
            seen,
            t0 + Duration::seconds(200),
            30,
            Some(PingHealth::Reachable),
        );
        assert_eq!(p.status, ConnectionStatus::Reachable);
        assert!(!p.is_online);

        // next heartbeat restores Online
        let p = resolve(
            Some(t0 + Duration::seconds(210)),
            t0 + Duration::seconds(215),
            30,
            Some(PingHealth::Reachable),
        );
        assert_eq!(p.status, ConnectionStatus::Online);
        assert!(p.is_online);
    }
}
