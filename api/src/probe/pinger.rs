//! ICMP reachability probes.
//!
//! Raw ICMP sockets need CAP_NET_RAW, so probes shell out to the system
//! `ping` binary, which carries the capability on every distro we deploy
//! to. The trait seam lets the scheduler run in tests without touching
//! the network.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub alive: bool,
    pub latency_ms: Option<i64>,
}

impl ProbeOutcome {
    pub fn dead() -> Self {
        Self {
            alive: false,
            latency_ms: None,
        }
    }
}

#[async_trait]
pub trait Pinger: Send + Sync + 'static {
    /// Probes `target` once, treating `timeout` as dead rather than an error.
    async fn probe(&self, target: &str, timeout: Duration) -> ProbeOutcome;
}

/// Probes through the system `ping` binary.
pub struct SystemPinger;

static LATENCY_RE: Lazy<Regex> = Lazy::new(|| {
    // iputils prints "time=12.3 ms"; busybox prints "time=12.3 ms" too,
    // and sub-millisecond replies show up as "time<1 ms"
    Regex::new(r"time[=<]([0-9.]+) ?ms").unwrap_or_else(|e| panic!("latency regex: {e}"))
});

fn parse_latency_ms(stdout: &str) -> Option<i64> {
    let caps = LATENCY_RE.captures(stdout)?;
    let ms: f64 = caps.get(1)?.as_str().parse().ok()?;
    Some(ms.round() as i64)
}

#[async_trait]
impl Pinger for SystemPinger {
    async fn probe(&self, target: &str, timeout: Duration) -> ProbeOutcome {
        let wait_secs = timeout.as_secs().max(1).to_string();
        let child = Command::new("ping")
            .arg("-c")
            .arg("1")
            .arg("-W")
            .arg(&wait_secs)
            .arg(target)
            .kill_on_drop(true)
            .output();

        // `ping -W` bounds the reply wait, not name resolution; the outer
        // timeout bounds the whole attempt.
        let output = match tokio::time::timeout(timeout + Duration::from_secs(1), child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::warn!("could not spawn ping for {target}: {e}");
                return ProbeOutcome::dead();
            }
            Err(_) => return ProbeOutcome::dead(),
        };

        if !output.status.success() {
            return ProbeOutcome::dead();
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        ProbeOutcome {
            alive: true,
            latency_ms: parse_latency_ms(&stdout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iputils_latency_line() {
        let out = "64 bytes from 10.0.0.7: icmp_seq=1 ttl=64 time=12.4 ms\n";
        assert_eq!(parse_latency_ms(out), Some(12));
    }

    #[test]
    fn parses_sub_millisecond_reply() {
        let out = "64 bytes from 127.0.0.1: icmp_seq=1 ttl=64 time<1 ms\n";
        assert_eq!(parse_latency_ms(out), Some(1));
    }

    #[test]
    fn no_latency_on_missing_time_field() {
        assert_eq!(parse_latency_ms("Request timeout for icmp_seq 1\n"), None);
    }
}
