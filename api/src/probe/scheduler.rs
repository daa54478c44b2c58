//! Ping reconciliation sweep.
//!
//! Socket presence goes dark when an agent dies even though the host may
//! still be up. On a fixed period the scheduler probes every non-archived
//! machine whose `last_seen` has gone stale and folds the results into the
//! ping-health columns, then re-broadcasts the affected machines' presence.

use chrono::{Duration as ChronoDuration, Utc};
use db::store::{PingObservation, Store};
use futures::future::join_all;
use sea_orm::DbErr;
use std::sync::Arc;
use std::time::Duration;
use util::ws::Broadcaster;

use super::pinger::{Pinger, SystemPinger};
use crate::presence::{self, PingHealth};
use crate::ws::events::{self, MachineStateChanged};

/// Spawns the background sweep loop. The first sweep is delayed so a
/// restarting server lets reconnecting agents report in before probing.
pub fn spawn_ping_scheduler(store: Arc<dyn Store>, ws: Broadcaster) -> tokio::task::JoinHandle<()> {
    let sweep_period = Duration::from_secs(util::config::ping_sweep_seconds());
    let startup_delay = Duration::from_secs(util::config::ping_startup_delay_seconds());
    let stale_seconds = util::config::ping_stale_seconds();
    let probe_timeout = Duration::from_millis(util::config::ping_timeout_ms());
    let heartbeat_interval = util::config::heartbeat_interval_seconds();

    tokio::spawn(async move {
        tokio::time::sleep(startup_delay).await;
        let pinger = SystemPinger;
        let mut ticker = tokio::time::interval(sweep_period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match run_sweep(
                store.as_ref(),
                &pinger,
                &ws,
                stale_seconds,
                heartbeat_interval,
                probe_timeout,
            )
            .await
            {
                Ok(probed) => tracing::debug!("ping sweep probed {probed} machine(s)"),
                Err(e) => tracing::warn!("ping sweep failed: {e}"),
            }
        }
    })
}

/// One sweep pass: probe every stale machine concurrently, persist each
/// observation, and re-broadcast presence. A single machine failing to
/// persist does not abort the rest of the sweep.
pub async fn run_sweep(
    store: &dyn Store,
    pinger: &dyn Pinger,
    ws: &Broadcaster,
    stale_seconds: i64,
    heartbeat_interval_seconds: i64,
    probe_timeout: Duration,
) -> Result<usize, DbErr> {
    let now = Utc::now();
    let cutoff = now - ChronoDuration::seconds(stale_seconds);
    let stale = store.stale_machines(cutoff).await?;

    let targets: Vec<_> = stale
        .into_iter()
        .filter_map(|m| {
            let target = m.probe_target()?.to_string();
            Some((m, target))
        })
        .collect();

    let outcomes = join_all(
        targets
            .iter()
            .map(|(_, target)| pinger.probe(target, probe_timeout)),
    )
    .await;

    let probed = targets.len();
    for ((machine, target), outcome) in targets.into_iter().zip(outcomes) {
        let obs = PingObservation {
            alive: outcome.alive,
            latency_ms: outcome.latency_ms,
            observed_at: Utc::now(),
        };
        let state = match store.record_ping_health(&machine.id, obs).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("failed to record ping result for {} ({target}): {e}", machine.id);
                continue;
            }
        };

        let p = presence::resolve(
            machine.last_seen,
            Utc::now(),
            heartbeat_interval_seconds,
            PingHealth::from_column(state.ping_health.as_deref()),
        );
        let status_text =
            presence::format_status(p.status, machine.last_seen, state.last_ping_success, Utc::now());
        events::emit(
            ws,
            &MachineStateChanged {
                machine_id: machine.id,
                presence: p,
                status_text,
                active_window: state.active_window,
                ping_latency_ms: state.ping_latency_ms,
            },
        )
        .await;
    }
    Ok(probed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::ConnectionStatus;
    use crate::probe::pinger::ProbeOutcome;
    use async_trait::async_trait;
    use db::memory::MemoryStore;
    use db::models::machine::MachineStatus;
    use db::store::MachineRegistration;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    struct FakePinger {
        outcomes: HashMap<String, ProbeOutcome>,
        probed: Mutex<Vec<String>>,
    }

    impl FakePinger {
        fn new(outcomes: Vec<(&str, ProbeOutcome)>) -> Self {
            Self {
                outcomes: outcomes
                    .into_iter()
                    .map(|(t, o)| (t.to_string(), o))
                    .collect(),
                probed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Pinger for FakePinger {
        async fn probe(&self, target: &str, _timeout: Duration) -> ProbeOutcome {
            self.probed.lock().await.push(target.to_string());
            self.outcomes
                .get(target)
                .copied()
                .unwrap_or_else(ProbeOutcome::dead)
        }
    }

    async fn stale_machine(store: &MemoryStore, id: &str, ip: Option<&str>) {
        store
            .register_machine(MachineRegistration {
                id: Some(id.to_string()),
                name: id.to_string(),
                ip_address: ip.map(str::to_string),
                api_key: "k".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        // last_seen stays None, i.e. stale by definition
    }

    #[tokio::test]
    async fn sweep_records_reachable_and_unreachable() {
        let store = MemoryStore::new();
        stale_machine(&store, "up", Some("10.0.0.1")).await;
        stale_machine(&store, "down", Some("10.0.0.2")).await;
        let pinger = FakePinger::new(vec![(
            "10.0.0.1",
            ProbeOutcome {
                alive: true,
                latency_ms: Some(7),
            },
        )]);
        let ws = Broadcaster::new();

        let probed = run_sweep(&store, &pinger, &ws, 120, 60, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(probed, 2);

        let up = store.machine_state("up").await.unwrap().unwrap();
        assert_eq!(up.ping_health.as_deref(), Some("reachable"));
        assert_eq!(up.ping_latency_ms, Some(7));
        let down = store.machine_state("down").await.unwrap().unwrap();
        assert_eq!(down.ping_health.as_deref(), Some("unreachable"));
        assert_eq!(down.ping_latency_ms, None);
    }

    #[tokio::test]
    async fn machines_without_a_target_are_skipped() {
        let store = MemoryStore::new();
        stale_machine(&store, "ghost", None).await;
        let pinger = FakePinger::new(vec![]);
        let ws = Broadcaster::new();

        let probed = run_sweep(&store, &pinger, &ws, 120, 60, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(probed, 0);
        assert!(pinger.probed.lock().await.is_empty());
        assert!(store.machine_state("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fresh_machines_are_not_probed() {
        let store = MemoryStore::new();
        stale_machine(&store, "fresh", Some("10.0.0.3")).await;
        store
            .touch_last_seen("fresh", Utc::now(), None)
            .await
            .unwrap();
        let pinger = FakePinger::new(vec![]);
        let ws = Broadcaster::new();

        let probed = run_sweep(&store, &pinger, &ws, 120, 60, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(probed, 0);
    }

    #[tokio::test]
    async fn archived_machines_are_left_alone() {
        let store = MemoryStore::new();
        store
            .seed_machine("old", "OLD-PC", "k", MachineStatus::Archived)
            .await;
        let pinger = FakePinger::new(vec![]);
        let ws = Broadcaster::new();

        let probed = run_sweep(&store, &pinger, &ws, 120, 60, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(probed, 0);
    }

    #[tokio::test]
    async fn sweep_broadcasts_promoted_presence() {
        let store = MemoryStore::new();
        stale_machine(&store, "up", Some("10.0.0.1")).await;
        let pinger = FakePinger::new(vec![(
            "10.0.0.1",
            ProbeOutcome {
                alive: true,
                latency_ms: Some(3),
            },
        )]);
        let ws = Broadcaster::new();
        let mut rx = ws.subscribe("machines").await;

        run_sweep(&store, &pinger, &ws, 120, 60, Duration::from_secs(1))
            .await
            .unwrap();

        let raw = rx.recv().await.unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["event"], "machine:state");
        assert_eq!(v["payload"]["machineId"], "up");
        assert_eq!(
            v["payload"]["presence"]["status"],
            serde_json::to_value(ConnectionStatus::Reachable).unwrap()
        );
        assert_eq!(v["payload"]["presence"]["isOnline"], false);
    }
}
