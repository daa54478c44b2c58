//! A thread-safe fan-out hub for topic-based WebSocket broadcasting.
//!
//! One Tokio broadcast channel per topic, created lazily on first
//! subscription and dropped again once the last receiver is gone. Which
//! machine is live is not tracked here; that is the event router's
//! registry.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};

type Topic = String;
type Sender = broadcast::Sender<String>;
type Receiver = broadcast::Receiver<String>;

/// Per-topic broadcast hub shared by every socket task.
#[derive(Clone, Default)]
pub struct Broadcaster {
    channels: Arc<RwLock<HashMap<Topic, Sender>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to `topic`, creating its channel if necessary.
    pub async fn subscribe(&self, topic: &str) -> Receiver {
        let mut map = self.channels.write().await;
        map.entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(128).0)
            .subscribe()
    }

    /// Broadcasts `msg` to every subscriber of `topic`.
    ///
    /// A topic nobody listens on is a no-op; once its last receiver is
    /// gone the channel is removed so idle machine topics do not pile up.
    pub async fn broadcast<T: Into<String>>(&self, topic: &str, msg: T) {
        let mut map = self.channels.write().await;
        if let Some(sender) = map.get(topic) {
            let _ = sender.send(msg.into());
            if sender.receiver_count() == 0 {
                tracing::debug!("removing topic '{topic}': no subscribers left");
                map.remove(topic);
            }
        }
    }

    /// Number of live receivers on `topic` right now.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        let map = self.channels.read().await;
        map.get(topic).map(|s| s.receiver_count()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Duration, timeout};

    #[tokio::test]
    async fn it_fans_out_to_all_subscribers() {
        let hub = Broadcaster::new();
        let topic = "machines";

        let mut r1 = hub.subscribe(topic).await;
        let mut r2 = hub.subscribe(topic).await;

        hub.broadcast(topic, "presence changed").await;

        let m1 = timeout(Duration::from_millis(50), r1.recv())
            .await
            .unwrap()
            .unwrap();
        let m2 = timeout(Duration::from_millis(50), r2.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(m1, "presence changed");
        assert_eq!(m2, "presence changed");
    }

    #[tokio::test]
    async fn it_creates_topics_lazily() {
        let hub = Broadcaster::new();
        assert_eq!(hub.subscriber_count("machines:abc").await, 0);
        let _rx = hub.subscribe("machines:abc").await;
        assert_eq!(hub.subscriber_count("machines:abc").await, 1);
    }

    #[tokio::test]
    async fn broadcast_to_empty_topic_does_not_panic() {
        let hub = Broadcaster::new();
        hub.broadcast("machines:nobody", "silent").await;
    }

    #[tokio::test]
    async fn topic_is_removed_after_broadcast_once_receivers_drop() {
        let hub = Broadcaster::new();
        let topic = "machines:gone";
        {
            let _rx = hub.subscribe(topic).await;
        } // receiver dropped
        hub.broadcast(topic, "cleanup").await;
        assert_eq!(hub.subscriber_count(topic).await, 0);
        assert!(!hub.channels.read().await.contains_key(topic));
    }
}
