use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use greenroom_core::ProxyEvent;

/// Broadcast channel depth for live subscribers. A slow observer that
/// lags past this many events is disconnected rather than backpressuring
/// the relay.
const LIVE_CHANNEL_DEPTH: usize = 1024;

/// Bounded retained event log with live fan-out.
///
/// `publish` and `subscribe` take the same lock, so a new subscriber's
/// retained snapshot and its live receiver are consistent: every event
/// lands in exactly one of the two.
pub struct EventBus {
    retained: Mutex<VecDeque<ProxyEvent>>,
    capacity: usize,
    live: broadcast::Sender<ProxyEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (live, _) = broadcast::channel(LIVE_CHANNEL_DEPTH);
        EventBus {
            retained: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            live,
        }
    }

    /// Append to the retained log (evicting the oldest entry at
    /// capacity) and fan out to live subscribers.
    pub fn publish(&self, event: ProxyEvent) {
        let mut retained = self.retained.lock();
        if retained.len() == self.capacity {
            retained.pop_front();
        }
        retained.push_back(event.clone());
        // No live subscribers is fine; the retained log is the record.
        let _ = self.live.send(event);
    }

    /// Snapshot the retained log and open a live receiver, atomically
    /// with respect to `publish`.
    pub fn subscribe(&self) -> (Vec<ProxyEvent>, broadcast::Receiver<ProxyEvent>) {
        let retained = self.retained.lock();
        let snapshot = retained.iter().cloned().collect();
        let receiver = self.live.subscribe();
        (snapshot, receiver)
    }

    pub fn retained_len(&self) -> usize {
        self.retained.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenroom_core::ProxyEventKind;
    use serde_json::json;

    fn event(n: u64) -> ProxyEvent {
        ProxyEvent::new(ProxyEventKind::Status, json!({"n": n}))
    }

    #[test]
    fn test_retention_evicts_oldest() {
        let bus = EventBus::new(3);
        for n in 0..5 {
            bus.publish(event(n));
        }
        let (snapshot, _) = bus.subscribe();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].data["n"], 2);
        assert_eq!(snapshot[2].data["n"], 4);
    }

    #[tokio::test]
    async fn test_replay_then_live_no_gap_or_duplicate() {
        let bus = EventBus::new(100);
        for n in 0..10 {
            bus.publish(event(n));
        }

        let (snapshot, mut live) = bus.subscribe();
        assert_eq!(snapshot.len(), 10);

        for n in 10..15 {
            bus.publish(event(n));
        }

        let mut seen: Vec<u64> = snapshot
            .iter()
            .map(|e| e.data["n"].as_u64().unwrap())
            .collect();
        for _ in 0..5 {
            let e = live.recv().await.unwrap();
            seen.push(e.data["n"].as_u64().unwrap());
        }
        assert_eq!(seen, (0..15).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_late_subscriber_converges() {
        let bus = EventBus::new(100);
        let (early_snapshot, mut early_live) = bus.subscribe();
        assert!(early_snapshot.is_empty());

        for n in 0..8 {
            bus.publish(event(n));
        }

        // Late joiner sees the same sequence via replay that the early
        // one saw live.
        let (late_snapshot, _) = bus.subscribe();
        let late: Vec<u64> = late_snapshot
            .iter()
            .map(|e| e.data["n"].as_u64().unwrap())
            .collect();
        let mut early = Vec::new();
        for _ in 0..8 {
            let e = early_live.recv().await.unwrap();
            early.push(e.data["n"].as_u64().unwrap());
        }
        assert_eq!(early, late);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(10);
        bus.publish(event(0));
        assert_eq!(bus.retained_len(), 1);
    }
}
