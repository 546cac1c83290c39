//! Heartbeat monitor: periodic liveness evaluation
//!
//! Runs as its own background task, decoupled from request handling. It
//! only reads heartbeat timestamps from the registry and writes node
//! status; it never touches chunk or placement data. Failure and rejoin
//! events reach the recovery engine through the registry's event channel.

use crate::common::timestamp_now_millis;
use crate::coordinator::registry::{NodeRegistry, NodeStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct HeartbeatMonitor {
    registry: Arc<NodeRegistry>,
    interval: Duration,
    timeout: Duration,
}

impl HeartbeatMonitor {
    pub fn new(registry: Arc<NodeRegistry>, interval: Duration, timeout: Duration) -> Self {
        Self {
            registry,
            interval,
            timeout,
        }
    }

    /// Start the periodic evaluation loop. The task stops when the
    /// shutdown signal flips.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                "heartbeat monitor started ({:?} interval, {:?} timeout)",
                self.interval,
                self.timeout
            );
            let mut tick = tokio::time::interval(self.interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so freshly
            // registered nodes get a full interval.
            tick.tick().await;

            loop {
                tokio::select! {
                    _ = tick.tick() => self.evaluate(),
                    _ = shutdown.changed() => {
                        tracing::info!("heartbeat monitor stopped");
                        break;
                    }
                }
            }
        })
    }

    /// One evaluation pass over every known node.
    ///
    /// Healthy -> Suspected after one missed interval, Suspected ->
    /// Failed once the timeout elapses. Failed nodes only come back via
    /// a received heartbeat, never from here.
    pub fn evaluate(&self) {
        let now = timestamp_now_millis();
        let interval_ms = self.interval.as_millis() as u64;
        let timeout_ms = self.timeout.as_millis() as u64;

        for node in self.registry.list_all() {
            let elapsed = now.saturating_sub(node.last_heartbeat);
            let next = match node.status {
                NodeStatus::Healthy | NodeStatus::Suspected if elapsed > timeout_ms => {
                    NodeStatus::Failed
                }
                NodeStatus::Healthy if elapsed > interval_ms => NodeStatus::Suspected,
                _ => continue,
            };

            if next == NodeStatus::Failed {
                tracing::warn!(
                    "node {} failed: no heartbeat for {}ms",
                    node.node_id,
                    elapsed
                );
            } else {
                tracing::debug!(
                    "node {} suspected: no heartbeat for {}ms",
                    node.node_id,
                    elapsed
                );
            }
            if let Err(e) = self.registry.set_status(&node.node_id, next) {
                tracing::warn!("status update for {} failed: {}", node.node_id, e);
            }
        }
    }
}
