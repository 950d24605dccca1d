//! Flow execution event relay.
//!
//! Execution progress fans out to three room scopes per event: the tenant,
//! the flow definition, and the individual run. Delivery is at-most-once over
//! [`tokio::sync::broadcast`]; a subscriber that joins after an event was
//! emitted never sees it, and a slow subscriber that overruns the channel
//! capacity observes a `Lagged` error from its receiver rather than blocking
//! the emitter.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 256;

/// Lifecycle stage of a flow or node event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowEventKind {
    FlowStarted,
    FlowCompleted,
    FlowFailed,
    NodeStarted,
    NodeCompleted,
    NodeFailed,
    FlowProgress,
}

impl FlowEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FlowEventKind::FlowStarted => "flow_started",
            FlowEventKind::FlowCompleted => "flow_completed",
            FlowEventKind::FlowFailed => "flow_failed",
            FlowEventKind::NodeStarted => "node_started",
            FlowEventKind::NodeCompleted => "node_completed",
            FlowEventKind::NodeFailed => "node_failed",
            FlowEventKind::FlowProgress => "flow_progress",
        }
    }

    /// Coarse status string carried on every event envelope.
    pub fn status(self) -> &'static str {
        match self {
            FlowEventKind::FlowStarted | FlowEventKind::NodeStarted => "started",
            FlowEventKind::FlowCompleted | FlowEventKind::NodeCompleted => "completed",
            FlowEventKind::FlowFailed | FlowEventKind::NodeFailed => "failed",
            FlowEventKind::FlowProgress => "progress",
        }
    }
}

/// One relayed execution event, as delivered to every subscribed room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEvent {
    pub id: Uuid,
    pub kind: FlowEventKind,
    pub tenant_id: String,
    pub flow_id: String,
    pub run_id: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    /// Kind-specific payload: node ids, outputs, error messages, progress
    /// percentages.
    pub payload: Value,
}

/// Subscription scope. Every event is delivered to all three scopes it
/// belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    Tenant(String),
    Flow(String),
    Run(String),
}

impl std::fmt::Display for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Room::Tenant(id) => write!(f, "tenant:{id}"),
            Room::Flow(id) => write!(f, "flow:{id}"),
            Room::Run(id) => write!(f, "run:{id}"),
        }
    }
}

/// In-process relay between flow executors and event consumers.
pub struct FlowEventRelay {
    capacity: usize,
    rooms: Mutex<HashMap<Room, broadcast::Sender<FlowEvent>>>,
}

impl Default for FlowEventRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowEventRelay {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// `capacity` bounds each room's broadcast buffer; overrunning it lags
    /// the slow receiver, never the emitter.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to one room. Only events emitted after this call are
    /// delivered.
    pub fn subscribe(&self, room: Room) -> broadcast::Receiver<FlowEvent> {
        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        rooms
            .entry(room)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn emit_flow_started(&self, tenant: &str, flow: &str, run: &str, payload: Value) {
        self.emit(FlowEventKind::FlowStarted, tenant, flow, run, payload);
    }

    pub fn emit_flow_completed(&self, tenant: &str, flow: &str, run: &str, payload: Value) {
        self.emit(FlowEventKind::FlowCompleted, tenant, flow, run, payload);
    }

    pub fn emit_flow_failed(&self, tenant: &str, flow: &str, run: &str, payload: Value) {
        self.emit(FlowEventKind::FlowFailed, tenant, flow, run, payload);
    }

    pub fn emit_node_started(&self, tenant: &str, flow: &str, run: &str, payload: Value) {
        self.emit(FlowEventKind::NodeStarted, tenant, flow, run, payload);
    }

    pub fn emit_node_completed(&self, tenant: &str, flow: &str, run: &str, payload: Value) {
        self.emit(FlowEventKind::NodeCompleted, tenant, flow, run, payload);
    }

    pub fn emit_node_failed(&self, tenant: &str, flow: &str, run: &str, payload: Value) {
        self.emit(FlowEventKind::NodeFailed, tenant, flow, run, payload);
    }

    pub fn emit_flow_progress(&self, tenant: &str, flow: &str, run: &str, payload: Value) {
        self.emit(FlowEventKind::FlowProgress, tenant, flow, run, payload);
    }

    /// Build the envelope and fan it out to the tenant, flow, and run rooms.
    /// Rooms with no live receivers are pruned as a side effect.
    pub fn emit(&self, kind: FlowEventKind, tenant: &str, flow: &str, run: &str, payload: Value) {
        let event = FlowEvent {
            id: Uuid::new_v4(),
            kind,
            tenant_id: tenant.to_string(),
            flow_id: flow.to_string(),
            run_id: run.to_string(),
            status: kind.status().to_string(),
            timestamp: Utc::now(),
            payload,
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            kind = kind.as_str(),
            tenant_id = tenant,
            run_id = run,
            "relaying flow event"
        );

        let targets = [
            Room::Tenant(tenant.to_string()),
            Room::Flow(flow.to_string()),
            Room::Run(run.to_string()),
        ];

        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        for room in targets {
            if let Some(sender) = rooms.get(&room) {
                // A send error means every receiver is gone; drop the room.
                if sender.send(event.clone()).is_err() {
                    rooms.remove(&room);
                }
            }
        }
    }

    /// Number of rooms with at least one historical subscriber still tracked.
    pub fn room_count(&self) -> usize {
        self.rooms.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn event_reaches_all_three_rooms() {
        let relay = FlowEventRelay::new();
        let mut tenant_rx = relay.subscribe(Room::Tenant("t1".into()));
        let mut flow_rx = relay.subscribe(Room::Flow("f1".into()));
        let mut run_rx = relay.subscribe(Room::Run("r1".into()));

        relay.emit_node_completed("t1", "f1", "r1", json!({ "nodeId": "n3" }));

        for rx in [&mut tenant_rx, &mut flow_rx, &mut run_rx] {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.kind, FlowEventKind::NodeCompleted);
            assert_eq!(event.status, "completed");
            assert_eq!(event.payload["nodeId"], "n3");
        }
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        let relay = FlowEventRelay::new();
        let mut early = relay.subscribe(Room::Run("r1".into()));
        relay.emit_flow_started("t1", "f1", "r1", json!({}));

        let mut late = relay.subscribe(Room::Run("r1".into()));
        relay.emit_flow_completed("t1", "f1", "r1", json!({}));

        assert_eq!(early.recv().await.unwrap().kind, FlowEventKind::FlowStarted);
        assert_eq!(early.recv().await.unwrap().kind, FlowEventKind::FlowCompleted);
        // The late receiver sees only the event after its subscription.
        assert_eq!(late.recv().await.unwrap().kind, FlowEventKind::FlowCompleted);
        assert!(late.try_recv().is_err());
    }

    #[tokio::test]
    async fn events_scope_to_their_own_run() {
        let relay = FlowEventRelay::new();
        let mut r1 = relay.subscribe(Room::Run("r1".into()));
        relay.emit_flow_started("t1", "f1", "r2", json!({}));
        relay.emit_flow_started("t1", "f1", "r1", json!({}));

        let event = r1.recv().await.unwrap();
        assert_eq!(event.run_id, "r1");
        assert!(r1.try_recv().is_err());
    }

    #[test]
    fn dead_rooms_are_pruned_on_emit() {
        let relay = FlowEventRelay::new();
        let rx = relay.subscribe(Room::Run("r1".into()));
        drop(rx);
        assert_eq!(relay.room_count(), 1);
        relay.emit_flow_progress("t1", "f1", "r1", json!({ "percent": 50 }));
        assert_eq!(relay.room_count(), 0);
    }

    #[test]
    fn room_labels_match_wire_format() {
        assert_eq!(Room::Tenant("t1".into()).to_string(), "tenant:t1");
        assert_eq!(Room::Flow("f1".into()).to_string(), "flow:f1");
        assert_eq!(Room::Run("r1".into()).to_string(), "run:r1");
    }

    #[test]
    fn event_serializes_camel_case() {
        let event = FlowEvent {
            id: Uuid::nil(),
            kind: FlowEventKind::NodeFailed,
            tenant_id: "t1".into(),
            flow_id: "f1".into(),
            run_id: "r1".into(),
            status: FlowEventKind::NodeFailed.status().into(),
            timestamp: Utc::now(),
            payload: json!({ "error": "boom" }),
        };
        let raw = serde_json::to_value(&event).unwrap();
        assert_eq!(raw["kind"], "node_failed");
        assert_eq!(raw["tenantId"], "t1");
        assert_eq!(raw["runId"], "r1");
        assert_eq!(raw["status"], "failed");
    }
}
