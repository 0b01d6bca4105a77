// Realtime fan-out layer: topic-keyed publish/subscribe with the tokio mpsc
// command/notification pattern. The in-process hub stands in for the managed
// realtime channel the production backend provides; delivery is best-effort
// and at-most-once, exactly like that channel.

pub mod hub;

pub use hub::{spawn_hub, BusCommand, BusNotification, HubError, RealtimeHub};
