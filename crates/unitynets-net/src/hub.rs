//! In-process realtime hub.
//!
//! The hub event loop runs in a dedicated tokio task. Attached clients
//! communicate with it through typed command and notification channels,
//! keeping the transport layer fully asynchronous and decoupled from the
//! session logic that drives it.
//!
//! Fan-out semantics match the managed realtime channel this hub stands in
//! for: a published event is delivered to every *other* subscriber of the
//! topic (publishers apply their own writes locally at send time), delivery
//! is best-effort, and a slow consumer loses events rather than stalling
//! the hub.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Command channel depth per attached client.
const CMD_BUFFER: usize = 64;
/// Notification channel depth per attached client.
const NOTIF_BUFFER: usize = 256;

#[derive(Error, Debug)]
pub enum HubError {
    #[error("Hub is closed")]
    Closed,
}

/// Commands sent *into* the hub task.
#[derive(Debug)]
pub enum BusCommand {
    /// Publish an event on a topic.
    Publish { topic: String, data: Vec<u8> },
    /// Start receiving events published on a topic.
    Subscribe(String),
    /// Stop receiving events for a topic.
    Unsubscribe(String),
    /// Detach this client from the hub.
    Shutdown,
}

/// Notifications sent *from* the hub task to an attached client.
#[derive(Debug, Clone)]
pub enum BusNotification {
    /// An event was published on a subscribed topic.
    Event { topic: String, data: Vec<u8> },
}

/// Handle for attaching clients to a running hub. Cloneable; the hub task
/// exits once every handle is dropped and every client has detached.
#[derive(Clone)]
pub struct RealtimeHub {
    attach_tx: mpsc::Sender<Registration>,
}

struct Registration {
    cmd_rx: mpsc::Receiver<BusCommand>,
    notif_tx: mpsc::Sender<BusNotification>,
}

impl RealtimeHub {
    /// Attach a new client.
    ///
    /// Returns `(command_tx, notification_rx)`, the same pair shape the
    /// production realtime SDK hands out. Dropping the command sender
    /// detaches the client.
    pub async fn attach(
        &self,
    ) -> Result<(mpsc::Sender<BusCommand>, mpsc::Receiver<BusNotification>), HubError> {
        let (cmd_tx, cmd_rx) = mpsc::channel(CMD_BUFFER);
        let (notif_tx, notif_rx) = mpsc::channel(NOTIF_BUFFER);

        self.attach_tx
            .send(Registration { cmd_rx, notif_tx })
            .await
            .map_err(|_| HubError::Closed)?;

        Ok((cmd_tx, notif_rx))
    }
}

/// Spawn the hub event loop in a background tokio task and return the
/// attach handle.
pub fn spawn_hub() -> RealtimeHub {
    let (attach_tx, attach_rx) = mpsc::channel::<Registration>(16);

    tokio::spawn(hub_loop(attach_rx));

    RealtimeHub { attach_tx }
}

enum ClientEvent {
    Command(u64, BusCommand),
    Detached(u64),
}

struct Client {
    notif_tx: mpsc::Sender<BusNotification>,
    topics: HashSet<String>,
}

async fn hub_loop(mut attach_rx: mpsc::Receiver<Registration>) {
    let (event_tx, mut event_rx) = mpsc::channel::<ClientEvent>(CMD_BUFFER);
    let mut clients: HashMap<u64, Client> = HashMap::new();
    let mut next_id: u64 = 0;
    let mut attach_open = true;

    info!("Realtime hub started");

    loop {
        tokio::select! {
            registration = attach_rx.recv(), if attach_open => {
                match registration {
                    Some(Registration { cmd_rx, notif_tx }) => {
                        let id = next_id;
                        next_id += 1;

                        clients.insert(id, Client {
                            notif_tx,
                            topics: HashSet::new(),
                        });

                        // Forward this client's commands into the shared
                        // event stream, tagged with its id.
                        let event_tx = event_tx.clone();
                        tokio::spawn(async move {
                            let mut cmd_rx = cmd_rx;
                            while let Some(cmd) = cmd_rx.recv().await {
                                if event_tx.send(ClientEvent::Command(id, cmd)).await.is_err() {
                                    return;
                                }
                            }
                            let _ = event_tx.send(ClientEvent::Detached(id)).await;
                        });

                        debug!(client = id, "client attached");
                    }
                    None => {
                        // All hub handles dropped; keep serving existing
                        // clients until they detach.
                        attach_open = false;
                        if clients.is_empty() {
                            break;
                        }
                    }
                }
            }

            event = event_rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    ClientEvent::Command(id, BusCommand::Publish { topic, data }) => {
                        fan_out(&clients, id, &topic, data);
                    }
                    ClientEvent::Command(id, BusCommand::Subscribe(topic)) => {
                        if let Some(client) = clients.get_mut(&id) {
                            debug!(client = id, topic = %topic, "subscribed");
                            client.topics.insert(topic);
                        }
                    }
                    ClientEvent::Command(id, BusCommand::Unsubscribe(topic)) => {
                        if let Some(client) = clients.get_mut(&id) {
                            debug!(client = id, topic = %topic, "unsubscribed");
                            client.topics.remove(&topic);
                        }
                    }
                    ClientEvent::Command(id, BusCommand::Shutdown)
                    | ClientEvent::Detached(id) => {
                        if clients.remove(&id).is_some() {
                            debug!(client = id, "client detached");
                        }
                        if clients.is_empty() && !attach_open {
                            break;
                        }
                    }
                }
            }
        }
    }

    info!("Realtime hub stopped");
}

/// Deliver an event to every subscriber of `topic` except the publisher.
fn fan_out(clients: &HashMap<u64, Client>, publisher: u64, topic: &str, data: Vec<u8>) {
    for (id, client) in clients {
        if *id == publisher || !client.topics.contains(topic) {
            continue;
        }
        let notification = BusNotification::Event {
            topic: topic.to_string(),
            data: data.clone(),
        };
        if client.notif_tx.try_send(notification).is_err() {
            // Best-effort delivery: a full or closed consumer loses the event.
            warn!(client = id, topic = %topic, "dropping event for slow consumer");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn recv_event(
        rx: &mut mpsc::Receiver<BusNotification>,
    ) -> Option<(String, Vec<u8>)> {
        match tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
            Ok(Some(BusNotification::Event { topic, data })) => Some((topic, data)),
            _ => None,
        }
    }

    #[tokio::test]
    async fn fan_out_excludes_publisher() {
        let hub = spawn_hub();
        let (a_tx, mut a_rx) = hub.attach().await.unwrap();
        let (b_tx, mut b_rx) = hub.attach().await.unwrap();

        a_tx.send(BusCommand::Subscribe("chat:1".into())).await.unwrap();
        b_tx.send(BusCommand::Subscribe("chat:1".into())).await.unwrap();

        a_tx.send(BusCommand::Publish {
            topic: "chat:1".into(),
            data: vec![1, 2, 3],
        })
        .await
        .unwrap();

        let (topic, data) = recv_event(&mut b_rx).await.expect("subscriber receives");
        assert_eq!(topic, "chat:1");
        assert_eq!(data, vec![1, 2, 3]);

        assert!(recv_event(&mut a_rx).await.is_none(), "publisher must not echo");
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let hub = spawn_hub();
        let (a_tx, _a_rx) = hub.attach().await.unwrap();
        let (b_tx, mut b_rx) = hub.attach().await.unwrap();

        b_tx.send(BusCommand::Subscribe("chat:2".into())).await.unwrap();
        a_tx.send(BusCommand::Publish {
            topic: "chat:2".into(),
            data: vec![1],
        })
        .await
        .unwrap();
        assert!(recv_event(&mut b_rx).await.is_some());

        b_tx.send(BusCommand::Unsubscribe("chat:2".into())).await.unwrap();
        a_tx.send(BusCommand::Publish {
            topic: "chat:2".into(),
            data: vec![2],
        })
        .await
        .unwrap();
        assert!(recv_event(&mut b_rx).await.is_none());
    }

    #[tokio::test]
    async fn unrelated_topics_are_not_delivered() {
        let hub = spawn_hub();
        let (a_tx, _a_rx) = hub.attach().await.unwrap();
        let (b_tx, mut b_rx) = hub.attach().await.unwrap();

        b_tx.send(BusCommand::Subscribe("user:42".into())).await.unwrap();
        a_tx.send(BusCommand::Publish {
            topic: "user:7".into(),
            data: vec![9],
        })
        .await
        .unwrap();

        assert!(recv_event(&mut b_rx).await.is_none());
    }

    #[tokio::test]
    async fn shutdown_detaches_client() {
        let hub = spawn_hub();
        let (a_tx, _a_rx) = hub.attach().await.unwrap();
        let (b_tx, mut b_rx) = hub.attach().await.unwrap();

        b_tx.send(BusCommand::Subscribe("chat:3".into())).await.unwrap();
        b_tx.send(BusCommand::Shutdown).await.unwrap();

        a_tx.send(BusCommand::Publish {
            topic: "chat:3".into(),
            data: vec![5],
        })
        .await
        .unwrap();
        assert!(recv_event(&mut b_rx).await.is_none());
    }
}
