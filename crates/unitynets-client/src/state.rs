//! Client session state.
//!
//! [`ClientSession`] is the explicit session object the rest of the crate
//! hangs off: created at sign-in, torn down at sign-out, passed by handle
//! instead of living in ambient globals. It owns the local store, the
//! realtime attachment, the typing tracker, and the single call slot.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

use unitynets_media::capture::MediaSource;
use unitynets_net::{BusCommand, RealtimeHub};
use unitynets_shared::constants::{MAX_UPLOAD_SIZE, RING_TIMEOUT_SECS, TYPING_TIMEOUT_SECS};
use unitynets_shared::protocol::WireMessage;
use unitynets_shared::types::{PresenceStatus, UserId};
use unitynets_store::{Database, Profile, StoreError};

use crate::bridge;
use crate::calls::CallSlot;
use crate::error::ClientError;
use crate::events::{emit_event, EventSink};
use crate::typing::TypingTracker;
use crate::uploads::FsObjectStore;

pub struct ClientConfig {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
    /// Database location; `None` uses the platform data directory.
    pub db_path: Option<PathBuf>,
    /// Directory backing attachment uploads.
    pub objects_dir: PathBuf,
    pub typing_timeout: Duration,
    pub ring_timeout: Duration,
}

impl ClientConfig {
    pub fn new(user_id: UserId, display_name: impl Into<String>, objects_dir: PathBuf) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            avatar_url: None,
            db_path: None,
            objects_dir,
            typing_timeout: Duration::from_secs(TYPING_TIMEOUT_SECS),
            ring_timeout: Duration::from_secs(RING_TIMEOUT_SECS),
        }
    }
}

pub(crate) struct SessionShared {
    pub(crate) user_id: UserId,
    pub(crate) display_name: String,
    pub(crate) avatar_url: Option<String>,
    pub(crate) ring_timeout: Duration,
    pub(crate) db: Mutex<Database>,
    pub(crate) cmd_tx: mpsc::Sender<BusCommand>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) media_source: Arc<dyn MediaSource>,
    pub(crate) objects: FsObjectStore,
    pub(crate) typing: Mutex<TypingTracker>,
    pub(crate) calls: Mutex<CallSlot>,
}

/// Handle to one signed-in client session. Cheap to clone; all clones share
/// the same state.
#[derive(Clone)]
pub struct ClientSession {
    pub(crate) inner: Arc<SessionShared>,
}

impl ClientSession {
    /// Open the store, attach to the realtime hub, subscribe to the user's
    /// topics, and spawn the event bridge.
    pub async fn start(
        config: ClientConfig,
        hub: &RealtimeHub,
        sink: Arc<dyn EventSink>,
        media_source: Arc<dyn MediaSource>,
    ) -> Result<Self, ClientError> {
        let db = match &config.db_path {
            Some(path) => Database::open_at(path)?,
            None => Database::open_default()?,
        };

        // Mirror our own profile so display resolution works offline.
        db.upsert_profile(&Profile {
            user_id: config.user_id,
            display_name: config.display_name.clone(),
            avatar_url: config.avatar_url.clone(),
            status: PresenceStatus::Online,
            created_at: Utc::now(),
        })?;

        let known_chats = db.list_chats_for_user(config.user_id)?;

        let (cmd_tx, notif_rx) = hub.attach().await.map_err(|_| ClientError::ChannelClosed)?;

        let session = Self {
            inner: Arc::new(SessionShared {
                user_id: config.user_id,
                display_name: config.display_name,
                avatar_url: config.avatar_url,
                ring_timeout: config.ring_timeout,
                db: Mutex::new(db),
                cmd_tx,
                sink,
                media_source,
                objects: FsObjectStore::new(config.objects_dir, MAX_UPLOAD_SIZE)?,
                typing: Mutex::new(TypingTracker::new(config.typing_timeout)),
                calls: Mutex::new(CallSlot::new()),
            }),
        };

        session.subscribe(config.user_id.to_topic()).await?;
        for chat in &known_chats {
            session.subscribe(chat.id.to_topic()).await?;
        }

        tokio::spawn(bridge::run(session.clone(), notif_rx));

        info!(user = %session.inner.user_id.short(), "client session started");
        Ok(session)
    }

    pub fn user_id(&self) -> UserId {
        self.inner.user_id
    }

    pub fn display_name(&self) -> &str {
        &self.inner.display_name
    }

    pub fn object_store(&self) -> &FsObjectStore {
        &self.inner.objects
    }

    /// End the session: hang up any in-flight call and detach from the hub.
    pub async fn shutdown(&self) {
        if self.call_phase().is_some() {
            if let Err(e) = self.end_call().await {
                tracing::warn!(error = %e, "failed to end call during shutdown");
            }
        }
        let _ = self.inner.cmd_tx.send(BusCommand::Shutdown).await;
        info!(user = %self.inner.user_id.short(), "client session shut down");
    }

    // ------------------------------------------------------------------
    // Internal plumbing shared by the operation modules
    // ------------------------------------------------------------------

    pub(crate) async fn publish(
        &self,
        topic: String,
        wire: &WireMessage,
    ) -> Result<(), ClientError> {
        let data = wire.to_bytes()?;
        self.inner
            .cmd_tx
            .send(BusCommand::Publish { topic, data })
            .await
            .map_err(|_| ClientError::ChannelClosed)
    }

    pub(crate) async fn subscribe(&self, topic: String) -> Result<(), ClientError> {
        self.inner
            .cmd_tx
            .send(BusCommand::Subscribe(topic))
            .await
            .map_err(|_| ClientError::ChannelClosed)
    }

    pub(crate) fn with_db<T>(
        &self,
        f: impl FnOnce(&Database) -> Result<T, StoreError>,
    ) -> Result<T, ClientError> {
        let db = self.inner.db.lock().map_err(|_| ClientError::LockPoisoned)?;
        Ok(f(&db)?)
    }

    pub(crate) fn typing_lock(&self) -> Result<MutexGuard<'_, TypingTracker>, ClientError> {
        self.inner
            .typing
            .lock()
            .map_err(|_| ClientError::LockPoisoned)
    }

    pub(crate) fn calls_lock(&self) -> Result<MutexGuard<'_, CallSlot>, ClientError> {
        self.inner
            .calls
            .lock()
            .map_err(|_| ClientError::LockPoisoned)
    }

    pub(crate) fn emit<S: Serialize>(&self, event: &str, payload: S) {
        emit_event(&*self.inner.sink, event, payload);
    }
}
