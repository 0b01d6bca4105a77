//! Shared scaffolding for the session tests: in-process hub sessions with
//! recording media sources and memory event sinks.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use unitynets_media::capture::{CaptureError, MediaSource};
use unitynets_media::MediaStream;
use unitynets_net::RealtimeHub;
use unitynets_shared::types::{CallType, UserId};

use crate::events::MemorySink;
use crate::state::{ClientConfig, ClientSession};

/// Media source that always succeeds and keeps a handle to every stream it
/// hands out, so tests can assert release.
#[derive(Default)]
pub(crate) struct RecordingSource {
    streams: Mutex<Vec<MediaStream>>,
}

impl RecordingSource {
    pub(crate) fn live_tracks(&self) -> usize {
        self.streams
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.live_track_count())
            .sum()
    }

    pub(crate) fn acquired(&self) -> usize {
        self.streams.lock().unwrap().len()
    }
}

impl MediaSource for RecordingSource {
    fn acquire(&self, call_type: CallType) -> Result<MediaStream, CaptureError> {
        let stream = MediaStream::for_call(call_type);
        self.streams.lock().unwrap().push(stream.clone());
        Ok(stream)
    }
}

/// Media source with no devices, for acquisition-failure paths.
pub(crate) struct NoDeviceSource;

impl MediaSource for NoDeviceSource {
    fn acquire(&self, _call_type: CallType) -> Result<MediaStream, CaptureError> {
        Err(CaptureError::NoInputDevice)
    }
}

pub(crate) struct TestSession {
    pub session: ClientSession,
    pub sink: Arc<MemorySink>,
    pub media: Arc<RecordingSource>,
    _dir: TempDir,
}

pub(crate) async fn start_session(hub: &RealtimeHub, name: &str) -> TestSession {
    start_session_opts(hub, name, None, Duration::from_secs(30)).await
}

pub(crate) async fn start_session_opts(
    hub: &RealtimeHub,
    name: &str,
    source: Option<Arc<dyn MediaSource>>,
    ring_timeout: Duration,
) -> TestSession {
    let dir = tempfile::tempdir().unwrap();
    let media = Arc::new(RecordingSource::default());
    let sink = Arc::new(MemorySink::new());

    let config = ClientConfig {
        user_id: UserId::new(),
        display_name: name.to_string(),
        avatar_url: None,
        db_path: Some(dir.path().join("session.db")),
        objects_dir: dir.path().join("objects"),
        typing_timeout: Duration::from_millis(200),
        ring_timeout,
    };

    let source: Arc<dyn MediaSource> = match source {
        Some(source) => source,
        None => media.clone(),
    };

    let session = ClientSession::start(config, hub, sink.clone(), source)
        .await
        .unwrap();

    TestSession {
        session,
        sink,
        media,
        _dir: dir,
    }
}

/// Poll `cond` for up to ~3 seconds.
pub(crate) async fn eventually<F: Fn() -> bool>(cond: F) -> bool {
    for _ in 0..300 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
