//! Media stream and track handles.
//!
//! A [`MediaTrack`] is a cheaply cloneable handle over two shared flags:
//! `enabled` (mute / camera-off state, read by the device callback) and
//! `live` (cleared exactly once when the track is stopped). Clones share
//! the flags, so stopping any handle stops the capture everywhere.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use unitynets_shared::types::CallType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone)]
pub struct MediaTrack {
    kind: TrackKind,
    enabled: Arc<AtomicBool>,
    live: Arc<AtomicBool>,
}

impl MediaTrack {
    pub fn new(kind: TrackKind) -> Self {
        Self {
            kind,
            enabled: Arc::new(AtomicBool::new(true)),
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Flip the track on/off without stopping it. Disabled audio produces
    /// silence, a disabled camera produces no frames; the peer observes the
    /// change through the media pipeline, no signaling involved.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Relaxed)
    }

    /// Permanently stop the track and release the underlying device.
    pub fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    /// Shared flag handed to the device callback.
    pub fn enabled_flag(&self) -> Arc<AtomicBool> {
        self.enabled.clone()
    }

    /// Shared flag handed to the device callback.
    pub fn live_flag(&self) -> Arc<AtomicBool> {
        self.live.clone()
    }
}

/// An ordered set of tracks making up one capture or playback stream.
#[derive(Debug, Clone)]
pub struct MediaStream {
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self { tracks }
    }

    /// The track set a call of this type carries: always audio, plus video
    /// for video calls. Used both for local capture and for the handle
    /// representing the remote peer's stream.
    pub fn for_call(call_type: CallType) -> Self {
        let mut tracks = vec![MediaTrack::new(TrackKind::Audio)];
        if call_type.has_video() {
            tracks.push(MediaTrack::new(TrackKind::Video));
        }
        Self::new(tracks)
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn audio_track(&self) -> Option<&MediaTrack> {
        self.tracks.iter().find(|t| t.kind() == TrackKind::Audio)
    }

    pub fn video_track(&self) -> Option<&MediaTrack> {
        self.tracks.iter().find(|t| t.kind() == TrackKind::Video)
    }

    /// A stream is active while at least one of its tracks is live.
    pub fn is_active(&self) -> bool {
        self.tracks.iter().any(|t| t.is_live())
    }

    pub fn live_track_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_stream_has_no_video_track() {
        let stream = MediaStream::for_call(CallType::Voice);
        assert!(stream.audio_track().is_some());
        assert!(stream.video_track().is_none());

        let stream = MediaStream::for_call(CallType::Video);
        assert!(stream.video_track().is_some());
        assert_eq!(stream.live_track_count(), 2);
    }

    #[test]
    fn stop_all_clears_liveness_across_clones() {
        let stream = MediaStream::for_call(CallType::Video);
        let clone = stream.clone();

        stream.stop_all();
        assert!(!clone.is_active());
        assert_eq!(clone.live_track_count(), 0);
    }

    #[test]
    fn disabling_does_not_stop() {
        let track = MediaTrack::new(TrackKind::Audio);
        track.set_enabled(false);
        assert!(track.is_live());
        assert!(!track.is_enabled());
    }
}
