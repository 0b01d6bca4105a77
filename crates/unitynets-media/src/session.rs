//! Per-call media session.
//!
//! Owns the local/remote stream pair, the mute and camera toggles, the
//! remote playback state, and the call duration counter. Two playback
//! rules are load-bearing rather than cosmetic: the local preview is muted
//! unconditionally (the caller must never hear their own microphone), and
//! remote output is never muted (muting it would silence the other
//! participant). When the platform blocks autoplay of remote audio, the
//! session parks in [`PlaybackState::Blocked`] until a user gesture calls
//! [`MediaSession::resume_playback`].

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use unitynets_shared::types::CallType;

use crate::stream::MediaStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// No remote stream attached yet.
    Inactive,
    /// Remote audio is audibly playing.
    Playing,
    /// The platform refused to start playback without a user gesture.
    Blocked,
}

pub struct MediaSession {
    call_type: CallType,
    local: MediaStream,
    remote: Option<MediaStream>,
    is_muted: bool,
    is_video_off: bool,
    playback: PlaybackState,
    connected_at: Option<Instant>,
    final_duration: Option<Duration>,
}

impl MediaSession {
    pub fn new(call_type: CallType, local: MediaStream) -> Self {
        Self {
            call_type,
            local,
            remote: None,
            is_muted: false,
            is_video_off: false,
            playback: PlaybackState::Inactive,
            connected_at: None,
            final_duration: None,
        }
    }

    pub fn call_type(&self) -> CallType {
        self.call_type
    }

    pub fn local_stream(&self) -> &MediaStream {
        &self.local
    }

    pub fn remote_stream(&self) -> Option<&MediaStream> {
        self.remote.as_ref()
    }

    /// The local preview element is always muted.
    pub fn preview_muted(&self) -> bool {
        true
    }

    /// The remote output element is never muted.
    pub fn output_muted(&self) -> bool {
        false
    }

    pub fn playback(&self) -> PlaybackState {
        self.playback
    }

    /// Attach the remote peer's stream once tracks arrive and start
    /// playback optimistically.
    pub fn attach_remote(&mut self, stream: MediaStream) {
        debug!(tracks = stream.tracks().len(), "remote stream attached");
        self.remote = Some(stream);
        self.playback = PlaybackState::Playing;
    }

    /// The platform refused to autoplay remote audio. Not an error: the
    /// session waits for a user gesture instead of failing silently.
    pub fn playback_blocked(&mut self) {
        if self.remote.is_some() {
            debug!("remote playback blocked, awaiting user gesture");
            self.playback = PlaybackState::Blocked;
        }
    }

    /// User-gesture retry for blocked playback.
    pub fn resume_playback(&mut self) -> PlaybackState {
        if self.playback == PlaybackState::Blocked {
            debug!("remote playback resumed by user gesture");
            self.playback = PlaybackState::Playing;
        }
        self.playback
    }

    /// Flip the microphone. Purely local: the peer observes the track going
    /// silent through the media pipeline.
    pub fn toggle_mute(&mut self) -> bool {
        self.is_muted = !self.is_muted;
        if let Some(track) = self.local.audio_track() {
            track.set_enabled(!self.is_muted);
        }
        debug!(muted = self.is_muted, "mute toggled");
        self.is_muted
    }

    /// Flip the camera. No-op for voice calls (there is no video track).
    pub fn toggle_video(&mut self) -> bool {
        if let Some(track) = self.local.video_track() {
            self.is_video_off = !self.is_video_off;
            track.set_enabled(!self.is_video_off);
            debug!(video_off = self.is_video_off, "video toggled");
        }
        self.is_video_off
    }

    pub fn is_muted(&self) -> bool {
        self.is_muted
    }

    pub fn is_video_off(&self) -> bool {
        self.is_video_off
    }

    /// Start the duration counter. Called exactly once, when signaling
    /// reports the connection established.
    pub fn mark_connected(&mut self, now: Instant) {
        if self.connected_at.is_none() {
            self.connected_at = Some(now);
        }
    }

    /// Elapsed call time: zero before connect, ticking while connected,
    /// frozen at its final value after release.
    pub fn duration(&self, now: Instant) -> Duration {
        if let Some(frozen) = self.final_duration {
            return frozen;
        }
        match self.connected_at {
            Some(start) => now.saturating_duration_since(start),
            None => Duration::ZERO,
        }
    }

    /// Tear down both streams and freeze the duration. Safe to call on
    /// every exit path, connected or not; repeated calls keep the first
    /// frozen value.
    pub fn release(&mut self, now: Instant) {
        if self.final_duration.is_none() {
            self.final_duration = Some(match self.connected_at {
                Some(start) => now.saturating_duration_since(start),
                None => Duration::ZERO,
            });
        }

        self.local.stop_all();
        if let Some(remote) = &self.remote {
            remote.stop_all();
        }
        self.playback = PlaybackState::Inactive;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(call_type: CallType) -> MediaSession {
        MediaSession::new(call_type, MediaStream::for_call(call_type))
    }

    #[test]
    fn preview_always_muted_output_never_muted() {
        let mut s = session(CallType::Video);
        s.attach_remote(MediaStream::for_call(CallType::Video));

        assert!(s.preview_muted());
        assert!(!s.output_muted());

        // Still holds mid-call and after toggles.
        s.toggle_mute();
        s.toggle_video();
        assert!(s.preview_muted());
        assert!(!s.output_muted());
    }

    #[test]
    fn even_number_of_toggles_is_identity() {
        let mut s = session(CallType::Video);
        let (muted0, video0) = (s.is_muted(), s.is_video_off());

        s.toggle_mute();
        s.toggle_mute();
        s.toggle_video();
        s.toggle_video();

        assert_eq!(s.is_muted(), muted0);
        assert_eq!(s.is_video_off(), video0);
        assert!(s.local_stream().audio_track().unwrap().is_enabled());
    }

    #[test]
    fn toggle_video_is_noop_for_voice_calls() {
        let mut s = session(CallType::Voice);
        assert!(!s.toggle_video());
        assert!(!s.is_video_off());
    }

    #[test]
    fn duration_starts_at_connect_and_freezes_at_release() {
        let mut s = session(CallType::Voice);
        let t0 = Instant::now();

        assert_eq!(s.duration(t0), Duration::ZERO);

        s.mark_connected(t0);
        let t1 = t0 + Duration::from_secs(90);
        assert_eq!(s.duration(t1), Duration::from_secs(90));

        s.release(t1);
        let t2 = t1 + Duration::from_secs(30);
        assert_eq!(s.duration(t2), Duration::from_secs(90));
    }

    #[test]
    fn release_before_connect_freezes_zero_duration() {
        let mut s = session(CallType::Voice);
        let t0 = Instant::now();
        s.release(t0);
        assert_eq!(s.duration(t0 + Duration::from_secs(5)), Duration::ZERO);
    }

    #[test]
    fn release_stops_both_streams() {
        let mut s = session(CallType::Video);
        let remote = MediaStream::for_call(CallType::Video);
        s.attach_remote(remote.clone());

        s.release(Instant::now());

        assert_eq!(s.local_stream().live_track_count(), 0);
        assert!(!remote.is_active());
        assert_eq!(s.playback(), PlaybackState::Inactive);
    }

    #[test]
    fn blocked_playback_resumes_on_user_gesture() {
        let mut s = session(CallType::Voice);
        s.attach_remote(MediaStream::for_call(CallType::Voice));
        assert_eq!(s.playback(), PlaybackState::Playing);

        s.playback_blocked();
        assert_eq!(s.playback(), PlaybackState::Blocked);

        assert_eq!(s.resume_playback(), PlaybackState::Playing);
    }

    #[test]
    fn blocked_without_remote_stream_is_ignored() {
        let mut s = session(CallType::Voice);
        s.playback_blocked();
        assert_eq!(s.playback(), PlaybackState::Inactive);
    }
}
