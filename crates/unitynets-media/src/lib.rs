//! # unitynets-media
//!
//! Call media and signaling for UnityNets: the per-call signaling state
//! machine ([`signaling::CallSession`]), the media session owning the
//! local/remote stream pair ([`session::MediaSession`]), and the device
//! capture layer behind the [`capture::MediaSource`] seam.
//!
//! SDP and ICE payloads are opaque strings here; the signaling layer only
//! sequences them. The RTP media path itself belongs to the platform.

pub mod capture;
pub mod session;
pub mod signaling;
pub mod stream;

pub use capture::{AudioConfig, CaptureEngine, CaptureError, DeviceSource, MediaSource};
pub use session::{MediaSession, PlaybackState};
pub use signaling::{CallPhase, CallSession, SignalingAction, SignalingError};
pub use stream::{MediaStream, MediaTrack, TrackKind};
