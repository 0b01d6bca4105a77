use thiserror::Error;

use unitynets_media::{CaptureError, SignalingError};
use unitynets_store::StoreError;

use crate::uploads::UploadError;

/// Errors surfaced by client session operations.
///
/// Nothing here is process-fatal: every failure is scoped to the operation
/// that raised it, and user-initiated operations additionally surface as an
/// operation-failed event for the notification layer.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Media capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Signaling error: {0}")]
    Signaling(#[from] SignalingError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Wire encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Realtime channel closed")]
    ChannelClosed,

    #[error("State lock poisoned")]
    LockPoisoned,

    #[error("Not a participant of this chat")]
    NotInChat,

    #[error("Reply target is not in this chat")]
    InvalidReply,

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Message exceeds {max} characters")]
    MessageTooLong { max: usize },

    #[error("A call is already in progress")]
    CallInProgress,

    #[error("No active call")]
    NoActiveCall,
}
