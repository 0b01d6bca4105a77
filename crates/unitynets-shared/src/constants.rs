/// Application name
pub const APP_NAME: &str = "UnityNets";

/// Silence window after the last keystroke before a typing indicator expires
pub const TYPING_TIMEOUT_SECS: u64 = 5;

/// How long an unanswered call may stay in `calling`/`ringing` before it is
/// torn down as missed
pub const RING_TIMEOUT_SECS: u64 = 45;

/// Maximum text message length in characters
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Maximum attachment upload size in bytes (25 MiB)
pub const MAX_UPLOAD_SIZE: usize = 25 * 1024 * 1024;

/// Maximum participants in a group chat
pub const MAX_GROUP_PARTICIPANTS: usize = 256;

/// Default page size for message history queries
pub const DEFAULT_HISTORY_PAGE: u32 = 50;

/// Realtime topic prefixes
pub const CHAT_TOPIC_PREFIX: &str = "chat:";
pub const USER_TOPIC_PREFIX: &str = "user:";
