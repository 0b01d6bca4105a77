//! # unitynets-client
//!
//! The embeddable UnityNets messaging client: one [`ClientSession`] per
//! signed-in user, owning the local store, the realtime attachment, the
//! typing tracker, and the single active call. The UI shell injects an
//! [`events::EventSink`] for render notifications and a media source for
//! device capture; everything else is driven through session methods and
//! the background event bridge.

pub mod error;
pub mod events;
pub mod pipeline;
pub mod state;
pub mod typing;
pub mod uploads;

mod bridge;
mod calls;

#[cfg(test)]
pub(crate) mod testutil;

use tracing_subscriber::{fmt, EnvFilter};

pub use error::ClientError;
pub use events::{EventSink, MemorySink, NullSink};
pub use pipeline::{Attachment, AttachmentKind};
pub use state::{ClientConfig, ClientSession};
pub use uploads::FsObjectStore;

/// Install the default tracing subscriber for a UnityNets client process.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "unitynets_client=debug,unitynets_net=debug,unitynets_store=info,unitynets_media=info,warn",
        )
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
