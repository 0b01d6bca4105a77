//! # unitynets-store
//!
//! Local chat session store for the UnityNets client, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for chats,
//! messages, reactions, read receipts, and profiles. Ordering of message
//! history is owned here: `(created_at, id)` is the total order within a
//! chat, regardless of network arrival order.

pub mod chats;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod reactions;
pub mod receipts;
pub mod users;

mod convert;
mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
