//! # unitynets-shared
//!
//! Domain model and wire protocol shared by every UnityNets crate: id
//! newtypes, the chat message model, the realtime wire messages (chat
//! fan-out, typing notices, call signaling), and application constants.

pub mod constants;
pub mod message;
pub mod protocol;
pub mod types;
