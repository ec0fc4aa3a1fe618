//! State management module.
//!
//! This module provides persistent state storage for tracking managed
//! Connect attachments and peers: remote identifiers, declaration hashes,
//! last-read attributes, and apply history.

mod local;
mod lock;
mod store;
mod types;

pub use local::LocalStateStore;
pub use lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
pub use store::StateStore;
pub use types::{HistoryEntry, ResourceState, STATE_VERSION, StackState, StateOperation};
