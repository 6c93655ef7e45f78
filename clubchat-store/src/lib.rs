//! # clubchat-store
//!
//! Durable local storage for the `ClubChat` sync engine, backed by SQLite.
//!
//! Two things live here, both of which must survive process restarts:
//! the send queue (outgoing messages that have not been confirmed by the
//! server yet) and the per-conversation last-read marker used to request
//! a targeted re-sync after the client missed live events.
//!
//! The crate exposes a [`Database`] handle wrapping a
//! [`rusqlite::Connection`] behind a lock, so one handle can be shared
//! across the engine's async tasks. Each conversation's queue rows are
//! independent; no operation takes a cross-conversation lock.

pub mod database;
pub mod queue;
pub mod read_marker;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
