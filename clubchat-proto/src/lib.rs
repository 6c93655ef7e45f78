//! Shared protocol definitions for the `ClubChat` sync engine.

pub mod codec;
pub mod event;
pub mod message;
