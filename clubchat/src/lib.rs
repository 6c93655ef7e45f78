//! `ClubChat` — client-side chat synchronization engine.
//!
//! The product around this crate is CRUD screens over a REST API; the
//! hard part is keeping a conversation's message list correct while
//! sends race confirmations, sockets deliver out of order, history pages
//! in backwards, and the process restarts mid-send. That logic lives
//! here, UI-free: the rendering layer is a pure consumer of the ordered
//! timeline and the [`sync::SessionEvent`] channel.

pub mod api;
pub mod config;
pub mod logging;
pub mod storage;
pub mod stream;
pub mod sync;
