//! Message and file-descriptor types shared between the session manager and
//! the transport gateway.
//!
//! The per-session history log and its append-and-broadcast/join-time-replay
//! behavior (the "MessageRouter" responsibility) live on [`crate::session::Session`]
//! itself rather than as a separate type — see DESIGN.md for the rationale.

mod types;

pub use types::{FileDescriptor, Message, MessageBody};
