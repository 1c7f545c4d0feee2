//! In-memory pairing sessions: membership, message history, storage quota,
//! and tiered timed cleanup. No database — a session's state does not
//! survive a server restart.

pub mod error;
pub mod manager;
pub mod types;

pub use error::{SessionError, SessionResult};
pub use manager::{JoinOutcome, SessionConfig, SessionManager};
pub use types::{ClientEntry, ClientToken, RoomEvent, Session, SessionStats};
