//! Collaboration Sessions
//!
//! ## Architecture
//!
//! - **SessionRegistry**: session key → hub, lazy creation, grace-period retirement
//! - **SessionHub**: per-session actor owning membership and fan-out
//! - **Handshake**: presence frames exchanged when a connection joins

mod handshake;
mod hub;
mod registry;

pub use handshake::join_session;
pub use hub::{ConnectionId, HubError, Member, SessionHub};
pub use registry::{SessionLease, SessionRegistry};
