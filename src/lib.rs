//! # Huddle
//!
//! Realtime relay for collaborative editing sessions. Participants connect
//! over WebSocket, join a session by key, learn who else is present, and
//! receive every content update the others send.
//!
//! ## Modules
//!
//! - [`session`]: Per-session hub actors and the registry that owns them
//! - [`websocket`]: Wire format, outbound queues, routing and the upgrade endpoint
//! - [`identity`]: Token verification and display-name lookup
//! - [`presence`]: Per-connection color and emoji
//! - [`api`]: HTTP server with Axum
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use huddle::config::HubConfig;
//! use huddle::session::{join_session, Member, SessionRegistry};
//! use huddle::websocket::{outbound_queue, Presence};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = SessionRegistry::new(HubConfig::default());
//!
//!     let (queue, mut outbound) = outbound_queue(512);
//!     let member = Member::new(
//!         Presence {
//!             user_id: "ada@example.com".into(),
//!             user_name: "Ada 🦊".into(),
//!             user_color: "#4363d8".into(),
//!         },
//!         queue,
//!     );
//!
//!     let lease = join_session(&registry, "doc-42", &member).await.unwrap();
//!     while let Some(frame) = outbound.try_next() {
//!         println!("{}", frame);
//!     }
//!     lease.unregister(member.id).await;
//! }
//! ```

pub mod api;
pub mod config;
pub mod identity;
pub mod presence;
pub mod session;
pub mod websocket;

pub use api::{build_router, serve, ApiError, AppState};

pub use config::{AuthConfig, Config, ConfigError, HubConfig, LoggingConfig, ServerConfig};

pub use identity::{
    AuthError, Identity, IdentityResolver, InMemoryUserDirectory, JwtIdentityResolver,
    TokenVerifier, UserDirectory,
};

pub use session::{join_session, ConnectionId, HubError, Member, SessionHub, SessionLease, SessionRegistry};

pub use websocket::{
    websocket_handler, ContentPayload, Envelope, Frame, MessageKind, Position, Presence,
};
