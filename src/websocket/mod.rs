//! WebSocket Transport
//!
//! Wire format, per-connection queues, inbound routing and the upgrade
//! endpoint.
//!
//! ## Usage
//!
//! Clients connect to `/ws?session=<key>&token=<jwt>` (or send the token as
//! `Authorization: Bearer <jwt>`). Every message is one JSON envelope:
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:8080/ws?session=doc-42&token=' + jwt);
//!
//! ws.onmessage = (event) => {
//!   const { type, data } = JSON.parse(event.data);
//!   // "user-data" | "user-added" | "user-removed" | "content" | ...
//! };
//!
//! ws.send(JSON.stringify({
//!   type: 'content',
//!   data: { content: '<p>hi</p>', position: { x: 0, y: 0 }, userData: me },
//! }));
//! ```

mod handler;
mod messages;
mod queue;
mod router;

pub use handler::{websocket_handler, ConnectParams};
pub use messages::{
    presence_frame, ContentPayload, Discriminator, Envelope, Frame, MessageKind, Position,
    Presence, PresencePayload,
};
pub use queue::{outbound_queue, EnqueueError, OutboundReceiver, OutboundSender, DEFAULT_QUEUE_CAPACITY};
pub use router::{classify, route_frame, Classified, RouteError, RouteOutcome};
