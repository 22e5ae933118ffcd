//! WebSocket Message Types
//!
//! Every frame on the wire is one JSON envelope `{type, data}`. The set of
//! types is open: kinds this server does not know are relayed untouched.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An encoded frame, shared between every queue it is delivered to
pub type Frame = Arc<str>;

/// Declared message kind of an envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Content,
    UserData,
    UserAdded,
    UserRemoved,
    Other(String),
}

impl MessageKind {
    pub fn parse(kind: &str) -> Self {
        match kind {
            "content" => Self::Content,
            "user-data" => Self::UserData,
            "user-added" => Self::UserAdded,
            "user-removed" => Self::UserRemoved,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Content => "content",
            Self::UserData => "user-data",
            Self::UserAdded => "user-added",
            Self::UserRemoved => "user-removed",
            Self::Other(kind) => kind,
        }
    }
}

/// A participant's displayable identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub user_id: String,
    pub user_name: String,
    pub user_color: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Body of a `content` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPayload {
    pub content: String,
    pub position: Position,
    pub user_data: Presence,
}

/// Body of the presence frames (`user-data`, `user-added`, `user-removed`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    pub user_data: Presence,
}

/// Wire envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: T,
}

/// Only the discriminator, for classifying a frame without decoding its body
#[derive(Debug, Deserialize)]
pub struct Discriminator {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Encode a presence announcement of the given kind
pub fn presence_frame(kind: MessageKind, presence: &Presence) -> Result<Frame, serde_json::Error> {
    let envelope = Envelope {
        kind: kind.as_str().to_string(),
        data: PresencePayload {
            user_data: presence.clone(),
        },
    };
    serde_json::to_string(&envelope).map(Frame::from)
}
