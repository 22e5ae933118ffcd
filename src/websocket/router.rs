//! Message Router
//!
//! Classifies inbound frames by their `type` and decides whether the
//! unmodified text is relayed to the session. Frames from a connection the
//! hub no longer lists (evicted for a full queue) are dropped.

use super::messages::{ContentPayload, Discriminator, Envelope, Frame, MessageKind};
use crate::session::{ConnectionId, SessionHub};

/// Why a frame was not relayed
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("Malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Malformed content payload: {0}")]
    MalformedContent(#[source] serde_json::Error),
}

/// A frame that passed classification
#[derive(Debug)]
pub struct Classified {
    pub kind: MessageKind,
    /// Decoded body, present for `content` frames only
    pub content: Option<ContentPayload>,
}

/// What happened to an inbound frame
#[derive(Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    Relayed(MessageKind),
    /// Content from a participant who is alone in the session
    Suppressed,
    Dropped,
}

/// Parse the discriminator, and the full body for `content` frames
pub fn classify(text: &str) -> Result<Classified, RouteError> {
    let discriminator: Discriminator = serde_json::from_str(text).map_err(RouteError::Malformed)?;
    let kind = MessageKind::parse(&discriminator.kind);

    let content = match kind {
        MessageKind::Content => {
            let envelope: Envelope<ContentPayload> =
                serde_json::from_str(text).map_err(RouteError::MalformedContent)?;
            Some(envelope.data)
        }
        _ => None,
    };

    Ok(Classified { kind, content })
}

/// Classify one inbound frame and relay it, unmodified, through the hub
pub async fn route_frame(hub: &SessionHub, connection_id: ConnectionId, text: String) -> RouteOutcome {
    let classified = match classify(&text) {
        Ok(classified) => classified,
        Err(e) => {
            tracing::warn!(connection_id = %connection_id, error = %e, "Dropping malformed frame");
            return RouteOutcome::Dropped;
        }
    };

    if !hub.contains(connection_id).await {
        tracing::debug!(connection_id = %connection_id, "Sender no longer in session, frame dropped");
        return RouteOutcome::Dropped;
    }

    if let Some(content) = &classified.content {
        if hub.member_count().await <= 1 {
            tracing::trace!(connection_id = %connection_id, "Alone in session, content not relayed");
            return RouteOutcome::Suppressed;
        }

        tracing::debug!(
            connection_id = %connection_id,
            user_id = %content.user_data.user_id,
            content_len = content.content.len(),
            x = content.position.x,
            y = content.position.y,
            "Received content"
        );
    } else {
        tracing::debug!(
            connection_id = %connection_id,
            kind = %classified.kind.as_str(),
            "Received message"
        );
    }

    match hub.broadcast(Frame::from(text)).await {
        Ok(()) => RouteOutcome::Relayed(classified.kind),
        Err(e) => {
            tracing::warn!(connection_id = %connection_id, error = %e, "Frame not relayed");
            RouteOutcome::Dropped
        }
    }
}
