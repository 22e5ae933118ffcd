//! Presence Handshake
//!
//! What a joining connection sees, in order: its own `user-data`, one
//! targeted `user-added` per participant already in the session, then the
//! session-wide `user-added` announcing itself.

use super::hub::{HubError, Member};
use super::registry::{SessionLease, SessionRegistry};
use crate::websocket::{presence_frame, MessageKind};

const MAX_JOIN_ATTEMPTS: usize = 3;

/// Join `key` through the registry and run the presence handshake
///
/// The `user-data` frame is queued before registration so nothing the hub
/// fans out can overtake it. The introductions run inside the hub loop as
/// part of [`SessionHub::join`](super::SessionHub::join).
pub async fn join_session(
    registry: &SessionRegistry,
    key: &str,
    member: &Member,
) -> Result<SessionLease, HubError> {
    greet(member);

    for attempt in 1..=MAX_JOIN_ATTEMPTS {
        let lease = registry.get_or_create(key);
        match lease.join(member.clone()).await {
            Ok(()) => return Ok(lease),
            Err(HubError::Retired) => {
                tracing::debug!(session = %key, attempt, "Hub retired during join, resolving again");
            }
        }
    }

    Err(HubError::Retired)
}

/// Send the connection its own presence
fn greet(member: &Member) {
    let frame = match presence_frame(MessageKind::UserData, &member.presence) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode user-data");
            return;
        }
    };

    match member.queue.try_enqueue(frame) {
        Ok(()) => tracing::debug!(connection_id = %member.id, "Sent user data to client"),
        Err(e) => tracing::warn!(connection_id = %member.id, error = %e, "Could not send user data"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use crate::websocket::{outbound_queue, Frame, OutboundReceiver, Presence};
    use serde_json::Value;
    use std::sync::Arc;

    fn member(user: &str) -> (Member, OutboundReceiver) {
        let (tx, rx) = outbound_queue(32);
        let presence = Presence {
            user_id: format!("{}@example.com", user),
            user_name: format!("{} 🐼", user),
            user_color: "#f58231".to_string(),
        };
        (Member::new(presence, tx), rx)
    }

    fn pair(kind: &str, user: &str) -> (String, String) {
        (kind.to_string(), user.to_string())
    }

    async fn next(rx: &mut OutboundReceiver) -> (String, String) {
        let frame = tokio::time::timeout(std::time::Duration::from_secs(1), rx.next())
            .await
            .expect("timed out waiting for frame")
            .expect("queue closed");
        let value: Value = serde_json::from_str(&frame).unwrap();
        (
            value["type"].as_str().unwrap_or_default().to_string(),
            value["data"]["userData"]["userId"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
        )
    }

    #[tokio::test]
    async fn test_first_member_sees_itself() {
        let registry = SessionRegistry::new(HubConfig::default());
        let (a, mut rx_a) = member("ada");

        let _lease = join_session(&registry, "s1", &a).await.unwrap();

        assert_eq!(next(&mut rx_a).await, pair("user-data", "ada@example.com"));
        assert_eq!(next(&mut rx_a).await, pair("user-added", "ada@example.com"));
    }

    #[tokio::test]
    async fn test_newcomer_learns_existing_members_in_order() {
        let registry = SessionRegistry::new(HubConfig::default());
        let (a, mut rx_a) = member("ada");
        let (b, mut rx_b) = member("bob");

        let _lease_a = join_session(&registry, "s1", &a).await.unwrap();
        next(&mut rx_a).await;
        next(&mut rx_a).await;

        let _lease_b = join_session(&registry, "s1", &b).await.unwrap();

        assert_eq!(next(&mut rx_b).await, pair("user-data", "bob@example.com"));
        assert_eq!(next(&mut rx_b).await, pair("user-added", "ada@example.com"));
        assert_eq!(next(&mut rx_b).await, pair("user-added", "bob@example.com"));

        assert_eq!(next(&mut rx_a).await, pair("user-added", "bob@example.com"));
    }

    #[tokio::test]
    async fn test_same_user_not_introduced_to_itself() {
        let registry = SessionRegistry::new(HubConfig::default());
        let (first_tab, _rx1) = member("ada");
        let (second_tab, mut rx2) = member("ada");

        let _l1 = join_session(&registry, "s1", &first_tab).await.unwrap();
        let _l2 = join_session(&registry, "s1", &second_tab).await.unwrap();

        assert_eq!(next(&mut rx2).await.0, "user-data");
        // Straight to the self announcement, no targeted user-added
        assert_eq!(next(&mut rx2).await, pair("user-added", "ada@example.com"));
        assert!(rx2.try_next().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_introductions_precede_concurrent_broadcasts() {
        for round in 0..50 {
            let registry = SessionRegistry::new(HubConfig::default());
            let (a, _rx_a) = member("ada");
            let lease_a = join_session(&registry, "s1", &a).await.unwrap();

            let hub = Arc::clone(lease_a.hub());
            let chatter = tokio::spawn(async move {
                for _ in 0..20 {
                    let _ = hub.broadcast(Frame::from(r#"{"type":"cursor","data":1}"#)).await;
                    tokio::task::yield_now().await;
                }
            });

            let (b, mut rx_b) = member("bob");
            let _lease_b = join_session(&registry, "s1", &b).await.unwrap();
            chatter.await.unwrap();

            assert_eq!(next(&mut rx_b).await, pair("user-data", "bob@example.com"), "round {}", round);
            assert_eq!(next(&mut rx_b).await, pair("user-added", "ada@example.com"), "round {}", round);
        }
    }
}
