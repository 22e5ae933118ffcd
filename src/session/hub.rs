//! Session Hub
//!
//! One actor per collaboration session. A single task owns every membership
//! change and every fan-out, consuming [`HubEvent`]s from one ordered
//! channel. The membership map sits behind a `RwLock` only so that code
//! outside the loop (the content router, health checks) can read a
//! consistent snapshot; the loop is the only writer.
//!
//! A [`SessionHub::join`] introduces the existing members to the newcomer
//! and announces the newcomer from inside the loop, so no other broadcast
//! can land between the two.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};
use uuid::Uuid;

use super::registry::RetirementHandle;
use crate::websocket::{presence_frame, EnqueueError, Frame, MessageKind, OutboundSender, Presence};

/// Unique identifier for one accepted connection
pub type ConnectionId = Uuid;

/// A registered participant as seen by the hub
#[derive(Debug, Clone)]
pub struct Member {
    pub id: ConnectionId,
    pub presence: Presence,
    pub queue: OutboundSender,
}

impl Member {
    pub fn new(presence: Presence, queue: OutboundSender) -> Self {
        Self {
            id: Uuid::new_v4(),
            presence,
            queue,
        }
    }
}

type Members = Arc<RwLock<HashMap<ConnectionId, Member>>>;

enum HubEvent {
    Register {
        member: Member,
        introduce: bool,
        ack: oneshot::Sender<()>,
    },
    Unregister {
        id: ConnectionId,
        ack: oneshot::Sender<()>,
    },
    Broadcast(Frame),
    Retire,
}

/// Errors returned by hub operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    /// The hub was removed from the registry and no longer accepts events
    #[error("Session hub has been retired")]
    Retired,
}

/// Handle to a running session hub
pub struct SessionHub {
    key: String,
    members: Members,
    events: mpsc::Sender<HubEvent>,
    retired: AtomicBool,
    population: Arc<AtomicUsize>,
    /// Live registry leases; only touched under the registry lock
    attached: AtomicUsize,
}

impl SessionHub {
    /// Start a hub that is not tracked by any registry
    pub fn new(key: impl Into<String>, event_capacity: usize) -> Arc<Self> {
        Self::spawn(key.into(), event_capacity, RetirementHandle::detached())
    }

    pub(crate) fn spawn(key: String, event_capacity: usize, retirement: RetirementHandle) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::channel(event_capacity.max(1));
        let members: Members = Arc::new(RwLock::new(HashMap::new()));
        let population = Arc::new(AtomicUsize::new(0));

        let event_loop = HubLoop {
            key: key.clone(),
            members: Arc::clone(&members),
            events: events_rx,
            population: Arc::clone(&population),
            retirement,
        };
        tokio::spawn(event_loop.run());

        Arc::new(Self {
            key,
            members,
            events: events_tx,
            retired: AtomicBool::new(false),
            population,
            attached: AtomicUsize::new(0),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Add a member. Returns once the hub loop has applied the change.
    pub async fn register(&self, member: Member) -> Result<(), HubError> {
        self.admit(member, false).await
    }

    /// Add a member and run the presence introductions in the same step:
    /// one targeted `user-added` per existing participant of another user,
    /// then a session-wide `user-added` for the newcomer.
    pub async fn join(&self, member: Member) -> Result<(), HubError> {
        self.admit(member, true).await
    }

    async fn admit(&self, member: Member, introduce: bool) -> Result<(), HubError> {
        if self.is_retired() {
            return Err(HubError::Retired);
        }

        let (ack, done) = oneshot::channel();
        self.events
            .send(HubEvent::Register {
                member,
                introduce,
                ack,
            })
            .await
            .map_err(|_| HubError::Retired)?;
        done.await.map_err(|_| HubError::Retired)
    }

    /// Remove a member, closing its queue and announcing its departure.
    /// Unknown ids are ignored. Returns once the hub loop has applied it.
    pub async fn unregister(&self, id: ConnectionId) {
        let (ack, done) = oneshot::channel();
        if self
            .events
            .send(HubEvent::Unregister { id, ack })
            .await
            .is_err()
        {
            return;
        }
        let _ = done.await;
    }

    /// Queue a frame for delivery to every member, sender included
    pub async fn broadcast(&self, frame: Frame) -> Result<(), HubError> {
        if self.is_retired() {
            return Err(HubError::Retired);
        }

        self.events
            .send(HubEvent::Broadcast(frame))
            .await
            .map_err(|_| HubError::Retired)
    }

    /// Current membership size, read under the shared lock
    pub async fn member_count(&self) -> usize {
        self.members.read().await.len()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.members.read().await.contains_key(&id)
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Membership size as last published by the hub loop
    pub(crate) fn population(&self) -> usize {
        self.population.load(Ordering::Acquire)
    }

    pub(crate) fn attached(&self) -> usize {
        self.attached.load(Ordering::Acquire)
    }

    pub(crate) fn attach(&self) {
        self.attached.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns the number of leases still attached
    pub(crate) fn detach(&self) -> usize {
        self.attached.fetch_sub(1, Ordering::AcqRel).saturating_sub(1)
    }

    /// Stop the hub loop. Later events are rejected.
    pub(crate) async fn retire(&self) {
        self.retired.store(true, Ordering::Release);
        let _ = self.events.send(HubEvent::Retire).await;
    }
}

impl std::fmt::Debug for SessionHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHub")
            .field("key", &self.key)
            .field("population", &self.population())
            .field("attached", &self.attached())
            .field("retired", &self.is_retired())
            .finish()
    }
}

/// State owned by the hub task
struct HubLoop {
    key: String,
    members: Members,
    events: mpsc::Receiver<HubEvent>,
    population: Arc<AtomicUsize>,
    retirement: RetirementHandle,
}

impl HubLoop {
    async fn run(mut self) {
        tracing::debug!(session = %self.key, "Session hub started");

        while let Some(event) = self.events.recv().await {
            let before = self.population.load(Ordering::Acquire);

            match event {
                HubEvent::Register {
                    member,
                    introduce,
                    ack,
                } => {
                    self.admit(member, introduce).await;
                    let _ = ack.send(());
                }
                HubEvent::Unregister { id, ack } => {
                    self.remove(id).await;
                    let _ = ack.send(());
                }
                HubEvent::Broadcast(frame) => self.fan_out(frame).await,
                HubEvent::Retire => break,
            }

            if before > 0 && self.population.load(Ordering::Acquire) == 0 {
                self.retirement.schedule(&self.key);
            }
        }

        tracing::debug!(session = %self.key, "Session hub stopped");
    }

    async fn admit(&mut self, member: Member, introduce: bool) {
        let newcomer = member.presence.clone();
        {
            let mut members = self.members.write().await;
            if introduce {
                introduce_existing(&self.key, &members, &member);
            }

            tracing::info!(
                session = %self.key,
                connection_id = %member.id,
                user_id = %member.presence.user_id,
                members = members.len() + 1,
                "Client registered"
            );

            members.insert(member.id, member);
            self.population.store(members.len(), Ordering::Release);
        }

        if introduce {
            match presence_frame(MessageKind::UserAdded, &newcomer) {
                Ok(frame) => {
                    self.fan_out(frame).await;
                    tracing::debug!(
                        session = %self.key,
                        user_id = %newcomer.user_id,
                        "Announced new user to all clients"
                    );
                }
                Err(e) => tracing::error!(session = %self.key, error = %e, "Failed to encode new user announcement"),
            }
        }
    }

    async fn remove(&mut self, id: ConnectionId) {
        let removed = {
            let mut members = self.members.write().await;
            let removed = members.remove(&id);
            self.population.store(members.len(), Ordering::Release);
            removed
        };

        let Some(Member { presence, queue, .. }) = removed else {
            tracing::debug!(session = %self.key, connection_id = %id, "Unregister for unknown client ignored");
            return;
        };
        // Releases the hub's producer, closing the queue
        drop(queue);

        tracing::info!(
            session = %self.key,
            connection_id = %id,
            user_id = %presence.user_id,
            "Client disconnected"
        );

        match presence_frame(MessageKind::UserRemoved, &presence) {
            Ok(frame) => self.fan_out(frame).await,
            Err(e) => {
                tracing::error!(session = %self.key, error = %e, "Failed to encode user-removed")
            }
        }
    }

    /// Deliver to every member without waiting; members whose queue is full
    /// are evicted and announced to the rest.
    async fn fan_out(&mut self, frame: Frame) {
        let mut pending = VecDeque::from([frame]);

        while let Some(frame) = pending.pop_front() {
            for evicted in self.deliver(&frame).await {
                tracing::warn!(
                    session = %self.key,
                    connection_id = %evicted.id,
                    user_id = %evicted.presence.user_id,
                    "Client send queue is full, removing client"
                );

                match presence_frame(MessageKind::UserRemoved, &evicted.presence) {
                    Ok(announcement) => pending.push_back(announcement),
                    Err(e) => tracing::error!(
                        session = %self.key,
                        error = %e,
                        "Failed to encode user-removed"
                    ),
                }
            }
        }
    }

    async fn deliver(&mut self, frame: &Frame) -> Vec<Member> {
        let mut members = self.members.write().await;

        let mut stalled = Vec::new();
        for member in members.values() {
            match member.queue.try_enqueue(Frame::clone(frame)) {
                Ok(()) => {}
                Err(EnqueueError::Full) => stalled.push(member.id),
                // Write pump already gone; the read pump will unregister
                Err(EnqueueError::Closed) => {
                    tracing::debug!(session = %self.key, connection_id = %member.id, "Skipping closed queue")
                }
            }
        }

        tracing::trace!(
            session = %self.key,
            members = members.len(),
            stalled = stalled.len(),
            "Broadcast frame"
        );

        let evicted: Vec<Member> = stalled.iter().filter_map(|id| members.remove(id)).collect();
        self.population.store(members.len(), Ordering::Release);
        evicted
    }
}

/// Queue a targeted `user-added` for each existing member onto the
/// newcomer's queue. Other connections of the same user are skipped.
fn introduce_existing(key: &str, members: &HashMap<ConnectionId, Member>, newcomer: &Member) {
    let existing = members
        .values()
        .filter(|m| m.presence.user_id != newcomer.presence.user_id);

    for member in existing {
        let frame = match presence_frame(MessageKind::UserAdded, &member.presence) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(session = %key, error = %e, "Failed to encode existing user");
                continue;
            }
        };

        if let Err(e) = newcomer.queue.try_enqueue(frame) {
            tracing::warn!(
                session = %key,
                connection_id = %newcomer.id,
                error = %e,
                "Could not send existing user to new client"
            );
            break;
        }
        tracing::debug!(
            session = %key,
            connection_id = %newcomer.id,
            existing = %member.presence.user_id,
            "Sent existing user data to new client"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::{outbound_queue, OutboundReceiver};

    fn presence(user: &str) -> Presence {
        Presence {
            user_id: format!("{}@example.com", user),
            user_name: user.to_string(),
            user_color: "#000075".to_string(),
        }
    }

    fn member(user: &str, capacity: usize) -> (Member, OutboundReceiver) {
        let (tx, rx) = outbound_queue(capacity);
        (Member::new(presence(user), tx), rx)
    }

    fn kind_of(frame: &str) -> String {
        let value: serde_json::Value = serde_json::from_str(frame).unwrap();
        value["type"].as_str().unwrap().to_string()
    }

    fn user_of(frame: &str) -> String {
        let value: serde_json::Value = serde_json::from_str(frame).unwrap();
        value["data"]["userData"]["userId"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_register_unregister() {
        let hub = SessionHub::new("s1", 16);
        let (a, _rx) = member("ada", 8);
        let id = a.id;

        hub.register(a).await.unwrap();
        assert_eq!(hub.member_count().await, 1);
        assert!(hub.contains(id).await);

        hub.unregister(id).await;
        assert_eq!(hub.member_count().await, 0);
        assert!(!hub.contains(id).await);
    }

    #[tokio::test]
    async fn test_concurrent_registers_converge() {
        let hub = SessionHub::new("s1", 4);
        let mut receivers = Vec::new();
        let mut tasks = Vec::new();

        for i in 0..25 {
            let (m, rx) = member(&format!("user{}", i), 8);
            receivers.push(rx);
            let hub = Arc::clone(&hub);
            tasks.push(tokio::spawn(async move { hub.register(m).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(hub.member_count().await, 25);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_member_including_sender() {
        let hub = SessionHub::new("s1", 16);
        let (a, mut rx_a) = member("ada", 8);
        let (b, mut rx_b) = member("bob", 8);
        hub.register(a).await.unwrap();
        hub.register(b).await.unwrap();

        hub.broadcast(Frame::from(r#"{"type":"cursor","data":1}"#))
            .await
            .unwrap();
        // Rendezvous on a later event so the broadcast has been processed
        hub.unregister(Uuid::new_v4()).await;

        assert_eq!(rx_a.try_next().as_deref(), Some(r#"{"type":"cursor","data":1}"#));
        assert_eq!(rx_b.try_next().as_deref(), Some(r#"{"type":"cursor","data":1}"#));
    }

    #[tokio::test]
    async fn test_unregister_announces_once_and_closes_queue() {
        let hub = SessionHub::new("s1", 16);
        let (a, mut rx_a) = member("ada", 8);
        let (b, mut rx_b) = member("bob", 8);
        let b_id = b.id;
        hub.register(a).await.unwrap();
        hub.register(b).await.unwrap();

        hub.unregister(b_id).await;
        hub.unregister(b_id).await;

        let frame = rx_a.try_next().unwrap();
        assert_eq!(kind_of(&frame), "user-removed");
        assert_eq!(user_of(&frame), "bob@example.com");
        assert!(rx_a.try_next().is_none());

        // The departing member's queue is closed and empty
        assert!(rx_b.next().await.is_none());
    }

    #[tokio::test]
    async fn test_full_queue_evicts_only_slow_member() {
        let hub = SessionHub::new("s1", 16);
        let (fast, mut rx_fast) = member("fast", 8);
        let (slow, mut rx_slow) = member("slow", 1);
        let slow_id = slow.id;
        hub.register(fast).await.unwrap();
        hub.register(slow).await.unwrap();

        hub.broadcast(Frame::from("one")).await.unwrap();
        hub.broadcast(Frame::from("two")).await.unwrap();
        hub.unregister(Uuid::new_v4()).await;

        assert!(!hub.contains(slow_id).await);
        assert_eq!(hub.member_count().await, 1);

        assert_eq!(rx_fast.try_next().as_deref(), Some("one"));
        assert_eq!(rx_fast.try_next().as_deref(), Some("two"));
        let removed = rx_fast.try_next().unwrap();
        assert_eq!(kind_of(&removed), "user-removed");
        assert_eq!(user_of(&removed), "slow@example.com");

        // Slow member got what fit, then its queue closed
        assert_eq!(rx_slow.next().await.as_deref(), Some("one"));
        assert!(rx_slow.next().await.is_none());

        // A later unregister for the evicted member is a no-op
        hub.unregister(slow_id).await;
        assert!(rx_fast.try_next().is_none());
    }

    #[tokio::test]
    async fn test_join_introduces_before_queued_broadcasts() {
        let hub = SessionHub::new("s1", 16);
        let (a, _rx_a) = member("ada", 8);
        let (b, mut rx_b) = member("bob", 8);
        hub.join(a).await.unwrap();

        // Queued ahead of bob's join, processed after it
        let (c, _rx_c) = member("cy", 8);
        let (joined, ()) = tokio::join!(hub.join(b), async {
            hub.broadcast(Frame::from(r#"{"type":"cursor","data":1}"#))
                .await
                .unwrap();
            hub.join(c).await.unwrap();
        });
        joined.unwrap();
        hub.unregister(Uuid::new_v4()).await;

        let mut seen = Vec::new();
        while let Some(frame) = rx_b.try_next() {
            seen.push(frame.to_string());
        }
        let bob_added = seen
            .iter()
            .position(|f| f.contains("user-added") && user_of(f) == "bob@example.com")
            .unwrap();

        // Existing members come first, then bob's own announcement
        assert!(seen[..bob_added]
            .iter()
            .all(|f| kind_of(f) == "user-added" && user_of(f) != "bob@example.com"));
        assert!(seen[..bob_added].iter().any(|f| user_of(f) == "ada@example.com"));

        // Cy is announced to bob exactly once
        let cy_count = seen
            .iter()
            .filter(|f| f.contains("user-added") && user_of(f) == "cy@example.com")
            .count();
        assert_eq!(cy_count, 1);
    }

    #[tokio::test]
    async fn test_join_skips_other_connections_of_same_user() {
        let hub = SessionHub::new("s1", 16);
        let (first_tab, _rx1) = member("ada", 8);
        let (second_tab, mut rx2) = member("ada", 8);
        hub.join(first_tab).await.unwrap();
        hub.join(second_tab).await.unwrap();

        let frame = rx2.try_next().unwrap();
        assert_eq!(kind_of(&frame), "user-added");
        assert_eq!(user_of(&frame), "ada@example.com");
        assert!(rx2.try_next().is_none());
    }

    #[tokio::test]
    async fn test_retired_hub_rejects_events() {
        let hub = SessionHub::new("s1", 16);
        hub.retire().await;

        let (a, _rx) = member("ada", 8);
        assert_eq!(hub.register(a).await, Err(HubError::Retired));
        assert_eq!(
            hub.broadcast(Frame::from("x")).await,
            Err(HubError::Retired)
        );
        assert!(hub.is_retired());
    }
}
