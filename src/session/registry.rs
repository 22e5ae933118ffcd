//! Session Registry
//!
//! Maps session keys to live hubs. Hubs are created on first join and
//! retired once they have stayed empty for the grace period.
//!
//! Every caller of [`SessionRegistry::get_or_create`] holds a
//! [`SessionLease`] for as long as it uses the hub. Attaching a lease and the
//! retirement check both run under the registry lock, so a session is never
//! retired between a join looking it up and that join registering.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::time::Instant;

use super::hub::SessionHub;
use crate::config::HubConfig;

struct RegistryEntry {
    hub: Arc<SessionHub>,
    retirement_pending: bool,
    /// Last time the session became unused; the grace period runs from here
    emptied_at: Option<Instant>,
}

/// What a retirement timer should do when it fires
enum Retirement {
    Retire(Arc<SessionHub>),
    Wait(Duration),
    Keep,
}

pub(crate) struct RegistryInner {
    sessions: Mutex<HashMap<String, RegistryEntry>>,
    config: HubConfig,
}

/// Owner of every live session hub
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub fn new(config: HubConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: Mutex::new(HashMap::new()),
                config,
            }),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Lease the hub for `key`, starting one if the session is not live
    pub fn get_or_create(&self, key: &str) -> SessionLease {
        let mut sessions = self.inner.lock();

        let entry = sessions.entry(key.to_string()).or_insert_with(|| {
            tracing::info!(session = %key, "Created new session hub");
            RegistryEntry {
                hub: SessionHub::spawn(
                    key.to_string(),
                    self.inner.config.event_capacity,
                    RetirementHandle {
                        registry: Arc::downgrade(&self.inner),
                    },
                ),
                retirement_pending: false,
                emptied_at: None,
            }
        });
        entry.hub.attach();

        SessionLease {
            hub: Arc::clone(&entry.hub),
            registry: Arc::clone(&self.inner),
        }
    }

    /// Live hub for `key`, without leasing it
    pub fn get(&self, key: &str) -> Option<Arc<SessionHub>> {
        self.inner.lock().get(key).map(|e| Arc::clone(&e.hub))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().contains_key(key)
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().len()
    }

    /// Total members across all live sessions
    pub async fn connection_count(&self) -> usize {
        let hubs: Vec<Arc<SessionHub>> = self
            .inner
            .lock()
            .values()
            .map(|e| Arc::clone(&e.hub))
            .collect();

        let mut total = 0;
        for hub in hubs {
            total += hub.member_count().await;
        }
        total
    }

    /// Retire `key` after the grace period if it is still unused by then
    pub fn schedule_retirement(&self, key: &str) {
        self.inner.schedule_retirement(key);
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl RegistryInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, RegistryEntry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule_retirement(self: &Arc<Self>, key: &str) {
        let mut sessions = self.lock();
        self.schedule_locked(&mut sessions, key);
    }

    fn schedule_locked(self: &Arc<Self>, sessions: &mut HashMap<String, RegistryEntry>, key: &str) {
        let Some(entry) = sessions.get_mut(key) else {
            return;
        };
        entry.emptied_at = Some(Instant::now());
        if entry.retirement_pending {
            tracing::debug!(session = %key, "Retirement already scheduled, grace period restarted");
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(session = %key, "No runtime available, retirement skipped");
            return;
        };
        entry.retirement_pending = true;

        let registry = Arc::clone(self);
        let key = key.to_string();
        let mut delay = self.config.grace_period();
        tracing::debug!(session = %key, grace_ms = delay.as_millis() as u64, "Retirement scheduled");

        runtime.spawn(async move {
            loop {
                tokio::time::sleep(delay).await;
                match registry.check_retirement(&key) {
                    Retirement::Wait(remaining) => delay = remaining,
                    Retirement::Keep => break,
                    Retirement::Retire(hub) => {
                        hub.retire().await;
                        tracing::info!(session = %key, "Cleaned up empty session hub");
                        break;
                    }
                }
            }
        });
    }

    fn check_retirement(&self, key: &str) -> Retirement {
        let mut sessions = self.lock();
        let Some(entry) = sessions.get_mut(key) else {
            return Retirement::Keep;
        };

        if entry.hub.attached() > 0 || entry.hub.population() > 0 {
            tracing::debug!(
                session = %key,
                attached = entry.hub.attached(),
                members = entry.hub.population(),
                "Session in use again, not retiring"
            );
            entry.retirement_pending = false;
            return Retirement::Keep;
        }

        let deadline = entry
            .emptied_at
            .map(|at| at + self.config.grace_period())
            .unwrap_or_else(Instant::now);
        let now = Instant::now();
        if deadline > now {
            tracing::debug!(
                session = %key,
                remaining_ms = (deadline - now).as_millis() as u64,
                "Session emptied again recently, retirement deferred"
            );
            return Retirement::Wait(deadline - now);
        }

        match sessions.remove(key) {
            Some(entry) => Retirement::Retire(entry.hub),
            None => Retirement::Keep,
        }
    }
}

/// Lets a hub ask its registry to schedule retirement
#[derive(Clone)]
pub(crate) struct RetirementHandle {
    registry: Weak<RegistryInner>,
}

impl RetirementHandle {
    /// A handle for hubs that no registry tracks
    pub(crate) fn detached() -> Self {
        Self {
            registry: Weak::new(),
        }
    }

    pub(crate) fn schedule(&self, key: &str) {
        if let Some(registry) = self.registry.upgrade() {
            registry.schedule_retirement(key);
        }
    }
}

/// A hub held on behalf of one connection; keeps the session from being
/// retired while it lives
pub struct SessionLease {
    hub: Arc<SessionHub>,
    registry: Arc<RegistryInner>,
}

impl SessionLease {
    pub fn hub(&self) -> &Arc<SessionHub> {
        &self.hub
    }
}

impl Deref for SessionLease {
    type Target = SessionHub;

    fn deref(&self) -> &SessionHub {
        &self.hub
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        let mut sessions = self.registry.lock();
        if self.hub.detach() > 0 {
            return;
        }

        let still_live = sessions
            .get(self.hub.key())
            .is_some_and(|e| Arc::ptr_eq(&e.hub, &self.hub));
        if still_live && self.hub.population() == 0 {
            self.registry
                .schedule_locked(&mut sessions, self.hub.key());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::hub::Member;
    use crate::websocket::{outbound_queue, OutboundReceiver, Presence};
    use std::time::Duration;

    fn registry(grace_ms: u64) -> SessionRegistry {
        SessionRegistry::new(HubConfig {
            grace_period_ms: grace_ms,
            ..HubConfig::default()
        })
    }

    fn member(user: &str) -> (Member, OutboundReceiver) {
        let (tx, rx) = outbound_queue(16);
        let presence = Presence {
            user_id: user.to_string(),
            user_name: user.to_string(),
            user_color: "#3cb44b".to_string(),
        };
        (Member::new(presence, tx), rx)
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_live_hub() {
        let registry = registry(50);
        let first = registry.get_or_create("s1");
        let second = registry.get_or_create("s1");
        let other = registry.get_or_create("s2");

        assert!(Arc::ptr_eq(first.hub(), second.hub()));
        assert!(!Arc::ptr_eq(first.hub(), other.hub()));
        assert_eq!(registry.session_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_first_joins_share_one_hub() {
        let registry = Arc::new(registry(50));
        let mut tasks = Vec::new();

        for i in 0..20 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let (m, rx) = member(&format!("user{}", i));
                let lease = registry.get_or_create("shared");
                lease.register(m).await.unwrap();
                (lease, rx)
            }));
        }

        let mut held = Vec::new();
        for task in tasks {
            held.push(task.await.unwrap());
        }

        assert_eq!(registry.session_count(), 1);
        for (lease, _) in &held {
            assert!(Arc::ptr_eq(lease.hub(), held[0].0.hub()));
        }
        assert_eq!(registry.connection_count().await, 20);
    }

    #[tokio::test]
    async fn test_empty_session_retired_after_grace() {
        let registry = registry(50);
        let lease = registry.get_or_create("s1");
        let (m, _rx) = member("ada");
        let id = m.id;
        lease.register(m).await.unwrap();
        let hub = Arc::clone(lease.hub());

        lease.unregister(id).await;
        drop(lease);
        assert!(registry.contains("s1"));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!registry.contains("s1"));
        assert!(hub.is_retired());

        // A later join starts over with a fresh hub
        let fresh = registry.get_or_create("s1");
        assert!(!Arc::ptr_eq(fresh.hub(), &hub));
        assert_eq!(fresh.member_count().await, 0);
    }

    #[tokio::test]
    async fn test_rejoin_within_grace_keeps_same_hub() {
        let registry = registry(100);
        let lease = registry.get_or_create("s1");
        let (m, _rx) = member("ada");
        let id = m.id;
        lease.register(m).await.unwrap();
        let original = Arc::clone(lease.hub());
        lease.unregister(id).await;
        drop(lease);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let rejoin = registry.get_or_create("s1");
        assert!(Arc::ptr_eq(rejoin.hub(), &original));
        let (m, _rx2) = member("ada");
        rejoin.register(m).await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(registry.contains("s1"));
        assert!(!original.is_retired());
        assert_eq!(rejoin.member_count().await, 1);
    }

    #[tokio::test]
    async fn test_grace_period_counts_from_last_departure() {
        let registry = registry(300);
        let lease = registry.get_or_create("s1");
        let (m, _rx) = member("ada");
        let id = m.id;
        lease.register(m).await.unwrap();
        lease.unregister(id).await;
        drop(lease);

        // Back briefly, then gone again 100ms into the first grace period
        tokio::time::sleep(Duration::from_millis(50)).await;
        let rejoin = registry.get_or_create("s1");
        let (m, _rx2) = member("ada");
        let id = m.id;
        rejoin.register(m).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        rejoin.unregister(id).await;
        drop(rejoin);

        // Past the first timer, short of a full grace since the last departure
        tokio::time::sleep(Duration::from_millis(240)).await;
        assert!(registry.contains("s1"));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!registry.contains("s1"));
    }

    #[tokio::test]
    async fn test_unused_lease_schedules_retirement() {
        let registry = registry(50);
        drop(registry.get_or_create("s1"));
        assert!(registry.contains("s1"));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!registry.contains("s1"));
    }

    #[tokio::test]
    async fn test_held_lease_blocks_retirement() {
        let registry = registry(50);
        let lease = registry.get_or_create("s1");
        registry.schedule_retirement("s1");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(registry.contains("s1"));
        assert!(!lease.is_retired());
    }
}
