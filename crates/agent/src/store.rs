use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::message::Message;

/// Identity of one conversation. Owner and session are compared as separate
/// parts; the `"{owner_id}-{session_id}"` form is for display only.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionKey {
    owner_id: String,
    session_id: String,
}

impl SessionKey {
    pub fn new(owner_id: &str, session_id: &str) -> Self {
        Self { owner_id: owner_id.to_string(), session_id: session_id.to_string() }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.owner_id, self.session_id)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conversation store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get(&self, key: &SessionKey) -> Result<Option<Vec<Message>>, StoreError>;
    async fn put(&self, key: &SessionKey, messages: Vec<Message>) -> Result<(), StoreError>;
    /// Removing an absent key is not an error.
    async fn delete(&self, key: &SessionKey) -> Result<(), StoreError>;
}

/// Process-lifetime store; everything is lost on restart.
#[derive(Default)]
pub struct InMemoryConversationStore {
    sessions: RwLock<HashMap<SessionKey, Vec<Message>>>,
}

impl InMemoryConversationStore {
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get(&self, key: &SessionKey) -> Result<Option<Vec<Message>>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(key).cloned())
    }

    async fn put(&self, key: &SessionKey, messages: Vec<Message>) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(key.clone(), messages);
        Ok(())
    }

    async fn delete(&self, key: &SessionKey) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(key);
        Ok(())
    }
}

/// One async mutex per conversation key, so turns on the same conversation run
/// one after another while different conversations never contend.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    /// Waits until no other turn holds the key. The lock is released when the
    /// guard drops.
    pub async fn acquire(&self, key: &SessionKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(key.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub async fn session_count(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Forgets keys nobody is holding or waiting on.
    pub async fn prune_idle(&self) {
        let mut locks = self.locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::{ConversationStore, InMemoryConversationStore, SessionKey, SessionLocks};
    use crate::message::Message;

    #[test]
    fn key_displays_owner_and_session() {
        assert_eq!(SessionKey::new("owner-1", "abc").to_string(), "owner-1-abc");
    }

    #[test]
    fn dashed_ids_that_render_alike_are_distinct_keys() {
        let left = SessionKey::new("acme", "x-secret");
        let right = SessionKey::new("acme-x", "secret");

        assert_eq!(left.to_string(), right.to_string());
        assert_ne!(left, right);
    }

    #[tokio::test]
    async fn store_keeps_dashed_conversations_apart() {
        let store = InMemoryConversationStore::default();
        store
            .put(&SessionKey::new("acme", "x-secret"), vec![Message::user("private")])
            .await
            .expect("put");

        assert!(store.get(&SessionKey::new("acme-x", "secret")).await.expect("get").is_none());
        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemoryConversationStore::default();
        let key = SessionKey::new("o", "s");

        store.put(&key, vec![Message::user("hi")]).await.expect("put");
        assert_eq!(store.get(&key).await.expect("get").map(|m| m.len()), Some(1));

        store.delete(&key).await.expect("first delete");
        store.delete(&key).await.expect("second delete");
        assert!(store.get(&key).await.expect("get").is_none());
        assert_eq!(store.session_count().await, 0);
    }

    #[tokio::test]
    async fn same_key_is_exclusive_other_keys_are_not() {
        let locks = Arc::new(SessionLocks::default());
        let key = SessionKey::new("o", "s");
        let guard = locks.acquire(&key).await;

        let other = tokio::time::timeout(
            Duration::from_millis(50),
            locks.acquire(&SessionKey::new("o", "other")),
        )
        .await;
        assert!(other.is_ok(), "different key must not wait");

        let same = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&key)).await;
        assert!(same.is_err(), "same key must wait for the holder");

        drop(guard);
        let same = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&key)).await;
        assert!(same.is_ok());
    }

    #[tokio::test]
    async fn prune_idle_forgets_released_keys() {
        let locks = SessionLocks::default();
        let held = locks.acquire(&SessionKey::new("o", "held")).await;
        drop(locks.acquire(&SessionKey::new("o", "idle")).await);

        locks.prune_idle().await;
        assert_eq!(locks.session_count().await, 1);
        drop(held);
    }
}
