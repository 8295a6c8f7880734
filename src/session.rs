//! Session accessor consumed by the session-attribute resolver.
//!
//! Only an in-process store ships here; clustering is left to whatever
//! implements [`Session`] on top of a shared backend.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Read/write access to one client's session attributes.
pub trait Session: Send + Sync {
    fn id(&self) -> &str;
    fn get(&self, name: &str) -> Option<Value>;
    fn set(&self, name: &str, value: Value);
    fn remove(&self, name: &str) -> Option<Value>;
}

/// Session held in memory for the lifetime of the process.
#[derive(Debug)]
pub struct InMemorySession {
    id: String,
    attributes: DashMap<String, Value>,
}

impl InMemorySession {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: DashMap::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl Session for InMemorySession {
    fn id(&self) -> &str {
        &self.id
    }

    fn get(&self, name: &str) -> Option<Value> {
        self.attributes.get(name).map(|v| v.value().clone())
    }

    fn set(&self, name: &str, value: Value) {
        self.attributes.insert(name.to_string(), value);
    }

    fn remove(&self, name: &str) -> Option<Value> {
        self.attributes.remove(name).map(|(_, v)| v)
    }
}

/// Sessions keyed by id (ULID strings).
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<InMemorySession>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh session with a generated id.
    pub fn create(&self) -> Arc<InMemorySession> {
        let id = ulid::Ulid::new().to_string();
        let session = Arc::new(InMemorySession::new(id.clone()));
        self.sessions.insert(id.clone(), Arc::clone(&session));
        debug!(session_id = %id, "Session created");
        session
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<InMemorySession>> {
        self.sessions.get(id).map(|s| Arc::clone(s.value()))
    }

    /// Existing session for `id`, or a new one when unknown or absent.
    pub fn get_or_create(&self, id: Option<&str>) -> Arc<InMemorySession> {
        id.and_then(|id| self.get(id))
            .unwrap_or_else(|| self.create())
    }

    /// Drop a session; unknown ids are ignored.
    pub fn invalidate(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            debug!(session_id = %id, "Session invalidated");
        }
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_attributes() {
        let session = InMemorySession::new("s1");
        assert_eq!(session.get("user"), None);
        session.set("user", json!({"name": "ada"}));
        assert_eq!(session.get("user"), Some(json!({"name": "ada"})));
        assert_eq!(session.remove("user"), Some(json!({"name": "ada"})));
        assert!(session.is_empty());
    }

    #[test]
    fn test_store_lifecycle() {
        let store = SessionStore::new();
        let s = store.create();
        s.set("k", json!(1));
        let again = store.get_or_create(Some(s.id()));
        assert_eq!(again.get("k"), Some(json!(1)));
        assert!(store.invalidate(s.id()));
        assert!(!store.invalidate(s.id()));
        let fresh = store.get_or_create(Some("unknown"));
        assert_ne!(fresh.id(), "unknown");
        assert_eq!(store.len(), 1);
    }
}
