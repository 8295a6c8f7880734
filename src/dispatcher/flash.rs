use dashmap::DashMap;
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::ids::FlashId;

/// Default lifetime of a stored flash map.
pub const DEFAULT_FLASH_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Clone)]
struct FlashMap {
    target_path: String,
    attributes: Map<String, Value>,
    expires_at: Instant,
}

/// Attributes carried across a redirect.
///
/// A stored map is handed out once, to the first request for its target
/// path; requests to other paths leave it in place until it expires.
#[derive(Debug)]
pub struct FlashMapManager {
    maps: DashMap<FlashId, FlashMap>,
    timeout: Duration,
}

impl Default for FlashMapManager {
    fn default() -> Self {
        Self::new(DEFAULT_FLASH_TIMEOUT)
    }
}

fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

impl FlashMapManager {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            maps: DashMap::new(),
            timeout,
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Store attributes for the next request to `target`.
    pub fn save(&self, target: &str, attributes: Map<String, Value>) -> FlashId {
        self.purge_expired();
        let id = FlashId::new();
        let target_path = normalize(target).to_string();
        debug!(
            flash_id = %id,
            target_path = %target_path,
            attributes = attributes.len(),
            "Flash attributes saved"
        );
        self.maps.insert(
            id,
            FlashMap {
                target_path,
                attributes,
                expires_at: Instant::now() + self.timeout,
            },
        );
        id
    }

    /// Take the attributes stored under `id` if `request_path` is their
    /// target. Expired or unknown ids yield `None`.
    pub fn take(&self, id: &str, request_path: &str) -> Option<Map<String, Value>> {
        let id: FlashId = id.parse().ok()?;
        let path = normalize(request_path);
        let (_, flash) = self
            .maps
            .remove_if(&id, |_, f| f.expires_at <= Instant::now() || f.target_path == path)?;
        if flash.expires_at <= Instant::now() {
            debug!(flash_id = %id, "Expired flash attributes discarded");
            return None;
        }
        debug!(flash_id = %id, target_path = %flash.target_path, "Flash attributes restored");
        Some(flash.attributes)
    }

    /// Drop expired entries.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.maps.retain(|_, f| f.expires_at > now);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs() -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("message".into(), json!("saved"));
        m
    }

    #[test]
    fn test_taken_once_by_target() {
        let mgr = FlashMapManager::default();
        let id = mgr.save("/items/7?tab=1", attrs());
        assert!(mgr.take(&id.to_string(), "/other").is_none());
        assert_eq!(mgr.len(), 1);
        let got = mgr.take(&id.to_string(), "/items/7/").unwrap();
        assert_eq!(got["message"], "saved");
        assert!(mgr.take(&id.to_string(), "/items/7").is_none());
    }

    #[test]
    fn test_expired_not_returned() {
        let mgr = FlashMapManager::new(Duration::from_millis(0));
        let id = mgr.save("/a", attrs());
        assert!(mgr.take(&id.to_string(), "/a").is_none());
        assert!(mgr.is_empty());
    }

    #[test]
    fn test_garbage_id() {
        let mgr = FlashMapManager::default();
        assert!(mgr.take("not-a-ulid", "/").is_none());
    }
}
