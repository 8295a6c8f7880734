use arc_swap::ArcSwap;
use http::Method;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::error::RegistrationError;
use crate::ids::RouteId;
use crate::mapping::{MappingKey, RouteDescriptor};

/// A route as stored in the table.
#[derive(Debug, Clone)]
pub struct RegisteredRoute {
    pub id: RouteId,
    pub route: Arc<RouteDescriptor>,
    key: Arc<MappingKey>,
}

impl RegisteredRoute {
    #[must_use]
    pub fn mapping_key(&self) -> &MappingKey {
        &self.key
    }
}

/// Immutable snapshot of the registered routes.
///
/// Cheap to clone and can be iterated any number of times; later
/// registrations do not affect an existing snapshot.
#[derive(Debug, Clone, Default)]
pub struct Routes(Arc<Vec<RegisteredRoute>>);

impl Routes {
    pub fn iter(&self) -> std::slice::Iter<'_, RegisteredRoute> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a Routes {
    type Item = &'a RegisteredRoute;
    type IntoIter = std::slice::Iter<'a, RegisteredRoute>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Registered mappings, published as copy-on-write snapshots.
///
/// Readers load the current snapshot without locking; writers serialize on
/// a mutex, build a new vector and swap it in, so a reader never observes a
/// half-applied change.
pub struct RouteTable {
    snapshot: ArcSwap<Vec<RegisteredRoute>>,
    write_lock: Mutex<()>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable").field("routes", &self.len()).finish()
    }
}

// Empty method sets mean "any method" and overlap with everything.
fn methods_overlap(a: &[Method], b: &[Method]) -> bool {
    a.is_empty() || b.is_empty() || a.iter().any(|m| b.contains(m))
}

impl RouteTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Vec::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Add a route; visible to matching as soon as this returns.
    ///
    /// Registering the same handler for an identical mapping again returns
    /// the existing id.
    ///
    /// # Errors
    ///
    /// - `DuplicateRoute`: identical mapping bound to another handler
    /// - `AmbiguousMapping`: same shape and conditions, overlapping but
    ///   different method sets
    pub fn register(&self, route: RouteDescriptor) -> Result<RouteId, RegistrationError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let current = self.snapshot.load_full();
        let key = route.mapping_key();

        for existing in current.iter().filter(|r| *r.key == key) {
            let existing_route = &existing.route;
            if existing_route.methods() == route.methods() {
                if existing_route.handler() == route.handler() {
                    debug!(
                        route_id = %existing.id,
                        mapping = %route.describe(),
                        "Route already registered for this handler"
                    );
                    return Ok(existing.id);
                }
                // RT2: Duplicate mapping rejected
                warn!(
                    mapping = %route.describe(),
                    existing = %existing_route.handler(),
                    attempted = %route.handler(),
                    "Duplicate mapping rejected"
                );
                return Err(RegistrationError::DuplicateRoute {
                    mapping: route.describe(),
                    existing: existing_route.handler().name().to_string(),
                    attempted: route.handler().name().to_string(),
                });
            }
            if methods_overlap(existing_route.methods(), route.methods()) {
                warn!(
                    mapping = %route.describe(),
                    existing = %existing_route.describe(),
                    "Ambiguous mapping rejected"
                );
                return Err(RegistrationError::AmbiguousMapping {
                    mapping: route.describe(),
                    existing: existing_route.handler().name().to_string(),
                    attempted: route.handler().name().to_string(),
                });
            }
        }

        let id = RouteId::next();
        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        let mapping = route.describe();
        let handler = route.handler().name().to_string();
        next.push(RegisteredRoute {
            id,
            route: Arc::new(route),
            key: Arc::new(key),
        });
        let total = next.len();
        self.snapshot.store(Arc::new(next));

        // RT1: Route registered
        info!(
            route_id = %id,
            mapping = %mapping,
            handler = %handler,
            total_routes = total,
            "Route registered"
        );
        Ok(id)
    }

    /// Remove a route. Unknown ids are ignored and return `false`.
    pub fn unregister(&self, id: RouteId) -> bool {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let current = self.snapshot.load_full();
        if !current.iter().any(|r| r.id == id) {
            debug!(route_id = %id, "Unregister of unknown route ignored");
            return false;
        }
        let next: Vec<RegisteredRoute> = current.iter().filter(|r| r.id != id).cloned().collect();
        let total = next.len();
        self.snapshot.store(Arc::new(next));
        // RT3: Route unregistered
        info!(route_id = %id, total_routes = total, "Route unregistered");
        true
    }

    /// Current snapshot.
    #[must_use]
    pub fn all_routes(&self) -> Routes {
        Routes(self.snapshot.load_full())
    }

    #[must_use]
    pub fn get(&self, id: RouteId) -> Option<RegisteredRoute> {
        self.snapshot.load().iter().find(|r| r.id == id).cloned()
    }

    /// Reverse lookup by route name (first registered wins).
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<RegisteredRoute> {
        self.snapshot
            .load()
            .iter()
            .find(|r| r.route.name() == Some(name))
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }
}
