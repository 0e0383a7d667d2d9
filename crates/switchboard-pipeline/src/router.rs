//! Routing: resolve an event to its ordered list of platform targets.
//!
//! The router holds two read-mostly caches populated at construction:
//! active platforms (by id and by code) and active routing rules grouped by
//! event type. `reload()` swaps both atomically and is meant for admin use,
//! not for workers under load.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use switchboard_core::{Event, EventType, PlatformDefinition, PlatformType, RoutingRule};

use crate::error::Result;
use crate::store::Store;

struct RouterCache {
    platforms_by_id: HashMap<i64, PlatformDefinition>,
    platforms_by_code: HashMap<String, PlatformDefinition>,
    rules_by_event_type: HashMap<EventType, Vec<RoutingRule>>,
}

/// Cached rule evaluation for fan-out target selection.
pub struct Router {
    store: Arc<Store>,
    cache: RwLock<RouterCache>,
}

impl Router {
    /// Build a router with caches loaded from the store.
    pub fn new(store: Arc<Store>) -> Result<Self> {
        let cache = Self::load(&store)?;
        Ok(Router {
            store,
            cache: RwLock::new(cache),
        })
    }

    fn load(store: &Store) -> Result<RouterCache> {
        let platforms = store.list_platforms(true)?;
        let mut platforms_by_id = HashMap::new();
        let mut platforms_by_code = HashMap::new();
        for platform in platforms {
            platforms_by_code.insert(platform.platform_code.clone(), platform.clone());
            platforms_by_id.insert(platform.id, platform);
        }

        let mut rules_by_event_type: HashMap<EventType, Vec<RoutingRule>> = HashMap::new();
        for rule in store.list_routing_rules()? {
            rules_by_event_type
                .entry(rule.event_type)
                .or_default()
                .push(rule);
        }
        // Store order is already priority ascending; keep it stable per type.

        tracing::debug!(
            platforms = platforms_by_id.len(),
            rule_types = rules_by_event_type.len(),
            "router caches loaded"
        );

        Ok(RouterCache {
            platforms_by_id,
            platforms_by_code,
            rules_by_event_type,
        })
    }

    /// Reload both caches from the store.
    pub fn reload(&self) -> Result<()> {
        let fresh = Self::load(&self.store)?;
        *self.cache.write() = fresh;
        Ok(())
    }

    /// Resolve the ordered platform targets for an event.
    ///
    /// Rules for the event's type are evaluated in ascending rule-priority
    /// order; matches referencing an active platform are deduped by
    /// platform id, and the rule ordering is what the result keeps: the
    /// first (highest-priority) rule to claim a platform decides its place
    /// in the fan-out. Deterministic for a fixed cache.
    pub fn routes_for_event(&self, event: &Event) -> Vec<PlatformDefinition> {
        let cache = self.cache.read();
        let Some(rules) = cache.rules_by_event_type.get(&event.event_type) else {
            return Vec::new();
        };

        let mut seen = Vec::new();
        let mut targets: Vec<PlatformDefinition> = Vec::new();
        for rule in rules {
            if !rule.matches(event) {
                continue;
            }
            let Some(platform) = cache.platforms_by_id.get(&rule.platform_id) else {
                // Inactive or deleted platform: the rule is a no-op.
                continue;
            };
            if seen.contains(&platform.id) {
                continue;
            }
            seen.push(platform.id);
            targets.push(platform.clone());
        }

        targets
    }

    /// Fetch an active platform by id (cache only).
    pub fn platform_by_id(&self, id: i64) -> Option<PlatformDefinition> {
        self.cache.read().platforms_by_id.get(&id).cloned()
    }

    /// Fetch an active platform by code (cache only).
    pub fn platform_by_code(&self, code: &str) -> Option<PlatformDefinition> {
        self.cache.read().platforms_by_code.get(code).cloned()
    }

    /// The active validation platform, if one is configured.
    pub fn validation_platform(&self) -> Option<PlatformDefinition> {
        let cache = self.cache.read();
        cache
            .platforms_by_code
            .get("zerobounce")
            .or_else(|| {
                cache
                    .platforms_by_id
                    .values()
                    .find(|p| p.platform_type == PlatformType::Validation)
            })
            .cloned()
    }

    /// Number of active platforms (health check).
    pub fn active_platform_count(&self) -> usize {
        self.cache.read().platforms_by_id.len()
    }
}
