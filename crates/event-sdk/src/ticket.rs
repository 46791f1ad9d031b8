//! Process-wide app-ticket cache.
//!
//! The server pushes a fresh `app_ticket` periodically.  Tickets are kept
//! per app id and shared by every client in the process, so several
//! clients for the same app see one refreshed value.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Typed key inside a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey(&'static str);

const APP_TICKET: CacheKey = CacheKey("app-ticket");

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

/// Key/value store namespaced by app id, with optional per-entry TTL.
#[derive(Default)]
struct NamespacedCache {
    entries: RwLock<HashMap<(String, CacheKey), Entry>>,
}

impl NamespacedCache {
    fn set(&self, namespace: &str, key: CacheKey, value: String, ttl: Option<Duration>) {
        let entry = Entry {
            value,
            expires_at: ttl.map(|t| Instant::now() + t),
        };
        self.entries
            .write()
            .insert((namespace.to_string(), key), entry);
    }

    fn get(&self, namespace: &str, key: CacheKey) -> Option<String> {
        let slot = (namespace.to_string(), key);
        {
            let entries = self.entries.read();
            match entries.get(&slot) {
                Some(e) if e.is_live() => return Some(e.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.entries.write().remove(&slot);
        None
    }
}

static CACHE: LazyLock<NamespacedCache> = LazyLock::new(NamespacedCache::default);

/// Cache `ticket` for `app_id`, replacing any earlier value.
pub fn store_app_ticket(app_id: &str, ticket: impl Into<String>) {
    CACHE.set(app_id, APP_TICKET, ticket.into(), None);
}

/// Like [`store_app_ticket`], evicting the value after `ttl`.
pub fn store_app_ticket_with_ttl(app_id: &str, ticket: impl Into<String>, ttl: Duration) {
    CACHE.set(app_id, APP_TICKET, ticket.into(), Some(ttl));
}

/// The most recent unexpired ticket for `app_id`.
pub fn app_ticket(app_id: &str) -> Option<String> {
    CACHE.get(app_id, APP_TICKET)
}
