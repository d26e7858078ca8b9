//! In-memory view of the parsed catalog, keyed by a freshness token.
//!
//! `get()` only touches disk when the persisted document changed or the cache
//! was invalidated. The slot mutex gives single-flight reloads for free:
//! concurrent callers block on the lock and observe the completed reload
//! instead of issuing redundant reads. A document that fails to load never
//! replaces the last valid cached catalog.

use std::sync::{Arc, Mutex};

use crate::catalog::{default_catalog, Catalog};
use crate::store::{CatalogStore, FreshnessToken};

#[derive(Default)]
struct CacheSlot {
    catalog: Option<Arc<Catalog>>,
    token: Option<FreshnessToken>,
    dirty: bool,
}

pub struct CatalogCache {
    store: Arc<CatalogStore>,
    slot: Mutex<CacheSlot>,
}

impl CatalogCache {
    pub fn new(store: Arc<CatalogStore>) -> Self {
        Self {
            store,
            slot: Mutex::new(CacheSlot {
                dirty: true,
                ..CacheSlot::default()
            }),
        }
    }

    /// Current catalog. Falls back to the last known-good catalog, or the
    /// built-in default, when the store cannot produce a valid one.
    pub fn get(&self) -> Arc<Catalog> {
        let mut slot = self.slot.lock().expect("catalog cache poisoned");

        if !slot.dirty {
            if let Some(catalog) = &slot.catalog {
                match self.store.current_token() {
                    Ok(current) if current.is_some() && current == slot.token => {
                        return Arc::clone(catalog);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Catalog freshness check failed: {e}");
                        return Arc::clone(catalog);
                    }
                }
            }
        }

        match self.store.read() {
            Ok((catalog, token)) => {
                let catalog = Arc::new(catalog);
                slot.catalog = Some(Arc::clone(&catalog));
                slot.token = Some(token);
                slot.dirty = false;
                tracing::debug!("Catalog cache reloaded ({} personas)", catalog.len());
                catalog
            }
            Err(e) => {
                tracing::warn!("Catalog reload failed, serving fallback: {e}");
                match &slot.catalog {
                    Some(last_good) => Arc::clone(last_good),
                    None => Arc::new(default_catalog()),
                }
            }
        }
    }

    /// Force the next `get()` to reload unconditionally.
    pub fn invalidate(&self) {
        let mut slot = self.slot.lock().expect("catalog cache poisoned");
        slot.dirty = true;
        tracing::debug!("Catalog cache invalidated");
    }

    /// Last error-free load result, if any. Used by tests and diagnostics.
    pub fn cached_token(&self) -> Option<FreshnessToken> {
        self.slot.lock().expect("catalog cache poisoned").token
    }

    pub fn store(&self) -> &Arc<CatalogStore> {
        &self.store
    }
}
