/// file: src/cache.rs
/// description: TTL-keyed result cache and the shared sitemap slot.
/// Process-scoped shared caches with lazy TTL expiry checked at read time.
/// Entries are replaced wholesale, never mutated in place. Both caches are
/// injectable collaborators: tests pre-seed entries and back-date timestamps.
use crate::models::{Product, Source};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

// ---------------------------------------------------------------------------
// Result cache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub inserted_at: Instant,
    pub products: Vec<Product>,
    pub source: Source,
    pub source_url: Option<String>,
}

/// Per-query-signature cache of resolved product sets.
pub struct ResultCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// A fresh entry for the signature, or None. An entry past its TTL is
    /// treated as absent and evicted on the spot.
    pub async fn get(&self, signature: &str) -> Option<CacheEntry> {
        {
            let entries = self.entries.read().await;
            match entries.get(signature) {
                Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                    return Some(entry.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: evict lazily, re-checking staleness under the write lock
        // in case a writer refreshed the key in between.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(signature)
            && entry.inserted_at.elapsed() >= self.ttl
        {
            entries.remove(signature);
        }
        None
    }

    /// Cache a non-empty result set. Empty results are never cached, so a
    /// transient failure does not poison identical queries for a TTL window.
    pub async fn put(
        &self,
        signature: &str,
        products: Vec<Product>,
        source: Source,
        source_url: Option<String>,
    ) {
        self.put_at(signature, products, source, source_url, Instant::now())
            .await;
    }

    /// Insert with an explicit timestamp. Lets tests control time.
    pub async fn put_at(
        &self,
        signature: &str,
        products: Vec<Product>,
        source: Source,
        source_url: Option<String>,
        inserted_at: Instant,
    ) {
        if products.is_empty() {
            return;
        }
        self.entries.write().await.insert(
            signature.to_owned(),
            CacheEntry {
                inserted_at,
                products,
                source,
                source_url,
            },
        );
    }
}

// ---------------------------------------------------------------------------
// Sitemap cache
// ---------------------------------------------------------------------------

/// Key-independent slot holding the discovered product-URL set, refreshed on
/// its own longer TTL and shared across all queries.
pub struct SitemapCache {
    ttl: Duration,
    slot: RwLock<Option<(Instant, Vec<String>)>>,
}

impl SitemapCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None),
        }
    }

    pub async fn get(&self) -> Option<Vec<String>> {
        {
            let slot = self.slot.read().await;
            match slot.as_ref() {
                Some((at, urls)) if at.elapsed() < self.ttl => return Some(urls.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        let mut slot = self.slot.write().await;
        if let Some((at, _)) = slot.as_ref()
            && at.elapsed() >= self.ttl
        {
            *slot = None;
        }
        None
    }

    pub async fn put(&self, urls: Vec<String>) {
        self.put_at(urls, Instant::now()).await;
    }

    pub async fn put_at(&self, urls: Vec<String>, inserted_at: Instant) {
        if urls.is_empty() {
            return;
        }
        *self.slot.write().await = Some((inserted_at, urls));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(name: &str) -> Product {
        Product {
            name: name.into(),
            price: 1.0,
            category: String::new(),
            description: String::new(),
            url: String::new(),
            image: None,
            tags: Vec::new(),
        }
    }

    #[tokio::test]
    async fn fresh_entry_is_served_within_ttl() {
        let cache = ResultCache::new(Duration::from_secs(60));
        cache
            .put("remote|soap|-|-|5", vec![product("a")], Source::Primary, None)
            .await;

        let hit = cache.get("remote|soap|-|-|5").await.unwrap();
        assert_eq!(hit.products.len(), 1);
        assert_eq!(hit.source, Source::Primary);
    }

    #[tokio::test]
    async fn expired_entry_is_absent_and_evicted() {
        let cache = ResultCache::new(Duration::from_secs(60));
        let stale = Instant::now() - Duration::from_secs(120);
        cache
            .put_at("k", vec![product("a")], Source::Primary, None, stale)
            .await;

        assert!(cache.get("k").await.is_none());
        assert!(cache.entries.read().await.is_empty());
    }

    #[tokio::test]
    async fn empty_results_are_never_cached() {
        let cache = ResultCache::new(Duration::from_secs(60));
        cache.put("k", Vec::new(), Source::Primary, None).await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn sitemap_slot_expires_on_its_own_ttl() {
        let cache = SitemapCache::new(Duration::from_secs(60));
        cache.put(vec!["https://s.example/p/1".into()]).await;
        assert_eq!(cache.get().await.unwrap().len(), 1);

        let stale = Instant::now() - Duration::from_secs(120);
        cache.put_at(vec!["https://s.example/p/2".into()], stale).await;
        assert!(cache.get().await.is_none());
    }
}
