/// file: src/pipeline.rs
/// description: Budget-bounded multi-stage resolution pipeline and ranker.
/// Resolution Pipeline — runs an explicit ordered list of discovery stages
/// against one shared wall-clock budget, short-circuiting on the first
/// sufficient result and absorbing all upstream unreliability. Nothing in
/// here fails a query; the local catalog is the floor.
use crate::cache::{ResultCache, SitemapCache};
use crate::catalog::Catalog;
use crate::classify;
use crate::config::DiscoveryConfig;
use crate::extract;
use crate::fetch::Fetcher;
use crate::models::{Product, Query, Resolution, Source};
use crate::sitemap_index;
use futures::StreamExt;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Cache namespace for remote discovery results.
pub const NS_REMOTE: &str = "remote";
/// Cache namespace for local catalog results.
pub const NS_LOCAL: &str = "local";

/// Absolute cap on verification fetches within one stage.
const VERIFY_FETCH_CAP: usize = 8;
/// Sitemap candidates handed to verification.
const SITEMAP_PICKS: usize = 8;
/// Still-thin entries re-hydrated after filtering.
const REHYDRATE_CAP: usize = 2;

// ---------------------------------------------------------------------------
// Pipeline budget
// ---------------------------------------------------------------------------

/// Shared deadline for one query's resolution. Cancellation is cooperative:
/// every stage checks before non-trivial work; per-fetch timeouts bound the
/// worst case inside a stage.
#[derive(Debug, Clone)]
pub struct PipelineBudget {
    started: Instant,
    max: Duration,
}

impl PipelineBudget {
    pub fn new(max: Duration) -> Self {
        Self {
            started: Instant::now(),
            max,
        }
    }

    pub fn expired(&self) -> bool {
        self.started.elapsed() >= self.max
    }

    pub fn remaining(&self) -> Duration {
        self.max.saturating_sub(self.started.elapsed())
    }
}

// ---------------------------------------------------------------------------
// Ranker
// ---------------------------------------------------------------------------

/// Total order over candidates: detail-classified URL first, then positive
/// price, then longer name as a proxy for descriptive completeness. Stable
/// otherwise.
pub fn prioritize_products(products: &mut [Product]) {
    products.sort_by_key(|p| {
        (
            !classify::is_detail_url(&p.url),
            p.price <= 0.0,
            std::cmp::Reverse(p.name.chars().count()),
        )
    });
}

// ---------------------------------------------------------------------------
// Stage list
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Primary,
    Alternate,
    Verify,
    SearchEngine,
    Sitemap,
}

/// Stage order is the contract. Each arm in the loop states its own skip
/// condition; the loop owns the budget check.
const REMOTE_STAGES: &[Stage] = &[
    Stage::Primary,
    Stage::Alternate,
    Stage::Verify,
    Stage::SearchEngine,
    Stage::Sitemap,
];

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

pub struct Resolver {
    cfg: DiscoveryConfig,
    fetcher: Fetcher,
    results: Arc<ResultCache>,
    sitemaps: Arc<SitemapCache>,
    catalog: Arc<Catalog>,
}

impl Resolver {
    pub fn new(
        cfg: DiscoveryConfig,
        fetcher: Fetcher,
        results: Arc<ResultCache>,
        sitemaps: Arc<SitemapCache>,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            cfg,
            fetcher,
            results,
            sitemaps,
            catalog,
        }
    }

    /// Remote discovery requires both the master switch and a configured
    /// primary template; otherwise queries jump straight to the catalog.
    pub fn remote_enabled(&self) -> bool {
        self.cfg.enabled && self.cfg.search_url_template.is_some()
    }

    /// Resolve a query. Never fails: upstream-site unreliability is absorbed
    /// stage by stage and the local catalog answers when everything else
    /// comes up empty.
    pub async fn resolve(&self, query: &Query) -> Resolution {
        if self.remote_enabled() {
            if let Some(entry) = self.results.get(&query.signature(NS_REMOTE)).await {
                return Resolution {
                    products: entry.products,
                    source: entry.source,
                    source_url: entry.source_url,
                    from_cache: true,
                };
            }

            let budget = PipelineBudget::new(self.cfg.query_budget);
            if let Some(resolution) = self.resolve_remote(query, &budget).await {
                return resolution;
            }
        }
        self.local_fallback(query).await
    }

    // ── Remote stages ─────────────────────────────────────────────────────────

    async fn resolve_remote(
        &self,
        query: &Query,
        budget: &PipelineBudget,
    ) -> Option<Resolution> {
        let template = self.cfg.search_url_template.as_deref()?;
        let primary_url = render_template(template, &query.term);
        let primary_base = Url::parse(&primary_url).ok()?;

        let mut candidates: Vec<Product> = Vec::new();
        let mut verified: Vec<Product> = Vec::new();
        let mut hydrated: HashSet<String> = HashSet::new();
        let mut source = Source::Primary;
        let mut source_url = primary_url.clone();

        for stage in REMOTE_STAGES {
            if budget.expired() {
                debug!(?stage, "Budget exhausted; stopping remote stages");
                break;
            }
            match stage {
                Stage::Primary => {
                    candidates = self.search_endpoint(&primary_url).await;
                }
                Stage::Alternate => {
                    if candidates.iter().any(|p| classify::is_detail_url(&p.url)) {
                        continue;
                    }
                    let Some(alt) = self.cfg.alt_search_url_template.as_deref() else {
                        continue;
                    };
                    let alt_url = render_template(alt, &query.term);
                    let alt_candidates = self.search_endpoint(&alt_url).await;
                    // Replace only when the alternate run found something
                    // detail-likely; otherwise primary candidates stand.
                    if alt_candidates.iter().any(|p| classify::is_detail_url(&p.url)) {
                        candidates = alt_candidates;
                        source = Source::Alternate;
                        source_url = alt_url;
                    }
                }
                Stage::Verify => {
                    let urls: Vec<String> = candidates
                        .iter()
                        .filter(|p| classify::is_detail_url(&p.url))
                        .map(|p| p.url.clone())
                        .collect();
                    verified = self.verify_urls(urls, query.limit, budget, &mut hydrated).await;
                }
                Stage::SearchEngine => {
                    if !verified.is_empty() {
                        continue;
                    }
                    let Some((serp_url, links)) =
                        self.search_engine_links(query, &primary_base).await
                    else {
                        continue;
                    };
                    verified = self.verify_urls(links, query.limit, budget, &mut hydrated).await;
                    if !verified.is_empty() {
                        source = Source::SearchEngine;
                        source_url = serp_url;
                    }
                }
                Stage::Sitemap => {
                    if !verified.is_empty() {
                        continue;
                    }
                    let urls = self.sitemap_urls(&primary_base).await;
                    let picks: Vec<String> = sitemap_index::rank_by_overlap(urls, &query.term)
                        .into_iter()
                        .take(SITEMAP_PICKS)
                        .collect();
                    verified = self.verify_urls(picks, query.limit, budget, &mut hydrated).await;
                    if !verified.is_empty() {
                        source = Source::Sitemap;
                        source_url = sitemap_index::sitemap_root(&primary_base).to_string();
                    }
                }
            }
        }

        // Filter, truncate, re-hydrate thin entries, rank, cache, return.
        let mut kept = verified;
        if let Some(cat) = query.category.as_deref() {
            let cat = cat.to_lowercase();
            kept.retain(|p| p.category.to_lowercase().contains(&cat));
        }
        if let Some(ceiling) = query.max_price {
            kept.retain(|p| p.price <= ceiling);
        }
        if kept.is_empty() {
            return None;
        }
        kept.truncate(query.limit);
        self.rehydrate_thin(&mut kept, budget, &mut hydrated).await;
        prioritize_products(&mut kept);

        self.results
            .put(
                &query.signature(NS_REMOTE),
                kept.clone(),
                source,
                Some(source_url.clone()),
            )
            .await;

        Some(Resolution {
            products: kept,
            source,
            source_url: Some(source_url),
            from_cache: false,
        })
    }

    /// Fetch one search endpoint and extract candidates, bolting on the
    /// layout fallback when structured data is thin. Fetch failure means an
    /// empty candidate set, never an error.
    async fn search_endpoint(&self, url: &str) -> Vec<Product> {
        let body = match self.fetcher.get(url).await {
            Ok(b) => b,
            Err(e) => {
                warn!(url, error = %e, "Search endpoint fetch failed (skipping)");
                return Vec::new();
            }
        };
        let Ok(base) = Url::parse(url) else {
            return Vec::new();
        };

        let mut products = extract::extract_structured(&body, &base);
        if products.len() < extract::LAYOUT_FALLBACK_THRESHOLD {
            products.extend(extract::extract_layout(&body, &base));
            products = extract::dedupe_products(products);
        }
        products
    }

    /// Fetch candidate detail pages concurrently (bounded fan-out) and keep
    /// only candidates whose own page confirms a product. Each URL is
    /// hydrated at most once per query.
    async fn verify_urls(
        &self,
        urls: Vec<String>,
        target: usize,
        budget: &PipelineBudget,
        hydrated: &mut HashSet<String>,
    ) -> Vec<Product> {
        if budget.expired() {
            return Vec::new();
        }

        let cap = (target * 2).min(VERIFY_FETCH_CAP);
        let mut targets = Vec::new();
        for u in urls {
            if targets.len() >= cap {
                break;
            }
            if !classify::is_detail_url(&u) {
                continue;
            }
            if hydrated.insert(u.to_lowercase()) {
                targets.push(u);
            }
        }

        let fetcher = &self.fetcher;
        let mut pages = futures::stream::iter(targets.into_iter().map(|u| async move {
            let body = fetcher.get(&u).await;
            (u, body)
        }))
        .buffer_unordered(self.cfg.verify_concurrency);

        let mut confirmed = Vec::new();
        while let Some((u, result)) = pages.next().await {
            match result {
                Ok(body) => {
                    if let Some(p) = confirm_product(&body, &u) {
                        confirmed.push(p);
                        if confirmed.len() >= target {
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!(url = %u, error = %e, "Verification fetch failed (skipping)");
                }
            }
            if budget.expired() {
                break;
            }
        }
        confirmed
    }

    /// Site-restricted query against the external search engine's result
    /// page; returns the SERP URL and candidate links on the primary host.
    async fn search_engine_links(
        &self,
        query: &Query,
        primary_base: &Url,
    ) -> Option<(String, Vec<String>)> {
        let template = self.cfg.search_engine_url_template.as_deref()?;
        let host = primary_base.host_str()?;
        let restricted = format!("site:{host} {}", query.term);
        let serp_url = render_template(template, &restricted);

        let html = match self.fetcher.get(&serp_url).await {
            Ok(h) => h,
            Err(e) => {
                warn!(error = %e, "Search-engine fetch failed (skipping)");
                return None;
            }
        };
        Some((serp_url, serp_links(&html, host)))
    }

    /// The shared sitemap URL set, refreshed on its own longer TTL.
    async fn sitemap_urls(&self, primary_base: &Url) -> Vec<String> {
        if let Some(urls) = self.sitemaps.get().await {
            return urls;
        }
        let urls =
            sitemap_index::discover(&self.fetcher, primary_base, sitemap_index::SITEMAP_URL_CAP)
                .await;
        self.sitemaps.put(urls.clone()).await;
        urls
    }

    /// Enrich entries that are still thin (no description, unknown price)
    /// with one extra detail fetch each. Skips anything hydrated earlier in
    /// this query, so no candidate is ever fetched twice.
    async fn rehydrate_thin(
        &self,
        products: &mut [Product],
        budget: &PipelineBudget,
        hydrated: &mut HashSet<String>,
    ) {
        let mut fetches = 0;
        for p in products.iter_mut() {
            if fetches >= REHYDRATE_CAP || budget.expired() {
                break;
            }
            if !p.description.is_empty() || p.price > 0.0 {
                continue;
            }
            if p.url.is_empty() || !hydrated.insert(p.url.to_lowercase()) {
                continue;
            }
            fetches += 1;
            match self.fetcher.get(&p.url).await {
                Ok(body) => {
                    if let Some(fresh) = confirm_product(&body, &p.url) {
                        *p = fresh;
                    }
                }
                Err(e) => {
                    warn!(url = %p.url, error = %e, "Re-hydration fetch failed (skipping)");
                }
            }
        }
    }

    // ── Local fallback ────────────────────────────────────────────────────────

    async fn local_fallback(&self, query: &Query) -> Resolution {
        let signature = query.signature(NS_LOCAL);
        if let Some(entry) = self.results.get(&signature).await {
            return Resolution {
                products: entry.products,
                source: Source::Local,
                source_url: None,
                from_cache: true,
            };
        }

        let products = self.catalog.search(query);
        self.results
            .put(&signature, products.clone(), Source::Local, None)
            .await;
        Resolution {
            products,
            source: Source::Local,
            source_url: None,
            from_cache: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn render_template(template: &str, term: &str) -> String {
    template.replace("{query}", &urlencoding::encode(term))
}

/// Re-extract from a candidate's own page. Prefers the record whose URL
/// matches the page, falls back to the first; a confirmed record without a
/// URL inherits the page URL.
fn confirm_product(body: &str, page_url: &str) -> Option<Product> {
    let base = Url::parse(page_url).ok()?;
    let found = extract::extract_structured(body, &base);

    let lowered = page_url.to_lowercase();
    let index = found
        .iter()
        .position(|p| p.url.to_lowercase() == lowered)
        .unwrap_or(0);
    let mut picked = found.into_iter().nth(index)?;
    if picked.url.is_empty() {
        picked.url = page_url.to_owned();
    }
    Some(picked)
}

/// Pull result links out of a search engine's result page. Engines wrap
/// targets as `/url?q=<actual>&…`; direct anchors to the restricted host are
/// accepted too. Everything is re-filtered by the detail classifier.
fn serp_links(html: &str, host: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let Ok(sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut links = Vec::new();
    let mut seen = HashSet::new();
    for el in doc.select(&sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let target = if let Some(stripped) = href.strip_prefix("/url?q=") {
            let end = stripped.find('&').unwrap_or(stripped.len());
            urlencoding::decode(&stripped[..end])
                .ok()
                .map(|s| s.into_owned())
        } else if href.starts_with("http") {
            Some(href.to_owned())
        } else {
            None
        };
        let Some(target) = target else {
            continue;
        };
        let Ok(parsed) = Url::parse(&target) else {
            continue;
        };
        if parsed.host_str() != Some(host) {
            continue;
        }
        if !classify::is_detail_url(&target) {
            continue;
        }
        if seen.insert(target.to_lowercase()) {
            links.push(target);
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(name: &str, price: f64, url: &str) -> Product {
        Product {
            name: name.into(),
            price,
            category: String::new(),
            description: String::new(),
            url: url.into(),
            image: None,
            tags: Vec::new(),
        }
    }

    #[test]
    fn ranker_orders_detail_then_price_then_name() {
        let a = product("x", 0.0, "https://s.example/productstore/shop-all");
        let b = product("y", 0.0, "https://s.example/productstore/cat/sku123");
        let c = product("z", 5.0, "https://s.example/productstore/cat/sku456");

        let mut products = vec![a, b, c];
        prioritize_products(&mut products);

        let names: Vec<&str> = products.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["z", "y", "x"]);
    }

    #[test]
    fn ranker_is_stable_for_equal_keys() {
        let first = product("same", 2.0, "https://s.example/productstore/cat/sku1");
        let second = product("same", 2.0, "https://s.example/productstore/cat/sku2");
        let mut products = vec![first.clone(), second.clone()];
        prioritize_products(&mut products);
        assert_eq!(products[0].url, first.url);
        assert_eq!(products[1].url, second.url);
    }

    #[test]
    fn zero_budget_expires_immediately() {
        let budget = PipelineBudget::new(Duration::ZERO);
        assert!(budget.expired());
        assert_eq!(budget.remaining(), Duration::ZERO);
    }

    #[test]
    fn template_rendering_encodes_the_term() {
        let url = render_template(
            "https://shop.example.com/productstore/search?q={query}",
            "citrus soap & more",
        );
        assert_eq!(
            url,
            "https://shop.example.com/productstore/search?q=citrus%20soap%20%26%20more"
        );
    }

    #[test]
    fn serp_links_unwrap_redirect_targets() {
        let html = r#"<html><body>
            <a href="/url?q=https://shop.example.com/productstore/bath/citrus-soap-12&sa=U">r1</a>
            <a href="/url?q=https://elsewhere.example.net/productstore/bath/thing-1&sa=U">offsite</a>
            <a href="https://shop.example.com/productstore/bath/oat-bar-7">direct</a>
            <a href="https://shop.example.com/productstore/shop-all">listing</a>
        </body></html>"#;

        let links = serp_links(html, "shop.example.com");
        assert_eq!(
            links,
            vec![
                "https://shop.example.com/productstore/bath/citrus-soap-12".to_string(),
                "https://shop.example.com/productstore/bath/oat-bar-7".to_string(),
            ]
        );
    }

    #[test]
    fn confirm_product_prefers_matching_url() {
        let page = "https://shop.example.com/productstore/bath/citrus-soap-12";
        let html = r#"<html><script type="application/ld+json">
            [{"@type":"Product","name":"Sidebar Thing","offers":{"price":"1.00"},
              "url":"/productstore/bath/sidebar-3"},
             {"@type":"Product","name":"Citrus Soap","offers":{"price":"$6.99"},
              "url":"/productstore/bath/citrus-soap-12"}]
        </script></html>"#;

        let p = confirm_product(html, page).unwrap();
        assert_eq!(p.name, "Citrus Soap");
        assert_eq!(p.price, 6.99);
        assert_eq!(p.url, page);
    }
}
