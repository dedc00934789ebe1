/// file: src/sitemap_index.rs
/// description: Sitemap crawl and query-overlap scoring of discovered URLs.
/// Walks the site's sitemap.xml (and nested child sitemaps) through the
/// shared Fetcher, collecting page URLs up to a cap. The result feeds the
/// key-independent sitemap cache slot.
use crate::fetch::Fetcher;
use sitemap::reader::{SiteMapEntity, SiteMapReader};
use std::collections::HashSet;
use std::io::Cursor;
use url::Url;

/// Upper bound on URLs collected in one crawl.
pub const SITEMAP_URL_CAP: usize = 500;

/// The site's sitemap root for any page URL on it: same scheme, host, and
/// port, path `/sitemap.xml`.
pub fn sitemap_root(base: &Url) -> Url {
    let mut root = base.clone();
    root.set_path("/sitemap.xml");
    root.set_query(None);
    root.set_fragment(None);
    root
}

/// Discover page URLs starting from the site's sitemap root.
/// Fetch or parse failures yield whatever was collected so far.
pub async fn discover(fetcher: &Fetcher, base: &Url, cap: usize) -> Vec<String> {
    let root = sitemap_root(base);
    let mut collected = Vec::new();
    let mut visited = HashSet::new();
    collect(fetcher, root.as_str(), cap, &mut collected, &mut visited).await;
    collected
}

async fn collect(
    fetcher: &Fetcher,
    url: &str,
    cap: usize,
    collected: &mut Vec<String>,
    visited: &mut HashSet<String>,
) {
    if collected.len() >= cap || !visited.insert(url.to_owned()) {
        return;
    }
    let Ok(body) = fetcher.get(url).await else {
        return;
    };

    let cursor = Cursor::new(body.into_bytes());
    let parser = SiteMapReader::new(cursor);
    let mut child_sitemaps = Vec::new();
    for entity in parser {
        if collected.len() >= cap {
            break;
        }
        match entity {
            SiteMapEntity::Url(entry) => {
                if let Some(loc) = entry.loc.get_url() {
                    collected.push(loc.to_string());
                }
            }
            SiteMapEntity::SiteMap(sm) => {
                if let Some(loc) = sm.loc.get_url() {
                    child_sitemaps.push(loc.to_string());
                }
            }
            SiteMapEntity::Err(_) => {}
        }
    }
    for child in child_sitemaps {
        if collected.len() >= cap {
            break;
        }
        Box::pin(collect(fetcher, &child, cap, collected, visited)).await;
    }
}

// ---------------------------------------------------------------------------
// Query-overlap scoring
// ---------------------------------------------------------------------------

/// Order URLs by how many query tokens they contain, highest first, dropping
/// URLs that match no token at all. Stable for equal scores.
pub fn rank_by_overlap(urls: Vec<String>, term: &str) -> Vec<String> {
    let term_lower = term.to_lowercase();
    let tokens: Vec<&str> = term_lower.split_whitespace().collect();

    let mut scored: Vec<(usize, String)> = urls
        .into_iter()
        .filter_map(|u| {
            let lower = u.to_lowercase();
            let score = tokens.iter().filter(|t| lower.contains(*t)).count();
            (score > 0).then_some((score, u))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, u)| u).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_ranking_prefers_denser_matches() {
        let urls = vec![
            "https://s.example/productstore/bath/rose-candle-4".to_string(),
            "https://s.example/productstore/bath/citrus-soap-12".to_string(),
            "https://s.example/productstore/kitchen/citrus-press-9".to_string(),
        ];
        let ranked = rank_by_overlap(urls, "citrus soap");
        assert_eq!(ranked.len(), 2);
        assert!(ranked[0].contains("citrus-soap"));
        assert!(ranked[1].contains("citrus-press"));
    }

    #[test]
    fn zero_overlap_urls_are_dropped() {
        let urls = vec!["https://s.example/about".to_string()];
        assert!(rank_by_overlap(urls, "soap").is_empty());
    }

    #[test]
    fn sitemap_root_keeps_scheme_host_and_port() {
        let base = Url::parse("http://127.0.0.1:8080/productstore/search?q=x").unwrap();
        assert_eq!(
            sitemap_root(&base).as_str(),
            "http://127.0.0.1:8080/sitemap.xml"
        );
    }
}
