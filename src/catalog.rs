/// file: src/catalog.rs
/// description: Static local catalog matcher, the pipeline's last resort.
/// Loads a read-only JSON catalog and scores entries against a query. This
/// component always succeeds: a missing or malformed catalog file is treated
/// as an empty catalog, and an empty result is a valid outcome.
use crate::models::{Product, Query};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogProduct {
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    products: Vec<CatalogProduct>,
}

pub struct Catalog {
    products: Vec<CatalogProduct>,
}

impl Catalog {
    /// Read the catalog document. Degrades to empty on any load problem.
    pub fn load(path: &Path) -> Self {
        let products = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<CatalogFile>(&raw) {
                Ok(file) => file.products,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Malformed catalog; treating as empty");
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Catalog unreadable; treating as empty");
                Vec::new()
            }
        };
        info!(count = products.len(), "Local catalog loaded");
        Self { products }
    }

    pub fn from_products(products: Vec<CatalogProduct>) -> Self {
        Self { products }
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Hard-filter then score the catalog against the query:
    /// +2 per distinct query token present in name/description/tags,
    /// +3 for the full phrase verbatim, +2 for exact category match,
    /// +1 when the price fits the stated ceiling, +0.2 x rating.
    /// Descending by score, ties keep catalog order, truncated to the limit.
    pub fn search(&self, query: &Query) -> Vec<Product> {
        let tokens = query.tokens();
        let phrase = query.term.to_lowercase();
        let category = query.category.as_deref().map(str::to_lowercase);

        let mut scored: Vec<(f64, &CatalogProduct)> = self
            .products
            .iter()
            .filter(|p| {
                if let Some(ceiling) = query.max_price
                    && p.price > ceiling
                {
                    return false;
                }
                if let Some(ref cat) = category
                    && !p.category.eq_ignore_ascii_case(cat)
                {
                    return false;
                }
                true
            })
            .filter_map(|p| {
                let haystack = format!(
                    "{} {} {}",
                    p.name.to_lowercase(),
                    p.description.to_lowercase(),
                    p.tags.join(" ").to_lowercase(),
                );

                let token_hits = tokens
                    .iter()
                    .filter(|t| haystack.contains(t.as_str()))
                    .count();
                let phrase_hit = haystack.contains(&phrase);
                // Rating and price bonuses only break ties between entries
                // that matched the query text at all.
                if token_hits == 0 && !phrase_hit {
                    return None;
                }

                let mut score = 2.0 * token_hits as f64;
                if phrase_hit {
                    score += 3.0;
                }
                if let Some(ref cat) = category
                    && p.category.eq_ignore_ascii_case(cat)
                {
                    score += 2.0;
                }
                if let Some(ceiling) = query.max_price
                    && p.price <= ceiling
                {
                    score += 1.0;
                }
                score += 0.2 * p.rating;
                Some((score, p))
            })
            .collect();

        // Vec::sort_by is stable, so equal scores keep catalog order.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(query.limit)
            .map(|(_, p)| Product {
                name: p.name.clone(),
                price: p.price,
                category: p.category.clone(),
                description: p.description.clone(),
                url: p.url.clone(),
                image: None,
                tags: p.tags.clone(),
            })
            .collect()
    }
}
