/// file: src/classify.rs
/// description: Heuristic URL classification: product detail vs category page.
/// Pure function over a URL's path segments, no network access. Both false
/// positives and false negatives are expected; downstream verification
/// (fetch-and-confirm) corrects them.
///
/// Rule precedence after locating the product-section marker:
///   1. fewer than two residual segments        -> not detail
///   2. every residual segment is a stop term   -> not detail
///   3. any residual segment has a detail keyword -> detail
///   4. residual depth of three or more         -> detail
///   5. any residual segment contains a digit   -> detail
///   6. otherwise                               -> not detail
use url::Url;

/// Stop-term set, version 1. Category and section names that never denote a
/// single item on their own.
pub const STOP_TERMS_V1: &[&str] = &[
    "shop-all",
    "products",
    "collections",
    "category",
    "categories",
    "all",
    "sale",
    "new",
    "bestsellers",
    "search",
    "shop",
    "browse",
    "catalog",
];

/// Path segments that mark the start of the product section of a site.
const SECTION_MARKERS: &[&str] = &[
    "productstore",
    "products",
    "product",
    "shop",
    "store",
    "collections",
    "catalog",
    "p",
];

/// Substrings that directly indicate a single-item page.
const DETAIL_KEYWORDS: &[&str] = &["item", "detail", "details", "product", "show", "view", "buy"];

/// Classify a full URL. Accepts bare paths too, so candidates whose base
/// could not be resolved still get a decision.
pub fn is_detail_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => is_detail_path(parsed.path()),
        Err(_) => is_detail_path(url),
    }
}

/// Classify a URL path. Identical path always yields an identical decision.
pub fn is_detail_path(path: &str) -> bool {
    let segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect();

    let residual: &[String] = match segments
        .iter()
        .position(|s| SECTION_MARKERS.contains(&s.as_str()))
    {
        Some(i) => &segments[i + 1..],
        None => &segments[..],
    };

    if residual.len() < 2 {
        return false;
    }
    if residual.iter().all(|s| STOP_TERMS_V1.contains(&s.as_str())) {
        return false;
    }
    if residual
        .iter()
        .any(|s| DETAIL_KEYWORDS.iter().any(|k| s.contains(k)))
    {
        return true;
    }
    if residual.len() >= 3 {
        return true;
    }
    residual.iter().any(|s| s.chars().any(|c| c.is_ascii_digit()))
}

/// Stopword heuristic reused by the layout parser on candidate *names*:
/// a name whose every token is a known category term is a navigation label,
/// not a product.
pub fn is_stop_name(name: &str) -> bool {
    let lowered = name.to_lowercase();
    let mut tokens = lowered
        .split(|c: char| c.is_whitespace() || c == '-' || c == '/')
        .filter(|t| !t.is_empty())
        .peekable();
    if tokens.peek().is_none() {
        return true;
    }
    tokens.all(|t| STOP_TERMS_V1.contains(&t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_term_only_residual_is_never_detail() {
        assert!(!is_detail_url("https://shop.example.com/productstore/shop-all"));
        assert!(!is_detail_url("https://shop.example.com/productstore/sale/new"));
        assert!(!is_detail_path("/productstore/categories/all"));
    }

    #[test]
    fn shallow_residual_is_not_detail() {
        assert!(!is_detail_url("https://shop.example.com/productstore/soap"));
        assert!(!is_detail_url("https://shop.example.com/productstore"));
    }

    #[test]
    fn digit_rule_accepts_short_sku_paths() {
        // Two residual segments: too shallow for the depth rule, accepted
        // through the digit signal alone.
        assert!(is_detail_url("https://shop.example.com/productstore/cat/sku123"));
        assert!(is_detail_path("/productstore/cat/sku123"));
    }

    #[test]
    fn keyword_rule_wins_over_depth() {
        assert!(is_detail_url(
            "https://shop.example.com/shop/bath/show-details"
        ));
        assert!(is_detail_path("/store/soaps/item-citrus"));
    }

    #[test]
    fn deep_residual_paths_are_detail() {
        assert!(is_detail_path("/shop/bath/soaps/citrus-bar"));
    }

    #[test]
    fn digitless_two_segment_residual_is_not_detail() {
        assert!(!is_detail_path("/shop/bath/soaps"));
    }

    #[test]
    fn decision_depends_on_path_alone() {
        assert_eq!(
            is_detail_url("https://a.example.com/productstore/cat/sku123"),
            is_detail_url("https://b.example.net/productstore/cat/sku123?utm=x"),
        );
    }

    #[test]
    fn stop_names_are_detected() {
        assert!(is_stop_name("Shop All"));
        assert!(is_stop_name("new"));
        assert!(is_stop_name(""));
        assert!(!is_stop_name("Citrus Soap"));
    }
}
