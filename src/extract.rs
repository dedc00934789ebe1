/// file: src/extract.rs
/// description: Structured-data product extraction and layout-based fallback.
/// Structured-Data Extractor — pulls schema.org Product records out of
/// embedded JSON-LD blocks, tolerating malformed blocks individually. When a
/// page carries too little structured data, the layout fallback mines
/// anchor/price text instead and produces the same Product shape at lower
/// confidence.
use crate::classify;
use crate::models::Product;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::debug;

/// Below this many structured records the layout fallback kicks in.
pub const LAYOUT_FALLBACK_THRESHOLD: usize = 3;

// ---------------------------------------------------------------------------
// Structured data (JSON-LD)
// ---------------------------------------------------------------------------

/// Extract every schema.org Product from the page's JSON-LD blocks,
/// deduplicated. A malformed block is skipped; it never aborts the page.
pub fn extract_structured(html: &str, base: &url::Url) -> Vec<Product> {
    let doc = Html::parse_document(html);
    let Ok(sel) = Selector::parse(r#"script[type="application/ld+json"]"#) else {
        return Vec::new();
    };

    let mut found = Vec::new();
    for el in doc.select(&sel) {
        let raw = el.text().collect::<String>();
        let value: Value = match serde_json::from_str(raw.trim()) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "Skipping malformed structured-data block");
                continue;
            }
        };
        collect_product_nodes(&value, base, &mut found);
    }

    dedupe_products(found)
}

/// Recursively unwrap arrays, @graph, ItemList wrappers, and ListItem.item
/// before testing each object node for Product-ness.
fn collect_product_nodes(node: &Value, base: &url::Url, out: &mut Vec<Product>) {
    match node {
        Value::Array(items) => {
            for item in items {
                collect_product_nodes(item, base, out);
            }
        }
        Value::Object(map) => {
            if let Some(graph) = map.get("@graph") {
                collect_product_nodes(graph, base, out);
            }
            if let Some(items) = map.get("itemListElement") {
                collect_product_nodes(items, base, out);
            }
            if let Some(item) = map.get("item") {
                collect_product_nodes(item, base, out);
            }
            if type_includes_product(map)
                && let Some(product) = normalize_product(map, base)
            {
                out.push(product);
            }
        }
        _ => {}
    }
}

fn type_includes_product(map: &serde_json::Map<String, Value>) -> bool {
    match map.get("@type") {
        Some(Value::String(t)) => t.eq_ignore_ascii_case("product"),
        Some(Value::Array(types)) => types
            .iter()
            .any(|t| t.as_str().is_some_and(|s| s.eq_ignore_ascii_case("product"))),
        _ => false,
    }
}

/// Normalize one Product node into the canonical shape. Returns None for
/// nodes missing a name, and for category stubs: nodes with neither a
/// positive price nor a detail-classified URL.
fn normalize_product(map: &serde_json::Map<String, Value>, base: &url::Url) -> Option<Product> {
    let name = map.get("name")?.as_str()?.trim().to_owned();
    if name.is_empty() {
        return None;
    }

    let price = map.get("offers").and_then(offer_price).unwrap_or(0.0);

    let url = map
        .get("url")
        .or_else(|| map.get("@id"))
        .and_then(Value::as_str)
        .and_then(|u| base.join(u).ok())
        .map(|u| u.to_string())
        .unwrap_or_default();

    if price <= 0.0 && !classify::is_detail_url(&url) {
        return None;
    }

    let image = match map.get("image") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Array(imgs)) => imgs.iter().find_map(|i| match i {
            Value::String(s) => Some(s.clone()),
            Value::Object(o) => o.get("url").and_then(Value::as_str).map(ToOwned::to_owned),
            _ => None,
        }),
        Some(Value::Object(o)) => o.get("url").and_then(Value::as_str).map(ToOwned::to_owned),
        _ => None,
    }
    .and_then(|i| base.join(&i).ok())
    .map(|u| u.to_string());

    Some(Product {
        name,
        price,
        category: string_field(map, "category"),
        description: string_field(map, "description"),
        url,
        image,
        tags: keyword_tags(map.get("keywords")),
    })
}

fn string_field(map: &serde_json::Map<String, Value>, key: &str) -> String {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_owned()
}

/// `keywords` is either a comma-joined string or an array of strings.
fn keyword_tags(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(ToOwned::to_owned)
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(ToOwned::to_owned)
            .collect(),
        _ => Vec::new(),
    }
}

/// Price lives in an offer object or an array of them, either directly as
/// `price` or nested under `priceSpecification.price`.
fn offer_price(offers: &Value) -> Option<f64> {
    match offers {
        Value::Array(items) => items.iter().find_map(offer_price),
        Value::Object(o) => o
            .get("price")
            .and_then(parse_price)
            .or_else(|| {
                o.get("priceSpecification")
                    .and_then(|spec| match spec {
                        Value::Array(specs) => {
                            specs.iter().find_map(|s| s.get("price").and_then(parse_price))
                        }
                        other => other.get("price").and_then(parse_price),
                    })
            }),
        _ => None,
    }
}

/// Parse a price out of a JSON number or a string that may carry currency
/// punctuation ("$6.99", "1,299.00 USD").
fn parse_price(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            cleaned.parse().ok()
        }
        _ => None,
    };
    parsed.filter(|p| p.is_finite() && *p >= 0.0)
}

// ---------------------------------------------------------------------------
// Deduplication
// ---------------------------------------------------------------------------

/// Dedupe by lowercased URL, falling back to lowercased name for entries
/// without a URL. First occurrence wins, order preserved.
pub fn dedupe_products(products: Vec<Product>) -> Vec<Product> {
    let mut seen = HashSet::new();
    products
        .into_iter()
        .filter(|p| {
            let key = if p.url.is_empty() {
                p.name.to_lowercase()
            } else {
                p.url.to_lowercase()
            };
            seen.insert(key)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Layout fallback
// ---------------------------------------------------------------------------

const BLOCK_TAGS: &[&str] = &["li", "article", "section", "div", "td", "body"];

fn price_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[$€£]\s*([0-9][0-9,]*(?:\.[0-9]{1,2})?)").unwrap())
}

/// Approximate product records from page layout: anchors whose resolved
/// target classifies as detail-likely, named from link title/text/image alt,
/// priced from the nearest enclosing block's text. Lower confidence than
/// structured data; callers re-filter through the classifier.
pub fn extract_layout(html: &str, base: &url::Url) -> Vec<Product> {
    let doc = Html::parse_document(html);
    let Ok(anchor_sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let Ok(img_sel) = Selector::parse("img") else {
        return Vec::new();
    };

    let mut found = Vec::new();
    for el in doc.select(&anchor_sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let Ok(target) = base.join(href) else {
            continue;
        };
        if !matches!(target.scheme(), "http" | "https") {
            continue;
        }
        if !classify::is_detail_url(target.as_str()) {
            continue;
        }

        let Some(name) = anchor_name(&el, &img_sel) else {
            continue;
        };
        if classify::is_stop_name(&name) {
            continue;
        }

        let price = enclosing_block(&el)
            .and_then(|block| block_price(&block))
            .unwrap_or(0.0);

        let image = el
            .select(&img_sel)
            .next()
            .and_then(|img| img.value().attr("src"))
            .and_then(|src| base.join(src).ok())
            .map(|u| u.to_string());

        found.push(Product {
            name,
            price,
            category: String::new(),
            description: String::new(),
            url: target.to_string(),
            image,
            tags: Vec::new(),
        });
    }

    dedupe_products(found)
}

/// Name from the link's title attribute, else its text, else an enclosed
/// image's alt text.
fn anchor_name(el: &ElementRef<'_>, img_sel: &Selector) -> Option<String> {
    if let Some(title) = el.value().attr("title") {
        let title = title.trim();
        if !title.is_empty() {
            return Some(title.to_owned());
        }
    }

    let text = el
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if !text.is_empty() {
        return Some(text);
    }

    el.select(img_sel)
        .next()
        .and_then(|img| img.value().attr("alt"))
        .map(str::trim)
        .filter(|alt| !alt.is_empty())
        .map(ToOwned::to_owned)
}

fn enclosing_block<'a>(el: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| BLOCK_TAGS.contains(&a.value().name()))
}

fn block_price(block: &ElementRef<'_>) -> Option<f64> {
    let text = block.text().collect::<Vec<_>>().join(" ");
    let caps = price_pattern().captures(&text)?;
    let cleaned: String = caps[1].chars().filter(|c| *c != ',').collect();
    cleaned.parse().ok().filter(|p: &f64| *p > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> url::Url {
        url::Url::parse("https://shop.example.com/productstore/search").unwrap()
    }

    #[test]
    fn normalizes_product_with_offer_price_string() {
        let html = r#"<html><head><script type="application/ld+json">
            {"@type":"Product","name":"Citrus Soap",
             "url":"/productstore/bath/citrus-soap-12",
             "offers":{"price":"$6.99"}}
        </script></head></html>"#;

        let products = extract_structured(html, &base());
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].name, "Citrus Soap");
        assert_eq!(products[0].price, 6.99);
        assert_eq!(
            products[0].url,
            "https://shop.example.com/productstore/bath/citrus-soap-12"
        );
    }

    #[test]
    fn malformed_block_does_not_abort_the_page() {
        let html = r#"<html><head>
            <script type="application/ld+json">{not json at all</script>
            <script type="application/ld+json">
                {"@type":"Product","name":"Oat Bar","offers":{"price":4.5},
                 "url":"https://shop.example.com/productstore/bath/oat-bar-7"}
            </script>
        </head></html>"#;

        let products = extract_structured(html, &base());
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].name, "Oat Bar");
    }

    #[test]
    fn unwraps_item_list_and_graph() {
        let html = r#"<html><head><script type="application/ld+json">
            {"@graph":[{"@type":"ItemList","itemListElement":[
                {"@type":"ListItem","item":
                    {"@type":"Product","name":"Lavender Soap",
                     "offers":{"priceSpecification":{"price":"5.25"}},
                     "url":"/productstore/bath/lavender-soap-3"}}
            ]}]}
        </script></head></html>"#;

        let products = extract_structured(html, &base());
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].price, 5.25);
    }

    #[test]
    fn rejects_nameless_nodes() {
        let html = r#"<html><script type="application/ld+json">
            {"@type":"Product","offers":{"price":"9.99"},
             "url":"/productstore/bath/mystery-9"}
        </script></html>"#;
        assert!(extract_structured(html, &base()).is_empty());
    }

    #[test]
    fn rejects_category_stubs() {
        // No price and a non-detail URL: a listing-page stub, not a product.
        let html = r#"<html><script type="application/ld+json">
            {"@type":"Product","name":"Bath","url":"/productstore/shop-all"}
        </script></html>"#;
        assert!(extract_structured(html, &base()).is_empty());
    }

    #[test]
    fn accepts_priced_node_without_detail_url() {
        let html = r#"<html><script type="application/ld+json">
            {"@type":"Product","name":"Charcoal Soap","offers":{"price":"3.10"}}
        </script></html>"#;
        let products = extract_structured(html, &base());
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].price, 3.10);
    }

    #[test]
    fn dedupes_by_url_then_name() {
        let html = r#"<html>
        <script type="application/ld+json">
            {"@type":"Product","name":"Twin","offers":{"price":1.0},
             "url":"/productstore/bath/twin-1"}
        </script>
        <script type="application/ld+json">
            {"@type":"Product","name":"Twin Again","offers":{"price":2.0},
             "url":"/PRODUCTSTORE/bath/twin-1"}
        </script>
        </html>"#;
        assert_eq!(extract_structured(html, &base()).len(), 1);
    }

    #[test]
    fn ignores_non_product_types() {
        let html = r#"<html><script type="application/ld+json">
            {"@type":"BreadcrumbList","name":"Crumbs"}
        </script></html>"#;
        assert!(extract_structured(html, &base()).is_empty());
    }

    #[test]
    fn layout_fallback_mines_anchor_and_price() {
        let html = r#"<html><body>
            <li>
                <a href="/productstore/bath/citrus-soap-12">Citrus Soap</a>
                <span class="price">$6.99</span>
            </li>
            <li>
                <a href="/productstore/shop-all">Shop All</a>
                <span>$1.00</span>
            </li>
        </body></html>"#;

        let products = extract_layout(html, &base());
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].name, "Citrus Soap");
        assert_eq!(products[0].price, 6.99);
        assert!(products[0].url.ends_with("/productstore/bath/citrus-soap-12"));
    }

    #[test]
    fn layout_fallback_names_from_image_alt() {
        let html = r#"<html><body><div>
            <a href="/productstore/bath/oat-bar-7" title="">
                <img src="/img/oat.jpg" alt="Oat Bar"/>
            </a>
            <p>£4.50</p>
        </div></body></html>"#;

        let products = extract_layout(html, &base());
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].name, "Oat Bar");
        assert_eq!(products[0].price, 4.50);
        assert_eq!(
            products[0].image.as_deref(),
            Some("https://shop.example.com/img/oat.jpg")
        );
    }

    #[test]
    fn layout_fallback_skips_non_detail_targets() {
        let html = r#"<html><body>
            <a href="/about">About us</a>
            <a href="mailto:hi@example.com">mail</a>
        </body></html>"#;
        assert!(extract_layout(html, &base()).is_empty());
    }

    #[test]
    fn price_strings_tolerate_thousands_separators() {
        let v = serde_json::json!("1,299.00");
        assert_eq!(parse_price(&v), Some(1299.0));
    }
}
