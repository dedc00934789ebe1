/// file: tests/http_api.rs
/// description: Query-interface contract over a live in-process server.
use std::sync::Arc;
use std::time::Duration;

use shop_scout::api::{self, AppState};
use shop_scout::cache::{ResultCache, SitemapCache};
use shop_scout::catalog::{Catalog, CatalogProduct};
use shop_scout::config::DiscoveryConfig;
use shop_scout::fetch::Fetcher;
use shop_scout::pipeline::Resolver;

async fn spawn_app() -> String {
    let cfg = DiscoveryConfig {
        enabled: false,
        search_url_template: None,
        alt_search_url_template: None,
        search_engine_url_template: None,
        query_budget: Duration::from_secs(2),
        fetch_timeout: Duration::from_secs(1),
        verify_concurrency: 1,
        user_agent: "shop-scout-test/0".into(),
    };
    let fetcher = Fetcher::new(&cfg.user_agent, cfg.fetch_timeout).unwrap();
    let catalog = Catalog::from_products(vec![CatalogProduct {
        name: "Citrus Soap".into(),
        price: 6.99,
        category: "bath".into(),
        description: "Zesty citrus soap bar.".into(),
        tags: vec!["citrus".into()],
        rating: 4.2,
        url: String::new(),
    }]);
    let catalog_products = catalog.len();

    let resolver = Resolver::new(
        cfg,
        fetcher,
        Arc::new(ResultCache::new(Duration::from_secs(60))),
        Arc::new(SitemapCache::new(Duration::from_secs(60))),
        Arc::new(catalog),
    );

    let app = api::router(AppState {
        resolver: Arc::new(resolver),
        catalog_products,
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn search_returns_ranked_products_with_provenance() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/v1/products/search"))
        .json(&serde_json::json!({ "query": "citrus soap", "limit": 3 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["source"], "local");
    assert_eq!(body["data"]["fromCache"], false);
    assert_eq!(body["data"]["products"][0]["name"], "Citrus Soap");
    assert_eq!(body["data"]["products"][0]["price"], 6.99);
}

#[tokio::test]
async fn empty_query_term_is_a_bad_request() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/v1/products/search"))
        .json(&serde_json::json!({ "query": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn health_reports_catalog_and_discovery_state() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["catalogProducts"], 1);
    assert_eq!(body["remoteDiscovery"], false);
}
