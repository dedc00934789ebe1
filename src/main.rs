/// file: src/main.rs
/// description: CLI entrypoint, runtime setup, and server/one-shot startup.
use anyhow::Result;
use axum::http::HeaderValue;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use shop_scout::{api, cache, catalog, config, fetch, models, pipeline};

/// shop_scout — resolves free-text product queries through unreliable web
/// sources with a local catalog floor.
#[derive(Debug, Parser)]
#[command(name = "shop_scout", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP query API (default).
    Serve,
    /// Resolve one query and print the result as JSON.
    Query {
        term: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        max_price: Option<f64>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Report configuration and catalog state, then exit.
    Healthcheck,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Structured logging — respect RUST_LOG; default to "info".
    // Set LOG_FORMAT=json for machine-readable output.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shop_scout=debug"));

    let json_format = std::env::var("LOG_FORMAT").as_deref() == Ok("json");
    if json_format {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    let cfg = config::Config::from_env()?;
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(cfg).await,
        Command::Query {
            term,
            category,
            max_price,
            limit,
        } => run_query(cfg, &term, category, max_price, limit).await,
        Command::Healthcheck => run_healthcheck(cfg),
    }
}

// ---------------------------------------------------------------------------
// Sub-command handlers
// ---------------------------------------------------------------------------

async fn run_server(cfg: config::Config) -> Result<()> {
    let addr = cfg.server.addr()?;
    let state = build_state(&cfg)?;

    let mut cors = CorsLayer::new();
    if !cfg.server.cors_allow_origins.is_empty() {
        let mut origins = Vec::with_capacity(cfg.server.cors_allow_origins.len());
        for origin in &cfg.server.cors_allow_origins {
            origins.push(
                HeaderValue::from_str(origin).map_err(|e| {
                    anyhow::anyhow!("Invalid CORS_ALLOW_ORIGINS entry `{origin}`: {e}")
                })?,
            );
        }
        cors = cors.allow_origin(origins);
    }

    let app = api::router(state)
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    info!(%addr, "Query API listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_query(
    cfg: config::Config,
    term: &str,
    category: Option<String>,
    max_price: Option<f64>,
    limit: Option<usize>,
) -> Result<()> {
    let state = build_state(&cfg)?;
    let query =
        models::Query::new(term, category, max_price, limit).map_err(|e| anyhow::anyhow!("{e}"))?;

    let resolution = state.resolver.resolve(&query).await;
    println!("{}", serde_json::to_string_pretty(&resolution)?);
    Ok(())
}

fn run_healthcheck(cfg: config::Config) -> Result<()> {
    let catalog = catalog::Catalog::load(&cfg.catalog.path);
    info!(
        catalog_products = catalog.len(),
        remote_discovery = cfg.discovery.enabled && cfg.discovery.search_url_template.is_some(),
        query_budget_ms = cfg.discovery.query_budget.as_millis() as u64,
        "Health check complete"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared app state
// ---------------------------------------------------------------------------

fn build_state(cfg: &config::Config) -> Result<api::AppState> {
    let fetcher = fetch::Fetcher::new(&cfg.discovery.user_agent, cfg.discovery.fetch_timeout)?;
    let catalog = Arc::new(catalog::Catalog::load(&cfg.catalog.path));
    let catalog_products = catalog.len();

    let resolver = pipeline::Resolver::new(
        cfg.discovery.clone(),
        fetcher,
        Arc::new(cache::ResultCache::new(cfg.cache.result_ttl)),
        Arc::new(cache::SitemapCache::new(cfg.cache.sitemap_ttl)),
        catalog,
    );

    Ok(api::AppState {
        resolver: Arc::new(resolver),
        catalog_products,
    })
}
