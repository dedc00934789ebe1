/// file: src/config.rs
/// description: Typed environment configuration with per-feature degradation.
/// Configuration is loaded from environment variables (dotenv + real env).
///
/// Optional discovery features degrade instead of failing: an unset
/// SEARCH_URL_TEMPLATE disables remote discovery entirely, an unset
/// ALT_SEARCH_URL_TEMPLATE skips the alternate-endpoint stage. A variable
/// that is *provided but invalid* is still a load error.
use std::path::PathBuf;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub discovery: DiscoveryConfig,
    pub cache: CacheConfig,
    pub catalog: CatalogConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig::from_env()?,
            discovery: DiscoveryConfig::from_env()?,
            cache: CacheConfig::from_env()?,
            catalog: CatalogConfig::from_env(),
        })
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allow_origins: Vec<String>,
}

impl ServerConfig {
    fn from_env() -> anyhow::Result<Self> {
        let cors_allow_origins = env_opt("CORS_ALLOW_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToOwned::to_owned)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(Self {
            host: env_opt("HOST").unwrap_or_else(|| "127.0.0.1".into()),
            port: env_parse("PORT", 8460)?,
            cors_allow_origins,
        })
    }

    pub fn addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

// ---------------------------------------------------------------------------
// Remote discovery
// ---------------------------------------------------------------------------

pub const DEFAULT_USER_AGENT: &str = concat!(
    "shop-scout/",
    env!("CARGO_PKG_VERSION"),
    " (product resolver; +https://github.com/shop-scout/shop_scout)"
);

const DEFAULT_SEARCH_ENGINE_TEMPLATE: &str = "https://www.google.com/search?q={query}&num=10";

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Master switch; false jumps every query straight to the local catalog.
    pub enabled: bool,
    /// Primary search URL with a `{query}` placeholder. Unset disables
    /// remote discovery.
    pub search_url_template: Option<String>,
    /// Second, differently-shaped search URL. Unset skips the stage.
    pub alt_search_url_template: Option<String>,
    /// External search-engine results page, `{query}` placeholder.
    pub search_engine_url_template: Option<String>,
    /// Wall-clock budget for one whole query resolution.
    pub query_budget: Duration,
    /// Per-request fetch timeout.
    pub fetch_timeout: Duration,
    /// Concurrent detail-page fetches during verification.
    pub verify_concurrency: usize,
    pub user_agent: String,
}

impl DiscoveryConfig {
    fn from_env() -> anyhow::Result<Self> {
        let search_url_template = validated_template("SEARCH_URL_TEMPLATE")?;
        let alt_search_url_template = validated_template("ALT_SEARCH_URL_TEMPLATE")?;
        let search_engine_url_template = validated_template("SEARCH_ENGINE_URL_TEMPLATE")?
            .or_else(|| Some(DEFAULT_SEARCH_ENGINE_TEMPLATE.into()));

        Ok(Self {
            enabled: env_bool("REMOTE_DISCOVERY_ENABLED", true)?,
            search_url_template,
            alt_search_url_template,
            search_engine_url_template,
            query_budget: Duration::from_millis(env_parse("QUERY_BUDGET_MS", 8_000u64)?),
            fetch_timeout: Duration::from_secs(env_parse("FETCH_TIMEOUT_SECONDS", 5u64)?),
            verify_concurrency: env_parse("VERIFY_CONCURRENCY", 4usize)?.max(1),
            user_agent: env_opt("USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.into()),
        })
    }
}

// ---------------------------------------------------------------------------
// Caches
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub result_ttl: Duration,
    pub sitemap_ttl: Duration,
}

impl CacheConfig {
    fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            result_ttl: Duration::from_secs(env_parse("CACHE_TTL_SECONDS", 300u64)?),
            sitemap_ttl: Duration::from_secs(env_parse("SITEMAP_TTL_SECONDS", 21_600u64)?),
        })
    }
}

// ---------------------------------------------------------------------------
// Local catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub path: PathBuf,
}

impl CatalogConfig {
    fn from_env() -> Self {
        Self {
            path: env_opt("CATALOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("catalog.json")),
        }
    }
}

// ---------------------------------------------------------------------------
// Env-reading helpers
// ---------------------------------------------------------------------------

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
{
    match env_opt(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid value for env var {key}: {raw}")),
    }
}

fn env_bool(key: &str, default: bool) -> anyhow::Result<bool> {
    match env_opt(key).as_deref() {
        None => Ok(default),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(other) => Err(anyhow::anyhow!(
            "Invalid bool value for env var {key}: {other} (expected true/false, 1/0, yes/no)"
        )),
    }
}

/// A URL template must carry the `{query}` placeholder to be usable.
fn validated_template(key: &str) -> anyhow::Result<Option<String>> {
    match env_opt(key) {
        None => Ok(None),
        Some(t) if t.contains("{query}") => Ok(Some(t)),
        Some(t) => Err(anyhow::anyhow!(
            "Env var {key} must contain a {{query}} placeholder: {t}"
        )),
    }
}
