//! Service configuration.

use serde::Deserialize;
use std::path::Path;

/// Paths searched, in order, for the secrets file.
const SECRET_PATHS: [&str; 3] = [
    ".secrets/storefront.json",
    "storefront/.secrets/storefront.json",
    "../.secrets/storefront.json",
];

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// `PostgreSQL` connection string. Unset means the in-memory store.
    pub database_url: Option<String>,

    /// Maximum pooled database connections (default: 10).
    pub database_max_connections: u32,

    /// JWT issuer base URL; JWKS is fetched from `<base>/.well-known/jwks.json`.
    pub auth_base_url: String,

    /// Expected JWT audience (default: "storefront").
    pub auth_audience: String,

    /// Bootstrap admin key accepted in the `X-Admin-Key` header.
    pub admin_api_key: Option<String>,

    /// Secret for signing guest order tracking tokens.
    pub tracking_secret: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

/// Secrets file structure. Every field falls back to its environment variable.
#[derive(Debug, Default, Deserialize)]
struct Secrets {
    #[serde(default)]
    database_url: Option<String>,
    #[serde(default)]
    admin_api_key: Option<String>,
    #[serde(default)]
    tracking_secret: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and the secrets file.
    #[must_use]
    pub fn from_env() -> Self {
        let secrets = load_secrets(&SECRET_PATHS);
        let defaults = Self::default();

        let tracking_secret = secrets
            .tracking_secret
            .or_else(|| std::env::var("TRACKING_SECRET").ok())
            .unwrap_or_else(|| {
                tracing::warn!("TRACKING_SECRET not set - using a development secret");
                defaults.tracking_secret.clone()
            });

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            database_url: secrets
                .database_url
                .or_else(|| std::env::var("DATABASE_URL").ok()),
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            auth_base_url: std::env::var("AUTH_BASE_URL").unwrap_or(defaults.auth_base_url),
            auth_audience: std::env::var("AUTH_AUDIENCE").unwrap_or(defaults.auth_audience),
            admin_api_key: secrets
                .admin_api_key
                .or_else(|| std::env::var("ADMIN_API_KEY").ok()),
            tracking_secret,
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| parse_origins(&s))
                .unwrap_or(defaults.cors_origins),
            max_body_bytes: env_parse("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout_seconds),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Load secrets from the first readable file in `paths`.
fn load_secrets(paths: &[&str]) -> Secrets {
    for path in paths {
        match load_secrets_file::<Secrets>(path) {
            Ok(secrets) => {
                tracing::info!(path = %path, "Loaded secrets from file");
                return secrets;
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                tracing::warn!(path = %path, error = %e, "Ignoring malformed secrets file");
            }
            Err(_) => {}
        }
    }

    tracing::debug!("Secrets file not found, using environment variables");
    Secrets::default()
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            database_url: None,
            database_max_connections: 10,
            auth_base_url: "http://localhost:9000".into(),
            auth_audience: "storefront".into(),
            admin_api_key: None,
            tracking_secret: "storefront-dev-tracking-secret".into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        }
    }
}
