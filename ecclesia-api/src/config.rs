/// Configuration management for the API server
///
/// Configuration comes from environment variables; a `.env` file is loaded
/// first when present.
///
/// # Environment Variables
///
/// - `APP_ENV`: `development` or `production` (default: production)
/// - `API_HOST` / `API_PORT`: bind address (default: 0.0.0.0:8080)
/// - `CORS_ORIGINS`: comma-separated origins, `*` for any (default: `*`)
/// - `PUBLIC_BASE_URL`: absolute URL used in emailed links
/// - `TRACKING_SECRET`: signs email click links; required outside development
/// - `SESSION_COOKIE_NAME` (default: ECCLESIA_SESSID), `SESSION_TTL_MINUTES` (default: 1440)
/// - `DATABASE_URL`, or `DB_HOST`, `DB_PORT`, `DB_NAME`, `DB_USER`, `DB_PASSWORD`, `DB_SSLMODE`
/// - `DATABASE_POOLER_URL`: fallback when the primary connection fails
/// - `DATABASE_MAX_CONNECTIONS` (default: 10)
/// - `MAIL_TRANSPORT` (`http` | `log`), `MAIL_API_URL`, `MAIL_API_KEY`,
///   `MAIL_FROM_EMAIL`, `MAIL_FROM_NAME`, `MAIL_WEBHOOK_TOKEN`
///
/// # Example
///
/// ```no_run
/// use ecclesia_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use ecclesia_shared::db::pool::DatabaseConfig;
use ecclesia_shared::mail::{MailConfig, MailTransport};
use std::env;

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(AppEnv::Development),
            "production" | "prod" | "" => Ok(AppEnv::Production),
            other => anyhow::bail!("APP_ENV must be development or production, got {}", other),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub env: AppEnv,
    pub api: ApiConfig,
    pub database: DatabaseSettings,
    pub session: SessionSettings,
    pub mail: MailConfig,

    /// Shared secret expected as `?token=` on the provider webhook
    pub mail_webhook_token: Option<String>,

    /// Key for click-link signatures; the worker must use the same one
    pub tracking_secret: String,
}

pub use ecclesia_shared::mail::DEVELOPMENT_TRACKING_SECRET;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,

    /// Absolute base for links in emails, without a trailing slash
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub pooler_url: Option<String>,
    pub max_connections: u32,
}

impl DatabaseSettings {
    /// Pool configuration for the primary URL
    pub fn pool_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            url: self.url.clone(),
            max_connections: self.max_connections,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cookie_name: String,
    pub ttl_minutes: i64,
}

impl Config {
    /// Loads configuration from the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through `lookup`; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let env = AppEnv::parse(&get("APP_ENV").unwrap_or_default())?;

        let host = get("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = get("API_PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse::<u16>()
            .map_err(|e| anyhow::anyhow!("API_PORT is invalid: {}", e))?;

        let cors_origins = get("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        let public_base_url = get("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();

        let url = match get("DATABASE_URL") {
            Some(url) => url,
            None => {
                let host = get("DB_HOST").ok_or_else(|| {
                    anyhow::anyhow!("DATABASE_URL or DB_HOST environment variable is required")
                })?;
                let db_port = get("DB_PORT")
                    .unwrap_or_else(|| "5432".to_string())
                    .parse::<u16>()
                    .map_err(|e| anyhow::anyhow!("DB_PORT is invalid: {}", e))?;
                DatabaseConfig::url_from_parts(
                    &host,
                    db_port,
                    &get("DB_NAME").unwrap_or_else(|| "ecclesia".to_string()),
                    &get("DB_USER").unwrap_or_else(|| "postgres".to_string()),
                    &get("DB_PASSWORD").unwrap_or_default(),
                    get("DB_SSLMODE").as_deref(),
                )
            }
        };

        let max_connections = get("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|| "10".to_string())
            .parse::<u32>()
            .map_err(|e| anyhow::anyhow!("DATABASE_MAX_CONNECTIONS is invalid: {}", e))?;

        let ttl_minutes = get("SESSION_TTL_MINUTES")
            .unwrap_or_else(|| "1440".to_string())
            .parse::<i64>()
            .map_err(|e| anyhow::anyhow!("SESSION_TTL_MINUTES is invalid: {}", e))?;
        if ttl_minutes <= 0 {
            anyhow::bail!("SESSION_TTL_MINUTES must be positive");
        }

        let transport = get("MAIL_TRANSPORT")
            .unwrap_or_default()
            .parse::<MailTransport>()?;
        let mail = MailConfig {
            transport,
            api_url: get("MAIL_API_URL"),
            api_key: get("MAIL_API_KEY"),
            from_email: get("MAIL_FROM_EMAIL")
                .unwrap_or_else(|| MailConfig::default().from_email),
            from_name: get("MAIL_FROM_NAME").unwrap_or_else(|| MailConfig::default().from_name),
        };

        let tracking_secret = match (get("TRACKING_SECRET"), env) {
            (Some(secret), _) => secret,
            (None, AppEnv::Development) => DEVELOPMENT_TRACKING_SECRET.to_string(),
            (None, AppEnv::Production) => {
                anyhow::bail!("TRACKING_SECRET environment variable is required in production")
            }
        };

        Ok(Self {
            env,
            api: ApiConfig {
                host,
                port,
                cors_origins,
                public_base_url,
            },
            database: DatabaseSettings {
                url,
                pooler_url: get("DATABASE_POOLER_URL"),
                max_connections,
            },
            session: SessionSettings {
                cookie_name: get("SESSION_COOKIE_NAME")
                    .unwrap_or_else(|| "ECCLESIA_SESSID".to_string()),
                ttl_minutes,
            },
            mail,
            mail_webhook_token: get("MAIL_WEBHOOK_TOKEN"),
            tracking_secret,
        })
    }

    pub fn is_development(&self) -> bool {
        self.env == AppEnv::Development
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Session cookies are `Secure` unless running locally over http
    pub fn secure_cookies(&self) -> bool {
        !self.is_development() || self.api.public_base_url.starts_with("https://")
    }
}
