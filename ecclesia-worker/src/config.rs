/// Worker configuration
///
/// Read from the same environment as the API server so both processes agree
/// on the database, the mail transport and the public URL used in tracked
/// links.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (or `DB_HOST`, `DB_PORT`, `DB_NAME`, `DB_USER`,
///   `DB_PASSWORD`, `DB_SSLMODE`), `DATABASE_POOLER_URL`,
///   `DATABASE_MAX_CONNECTIONS`
/// - `MAIL_TRANSPORT`, `MAIL_API_URL`, `MAIL_API_KEY`, `MAIL_FROM_EMAIL`,
///   `MAIL_FROM_NAME`
/// - `PUBLIC_BASE_URL` - Base of open/click tracking links
/// - `TRACKING_SECRET` - Signs click links; must match the API server's.
///   Required unless `APP_ENV=development`
/// - `SESSION_TTL_MINUTES` - Idle lifetime used by the session sweeper
/// - `WORKER_POLL_INTERVAL_SECS` (default 60)
/// - `WORKER_BATCH_SIZE` - Campaign emails per pass (default 50)
/// - `REMINDER_WINDOW_HOURS` - How far ahead reminders go out (default 24)

use anyhow::{anyhow, bail};
use ecclesia_shared::{
    db::pool::DatabaseConfig,
    mail::{MailConfig, MailTransport, DEVELOPMENT_TRACKING_SECRET},
};
use std::{env, str::FromStr, time::Duration};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database: DatabaseConfig,
    pub pooler_url: Option<String>,
    pub mail: MailConfig,
    pub public_base_url: String,
    pub tracking_secret: String,
    pub session_ttl: chrono::Duration,
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub reminder_window: chrono::Duration,
}

fn parse_or<T>(value: Option<String>, default: T, key: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow!("{} is invalid: {}", key, e)),
        None => Ok(default),
    }
}

impl WorkerConfig {
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

        let url = match get("DATABASE_URL") {
            Some(url) => url,
            None => {
                let host = get("DB_HOST").ok_or_else(|| {
                    anyhow!("DATABASE_URL or DB_HOST environment variable is required")
                })?;
                DatabaseConfig::url_from_parts(
                    &host,
                    parse_or(get("DB_PORT"), 5432u16, "DB_PORT")?,
                    &get("DB_NAME").unwrap_or_else(|| "ecclesia".to_string()),
                    &get("DB_USER").unwrap_or_else(|| "postgres".to_string()),
                    &get("DB_PASSWORD").unwrap_or_default(),
                    get("DB_SSLMODE").as_deref(),
                )
            }
        };

        let max_connections = parse_or(get("DATABASE_MAX_CONNECTIONS"), 5u32, "DATABASE_MAX_CONNECTIONS")?;

        let defaults = MailConfig::default();
        let mail = MailConfig {
            transport: get("MAIL_TRANSPORT")
                .unwrap_or_default()
                .parse::<MailTransport>()?,
            api_url: get("MAIL_API_URL"),
            api_key: get("MAIL_API_KEY"),
            from_email: get("MAIL_FROM_EMAIL").unwrap_or(defaults.from_email),
            from_name: get("MAIL_FROM_NAME").unwrap_or(defaults.from_name),
        };

        let public_base_url = get("PUBLIC_BASE_URL")
            .unwrap_or_else(|| "http://localhost:8080".to_string())
            .trim_end_matches('/')
            .to_string();

        let development = matches!(
            get("APP_ENV").map(|v| v.to_ascii_lowercase()).as_deref(),
            Some("development" | "dev" | "local")
        );
        let tracking_secret = match get("TRACKING_SECRET") {
            Some(secret) => secret,
            None if development => DEVELOPMENT_TRACKING_SECRET.to_string(),
            None => bail!("TRACKING_SECRET environment variable is required in production"),
        };

        let ttl_minutes = parse_or(get("SESSION_TTL_MINUTES"), 1440i64, "SESSION_TTL_MINUTES")?;
        let poll_secs = parse_or(get("WORKER_POLL_INTERVAL_SECS"), 60u64, "WORKER_POLL_INTERVAL_SECS")?;
        let batch_size = parse_or(get("WORKER_BATCH_SIZE"), 50i64, "WORKER_BATCH_SIZE")?;
        let window_hours = parse_or(get("REMINDER_WINDOW_HOURS"), 24i64, "REMINDER_WINDOW_HOURS")?;

        if ttl_minutes <= 0 {
            bail!("SESSION_TTL_MINUTES must be positive");
        }
        if poll_secs == 0 {
            bail!("WORKER_POLL_INTERVAL_SECS must be at least 1");
        }
        if batch_size <= 0 {
            bail!("WORKER_BATCH_SIZE must be positive");
        }
        if window_hours <= 0 {
            bail!("REMINDER_WINDOW_HOURS must be positive");
        }

        Ok(Self {
            database: DatabaseConfig {
                url,
                max_connections,
                ..Default::default()
            },
            pooler_url: get("DATABASE_POOLER_URL"),
            mail,
            public_base_url,
            tracking_secret,
            session_ttl: chrono::Duration::minutes(ttl_minutes),
            poll_interval: Duration::from_secs(poll_secs),
            batch_size,
            reminder_window: chrono::Duration::hours(window_hours),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<WorkerConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[
            ("DATABASE_URL", "postgresql://localhost/ecclesia"),
            ("APP_ENV", "development"),
        ])
        .unwrap();

        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.reminder_window, chrono::Duration::hours(24));
        assert_eq!(config.session_ttl, chrono::Duration::minutes(1440));
        assert_eq!(config.mail.transport, MailTransport::Log);
        assert_eq!(config.public_base_url, "http://localhost:8080");
        assert_eq!(config.tracking_secret, DEVELOPMENT_TRACKING_SECRET);
    }

    #[test]
    fn test_tracking_secret_required_outside_development() {
        let base = ("DATABASE_URL", "postgresql://localhost/ecclesia");
        assert!(load(&[base]).is_err());

        let config = load(&[base, ("TRACKING_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.tracking_secret, "s3cret");
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DATABASE_URL", "postgresql://localhost/ecclesia"),
            ("WORKER_POLL_INTERVAL_SECS", "15"),
            ("WORKER_BATCH_SIZE", "200"),
            ("REMINDER_WINDOW_HOURS", "48"),
            ("PUBLIC_BASE_URL", "https://members.example.org/"),
            ("MAIL_TRANSPORT", "http"),
            ("TRACKING_SECRET", "s3cret"),
        ])
        .unwrap();

        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert_eq!(config.batch_size, 200);
        assert_eq!(config.reminder_window, chrono::Duration::hours(48));
        assert_eq!(config.public_base_url, "https://members.example.org");
        assert_eq!(config.mail.transport, MailTransport::Http);
    }

    #[test]
    fn test_database_from_parts() {
        let config = load(&[
            ("DB_HOST", "db.internal"),
            ("DB_NAME", "parish"),
            ("TRACKING_SECRET", "s3cret"),
        ])
        .unwrap();
        assert!(config.database.url.contains("db.internal"));
        assert!(config.database.url.contains("parish"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(load(&[]).is_err());
        assert!(load(&[
            ("DATABASE_URL", "postgresql://localhost/ecclesia"),
            ("TRACKING_SECRET", "s3cret"),
            ("WORKER_BATCH_SIZE", "0"),
        ])
        .is_err());
        assert!(load(&[
            ("DATABASE_URL", "postgresql://localhost/ecclesia"),
            ("TRACKING_SECRET", "s3cret"),
            ("WORKER_POLL_INTERVAL_SECS", "soon"),
        ])
        .is_err());
    }
}
