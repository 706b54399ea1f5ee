use std::time::Duration;

use anyhow::Context;

const DEFAULT_PORT: u16 = 3030;
const DEFAULT_PENDING_REDIRECT_TTL: Duration = Duration::from_secs(60 * 60);
const DEFAULT_BUSINESS_URL: &str = "http://business:4000";

/// Process configuration read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    /// Public base URL of this service
    pub callback_url: Option<String>,
    pub business_url: String,
    pub sign_key: Option<[u8; 32]>,
    /// How long a 3-D Secure challenge may stay unanswered
    pub pending_redirect_ttl: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = match var("PORT") {
            Some(port) => port.parse().with_context(|| format!("invalid PORT: {port}"))?,
            None => DEFAULT_PORT,
        };
        let database_url = var("DATABASE_URL").context("DATABASE_URL is not defined")?;
        let callback_url = var("CALLBACK_URL")
            .filter(|url| !url.trim().is_empty())
            .map(|url| url.trim_end_matches('/').to_owned());
        if callback_url.is_none() {
            tracing::warn!("CALLBACK_URL is not defined, 3-D Secure challenges can't be completed");
        }
        let business_url = var("BUSINESS_URL").unwrap_or_else(|| {
            tracing::warn!("BUSINESS_URL is not defined, using default one");
            DEFAULT_BUSINESS_URL.to_owned()
        });
        let sign_key = match var("SIGN_KEY") {
            Some(key) => Some(
                <[u8; 32]>::try_from(key.as_bytes())
                    .map_err(|_| anyhow::anyhow!("SIGN_KEY must be 32 bytes, got {}", key.len()))?,
            ),
            None => {
                tracing::warn!("SIGN_KEY is not defined, host notifications are disabled");
                None
            }
        };
        let pending_redirect_ttl = match var("PENDING_REDIRECT_TTL") {
            Some(secs) => Duration::from_secs(
                secs.parse()
                    .with_context(|| format!("invalid PENDING_REDIRECT_TTL: {secs}"))?,
            ),
            None => DEFAULT_PENDING_REDIRECT_TTL,
        };
        Ok(Self {
            port,
            database_url,
            callback_url,
            business_url: business_url.trim_end_matches('/').to_owned(),
            sign_key,
            pending_redirect_ttl,
        })
    }
}

#[cfg(test)]
impl AppConfig {
    pub fn for_tests(business_url: &str) -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: "sqlite::memory:".into(),
            callback_url: Some("https://adapter.example".into()),
            business_url: business_url.into(),
            sign_key: Some(*b"0123456789abcdef0123456789abcdef"),
            pending_redirect_ttl: DEFAULT_PENDING_REDIRECT_TTL,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let config = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "sqlite://data/db.sqlite")]))
            .unwrap();
        assert_eq!(config.port, 3030);
        assert_eq!(config.business_url, "http://business:4000");
        assert_eq!(config.callback_url, None);
        assert_eq!(config.sign_key, None);
        assert_eq!(config.pending_redirect_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn full_environment() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite://data/db.sqlite"),
            ("PORT", "8080"),
            ("CALLBACK_URL", "https://adapter.example/"),
            ("BUSINESS_URL", "http://host:4000/"),
            ("SIGN_KEY", "e7403b3c0d76a35312e7cc65eeb75808"),
            ("PENDING_REDIRECT_TTL", "900"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.callback_url.as_deref(), Some("https://adapter.example"));
        assert_eq!(config.business_url, "http://host:4000");
        assert_eq!(&config.sign_key.unwrap(), b"e7403b3c0d76a35312e7cc65eeb75808");
        assert_eq!(config.pending_redirect_ttl, Duration::from_secs(900));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(AppConfig::from_lookup(lookup(&[])).is_err());
        assert!(
            AppConfig::from_lookup(lookup(&[("DATABASE_URL", "sqlite::memory:"), ("PORT", "x")]))
                .is_err()
        );
        assert!(
            AppConfig::from_lookup(lookup(&[
                ("DATABASE_URL", "sqlite::memory:"),
                ("SIGN_KEY", "short"),
            ]))
            .is_err()
        );
    }
}
