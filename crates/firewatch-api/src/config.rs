use std::collections::HashMap;
use std::env;
use std::time::Duration;

use firewatch_core::util::{is_http_url, lookup_trimmed};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub supabase_url: String,
    pub supabase_jwks_url: String,
    /// Expected `iss`; the check is skipped when unset
    pub supabase_jwt_issuer: Option<String>,
    /// Expected `aud`; the check is skipped when unset
    pub supabase_jwt_audience: Option<String>,
    pub jwks_cache_ttl: Duration,
    pub auth_clock_skew: Duration,
    pub admin_role: String,
    pub max_image_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "FIREWATCH_API_BIND_ADDR", "127.0.0.1:8080");

        let supabase_url = required_trimmed(&lookup, "SUPABASE_URL")?;
        if !is_http_url(&supabase_url) {
            return Err(ConfigError::Invalid(
                "SUPABASE_URL must start with http:// or https://".to_string(),
            ));
        }

        let default_jwks = format!(
            "{}/auth/v1/.well-known/jwks.json",
            trim_trailing(&supabase_url)
        );
        let supabase_jwks_url = value_or_default(&lookup, "SUPABASE_JWKS_URL", &default_jwks);
        if !is_http_url(&supabase_jwks_url) {
            return Err(ConfigError::Invalid(
                "SUPABASE_JWKS_URL must start with http:// or https://".to_string(),
            ));
        }

        let supabase_jwt_issuer = lookup_trimmed(&lookup, "SUPABASE_JWT_ISSUER");
        let supabase_jwt_audience = lookup_trimmed(&lookup, "SUPABASE_JWT_AUDIENCE");

        let jwks_cache_ttl_secs = value_or_default(&lookup, "SUPABASE_JWKS_CACHE_TTL_SECS", "300")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "SUPABASE_JWKS_CACHE_TTL_SECS must be an integer >= 30".to_string(),
                )
            })?;
        if jwks_cache_ttl_secs < 30 {
            return Err(ConfigError::Invalid(
                "SUPABASE_JWKS_CACHE_TTL_SECS must be >= 30".to_string(),
            ));
        }

        let auth_clock_skew_secs = value_or_default(&lookup, "AUTH_CLOCK_SKEW_SECS", "60")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "AUTH_CLOCK_SKEW_SECS must be an integer in [0, 300]".to_string(),
                )
            })?;
        if auth_clock_skew_secs > 300 {
            return Err(ConfigError::Invalid(
                "AUTH_CLOCK_SKEW_SECS must be in [0, 300]".to_string(),
            ));
        }

        let admin_role = value_or_default(&lookup, "FIREWATCH_ADMIN_ROLE", "admin");

        let max_image_mb = value_or_default(&lookup, "FIREWATCH_MAX_IMAGE_MB", "10")
            .parse::<usize>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "FIREWATCH_MAX_IMAGE_MB must be an integer in [1, 50]".to_string(),
                )
            })?;
        if !(1..=50).contains(&max_image_mb) {
            return Err(ConfigError::Invalid(
                "FIREWATCH_MAX_IMAGE_MB must be in [1, 50]".to_string(),
            ));
        }

        Ok(Self {
            bind_addr,
            supabase_url,
            supabase_jwks_url,
            supabase_jwt_issuer,
            supabase_jwt_audience,
            jwks_cache_ttl: Duration::from_secs(jwks_cache_ttl_secs),
            auth_clock_skew: Duration::from_secs(auth_clock_skew_secs),
            admin_role,
            max_image_bytes: max_image_mb * 1024 * 1024,
        })
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    lookup_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    lookup_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn trim_trailing(value: &str) -> &str {
    value.trim_end_matches('/')
}
