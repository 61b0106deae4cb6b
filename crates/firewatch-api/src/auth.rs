use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::HeaderMap;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::config::AppConfig;
use crate::error::AppError;

/// Role assumed when a verified token carries no `role` claim.
pub const DEFAULT_ROLE: &str = "authenticated";

const ACCEPTED_ALGORITHMS: [Algorithm; 3] = [Algorithm::RS256, Algorithm::RS384, Algorithm::RS512];

/// Identity attached to a request after its bearer token verified.
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    pub subject: String,
    pub email: Option<String>,
    pub role: String,
    #[serde(rename = "claims")]
    pub raw_claims: Map<String, Value>,
    #[serde(skip)]
    pub key_id: String,
}

impl Principal {
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }
}

pub fn require_role(principal: &Principal, role: &str) -> Result<(), AppError> {
    if principal.has_role(role) {
        Ok(())
    } else {
        Err(AppError::forbidden(format!("Role `{role}` is required")))
    }
}

/// Where signing keys come from, keyed by `kid`.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    async fn fetch_keys(&self) -> Result<HashMap<String, DecodingKey>, AppError>;
}

pub struct HttpKeySetSource {
    client: reqwest::Client,
    url: String,
}

impl HttpKeySetSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl KeySetSource for HttpKeySetSource {
    async fn fetch_keys(&self) -> Result<HashMap<String, DecodingKey>, AppError> {
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|error| {
                AppError::external(format!("JWKS request failed: {}", sanitize(&error)))
            })?;

        if !response.status().is_success() {
            return Err(AppError::external(format!(
                "JWKS request failed with HTTP {}",
                response.status().as_u16()
            )));
        }

        let document = response.json::<JwksDocument>().await.map_err(|error| {
            AppError::external(format!("JWKS JSON parse failed: {}", sanitize(&error)))
        })?;
        parse_key_set(document)
    }
}

#[derive(Default)]
struct KeyCache {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Option<Instant>,
}

impl KeyCache {
    fn is_stale(&self, ttl: Duration) -> bool {
        self.fetched_at.map_or(true, |at| at.elapsed() > ttl)
    }

    fn fresh_key(&self, kid: &str, ttl: Duration) -> Option<DecodingKey> {
        if self.is_stale(ttl) {
            None
        } else {
            self.keys.get(kid).cloned()
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ClaimExpectations {
    issuer: Option<String>,
    audience: Option<String>,
}

/// Verifies RS-signed access tokens against a cached key set.
///
/// The cache is refreshed when it is older than the TTL, and once more when a
/// token names a `kid` the cache does not hold. Refreshes happen under the
/// write lock, so concurrent misses collapse into a single fetch.
pub struct JwtVerifier {
    source: Arc<dyn KeySetSource>,
    cache: RwLock<KeyCache>,
    expectations: ClaimExpectations,
    cache_ttl: Duration,
    clock_skew: Duration,
}

impl JwtVerifier {
    pub fn new(source: Arc<dyn KeySetSource>, cache_ttl: Duration, clock_skew: Duration) -> Self {
        Self {
            source,
            cache: RwLock::new(KeyCache::default()),
            expectations: ClaimExpectations::default(),
            cache_ttl,
            clock_skew,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let source = Arc::new(HttpKeySetSource::new(config.supabase_jwks_url.clone()));
        Self::new(source, config.jwks_cache_ttl, config.auth_clock_skew)
            .with_issuer(config.supabase_jwt_issuer.clone())
            .with_audience(config.supabase_jwt_audience.clone())
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: Option<String>) -> Self {
        self.expectations.issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: Option<String>) -> Self {
        self.expectations.audience = audience;
        self
    }

    pub async fn verify_access_token(&self, token: &str) -> Result<Principal, AppError> {
        check_token_shape(token)?;

        let header = decode_header(token).map_err(|error| {
            AppError::unauthorized(format!("Token header decode failed: {}", sanitize(&error)))
        })?;
        if !ACCEPTED_ALGORITHMS.contains(&header.alg) {
            return Err(AppError::unauthorized(format!(
                "Token algorithm {:?} is not accepted",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| AppError::unauthorized("Token header missing `kid`"))?;

        let key = self.find_key(&kid).await?;

        let mut validation = Validation::new(header.alg);
        validation.leeway = self.clock_skew.as_secs();
        validation.validate_nbf = true;
        validation.validate_aud = false;
        if let Some(issuer) = &self.expectations.issuer {
            validation.set_issuer(&[issuer.as_str()]);
        }

        let decoded = decode::<Map<String, Value>>(token, &key, &validation).map_err(|error| {
            AppError::unauthorized(format!("Token validation failed: {}", sanitize(&error)))
        })?;
        let claims = decoded.claims;

        if let Some(expected) = &self.expectations.audience {
            if !audience_matches(claims.get("aud"), expected) {
                return Err(AppError::unauthorized("Token audience is not allowed"));
            }
        }
        reject_future_issued_at(&claims, self.clock_skew)?;

        let subject = string_claim(&claims, "sub")
            .ok_or_else(|| AppError::unauthorized("Token subject is missing"))?;
        let email = string_claim(&claims, "email");
        let role = string_claim(&claims, "role").unwrap_or_else(|| DEFAULT_ROLE.to_string());

        Ok(Principal {
            subject,
            email,
            role,
            raw_claims: claims,
            key_id: kid,
        })
    }

    async fn find_key(&self, kid: &str) -> Result<DecodingKey, AppError> {
        if let Some(key) = self.cache.read().await.fresh_key(kid, self.cache_ttl) {
            return Ok(key);
        }

        let mut cache = self.cache.write().await;
        if let Some(key) = cache.fresh_key(kid, self.cache_ttl) {
            return Ok(key);
        }

        match self.source.fetch_keys().await {
            Ok(keys) => {
                tracing::debug!(keys = keys.len(), "Refreshed signing key set");
                cache.keys = keys;
                cache.fetched_at = Some(Instant::now());
            }
            Err(error) => {
                if let Some(key) = cache.keys.get(kid) {
                    tracing::warn!(%error, kid, "Key set refresh failed; using cached key");
                    return Ok(key.clone());
                }
                return Err(error);
            }
        }

        cache
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| AppError::unauthorized("Signing key not found in key set"))
    }
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get("authorization")
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("Authorization header is not valid UTF-8"))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AppError::unauthorized("Authorization header must be `Bearer <token>`"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::unauthorized(
            "Authorization scheme must be `Bearer`",
        ));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::unauthorized("Bearer token is empty"));
    }
    check_token_shape(token)?;

    Ok(token)
}

fn check_token_shape(token: &str) -> Result<(), AppError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|segment| segment.is_empty()) {
        return Err(AppError::unauthorized(
            "Bearer token must have three non-empty segments",
        ));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: Option<String>,
    kty: Option<String>,
    #[serde(rename = "use")]
    usage: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

fn parse_key_set(document: JwksDocument) -> Result<HashMap<String, DecodingKey>, AppError> {
    let mut out = HashMap::new();
    for key in document.keys {
        let Some(kid) = key.kid else {
            continue;
        };
        if key.kty.as_deref() != Some("RSA") {
            continue;
        }
        if key.usage.as_deref().is_some_and(|usage| usage != "sig") {
            continue;
        }
        let (Some(n), Some(e)) = (key.n, key.e) else {
            continue;
        };
        match DecodingKey::from_rsa_components(&n, &e) {
            Ok(decoding) => {
                out.insert(kid, decoding);
            }
            Err(error) => {
                tracing::warn!(kid, error = %sanitize(&error), "Skipping malformed JWKS key");
            }
        }
    }

    if out.is_empty() {
        return Err(AppError::external(
            "JWKS did not include any usable RSA signing keys",
        ));
    }

    Ok(out)
}

fn string_claim(claims: &Map<String, Value>, name: &str) -> Option<String> {
    claims
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

fn reject_future_issued_at(
    claims: &Map<String, Value>,
    clock_skew: Duration,
) -> Result<(), AppError> {
    let Some(iat) = claims.get("iat").and_then(Value::as_i64) else {
        return Ok(());
    };
    let now = chrono::Utc::now().timestamp();
    let skew = i64::try_from(clock_skew.as_secs()).unwrap_or(0);
    if iat > now.saturating_add(skew) {
        return Err(AppError::unauthorized("Token `iat` is in the future"));
    }
    Ok(())
}

fn audience_matches(aud: Option<&Value>, expected: &str) -> bool {
    let Some(aud) = aud else {
        return false;
    };

    match aud {
        Value::String(value) => value == expected,
        Value::Array(values) => values
            .iter()
            .filter_map(Value::as_str)
            .any(|value| value == expected),
        _ => false,
    }
}

fn sanitize(error: &impl std::fmt::Display) -> String {
    error.to_string().replace('\n', " ").trim().to_string()
}
