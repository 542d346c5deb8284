//! Authentication extractors.
//!
//! - `AuthUser` - a signed-in customer, from a bearer JWT
//! - `MaybeUser` - the same, but absent for guests
//! - `Staff` - a manager or admin; the role comes from the stored profile,
//!   or the bootstrap `X-Admin-Key` header grants admin rights

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use storefront_core::{Capability, Role, UserId};

use crate::crypto::constant_time_eq;
use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Constants
// ============================================================================

/// How long to cache JWKS keys before refreshing.
const JWKS_CACHE_DURATION: Duration = Duration::from_secs(3600);

/// Timeout for JWKS fetch requests.
const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// An authenticated user extracted from a bearer JWT.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The user ID.
    pub user_id: UserId,
    /// The raw subject claim from the JWT.
    pub subject: String,
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

async fn authenticate(token: &str, state: &AppState) -> Result<AuthUser, ApiError> {
    // Test tokens are only honoured in test builds or with the "test-auth" feature.
    #[cfg(any(test, feature = "test-auth"))]
    if let Some(user_id_str) = token.strip_prefix("test-token:") {
        let user_id = user_id_str
            .parse::<UserId>()
            .map_err(|_| ApiError::Unauthorized)?;

        return Ok(AuthUser {
            user_id,
            subject: user_id_str.to_string(),
        });
    }

    let claims = validate_jwt(token, state).await?;

    let user_id = claims
        .sub
        .parse::<UserId>()
        .map_err(|_| ApiError::Unauthorized)?;

    Ok(AuthUser {
        user_id,
        subject: claims.sub,
    })
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;
        authenticate(token, state).await
    }
}

/// The signed-in user, or `None` for a guest.
///
/// A request without an `Authorization` header is a guest; a header with an
/// invalid token is still rejected.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthUser>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key("authorization") {
            return Ok(Self(None));
        }
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;
        Ok(Self(Some(authenticate(token, state).await?)))
    }
}

/// A staff member acting on the back-office.
#[derive(Debug, Clone)]
pub struct Staff {
    /// The staff user, `None` when authenticated with the admin key.
    pub user_id: Option<UserId>,
    /// Effective role.
    pub role: Role,
}

impl Staff {
    /// Require `capability`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Forbidden` if the role lacks it.
    pub fn require(&self, capability: Capability) -> Result<(), ApiError> {
        if self.role.can(capability) {
            Ok(())
        } else {
            tracing::debug!(role = %self.role, ?capability, "Capability denied");
            Err(ApiError::Forbidden)
        }
    }

    /// Identifier for audit logs.
    #[must_use]
    pub fn actor(&self) -> String {
        self.user_id
            .map_or_else(|| "admin-key".to_string(), |id| id.to_string())
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Staff {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(admin_key) = parts.headers.get("x-admin-key") {
            let admin_key = admin_key.to_str().map_err(|_| ApiError::Unauthorized)?;
            let expected_key = state
                .config
                .admin_api_key
                .as_ref()
                .ok_or(ApiError::Unauthorized)?;

            if !constant_time_eq(admin_key, expected_key) {
                return Err(ApiError::Unauthorized);
            }

            tracing::info!("Admin authenticated with admin key");
            return Ok(Self {
                user_id: None,
                role: Role::Admin,
            });
        }

        let auth = AuthUser::from_request_parts(parts, state).await?;
        let user = state
            .store
            .get_user(&auth.user_id)
            .await?
            .ok_or(ApiError::Forbidden)?;

        if user.disabled || !user.role.is_staff() {
            return Err(ApiError::Forbidden);
        }

        tracing::debug!(user_id = %user.id, role = %user.role, "Staff authenticated");
        Ok(Self {
            user_id: Some(user.id),
            role: user.role,
        })
    }
}

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID).
    pub sub: String,
    /// Audience (can be string or array).
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
    /// Issuer.
    pub iss: String,
    /// Expiration time.
    pub exp: i64,
    /// Issued at.
    pub iat: i64,
}

// ============================================================================
// JWKS Client and JWT Validation
// ============================================================================

/// JWKS (JSON Web Key Set) response structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwks {
    /// List of JWK keys.
    pub keys: Vec<Jwk>,
}

/// Single JSON Web Key.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type (e.g., "RSA").
    pub kty: String,
    /// Key ID.
    pub kid: Option<String>,
    /// RSA public key modulus (base64url encoded).
    pub n: Option<String>,
    /// RSA public key exponent (base64url encoded).
    pub e: Option<String>,
}

/// Cached signing keys of the auth provider.
pub(crate) struct JwksCache {
    client: reqwest::Client,
    keys: HashMap<String, DecodingKey>,
    default_key: Option<DecodingKey>,
    last_updated: Instant,
}

impl JwksCache {
    pub(crate) fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(JWKS_FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            keys: HashMap::new(),
            default_key: None,
            // Expired from the start so the first request fetches.
            last_updated: Instant::now()
                .checked_sub(JWKS_CACHE_DURATION)
                .unwrap_or_else(Instant::now),
        }
    }

    fn is_expired(&self) -> bool {
        self.last_updated.elapsed() >= JWKS_CACHE_DURATION
    }

    fn lookup(&self, kid: Option<&str>) -> Option<DecodingKey> {
        match kid {
            Some(kid) => self.keys.get(kid).cloned(),
            None => self.default_key.clone(),
        }
    }
}

/// Validate a JWT against the JWKS.
async fn validate_jwt(token: &str, state: &AppState) -> Result<JwtClaims, ApiError> {
    let header = decode_header(token).map_err(|e| {
        tracing::debug!(error = %e, "Failed to decode JWT header");
        ApiError::Unauthorized
    })?;

    let decoding_key = get_decoding_key(header.kid.as_deref(), state).await?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[&state.config.auth_audience]);
    validation.set_issuer(&[&state.config.auth_base_url]);

    let token_data = decode::<JwtClaims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!(error = %e, "JWT validation failed");
        ApiError::Unauthorized
    })?;

    Ok(token_data.claims)
}

/// Get a decoding key from the cache, refreshing it when expired or unknown.
async fn get_decoding_key(kid: Option<&str>, state: &AppState) -> Result<DecodingKey, ApiError> {
    let client = {
        let cache = state.jwks.read().await;
        if !cache.is_expired() {
            if let Some(key) = cache.lookup(kid) {
                return Ok(key);
            }
        }
        cache.client.clone()
    };

    let jwks = fetch_jwks(&client, &state.config.auth_base_url).await?;

    let mut cache = state.jwks.write().await;
    cache.keys.clear();
    cache.default_key = None;
    cache.last_updated = Instant::now();

    for jwk in &jwks.keys {
        if let Some(decoding_key) = jwk_to_decoding_key(jwk) {
            if let Some(key_kid) = &jwk.kid {
                cache.keys.insert(key_kid.clone(), decoding_key.clone());
            }
            if cache.default_key.is_none() {
                cache.default_key = Some(decoding_key);
            }
        }
    }

    cache.lookup(kid).ok_or(ApiError::Unauthorized)
}

/// Fetch JWKS from the auth provider.
async fn fetch_jwks(client: &reqwest::Client, auth_base_url: &str) -> Result<Jwks, ApiError> {
    let jwks_url = format!("{auth_base_url}/.well-known/jwks.json");

    tracing::debug!(url = %jwks_url, "Fetching JWKS");

    let response = client.get(&jwks_url).send().await.map_err(|e| {
        tracing::error!(error = %e, url = %jwks_url, "Failed to fetch JWKS");
        ApiError::ExternalService("Failed to fetch authentication keys".into())
    })?;

    if !response.status().is_success() {
        tracing::error!(
            status = %response.status(),
            url = %jwks_url,
            "JWKS fetch returned non-success status"
        );
        return Err(ApiError::ExternalService(
            "Failed to fetch authentication keys".into(),
        ));
    }

    let jwks: Jwks = response.json().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to parse JWKS response");
        ApiError::ExternalService("Failed to parse authentication keys".into())
    })?;

    tracing::info!(keys_count = %jwks.keys.len(), "JWKS fetched successfully");

    Ok(jwks)
}

/// Convert a JWK to a `DecodingKey`. Only RSA keys are supported.
fn jwk_to_decoding_key(jwk: &Jwk) -> Option<DecodingKey> {
    if jwk.kty != "RSA" {
        tracing::debug!(kty = %jwk.kty, "Skipping non-RSA JWK");
        return None;
    }

    let n = jwk.n.as_ref()?;
    let e = jwk.e.as_ref()?;

    DecodingKey::from_rsa_components(n, e).ok()
}
