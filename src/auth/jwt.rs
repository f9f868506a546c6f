//! Token issuing and the `AuthUser` extractor.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{config::JwtConfig, error::AppError, state::AppState};

/// Access tokens authorize API calls; refresh tokens can only mint a new pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    #[serde(rename = "typ")]
    pub kind: TokenKind,
}

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::minutes(cfg.ttl_minutes.max(1)),
            refresh_ttl: Duration::minutes(cfg.refresh_ttl_minutes.max(1)),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::from(&state.config.jwt)
    }
}

impl JwtKeys {
    fn sign(&self, user_id: Uuid, kind: TokenKind) -> Result<String, AppError> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("signing {kind:?} token: {e}")))
    }

    pub fn sign_access(&self, user_id: Uuid) -> Result<String, AppError> {
        self.sign(user_id, TokenKind::Access)
    }

    pub fn sign_refresh(&self, user_id: Uuid) -> Result<String, AppError> {
        self.sign(user_id, TokenKind::Refresh)
    }

    pub fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair, AppError> {
        let pair = TokenPair {
            access_token: self.sign_access(user_id)?,
            refresh_token: self.sign_refresh(user_id)?,
        };
        debug!(%user_id, "token pair issued");
        Ok(pair)
    }

    /// Checks signature, expiry, issuer and audience, then the token kind.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);
        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| AppError::Unauthorized(format!("invalid token: {e}")))?
            .claims;
        if claims.kind != expected {
            return Err(AppError::Unauthorized(format!(
                "expected a {expected:?} token"
            )));
        }
        Ok(claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, AppError> {
        self.verify(token, TokenKind::Refresh)
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let value = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;
    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() => {
            Ok(token.trim())
        }
        _ => Err(AppError::Unauthorized("Invalid Authorization header".into())),
    }
}

/// The authenticated user's id, taken from a Bearer access token.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = JwtKeys::from_ref(state)
            .verify(token, TokenKind::Access)
            .map_err(|e| {
                warn!(error = %e, "rejected access token");
                AppError::Unauthorized("Invalid or expired token".into())
            })?;
        Ok(AuthUser(claims.sub))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn keys(secret: &str, issuer: &str) -> JwtKeys {
        JwtKeys::from(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: "food-tracker-users".into(),
            ttl_minutes: 5,
            refresh_ttl_minutes: 60,
        })
    }

    #[test]
    fn pair_carries_one_token_of_each_kind() {
        let keys = keys("dev-secret", "food-tracker");
        let user_id = Uuid::new_v4();
        let pair = keys.issue_pair(user_id).unwrap();

        let access = keys.verify(&pair.access_token, TokenKind::Access).unwrap();
        assert_eq!(access.sub, user_id);
        assert_eq!(access.exp - access.iat, 5 * 60);

        let refresh = keys.verify_refresh(&pair.refresh_token).unwrap();
        assert_eq!(refresh.sub, user_id);
        assert_eq!(refresh.exp - refresh.iat, 60 * 60);
    }

    #[test]
    fn kinds_are_not_interchangeable() {
        let keys = keys("dev-secret", "food-tracker");
        let access = keys.sign_access(Uuid::new_v4()).unwrap();
        assert!(matches!(keys.verify_refresh(&access), Err(AppError::Unauthorized(_))));
        let refresh = keys.sign_refresh(Uuid::new_v4()).unwrap();
        assert!(keys.verify(&refresh, TokenKind::Access).is_err());
    }

    #[test]
    fn foreign_issuer_or_secret_is_rejected() {
        let ours = keys("secret-a", "food-tracker");
        let token = ours.sign_access(Uuid::new_v4()).unwrap();
        assert!(keys("secret-a", "someone-else").verify(&token, TokenKind::Access).is_err());
        assert!(keys("secret-b", "food-tracker").verify(&token, TokenKind::Access).is_err());
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let (parts, _) = Request::builder()
            .header(AUTHORIZATION, "bearer abc.def")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(bearer_token(&parts).unwrap(), "abc.def");

        let (parts, _) = Request::builder()
            .header(AUTHORIZATION, "Basic Zm9v")
            .body(())
            .unwrap()
            .into_parts();
        assert!(bearer_token(&parts).is_err());
    }
}
