//! Principal extraction
//!
//! Token issuance and tenant signup live elsewhere; this module only
//! verifies bearer tokens and turns their claims into a `Principal`.

use crate::error::ApiError;
use crate::state::AppState;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use strata_core::error::Error;
use strata_core::principal::Principal;

/// Claims carried by a Strata access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Principal id
    pub sub: String,
    /// Tenant namespace
    pub tenant: String,
    /// Additional principal ids (groups) for ACL evaluation
    #[serde(default)]
    pub access: Vec<String>,
    /// Elevation claim for system-model mutation
    #[serde(default)]
    pub is_sudo: bool,
    pub exp: u64,
    #[serde(default)]
    pub iat: u64,
}

impl TokenClaims {
    pub fn into_principal(self) -> Principal {
        let mut principal = Principal::new(self.sub, self.tenant).with_access_ids(self.access);
        principal.is_sudo = self.is_sudo;
        principal
    }
}

/// Extractor for the authenticated principal
pub struct AuthPrincipal(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for AuthPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError(Error::unauthenticated("missing authorization header")))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError(Error::unauthenticated("malformed authorization header")))?;

        let key = DecodingKey::from_secret(state.config.security.jwt_secret.as_bytes());
        let data = decode::<TokenClaims>(token, &key, &Validation::default())
            .map_err(|e| ApiError(Error::unauthenticated(format!("invalid token: {e}"))))?;

        Ok(AuthPrincipal(data.claims.into_principal()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_to_principal() {
        let claims = TokenClaims {
            sub: "u1".into(),
            tenant: "acme".into(),
            access: vec!["g1".into()],
            is_sudo: true,
            exp: 0,
            iat: 0,
        };
        let principal = claims.into_principal();
        assert_eq!(principal.tenant, "acme");
        assert!(principal.access_ids.contains(&"u1".to_string()));
        assert!(principal.access_ids.contains(&"g1".to_string()));
        assert!(principal.is_sudo);
    }
}
