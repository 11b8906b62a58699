use anyhow::{anyhow, Result};
use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::keys::SymmetricKey;
use pasetors::token::UntrustedToken;
use pasetors::{local, version4::V4, Local};

use crate::domain::Id;

const TOKEN_ISSUER: &str = "scribe";

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: Id,
}

/// Verifies (and, for tooling and tests, issues) PASETO v4.local access
/// tokens. Accounts themselves are managed outside this service.
#[derive(Clone)]
pub struct AuthService {
    access_key: [u8; 32],
}

impl AuthService {
    pub fn new(access_key: [u8; 32]) -> Self {
        Self { access_key }
    }

    /// `Ok(None)` for malformed, expired or foreign tokens.
    pub fn authenticate_access_token(&self, token: &str) -> Result<Option<AuthSession>> {
        let claims = match self.decrypt_claims(token)? {
            Some(claims) => claims,
            None => return Ok(None),
        };
        if !has_token_type(&claims, "access") {
            return Ok(None);
        }
        let user_id = match claim_id(&claims, "sub") {
            Ok(user_id) => user_id,
            Err(_) => return Ok(None),
        };
        Ok(Some(AuthSession { user_id }))
    }

    pub fn issue_access_token(&self, user_id: Id, ttl: std::time::Duration) -> Result<String> {
        let mut claims = Claims::new_expires_in(&ttl)?;
        claims.issuer(TOKEN_ISSUER)?;
        claims.audience(TOKEN_ISSUER)?;
        claims.subject(&user_id.to_string())?;
        claims.add_additional("typ", "access")?;

        let key = SymmetricKey::<V4>::from(&self.access_key)?;
        Ok(local::encrypt(&key, &claims, None, None)?)
    }

    fn decrypt_claims(&self, token: &str) -> Result<Option<Claims>> {
        let key = SymmetricKey::<V4>::from(&self.access_key)?;
        let mut rules = ClaimsValidationRules::new();
        rules.validate_issuer_with(TOKEN_ISSUER);
        rules.validate_audience_with(TOKEN_ISSUER);

        let untrusted = match UntrustedToken::<Local, V4>::try_from(token) {
            Ok(token) => token,
            Err(_) => return Ok(None),
        };
        let trusted = match local::decrypt(&key, &untrusted, &rules, None, None) {
            Ok(token) => token,
            Err(_) => return Ok(None),
        };
        Ok(trusted.payload_claims().cloned())
    }
}

fn claim_id(claims: &Claims, name: &str) -> Result<Id> {
    let value = claims
        .get_claim(name)
        .and_then(|value| value.as_str())
        .ok_or_else(|| anyhow!("missing {} claim", name))?;
    Ok(value.parse::<Id>()?)
}

fn has_token_type(claims: &Claims, expected: &str) -> bool {
    claims
        .get_claim("typ")
        .and_then(|value| value.as_str())
        .map(|value| value == expected)
        .unwrap_or(false)
}
