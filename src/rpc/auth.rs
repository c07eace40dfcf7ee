// Auth - Bearer tokens for the control endpoint
//
// Tokens are HS256 JWTs keyed with the raw bytes of the node's secret file.
// The only claim is `iat`, which must be within IAT_TOLERANCE_SECS of the
// server clock, so a captured token stops working after a minute.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Maximum clock distance between token issue time and verification
pub const IAT_TOLERANCE_SECS: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    iat: i64,
}

/// Mint a token for `secret` issued now
pub fn create_token(secret: &[u8]) -> Result<String, AuthError> {
    create_token_at(secret, chrono::Utc::now().timestamp())
}

/// Mint a token with an explicit issue time
pub fn create_token_at(secret: &[u8], iat: i64) -> Result<String, AuthError> {
    encode(
        &Header::new(Algorithm::HS256),
        &Claims { iat },
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AuthError::Encoding(e.to_string()))
}

/// Verify a raw `Authorization` header value
pub fn verify_bearer(header: Option<&str>, secret: &[u8]) -> Result<(), AuthError> {
    let header = header.ok_or(AuthError::MissingToken)?;
    let (scheme, token) = header
        .trim()
        .split_once(' ')
        .ok_or(AuthError::MalformedHeader)?;

    // Scheme names are case-insensitive
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MalformedHeader);
    }
    verify_token(token.trim(), secret)
}

/// Verify a token signature and its issue time
pub fn verify_token(token: &str, secret: &[u8]) -> Result<(), AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims = HashSet::new();
    validation.validate_exp = false;

    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

    let drift = (chrono::Utc::now().timestamp() - data.claims.iat).abs();
    if drift > IAT_TOLERANCE_SECS {
        return Err(AuthError::StaleToken { drift });
    }

    Ok(())
}

/// Authentication errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Authorization header is not a bearer token")]
    MalformedHeader,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token issued {drift}s away from server time")]
    StaleToken { drift: i64 },

    #[error("Token encoding failed: {0}")]
    Encoding(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: [u8; 32] = [7u8; 32];

    #[test]
    fn test_fresh_token_verifies() {
        let token = create_token(&SECRET).unwrap();
        assert!(verify_token(&token, &SECRET).is_ok());
        assert!(verify_bearer(Some(&format!("Bearer {}", token)), &SECRET).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = create_token(&SECRET).unwrap();
        let result = verify_token(&token, &[8u8; 32]);
        assert!(matches!(result, Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_stale_token_rejected() {
        let old = chrono::Utc::now().timestamp() - 3600;
        let token = create_token_at(&SECRET, old).unwrap();
        assert!(matches!(verify_token(&token, &SECRET), Err(AuthError::StaleToken { .. })));
    }

    #[test]
    fn test_missing_and_malformed_headers() {
        assert!(matches!(verify_bearer(None, &SECRET), Err(AuthError::MissingToken)));
        assert!(matches!(
            verify_bearer(Some("Basic abc"), &SECRET),
            Err(AuthError::MalformedHeader)
        ));
        assert!(matches!(
            verify_bearer(Some("Bearer not-a-jwt"), &SECRET),
            Err(AuthError::InvalidToken(_))
        ));
        assert!(matches!(
            verify_bearer(Some("Bearer"), &SECRET),
            Err(AuthError::MalformedHeader)
        ));
    }

    #[test]
    fn test_bearer_scheme_case_insensitive() {
        let token = create_token(&SECRET).unwrap();
        for scheme in ["bearer", "BEARER", "BeArEr"] {
            assert!(verify_bearer(Some(&format!("{} {}", scheme, token)), &SECRET).is_ok());
        }
    }
}
