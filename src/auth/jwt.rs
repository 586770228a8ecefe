//! Identity tokens issued by the identity provider (HS256 JWT, `sub` = user id).

use crate::error::{AppError, AppResult};
use crate::models::UserId;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub exp: i64,
    pub iat: i64,
}

/// Verifies identity tokens at the HTTP edge. The realtime core only ever
/// sees the resulting [`UserId`].
#[derive(Clone)]
pub struct IdentityVerifier {
    secret: String,
}

impl IdentityVerifier {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    /// Sign a token the way the identity provider does (local tooling and tests).
    pub fn issue(&self, user_id: &UserId, ttl: Duration) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Jwt(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> AppResult<UserId> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| AppError::Jwt(e.to_string()))?;
        UserId::parse(&data.claims.sub)
            .map_err(|_| AppError::Unauthorized("token subject is not a valid identity".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies() {
        let verifier = IdentityVerifier::new("test-identity-secret".to_string());
        let user = UserId::parse("user_2xyz").unwrap();
        let token = verifier.issue(&user, Duration::minutes(5)).unwrap();
        assert_eq!(verifier.verify(&token).unwrap(), user);
    }

    #[test]
    fn wrong_secret_and_expired_tokens_fail() {
        let verifier = IdentityVerifier::new("secret-a".to_string());
        let other = IdentityVerifier::new("secret-b".to_string());
        let user = UserId::parse("u1").unwrap();

        let token = other.issue(&user, Duration::minutes(5)).unwrap();
        assert!(matches!(verifier.verify(&token), Err(AppError::Jwt(_))));

        let expired = verifier.issue(&user, Duration::minutes(-10)).unwrap();
        assert!(matches!(verifier.verify(&expired), Err(AppError::Jwt(_))));
        assert!(verifier.verify("not-a-token").is_err());
    }
}
