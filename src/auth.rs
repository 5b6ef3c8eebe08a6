use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use chrono::{Duration, Utc};
use futures::future::{ready, Ready};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ApiError;

/// Only the standard expiry claim is carried; the token proves nothing
/// beyond "someone logged in recently".
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Sign(jsonwebtoken::errors::Error),
    #[error("invalid token: {0}")]
    Invalid(jsonwebtoken::errors::Error),
    #[error("token lifetime overflows the clock")]
    Lifetime,
}

pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    pub fn issue(&self) -> Result<String, TokenError> {
        let exp = Utc::now()
            .checked_add_signed(self.ttl)
            .ok_or(TokenError::Lifetime)?;
        self.issue_expiring_at(exp.timestamp())
    }

    fn issue_expiring_at(&self, exp: i64) -> Result<String, TokenError> {
        encode(
            &Header::new(Algorithm::HS256),
            &Claims { exp },
            &self.encoding_key,
        )
        .map_err(TokenError::Sign)
    }

    pub fn validate(&self, token: &str) -> Result<(), TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|_| ())
            .map_err(TokenError::Invalid)
    }
}

/// Extractor for routes that need a valid bearer token. Rejection happens
/// before the handler body runs.
#[derive(Debug)]
pub struct Authenticated;

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim())
    } else {
        None
    }
}

impl FromRequest for Authenticated {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let issuer = match req.app_data::<web::Data<TokenIssuer>>() {
            Some(issuer) => issuer,
            None => {
                return ready(Err(ApiError::Internal(
                    "token issuer not configured".to_string(),
                )))
            }
        };

        let result = match bearer_token(req) {
            None => {
                debug!("Rejected {} {}: no bearer token", req.method(), req.path());
                Err(ApiError::Unauthorized("Missing bearer token.".to_string()))
            }
            Some(token) => issuer.validate(token).map(|_| Authenticated).map_err(|e| {
                warn!("Rejected {} {}: {}", req.method(), req.path(), e);
                ApiError::Unauthorized("Invalid or expired token.".to_string())
            }),
        };
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn issuer(secret: &str) -> TokenIssuer {
        TokenIssuer::new(secret.as_bytes(), Duration::hours(1))
    }

    #[test]
    fn issued_token_validates() {
        let issuer = issuer("testkey");
        let token = issuer.issue().unwrap();

        assert!(!token.is_empty());
        assert!(issuer.validate(&token).is_ok());
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let token = issuer("one").issue().unwrap();
        assert!(issuer("two").validate(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let issuer = issuer("testkey");
        let token = issuer
            .issue_expiring_at((Utc::now() - Duration::minutes(5)).timestamp())
            .unwrap();

        assert!(matches!(issuer.validate(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn lifetime_past_the_clock_range_is_an_error() {
        let issuer = TokenIssuer::new(b"testkey", Duration::MAX);
        assert!(matches!(issuer.issue(), Err(TokenError::Lifetime)));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(issuer("testkey").validate("invalid.token.here").is_err());
    }

    #[test]
    fn bearer_scheme_is_required() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Basic abc"))
            .to_http_request();
        assert!(bearer_token(&req).is_none());

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer abc.def"))
            .to_http_request();
        assert_eq!(bearer_token(&req), Some("abc.def"));
    }
}
