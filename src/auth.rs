// src/auth.rs
use crate::config::Config;
use crate::models::Claims;
use actix_web::HttpRequest;
use actix_web::http::header::AUTHORIZATION;
use chrono::{Duration, Utc};
use jsonwebtoken::errors::{Error, ErrorKind};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Serialize;
use uuid::Uuid;

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Caller identity from the bearer token, `None` when the request carries no
/// valid session.
pub fn get_user_from_request(req: &HttpRequest, config: &Config) -> Option<AuthUser> {
    let token = bearer_token(req)?;
    match verify_token(token, config) {
        Ok(user) => Some(user),
        Err(e) => {
            tracing::debug!("Rejected bearer token: {}", e);
            None
        }
    }
}

pub fn verify_token(token: &str, config: &Config) -> Result<AuthUser, Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_ref()),
        &Validation::default(),
    )?;
    let id =
        Uuid::parse_str(&data.claims.sub).map_err(|_| Error::from(ErrorKind::InvalidSubject))?;
    Ok(AuthUser {
        id,
        email: data.claims.email,
    })
}

/// Signs a session token for `user`, valid for `ttl`.
pub fn issue_token(
    user: &AuthUser,
    config: &Config,
    ttl: Duration,
) -> Result<String, Error> {
    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        exp: (Utc::now() + ttl).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_ref()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn user() -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: Some("lab@example.org".into()),
        }
    }

    #[test]
    fn valid_token_yields_user() {
        let config = Config::with_secret("secret");
        let user = user();
        let token = issue_token(&user, &config, Duration::hours(1)).unwrap();

        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, format!("Bearer {}", token)))
            .to_http_request();
        assert_eq!(get_user_from_request(&req, &config), Some(user));
    }

    #[test]
    fn token_signed_with_other_secret_is_anonymous() {
        let other = Config::with_secret("other");
        let token = issue_token(&user(), &other, Duration::hours(1)).unwrap();
        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, format!("Bearer {}", token)))
            .to_http_request();
        assert_eq!(get_user_from_request(&req, &Config::with_secret("secret")), None);
    }

    #[test]
    fn non_uuid_subject_is_rejected() {
        let config = Config::with_secret("s");
        let claims = Claims {
            sub: "not-a-uuid".into(),
            email: None,
            exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret.as_ref()),
        )
        .unwrap();

        let err = verify_token(&token, &config).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidSubject));
    }

    #[test]
    fn expired_token_is_anonymous() {
        let config = Config::with_secret("secret");
        let token = issue_token(&user(), &config, Duration::hours(-2)).unwrap();
        assert!(verify_token(&token, &config).is_err());
    }

    #[test]
    fn missing_or_malformed_header_is_anonymous() {
        let config = Config::with_secret("secret");
        let req = TestRequest::default().to_http_request();
        assert_eq!(get_user_from_request(&req, &config), None);

        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, "Basic abc"))
            .to_http_request();
        assert_eq!(get_user_from_request(&req, &config), None);
    }
}
