//! HTTP Basic authentication against an external user store.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::gateway::ApiError;
use crate::AppState;

/// Where credentials are checked. Owned by the catalog, not by this crate.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn verify(&self, username: &str, password: &str) -> Result<bool>;
}

/// Users listed in the configuration file with Argon2 password hashes.
#[derive(Debug, Clone, Default)]
pub struct StaticUsers {
    users: HashMap<String, String>,
}

impl StaticUsers {
    pub fn new(users: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            users: users.into_iter().collect(),
        }
    }

    pub fn from_config(users: &[folio_env::User]) -> Self {
        Self::new(
            users
                .iter()
                .map(|user| (user.name.clone(), user.password_hash.clone())),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserStore for StaticUsers {
    async fn verify(&self, username: &str, password: &str) -> Result<bool> {
        let Some(hash) = self.users.get(username).cloned() else {
            debug!(%username, "Unknown user");
            return Ok(false);
        };
        let password = password.to_owned();
        let username = username.to_owned();

        // Argon2 is CPU bound.
        tokio::task::spawn_blocking(move || match verify_password(&password, &hash) {
            Ok(valid) => Ok(valid),
            Err(e) => {
                warn!(%username, error = %e, "Stored password hash is malformed");
                Ok(false)
            }
        })
        .await?
    }
}

/// Hash a password with Argon2id into a PHC string.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::PasswordHash(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| Error::PasswordHash(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Parse an `Authorization: Basic <base64(user:password)>` header value.
pub fn parse_basic_authorization(value: &str) -> Option<Credentials> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = BASE64_STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;

    Some(Credentials {
        username: username.to_owned(),
        password: password.to_owned(),
    })
}

/// A request whose Basic credentials were accepted by the [`UserStore`].
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub String);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let credentials = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_basic_authorization)
            .ok_or(ApiError::Unauthorized)?;

        if state
            .users
            .verify(&credentials.username, &credentials.password)
            .await?
        {
            Ok(AuthenticatedUser(credentials.username))
        } else {
            debug!(username = %credentials.username, "Rejected credentials");
            Err(ApiError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(user_pass: &str) -> String {
        format!("Basic {}", BASE64_STANDARD.encode(user_pass))
    }

    #[test]
    fn hash_and_verify() {
        let hash = hash_password("correct-horse-battery-staple").unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct-horse-battery-staple", &hash).unwrap());
        assert!(!verify_password("wrong-password", &hash).unwrap());
    }

    #[test]
    fn invalid_hash_format() {
        assert!(verify_password("password", "not-a-valid-hash").is_err());
    }

    #[test]
    fn parses_basic_header() {
        let credentials = parse_basic_authorization(&basic("alice:s3cret:with:colons")).unwrap();

        assert_eq!(credentials.username, "alice");
        assert_eq!(credentials.password, "s3cret:with:colons");
    }

    #[test]
    fn rejects_other_schemes_and_garbage() {
        assert!(parse_basic_authorization("Bearer abc").is_none());
        assert!(parse_basic_authorization("Basic !!!").is_none());
        assert!(parse_basic_authorization(&basic("no-colon")).is_none());
        assert!(parse_basic_authorization("").is_none());
    }

    #[tokio::test]
    async fn static_users_verify() {
        let users = StaticUsers::new([("alice".to_owned(), hash_password("pw").unwrap())]);

        assert!(users.verify("alice", "pw").await.unwrap());
        assert!(!users.verify("alice", "nope").await.unwrap());
        assert!(!users.verify("bob", "pw").await.unwrap());
    }

    #[tokio::test]
    async fn malformed_stored_hash_never_authenticates() {
        let users = StaticUsers::new([("alice".to_owned(), "plaintext".to_owned())]);

        assert!(!users.verify("alice", "plaintext").await.unwrap());
    }
}
