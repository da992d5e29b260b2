//! Registration, login and bearer token handling.
//!
//! Passwords are stored as Argon2id PHC strings. Tokens are
//! `<payload>.<signature>` where the payload is `<user id>:<expiry unix
//! seconds>` and the signature is an HMAC-SHA256 over the encoded payload;
//! both parts are url-safe base64.

use std::sync::Arc;

use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    models::UserId,
    store::{StoreError, TransactionStore},
};

type HmacSha256 = Hmac<Sha256>;

const SALT_LEN: usize = 16;
pub const MAX_USERNAME_CHARS: usize = 80;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing username or password")]
    MissingCredentials,
    #[error("Username must be at most 80 characters")]
    UsernameTooLong,
    #[error("Username already exists")]
    DuplicateUsername,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token has expired")]
    ExpiredToken,
    #[error("malformed stored credential")]
    MalformedCredential,
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("token secret is not a usable HMAC key")]
    InvalidSecret,
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateUsername(_) => AuthError::DuplicateUsername,
            other => AuthError::Store(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub secret: Vec<u8>,
    pub token_ttl: Duration,
    /// Argon2 cost for new password hashes. Stored hashes carry their own.
    pub hash_params: Params,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            secret: b"dev-secret-key".to_vec(),
            token_ttl: Duration::hours(1),
            hash_params: Params::default(),
        }
    }
}

#[derive(Clone)]
pub struct AuthGateway {
    store: Arc<dyn TransactionStore>,
    settings: Arc<AuthSettings>,
}

impl AuthGateway {
    pub fn new(store: Arc<dyn TransactionStore>, settings: AuthSettings) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
        }
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<UserId, AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        if username.chars().count() > MAX_USERNAME_CHARS {
            return Err(AuthError::UsernameTooLong);
        }

        let params = self.settings.hash_params.clone();
        let password = password.to_owned();
        let credential = blocking(move || hash_password(&password, params)).await??;

        let user = self.store.create_user(username, &credential).await?;
        log::info!("registered user {} ({})", user.username, user.id);
        Ok(user.id)
    }

    /// Checks the password and returns a fresh bearer token.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<String, AuthError> {
        let user = self
            .store
            .find_user(username.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let password = password.to_owned();
        let credential = user.credential;
        if !blocking(move || verify_password(&password, &credential)).await?? {
            return Err(AuthError::InvalidCredentials);
        }

        self.issue_token(user.id)
    }

    pub fn issue_token(&self, user_id: UserId) -> Result<String, AuthError> {
        let expires = (Utc::now() + self.settings.token_ttl).timestamp();
        let payload = URL_SAFE_NO_PAD.encode(format!("{}:{}", user_id, expires));
        let signature = URL_SAFE_NO_PAD.encode(self.sign(payload.as_bytes())?.finalize().into_bytes());
        Ok(format!("{}.{}", payload, signature))
    }

    /// Resolves a bearer token to the user it was issued for.
    pub fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let (payload, signature) = token.split_once('.').ok_or(AuthError::InvalidToken)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::InvalidToken)?;
        self.sign(payload.as_bytes())?
            .verify_slice(&signature)
            .map_err(|_| AuthError::InvalidToken)?;

        let decoded = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| AuthError::InvalidToken)?;
        let decoded = String::from_utf8(decoded).map_err(|_| AuthError::InvalidToken)?;
        let (user_id, expires) = decoded.split_once(':').ok_or(AuthError::InvalidToken)?;
        let user_id = Uuid::parse_str(user_id).map_err(|_| AuthError::InvalidToken)?;
        let expires: i64 = expires.parse().map_err(|_| AuthError::InvalidToken)?;

        if Utc::now().timestamp() >= expires {
            return Err(AuthError::ExpiredToken);
        }
        Ok(user_id)
    }

    fn sign(&self, data: &[u8]) -> Result<HmacSha256, AuthError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.settings.secret).map_err(|_| AuthError::InvalidSecret)?;
        mac.update(data);
        Ok(mac)
    }
}

/// Runs a password derivation on the blocking pool so it does not stall a
/// runtime worker.
async fn blocking<T, F>(f: F) -> Result<T, AuthError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| AuthError::Hashing(err.to_string()))
}

pub fn hash_password(password: &str, params: Params) -> Result<String, AuthError> {
    let salt: [u8; SALT_LEN] = rand::random();
    let salt = SaltString::encode_b64(&salt).map_err(|err| AuthError::Hashing(err.to_string()))?;
    let hash = Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| AuthError::Hashing(err.to_string()))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, credential: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(credential).map_err(|_| AuthError::MalformedCredential)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(_) => Err(AuthError::MalformedCredential),
    }
}
