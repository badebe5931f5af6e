//! # Sessions
//!
//! Who is calling. Every protected handler takes a [`Caller`], so the services never look
//! at cookies or headers themselves.
//!
//! ## Token
//! HS256 JWT signed with `SESSION_SECRET`, claims `sub` (account id), `iat`, `exp`.
//!
//! - Nothing stored server side
//! - Sent back as the `token` cookie (HttpOnly) and in the login/register body
//! - Read from the `token` cookie first, then `Authorization: Bearer`
//!
//! ## Passwords
//! bcrypt, hashed and checked on the blocking pool.
use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::spawn_blocking;
use tracing::{debug, info};

use crate::{
    error::AppError,
    models::{Account, AccountId, LoginRequest, RegisterRequest},
    state::State,
    store::{Store, StoreError},
    utils::{bearer_token, cookie_value, non_blank},
};

pub const TOKEN_COOKIE: &str = "token";

#[derive(Error, Debug, PartialEq)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,

    #[error("Bad signature")]
    BadSignature,

    #[error("Token expired")]
    Expired,

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::BadSignature,
            _ => TokenError::Malformed,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    iat: i64,
    exp: i64,
}

#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_secs: i64,
}

impl SessionKeys {
    pub fn new(secret: &[u8], ttl_secs: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl_secs,
        }
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    pub fn issue(&self, account_id: AccountId) -> Result<String, TokenError> {
        self.issue_at(account_id, Utc::now().timestamp())
    }

    pub fn verify(&self, token: &str) -> Result<AccountId, TokenError> {
        let data = decode::<SessionClaims>(token, &self.decoding, &self.validation)?;

        data.claims.sub.parse().map_err(|_| TokenError::Malformed)
    }

    fn issue_at(&self, account_id: AccountId, now: i64) -> Result<String, TokenError> {
        let claims = SessionClaims {
            sub: account_id.to_string(),
            iat: now,
            exp: now.saturating_add(self.ttl_secs),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }
}

/// Authenticated principal of the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub account_id: AccountId,
}

impl FromRequestParts<Arc<State>> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<State>,
    ) -> Result<Self, Self::Rejection> {
        let token = cookie_value(&parts.headers, TOKEN_COOKIE)
            .or_else(|| bearer_token(&parts.headers))
            .ok_or_else(|| AppError::Unauthenticated("Unauthorized request".to_string()))?;

        let account_id = state.sessions.verify(token).map_err(|e| {
            debug!("Rejected session token: {e}");
            AppError::Unauthenticated("Invalid or expired token".to_string())
        })?;

        Ok(Caller { account_id })
    }
}

async fn hash_password(password: String, cost: u32) -> Result<String, AppError> {
    spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?
        .map_err(|e| AppError::InternalError(e.to_string()))
}

async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?
        .map_err(|e| AppError::InternalError(e.to_string()))
}

pub async fn register(
    store: &dyn Store,
    bcrypt_cost: u32,
    request: RegisterRequest,
) -> Result<Account, AppError> {
    let (Some(name), Some(email), Some(password)) = (
        non_blank(request.name),
        non_blank(request.email),
        request.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::BadRequest("All fields are required".to_string()));
    };

    let conflict = || AppError::Conflict("User already exists".to_string());

    if store.account_by_email(&email).await?.is_some() {
        return Err(conflict());
    }

    let account = Account {
        id: AccountId::new(),
        name,
        email,
        password_hash: hash_password(password, bcrypt_cost).await?,
        points: 0,
        history: Vec::new(),
        created_at: Utc::now(),
    };

    // two registrations can race past the lookup, the store settles it
    store.insert_account(&account).await.map_err(|e| match e {
        StoreError::Conflict(_) => conflict(),
        other => other.into(),
    })?;

    info!("Registered account {}", account.id);

    Ok(account)
}

pub async fn login(store: &dyn Store, request: LoginRequest) -> Result<Account, AppError> {
    let (Some(email), Some(password)) = (
        non_blank(request.email),
        request.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::BadRequest(
            "Email and password are required".to_string(),
        ));
    };

    let invalid = || AppError::Unauthenticated("Invalid email or password".to_string());

    let account = store.account_by_email(&email).await?.ok_or_else(invalid)?;

    if !verify_password(password, account.password_hash.clone()).await? {
        return Err(invalid());
    }

    Ok(account)
}
