//! Authentication backend for axum-login.
//!
//! Accounts live in the store; passwords are argon2 hashes. The session
//! auth hash is the stored password hash, so changing a password ends every
//! other session for that account.

use std::fmt;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use axum_login::{AuthUser, AuthnBackend, UserId};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::domain::account::{Account, normalize_email};
use crate::domain::error::SportfundError;
use crate::ports::store_port::AccountStore;

use super::{SharedStore, run_blocking};

pub type AuthSession = axum_login::AuthSession<Backend>;

/// The signed-in account as carried in the session.
#[derive(Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub is_admin: bool,
    pw_hash: Vec<u8>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("is_admin", &self.is_admin)
            .field("pw_hash", &"[redacted]")
            .finish()
    }
}

impl From<Account> for User {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            is_admin: account.is_admin,
            pw_hash: account.password_hash.into_bytes(),
        }
    }
}

impl AuthUser for User {
    type Id = i64;

    fn id(&self) -> i64 {
        self.id
    }

    fn session_auth_hash(&self) -> &[u8] {
        &self.pw_hash
    }
}

/// Sign-in form fields.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Clone)]
pub struct Backend {
    store: SharedStore,
}

impl Backend {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

impl AuthnBackend for Backend {
    type User = User;
    type Credentials = Credentials;
    type Error = SportfundError;

    async fn authenticate(
        &self,
        creds: Self::Credentials,
    ) -> Result<Option<Self::User>, Self::Error> {
        let Ok(email) = normalize_email(&creds.email) else {
            return Ok(None);
        };

        // argon2 verification is CPU-bound; keep it with the lookup on the
        // blocking pool.
        run_blocking(&self.store, move |store| {
            let Some(account) = store.find_account_by_email(&email)? else {
                return Ok(None);
            };
            if verify_password(&creds.password, &account.password_hash) {
                Ok(Some(User::from(account)))
            } else {
                Ok(None)
            }
        })
        .await
    }

    async fn get_user(&self, user_id: &UserId<Self>) -> Result<Option<Self::User>, Self::Error> {
        let id = *user_id;
        let account = run_blocking(&self.store, move |store| store.get_account(id)).await?;
        Ok(account.map(User::from))
    }
}

pub fn hash_password(password: &str) -> Result<String, SportfundError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| SportfundError::PasswordHash {
            reason: e.to_string(),
        })
}

/// False for a wrong password and for a hash that does not parse.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
