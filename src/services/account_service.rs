//! Accounts and bearer-token lookup.

use crate::models::account::Account;
use chrono::Utc;
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

const USERNAME_MAX_LEN: usize = 150;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("username `{0}` is invalid: letters, digits and @/./+/-/_ only, at most 150 characters")]
    InvalidUsername(String),
    #[error("username `{0}` is already taken")]
    UsernameTaken(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type AccountResult<T> = Result<T, AccountError>;

#[derive(Clone)]
pub struct AccountService {
    pub db: Arc<SqlitePool>,
}

impl AccountService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Insert a new account and return it with its freshly minted token.
    ///
    /// The plain token is only available here; the database keeps its hash.
    pub async fn create_account(
        &self,
        username: &str,
        is_staff: bool,
    ) -> AccountResult<(Account, String)> {
        ensure_username_valid(username)?;

        let token = generate_token();
        let account = Account {
            id: Uuid::new_v4(),
            username: username.to_string(),
            is_staff,
            token_hash: hash_token(&token),
            created_at: Utc::now(),
        };

        match sqlx::query(
            "INSERT INTO accounts (id, username, is_staff, token_hash, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(account.id)
        .bind(&account.username)
        .bind(account.is_staff)
        .bind(&account.token_hash)
        .bind(account.created_at)
        .execute(&*self.db)
        .await
        {
            Ok(_) => Ok((account, token)),
            Err(err) if is_unique_violation(&err) => {
                Err(AccountError::UsernameTaken(username.to_string()))
            }
            Err(err) => Err(AccountError::Sqlx(err)),
        }
    }

    /// Resolve a presented bearer token.
    pub async fn find_by_token(&self, token: &str) -> AccountResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT id, username, is_staff, token_hash, created_at
             FROM accounts WHERE token_hash = ?",
        )
        .bind(hash_token(token))
        .fetch_optional(&*self.db)
        .await?;
        Ok(account)
    }
}

/// 32 random bytes, hex encoded.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn ensure_username_valid(name: &str) -> AccountResult<()> {
    let ok = !name.is_empty()
        && name.chars().count() <= USERNAME_MAX_LEN
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));
    if ok {
        Ok(())
    } else {
        Err(AccountError::InvalidUsername(name.to_string()))
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
