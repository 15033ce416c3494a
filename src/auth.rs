//! Requester resolution from the `Authorization` header.
//!
//! Accepts `Bearer <token>` or `Token <token>`. No header means an anonymous
//! requester; a token that matches no account is rejected with 401.

use crate::{
    errors::AppError,
    models::account::Account,
    services::record_service::AccessScope,
    state::AppState,
};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use tracing::error;

#[derive(Debug, Clone)]
pub enum Requester {
    Anonymous,
    Account(Account),
}

impl Requester {
    pub fn account(&self) -> Option<&Account> {
        match self {
            Requester::Anonymous => None,
            Requester::Account(account) => Some(account),
        }
    }

    /// The authenticated account, or 401 for anonymous requests.
    pub fn require_account(&self) -> Result<&Account, AppError> {
        self.account().ok_or_else(|| {
            AppError::unauthorized("Authentication credentials were not provided.")
        })
    }

    /// Which records this requester may read.
    pub fn scope(&self) -> AccessScope {
        match self {
            Requester::Anonymous => AccessScope::Public,
            Requester::Account(account) => AccessScope::for_account(account),
        }
    }
}

impl FromRequestParts<AppState> for Requester {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
            return Ok(Requester::Anonymous);
        };
        let token = value
            .to_str()
            .ok()
            .and_then(bearer_token)
            .ok_or_else(|| AppError::unauthorized("Invalid authorization header."))?;

        match state.accounts.find_by_token(token).await {
            Ok(Some(account)) => Ok(Requester::Account(account)),
            Ok(None) => Err(AppError::unauthorized("Invalid token.")),
            Err(err) => {
                error!("token lookup failed: {}", err);
                Err(AppError::internal("failed to resolve credentials"))
            }
        }
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    if (scheme.eq_ignore_ascii_case("bearer") || scheme.eq_ignore_ascii_case("token"))
        && !token.is_empty()
    {
        Some(token)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn account(is_staff: bool) -> Account {
        Account {
            id: Uuid::new_v4(),
            username: "observer".into(),
            is_staff,
            token_hash: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn bearer_and_token_schemes_are_accepted() {
        assert_eq!(bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(bearer_token("token   abc123 "), Some("abc123"));
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_token("Bearer"), None);
    }

    #[test]
    fn scope_follows_requester_class() {
        assert_eq!(Requester::Anonymous.scope(), AccessScope::Public);
        assert_eq!(Requester::Account(account(true)).scope(), AccessScope::All);

        let owner = account(false);
        let id = owner.id;
        assert_eq!(
            Requester::Account(owner).scope(),
            AccessScope::PublicOrOwned(id)
        );
        assert!(Requester::Anonymous.require_account().is_err());
    }
}
