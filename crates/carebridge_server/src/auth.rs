//! Credential checks and bearer token issuance.

use crate::config::UserAccount;
use crate::error::{ServerError, ServerResult};
use carebridge_protocol::UserInfo;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// In-memory token store.
///
/// Login validates credentials against the provisioned accounts and
/// issues an opaque UUID token; every authenticated route resolves the
/// bearer token back to the user it was issued to. Tokens live until
/// the server restarts.
pub struct TokenStore {
    accounts: Vec<UserAccount>,
    tokens: RwLock<HashMap<String, UserInfo>>,
}

impl TokenStore {
    /// Creates a token store over the provisioned accounts.
    pub fn new(accounts: Vec<UserAccount>) -> Self {
        Self {
            accounts,
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Validates credentials and issues a fresh token.
    pub fn login(&self, email: &str, password: &str) -> ServerResult<(String, UserInfo)> {
        let account = self
            .accounts
            .iter()
            .find(|a| a.email == email && a.password == password)
            .ok_or_else(|| ServerError::AuthenticationFailed("bad credentials".into()))?;
        let token = Uuid::new_v4().to_string();
        self.tokens
            .write()
            .insert(token.clone(), account.user.clone());
        tracing::debug!(email, "login ok");
        Ok((token, account.user.clone()))
    }

    /// Resolves an `Authorization` header value to a user.
    pub fn authenticate(&self, header: Option<&str>) -> ServerResult<UserInfo> {
        let value =
            header.ok_or_else(|| ServerError::AuthenticationFailed("missing token".into()))?;
        let token = value
            .strip_prefix("Bearer ")
            .ok_or_else(|| ServerError::AuthenticationFailed("not a bearer token".into()))?;
        self.tokens
            .read()
            .get(token)
            .cloned()
            .ok_or_else(|| ServerError::AuthenticationFailed("unknown token".into()))
    }

    /// Invalidates a token.
    pub fn revoke(&self, token: &str) {
        self.tokens.write().remove(token);
    }
}
