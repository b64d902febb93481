//! Session state and token persistence.

use crate::{
    dto::auth::{AuthSession, TokenPair},
    models::PublicUser,
    storefront::storage::{KeyValueStore, StorageError},
};

pub const TOKEN_KEY: &str = "token";

#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub user: Option<PublicUser>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub is_authenticated: bool,
    pub is_admin: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl AuthState {
    pub fn login_pending(&mut self) {
        self.is_loading = true;
        self.error = None;
    }

    pub fn login_succeeded(&mut self, session: AuthSession) {
        self.is_loading = false;
        self.error = None;
        self.set_tokens(session.tokens);
        self.set_user(session.user);
    }

    pub fn login_failed(&mut self, message: impl Into<String>) {
        *self = Self {
            error: Some(message.into()),
            ..Self::default()
        };
    }

    pub fn set_user(&mut self, user: PublicUser) {
        self.is_admin = user.is_admin;
        self.is_authenticated = true;
        self.user = Some(user);
    }

    pub fn set_tokens(&mut self, tokens: TokenPair) {
        self.access_token = Some(tokens.access_token);
        self.refresh_token = Some(tokens.refresh_token);
    }

    pub fn tokens(&self) -> Option<TokenPair> {
        Some(TokenPair {
            access_token: self.access_token.clone()?,
            refresh_token: self.refresh_token.clone()?,
        })
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// [`AuthState`] whose tokens survive restarts under [`TOKEN_KEY`].
#[derive(Debug)]
pub struct AuthStore<S> {
    state: AuthState,
    storage: S,
}

impl<S: KeyValueStore> AuthStore<S> {
    /// Restore saved tokens. The user stays unknown until confirmed by the API.
    pub fn load(storage: S) -> Self {
        let mut state = AuthState::default();
        if let Some(value) = storage.get(TOKEN_KEY) {
            match serde_json::from_value::<TokenPair>(value) {
                Ok(tokens) => state.set_tokens(tokens),
                Err(err) => tracing::warn!(error = %err, "saved token unreadable, ignoring"),
            }
        }
        Self { state, storage }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut AuthState {
        &mut self.state
    }

    pub fn login_succeeded(&mut self, session: AuthSession) {
        self.save_tokens(&session.tokens);
        self.state.login_succeeded(session);
    }

    pub fn login_failed(&mut self, message: impl Into<String>) {
        self.state.login_failed(message);
        self.forget_tokens();
    }

    pub fn set_tokens(&mut self, tokens: TokenPair) {
        self.save_tokens(&tokens);
        self.state.set_tokens(tokens);
    }

    pub fn clear(&mut self) {
        self.state.clear();
        self.forget_tokens();
    }

    fn save_tokens(&mut self, tokens: &TokenPair) {
        let result = serde_json::to_value(tokens)
            .map_err(StorageError::from)
            .and_then(|value| self.storage.set(TOKEN_KEY, &value));
        if let Err(err) = result {
            tracing::warn!(error = %err, "failed to save token");
        }
    }

    fn forget_tokens(&mut self) {
        if let Err(err) = self.storage.remove(TOKEN_KEY) {
            tracing::warn!(error = %err, "failed to remove saved token");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storefront::storage::MemoryStore;
    use chrono::Utc;
    use uuid::Uuid;

    fn session(is_admin: bool) -> AuthSession {
        AuthSession {
            user: PublicUser {
                id: Uuid::new_v4(),
                name: "John Doe".into(),
                email: "john@example.com".into(),
                phone: "08012345678".into(),
                is_admin,
                created_at: Utc::now(),
            },
            tokens: TokenPair {
                access_token: "access".into(),
                refresh_token: "refresh".into(),
            },
        }
    }

    #[test]
    fn login_lifecycle() {
        let mut state = AuthState::default();
        state.login_pending();
        assert!(state.is_loading);

        state.login_succeeded(session(true));
        assert!(state.is_authenticated);
        assert!(state.is_admin);
        assert!(!state.is_loading);
        assert_eq!(state.access_token.as_deref(), Some("access"));

        state.login_failed("Invalid credentials");
        assert!(!state.is_authenticated);
        assert!(state.user.is_none());
        assert_eq!(state.error.as_deref(), Some("Invalid credentials"));
    }

    #[test]
    fn tokens_survive_reload_and_clear_removes_them() {
        let mut store = AuthStore::load(MemoryStore::new());
        store.login_succeeded(session(false));
        let reloaded = AuthStore::load(store.storage.clone());
        assert_eq!(
            reloaded.state().tokens(),
            Some(TokenPair {
                access_token: "access".into(),
                refresh_token: "refresh".into(),
            })
        );
        assert!(!reloaded.state().is_authenticated);

        store.clear();
        assert!(store.storage.get(TOKEN_KEY).is_none());
        assert!(store.state().tokens().is_none());
    }
}
