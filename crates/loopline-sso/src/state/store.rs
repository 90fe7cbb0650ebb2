//! Storage for ephemeral authorization state.
//!
//! Provides both an in-memory store (tests, single-node deployments) and a
//! PostgreSQL-backed store for production.

use super::types::{AuthState, StateStoreError};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Store for pending authorization round trips.
#[async_trait]
pub trait AuthStateStore: Send + Sync {
    /// Store a new authorization state.
    async fn store(&self, state: AuthState) -> Result<(), StateStoreError>;

    /// Look up a live state by its token without consuming it.
    ///
    /// Consumed and expired states are indistinguishable from absent ones:
    /// all three return `None`.
    async fn get(&self, state: &str) -> Result<Option<AuthState>, StateStoreError>;

    /// Attach the PKCE code verifier to a pending state.
    async fn attach_verifier(&self, state: &str, verifier: &str) -> Result<(), StateStoreError>;

    /// Validate and consume a state atomically.
    ///
    /// Marks the state consumed and returns it. Two concurrent consumers of
    /// the same token must not both succeed.
    async fn consume(&self, state: &str) -> Result<AuthState, StateStoreError>;

    /// Remove expired states. Returns the number deleted.
    async fn cleanup_expired(&self) -> Result<u64, StateStoreError>;
}

/// In-memory state store.
#[derive(Debug, Default)]
pub struct InMemoryAuthStateStore {
    states: Arc<RwLock<HashMap<String, AuthState>>>,
}

impl InMemoryAuthStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthStateStore for InMemoryAuthStateStore {
    async fn store(&self, state: AuthState) -> Result<(), StateStoreError> {
        let mut states = self.states.write().await;

        if states.contains_key(&state.state) {
            return Err(StateStoreError::DuplicateState);
        }

        states.insert(state.state.clone(), state);
        Ok(())
    }

    async fn get(&self, state: &str) -> Result<Option<AuthState>, StateStoreError> {
        let states = self.states.read().await;
        Ok(states
            .get(state)
            .filter(|s| !s.is_consumed() && !s.is_expired())
            .cloned())
    }

    async fn attach_verifier(&self, state: &str, verifier: &str) -> Result<(), StateStoreError> {
        let mut states = self.states.write().await;
        let entry = states.get_mut(state).ok_or(StateStoreError::NotFound)?;
        entry.validate()?;
        entry.pkce_verifier = Some(verifier.to_string());
        Ok(())
    }

    async fn consume(&self, state: &str) -> Result<AuthState, StateStoreError> {
        let mut states = self.states.write().await;

        let entry = states.get_mut(state).ok_or(StateStoreError::NotFound)?;
        entry.validate()?;
        entry.consume();
        let consumed = entry.clone();

        tracing::info!(
            config_id = %consumed.sso_configuration_id,
            "Authorization state consumed"
        );

        Ok(consumed)
    }

    async fn cleanup_expired(&self) -> Result<u64, StateStoreError> {
        let mut states = self.states.write().await;
        let before_count = states.len();

        states.retain(|_, state| !state.is_expired());

        let deleted = (before_count - states.len()) as u64;

        if deleted > 0 {
            tracing::debug!(deleted = deleted, "Cleaned up expired authorization states");
        }

        Ok(deleted)
    }
}

/// PostgreSQL-backed state store for multi-node deployments.
pub struct PostgresAuthStateStore {
    pool: PgPool,
}

impl PostgresAuthStateStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch a row regardless of consumed/expired status. Only for internal
    /// diagnostics; the trait's `get` hides dead states.
    async fn fetch_any(&self, state: &str) -> Result<Option<AuthState>, StateStoreError> {
        let row = sqlx::query(
            r"
            SELECT state, sso_configuration_id, pkce_verifier, redirect_uri,
                   created_at, expires_at, consumed_at
            FROM sso_auth_states
            WHERE state = $1
            ",
        )
        .bind(state)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StateStoreError::Storage(e.to_string()))?;

        Ok(row.as_ref().map(Self::row_to_state))
    }

    fn row_to_state(r: &sqlx::postgres::PgRow) -> AuthState {
        AuthState {
            state: r.get("state"),
            sso_configuration_id: r.get("sso_configuration_id"),
            pkce_verifier: r.get("pkce_verifier"),
            redirect_uri: r.get("redirect_uri"),
            created_at: r.get("created_at"),
            expires_at: r.get("expires_at"),
            consumed_at: r.get("consumed_at"),
        }
    }
}

#[async_trait]
impl AuthStateStore for PostgresAuthStateStore {
    async fn store(&self, state: AuthState) -> Result<(), StateStoreError> {
        // RETURNING distinguishes insert-success from conflict-silenced.
        let row = sqlx::query(
            r"
            INSERT INTO sso_auth_states
                (state, sso_configuration_id, pkce_verifier, redirect_uri,
                 created_at, expires_at, consumed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (state) DO NOTHING
            RETURNING state
            ",
        )
        .bind(&state.state)
        .bind(state.sso_configuration_id)
        .bind(&state.pkce_verifier)
        .bind(&state.redirect_uri)
        .bind(state.created_at)
        .bind(state.expires_at)
        .bind(state.consumed_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StateStoreError::Storage(e.to_string()))?;

        if row.is_none() {
            return Err(StateStoreError::DuplicateState);
        }

        tracing::debug!(
            config_id = %state.sso_configuration_id,
            expires_at = %state.expires_at,
            "Stored authorization state"
        );

        Ok(())
    }

    async fn get(&self, state: &str) -> Result<Option<AuthState>, StateStoreError> {
        let row = sqlx::query(
            r"
            SELECT state, sso_configuration_id, pkce_verifier, redirect_uri,
                   created_at, expires_at, consumed_at
            FROM sso_auth_states
            WHERE state = $1
              AND consumed_at IS NULL
              AND expires_at > NOW()
            ",
        )
        .bind(state)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StateStoreError::Storage(e.to_string()))?;

        Ok(row.as_ref().map(Self::row_to_state))
    }

    async fn attach_verifier(&self, state: &str, verifier: &str) -> Result<(), StateStoreError> {
        let result = sqlx::query(
            r"
            UPDATE sso_auth_states
            SET pkce_verifier = $2
            WHERE state = $1 AND consumed_at IS NULL AND expires_at > NOW()
            ",
        )
        .bind(state)
        .bind(verifier)
        .execute(&self.pool)
        .await
        .map_err(|e| StateStoreError::Storage(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StateStoreError::NotFound);
        }
        Ok(())
    }

    async fn consume(&self, state: &str) -> Result<AuthState, StateStoreError> {
        let now = Utc::now();

        // Atomic update prevents two concurrent callbacks from both
        // succeeding with the same token.
        let row = sqlx::query(
            r"
            UPDATE sso_auth_states
            SET consumed_at = $2
            WHERE state = $1
              AND consumed_at IS NULL
              AND expires_at > $2
            RETURNING state, sso_configuration_id, pkce_verifier, redirect_uri,
                      created_at, expires_at, consumed_at
            ",
        )
        .bind(state)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StateStoreError::Storage(e.to_string()))?;

        if let Some(r) = row {
            let consumed = Self::row_to_state(&r);
            tracing::info!(
                config_id = %consumed.sso_configuration_id,
                "Authorization state consumed"
            );
            Ok(consumed)
        } else {
            // The update didn't match; look the row up to log the right
            // reason. Callers see the same error either way.
            let existing = self.fetch_any(state).await?;
            match existing {
                None => Err(StateStoreError::NotFound),
                Some(s) if s.is_consumed() => {
                    tracing::warn!(
                        config_id = %s.sso_configuration_id,
                        consumed_at = ?s.consumed_at,
                        "Replay attempt: authorization state already consumed"
                    );
                    Err(StateStoreError::AlreadyConsumed {
                        consumed_at: s.consumed_at.unwrap_or(s.expires_at),
                    })
                }
                Some(s) => {
                    tracing::warn!(
                        config_id = %s.sso_configuration_id,
                        expired_at = %s.expires_at,
                        "Expired authorization state presented"
                    );
                    Err(StateStoreError::Expired {
                        expired_at: s.expires_at,
                    })
                }
            }
        }
    }

    async fn cleanup_expired(&self) -> Result<u64, StateStoreError> {
        let result = sqlx::query("DELETE FROM sso_auth_states WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await
            .map_err(|e| StateStoreError::Storage(e.to_string()))?;

        let deleted = result.rows_affected();

        if deleted > 0 {
            tracing::info!(deleted = deleted, "Cleaned up expired authorization states");
        }

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn make_state(token: &str) -> AuthState {
        AuthState::new(
            token.to_string(),
            Uuid::new_v4(),
            "https://app.example.com/dashboard".to_string(),
        )
    }

    #[tokio::test]
    async fn test_store_and_get() {
        let store = InMemoryAuthStateStore::new();
        store.store(make_state("tok-123")).await.unwrap();

        let retrieved = store.get("tok-123").await.unwrap().unwrap();
        assert_eq!(retrieved.state, "tok-123");
        assert!(retrieved.pkce_verifier.is_none());
        assert!(!retrieved.is_consumed());
    }

    #[tokio::test]
    async fn test_duplicate_state_rejected() {
        let store = InMemoryAuthStateStore::new();
        store.store(make_state("tok-123")).await.unwrap();

        let result = store.store(make_state("tok-123")).await;
        assert!(matches!(result, Err(StateStoreError::DuplicateState)));
    }

    #[tokio::test]
    async fn test_attach_verifier() {
        let store = InMemoryAuthStateStore::new();
        store.store(make_state("tok-123")).await.unwrap();

        store.attach_verifier("tok-123", "verifier-abc").await.unwrap();

        let retrieved = store.get("tok-123").await.unwrap().unwrap();
        assert_eq!(retrieved.pkce_verifier.as_deref(), Some("verifier-abc"));
    }

    #[tokio::test]
    async fn test_consume_is_single_use() {
        let store = InMemoryAuthStateStore::new();
        store.store(make_state("tok-123")).await.unwrap();

        let consumed = store.consume("tok-123").await.unwrap();
        assert!(consumed.consumed_at.is_some());

        // Second consume fails (replay)
        let result = store.consume("tok-123").await;
        assert!(matches!(result, Err(StateStoreError::AlreadyConsumed { .. })));
    }

    #[tokio::test]
    async fn test_get_after_consume_returns_none() {
        let store = InMemoryAuthStateStore::new();
        store.store(make_state("tok-123")).await.unwrap();
        store.consume("tok-123").await.unwrap();

        // A consumed state looks exactly like one that never existed.
        assert!(store.get("tok-123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_expired_state_returns_none() {
        let store = InMemoryAuthStateStore::new();
        let mut state = make_state("tok-expired");
        state.expires_at = Utc::now() - Duration::minutes(1);
        store.store(state).await.unwrap();

        assert!(store.get("tok-expired").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_consume_unknown_state() {
        let store = InMemoryAuthStateStore::new();
        let result = store.consume("nonexistent").await;
        assert!(matches!(result, Err(StateStoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_consume_expired_state() {
        let store = InMemoryAuthStateStore::new();
        let mut state = make_state("tok-expired");
        state.expires_at = Utc::now() - Duration::minutes(1);
        store.store(state).await.unwrap();

        let result = store.consume("tok-expired").await;
        assert!(matches!(result, Err(StateStoreError::Expired { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_consume_single_winner() {
        let store = Arc::new(InMemoryAuthStateStore::new());
        store.store(make_state("tok-race")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(
                async move { store.consume("tok-race").await },
            ));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let store = InMemoryAuthStateStore::new();

        let mut expired = make_state("tok-old");
        expired.expires_at = Utc::now() - Duration::minutes(10);
        store.store(expired).await.unwrap();
        store.store(make_state("tok-fresh")).await.unwrap();

        let deleted = store.cleanup_expired().await.unwrap();
        assert_eq!(deleted, 1);

        assert!(store.get("tok-old").await.unwrap().is_none());
        assert!(store.get("tok-fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_error_mapping_hides_reason() {
        use crate::error::SsoError;

        for err in [
            StateStoreError::NotFound,
            StateStoreError::AlreadyConsumed {
                consumed_at: Utc::now(),
            },
            StateStoreError::Expired {
                expired_at: Utc::now(),
            },
        ] {
            let sso_err: SsoError = err.into();
            assert!(matches!(sso_err, SsoError::InvalidOrExpiredState));
        }
    }
}
