//! Cache of built provider clients, keyed by configuration id.
//!
//! Building a client is expensive (credential decryption, and discovery for
//! OIDC), so clients are cached for the configuration's lifetime and
//! invalidated when an admin updates or disables the configuration.

use crate::services::oidc_client::OidcProviderClient;
use crate::saml::SamlProviderClient;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub struct ProviderClientCache<T> {
    inner: Arc<RwLock<HashMap<Uuid, Arc<T>>>>,
}

pub type SamlClientCache = ProviderClientCache<SamlProviderClient>;
pub type OidcClientCache = ProviderClientCache<OidcProviderClient>;

impl<T> Clone for ProviderClientCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for ProviderClientCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ProviderClientCache<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn get(&self, config_id: Uuid) -> Option<Arc<T>> {
        self.inner.read().await.get(&config_id).cloned()
    }

    /// Insert a freshly built client. If a concurrent build raced us, the
    /// later insert wins; both clients were built from the same
    /// configuration row.
    pub async fn insert(&self, config_id: Uuid, client: T) -> Arc<T> {
        let client = Arc::new(client);
        self.inner
            .write()
            .await
            .insert(config_id, Arc::clone(&client));
        client
    }

    /// Drop the cached client for a configuration. Called on configuration
    /// update and disable so stale credentials and endpoints never serve
    /// another login.
    pub async fn invalidate(&self, config_id: Uuid) {
        if self.inner.write().await.remove(&config_id).is_some() {
            tracing::debug!(%config_id, "Invalidated cached provider client");
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_get_invalidate() {
        let cache: ProviderClientCache<String> = ProviderClientCache::new();
        let id = Uuid::new_v4();

        assert!(cache.get(id).await.is_none());

        let stored = cache.insert(id, "client".to_string()).await;
        assert_eq!(*stored, "client");
        assert_eq!(cache.get(id).await.as_deref(), Some(&"client".to_string()));
        assert_eq!(cache.len().await, 1);

        cache.invalidate(id).await;
        assert!(cache.get(id).await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalidate_unknown_is_noop() {
        let cache: ProviderClientCache<String> = ProviderClientCache::new();
        cache.invalidate(Uuid::new_v4()).await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_existing_handles_survive_invalidation() {
        let cache: ProviderClientCache<String> = ProviderClientCache::new();
        let id = Uuid::new_v4();
        let handle = cache.insert(id, "client".to_string()).await;
        cache.invalidate(id).await;
        // In-flight logins keep their Arc until they finish.
        assert_eq!(*handle, "client");
    }
}
