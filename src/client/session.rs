use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use tokio::sync::OnceCell;

use crate::client::storage::TokenStore;
use crate::client::ClientError;

/// Supplies the base headers of every call. Resolved once per client.
#[async_trait]
pub trait HeaderInit: Send + Sync {
    async fn initial_headers(&self) -> Result<HeaderMap, ClientError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoHeaders;

#[async_trait]
impl HeaderInit for NoHeaders {
    async fn initial_headers(&self) -> Result<HeaderMap, ClientError> {
        Ok(HeaderMap::new())
    }
}

/// A fixed header set, e.g. an API key or user agent
#[derive(Debug, Default, Clone)]
pub struct StaticHeaders(pub HeaderMap);

#[async_trait]
impl HeaderInit for StaticHeaders {
    async fn initial_headers(&self) -> Result<HeaderMap, ClientError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Default)]
struct Credentials {
    token: Option<String>,
    last_token: Option<String>,
}

/// Auth state owned by one client instance.
///
/// The first call hydrates the token from the store and resolves the header
/// hook; later calls reuse both without touching storage again. Concurrent
/// updates are last-writer-wins.
pub struct Session {
    store: Arc<dyn TokenStore>,
    header_init: Arc<dyn HeaderInit>,
    headers: OnceCell<HeaderMap>,
    credentials: Mutex<Credentials>,
}

impl Session {
    pub fn new(store: Arc<dyn TokenStore>, header_init: Arc<dyn HeaderInit>) -> Self {
        Self {
            store,
            header_init,
            headers: OnceCell::new(),
            credentials: Mutex::new(Credentials::default()),
        }
    }

    fn credentials(&self) -> MutexGuard<'_, Credentials> {
        self.credentials.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn headers(&self) -> Result<HeaderMap, ClientError> {
        let headers = self
            .headers
            .get_or_try_init(|| async {
                self.hydrate().await;
                self.header_init.initial_headers().await
            })
            .await?;
        Ok(headers.clone())
    }

    async fn hydrate(&self) {
        match self.store.load().await {
            Ok(Some(stored)) => {
                tracing::debug!("Found stored token");
                let mut credentials = self.credentials();
                if credentials.token.is_none() {
                    credentials.last_token = Some(stored.clone());
                    credentials.token = Some(stored);
                }
            }
            Ok(None) => tracing::debug!("No stored token"),
            Err(err) => tracing::warn!("Failed to read stored token: {}", err),
        }
    }

    /// `Bearer <sealed>` when a token is cached
    pub fn bearer(&self) -> Option<String> {
        self.credentials().token.clone()
    }

    /// Cache a refreshed sealed token. Persists only when it changed.
    pub async fn absorb_token(&self, sealed: &str) {
        let bearer = format!("Bearer {}", sealed);
        let changed = {
            let mut credentials = self.credentials();
            credentials.token = Some(bearer.clone());
            if credentials.last_token.as_deref() == Some(bearer.as_str()) {
                false
            } else {
                credentials.last_token = Some(bearer.clone());
                true
            }
        };

        if changed {
            match self.store.store(&bearer).await {
                Ok(()) => tracing::debug!("Token stored"),
                Err(err) => tracing::error!("Failed to store token: {}", err),
            }
        }
    }

    pub async fn clear(&self) -> Result<(), ClientError> {
        *self.credentials() = Credentials::default();
        self.store.clear().await
    }
}
