//! Per-plugin session state shared by concurrent query executions.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::RwLock;

use crate::backends::{AccessToken, HistorianBackend, TokenProvider};
use crate::config::SessionConfig;
use crate::directory::VariableDirectory;
use crate::error::{IihflowError, Result};

/// Backend handle, cached token and variable directory.
///
/// Cloning is cheap and clones share the cache. Refreshes are not coordinated between
/// executions; two callers noticing an expired token at once both refresh.
#[derive(Clone)]
pub struct Session {
    backend: Arc<dyn HistorianBackend>,
    tokens: Arc<dyn TokenProvider>,
    refresh_margin: Duration,
    token: Arc<RwLock<Option<AccessToken>>>,
    directory: Arc<RwLock<Arc<VariableDirectory>>>,
}

impl Session {
    pub fn new(
        backend: Arc<dyn HistorianBackend>,
        tokens: Arc<dyn TokenProvider>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            backend,
            tokens,
            refresh_margin: Duration::seconds(config.token_refresh_margin_secs as i64),
            token: Arc::new(RwLock::new(None)),
            directory: Arc::new(RwLock::new(Arc::new(VariableDirectory::new()))),
        }
    }

    pub fn backend(&self) -> &Arc<dyn HistorianBackend> {
        &self.backend
    }

    /// The cached token, refreshed first when it is missing, empty or about to expire.
    pub async fn access_token(&self) -> Result<AccessToken> {
        if let Some(token) = self.token.read().await.as_ref() {
            if !token.is_empty() && Utc::now() + self.refresh_margin < token.expires_at {
                return Ok(token.clone());
            }
        }
        self.refresh().await
    }

    /// Issue a new token and rebuild the variable directory with it.
    pub async fn refresh(&self) -> Result<AccessToken> {
        let token = self.tokens.issue_token().await?;
        if token.is_empty() {
            return Err(IihflowError::Auth("token provider returned an empty token".to_string()));
        }
        *self.token.write().await = Some(token.clone());
        tracing::info!(expires_at = %token.expires_at, "session token refreshed");

        match VariableDirectory::discover(self.backend.as_ref(), &token).await {
            Ok(directory) => *self.directory.write().await = Arc::new(directory),
            Err(e) => {
                tracing::warn!(error = %e, "variable discovery failed; keeping previous directory")
            }
        }
        Ok(token)
    }

    pub async fn directory(&self) -> Arc<VariableDirectory> {
        self.directory.read().await.clone()
    }

    /// Replace the directory without going through discovery.
    pub async fn set_directory(&self, directory: VariableDirectory) {
        *self.directory.write().await = Arc::new(directory);
    }
}
