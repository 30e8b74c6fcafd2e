//! Token persistence backends.

use super::AccessToken;
use crate::errors::AuthError;
use crate::ports::TokenPersistence;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Stores the token as JSON in a file.
#[derive(Debug, Clone)]
pub struct FileTokenPersistence {
    path: PathBuf,
}

impl FileTokenPersistence {
    /// Creates a backend writing to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TokenPersistence for FileTokenPersistence {
    async fn load(&self) -> Result<Option<AccessToken>, AuthError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AuthError::Persistence(format!("{}: {e}", self.path.display()))),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| AuthError::Persistence(format!("{}: {e}", self.path.display())))
    }

    async fn save(&self, token: &AccessToken) -> Result<(), AuthError> {
        let json = serde_json::to_vec_pretty(token).map_err(|e| AuthError::Persistence(e.to_string()))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| AuthError::Persistence(format!("{}: {e}", self.path.display())))
    }
}

/// Keeps nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTokenPersistence;

#[async_trait]
impl TokenPersistence for NoopTokenPersistence {
    async fn load(&self) -> Result<Option<AccessToken>, AuthError> {
        Ok(None)
    }

    async fn save(&self, _token: &AccessToken) -> Result<(), AuthError> {
        Ok(())
    }
}
