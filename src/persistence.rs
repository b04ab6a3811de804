//! Vendor credential cache
//!
//! Each vendor integration persists its session tokens in a small JSON file
//! so a restart does not force a fresh interactive login. The contents are
//! opaque to the core; only the owning client reads or writes them.

use crate::error::Result;
use crate::logging::get_logger;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// JSON-backed token store for one vendor integration
pub struct TokenStore {
    path: PathBuf,
    logger: crate::logging::StructuredLogger,
}

impl TokenStore {
    /// Create a store backed by the given file path
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let logger = get_logger("tokens");
        Self {
            path: path.into(),
            logger,
        }
    }

    /// Load cached tokens, `None` when the file does not exist
    pub fn load<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        if !Path::new(&self.path).exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&self.path)?;
        let tokens: T = serde_json::from_str(&contents)?;
        self.logger
            .debug(&format!("Loaded cached tokens from {}", self.path.display()));
        Ok(Some(tokens))
    }

    /// Save tokens, replacing any previous contents
    pub fn save<T: Serialize>(&self, tokens: &T) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(tokens)?;
        std::fs::write(&self.path, contents)?;
        self.logger
            .debug(&format!("Saved tokens to {}", self.path.display()));
        Ok(())
    }

    /// Remove the cached token file, e.g. after the vendor rejects it
    pub fn clear(&self) -> Result<()> {
        if Path::new(&self.path).exists() {
            std::fs::remove_file(&self.path)?;
            self.logger
                .info(&format!("Cleared token cache {}", self.path.display()));
        }
        Ok(())
    }
}
