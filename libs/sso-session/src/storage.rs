//! Durable local storage for the token pair.
//!
//! Two string fields, `token` and `refreshToken`, survive process restarts.
//! Storage is read once at startup, written on every credential update and
//! removed on clear.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::token::TokenPair;

/// Errors raised by [`TokenStorage`] implementations
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("token storage I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("token storage document is invalid: {0}")]
    Format(#[source] Arc<serde_json::Error>),
}

impl StorageError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source: Arc::new(source),
        }
    }
}

/// Key/value persistence of the token pair
pub trait TokenStorage: Send + Sync {
    /// Read the persisted pair, `None` if nothing (or only half a pair) is stored
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store cannot be read or parsed.
    fn load(&self) -> Result<Option<TokenPair>, StorageError>;

    /// Persist both tokens, replacing any previous pair
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the pair cannot be written.
    fn save(&self, pair: &TokenPair) -> Result<(), StorageError>;

    /// Remove the persisted pair; removing an absent pair succeeds
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store cannot be modified.
    fn remove(&self) -> Result<(), StorageError>;
}

/// On-disk document
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

impl StoredTokens {
    fn into_pair(self) -> Option<TokenPair> {
        match (self.token, self.refresh_token) {
            (Some(token), Some(refresh)) if !token.is_empty() && !refresh.is_empty() => {
                Some(TokenPair::new(token, refresh))
            }
            (None, None) => None,
            _ => {
                tracing::warn!("ignoring incomplete persisted token pair");
                None
            }
        }
    }
}

/// JSON file storage
///
/// Writes go to a sibling temporary file which is then renamed over the
/// target, so a crash never leaves a half-written document. On Unix the file
/// is created with mode `0600`.
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data-local-dir>/sso-session/tokens.json`, if the platform has one
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join("sso-session").join("tokens.json"))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;
        io::Write::write_all(&mut file, contents)?;
        file.sync_all()
    }
}

impl TokenStorage for FileTokenStorage {
    fn load(&self) -> Result<Option<TokenPair>, StorageError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };
        let doc: StoredTokens =
            serde_json::from_slice(&raw).map_err(|e| StorageError::Format(Arc::new(e)))?;
        Ok(doc.into_pair())
    }

    fn save(&self, pair: &TokenPair) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }

        let doc = StoredTokens {
            token: Some(pair.access_token().expose().to_owned()),
            refresh_token: Some(pair.refresh_token().expose().to_owned()),
        };
        let encoded = zeroize::Zeroizing::new(
            serde_json::to_vec_pretty(&doc).map_err(|e| StorageError::Format(Arc::new(e)))?,
        );

        let tmp = self.temp_path();
        Self::write_private(&tmp, &encoded).map_err(|e| StorageError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| StorageError::io(&self.path, e))
    }

    fn remove(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(&self.path, e)),
        }
    }
}

/// In-process storage, lost on exit
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    pair: Mutex<Option<TokenPair>>,
}

impl MemoryTokenStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-populated with `pair`, as if persisted by an earlier run
    #[must_use]
    pub fn with_pair(pair: TokenPair) -> Self {
        Self {
            pair: Mutex::new(Some(pair)),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pair.lock().is_none()
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn load(&self) -> Result<Option<TokenPair>, StorageError> {
        Ok(self.pair.lock().clone())
    }

    fn save(&self, pair: &TokenPair) -> Result<(), StorageError> {
        *self.pair.lock() = Some(pair.clone());
        Ok(())
    }

    fn remove(&self) -> Result<(), StorageError> {
        *self.pair.lock() = None;
        Ok(())
    }
}
