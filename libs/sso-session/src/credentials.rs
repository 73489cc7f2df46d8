//! In-memory credential state backed by [`TokenStorage`].
//!
//! The current token pair, its decoded claims and the prepared bearer header
//! live together in one immutable [`Credentials`] value. Updates swap the
//! whole value through an [`ArcSwapOption`], so readers never see the access
//! token of one pair next to the refresh token or claims of another.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use http::HeaderValue;
use parking_lot::Mutex;

use crate::claims::{ClaimsError, TokenClaims};
use crate::error::SessionError;
use crate::secret::SecretString;
use crate::storage::{MemoryTokenStorage, TokenStorage};
use crate::token::{Role, TokenPair};

/// One consistent snapshot of the stored credentials
pub struct Credentials {
    pair: TokenPair,
    claims: TokenClaims,
    header: HeaderValue,
    generation: u64,
}

impl Credentials {
    fn derive(pair: TokenPair, generation: u64) -> Result<Self, ClaimsError> {
        let claims = TokenClaims::decode(pair.access_token().expose())?;
        let mut header = HeaderValue::try_from(format!("Bearer {}", pair.access_token().expose()))
            .map_err(|_| ClaimsError::Malformed("token contains characters not allowed in a header"))?;
        header.set_sensitive(true);
        Ok(Self {
            pair,
            claims,
            header,
            generation,
        })
    }

    #[must_use]
    pub fn pair(&self) -> &TokenPair {
        &self.pair
    }

    #[must_use]
    pub fn claims(&self) -> &TokenClaims {
        &self.claims
    }

    /// `Authorization` value for the access token, marked sensitive
    #[must_use]
    pub fn header(&self) -> &HeaderValue {
        &self.header
    }

    /// Increases on every update; two snapshots with the same generation
    /// hold the same pair.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_name", &self.claims.user_name())
            .field("roles", &self.claims.roles())
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Holds at most one token pair and mirrors it to durable storage.
///
/// Reads are lock-free. Writers are serialized so that the in-memory state
/// and the persisted copy are updated in the same order.
pub struct CredentialStore {
    current: ArcSwapOption<Credentials>,
    storage: Arc<dyn TokenStorage>,
    write_lock: Mutex<()>,
    next_generation: AtomicU64,
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("current", &self.current.load_full())
            .finish_non_exhaustive()
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl CredentialStore {
    /// Empty store that persists to `storage`. Call [`hydrate`](Self::hydrate)
    /// to pick up a pair saved by an earlier run.
    pub fn new(storage: Arc<dyn TokenStorage>) -> Self {
        Self {
            current: ArcSwapOption::empty(),
            storage,
            write_lock: Mutex::new(()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Store whose persistence lasts as long as the process
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryTokenStorage::new()))
    }

    /// Load the persisted pair into memory.
    ///
    /// A pair whose access token cannot be decoded is discarded and removed
    /// from storage. Storage read errors leave the store empty. Returns
    /// whether credentials are present afterwards.
    pub fn hydrate(&self) -> bool {
        let _guard = self.write_lock.lock();
        let pair = match self.storage.load() {
            Ok(Some(pair)) => pair,
            Ok(None) => return self.is_present(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read persisted tokens, starting logged out");
                return self.is_present();
            }
        };

        match Credentials::derive(pair, self.bump_generation()) {
            Ok(creds) => {
                tracing::debug!(user = ?creds.claims.user_name(), "restored persisted tokens");
                self.current.store(Some(Arc::new(creds)));
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "discarding persisted tokens");
                self.remove_persisted();
                self.is_present()
            }
        }
    }

    /// Bearer header for the current access token.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoCredentials`] if nothing is stored.
    pub fn header(&self) -> Result<HeaderValue, SessionError> {
        self.current
            .load()
            .as_deref()
            .map(|creds| creds.header.clone())
            .ok_or(SessionError::NoCredentials)
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        self.current.load().is_some()
    }

    /// Snapshot of the current credentials
    #[must_use]
    pub fn current(&self) -> Option<Arc<Credentials>> {
        self.current.load_full()
    }

    #[must_use]
    pub fn claims(&self) -> Option<TokenClaims> {
        self.current.load().as_deref().map(|creds| creds.claims.clone())
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<SecretString> {
        self.current
            .load()
            .as_deref()
            .map(|creds| creds.pair.refresh_token().clone())
    }

    #[must_use]
    pub fn user_name(&self) -> Option<String> {
        self.current
            .load()
            .as_deref()
            .and_then(|creds| creds.claims.user_name().map(str::to_owned))
    }

    /// `false` when logged out
    #[must_use]
    pub fn has_role(&self, role: Role, scope: &str) -> bool {
        self.current
            .load()
            .as_deref()
            .is_some_and(|creds| creds.claims.has_role(role, scope))
    }

    #[must_use]
    pub fn is_admin(&self, scope: &str) -> bool {
        self.has_role(Role::Admin, scope)
    }

    #[must_use]
    pub fn is_super_admin(&self) -> bool {
        self.is_admin(crate::claims::ANY_SCOPE)
    }

    /// Replace the stored pair and re-derive its claims.
    ///
    /// Persistence failures are logged; the in-memory update stands.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Claims`] if the access token cannot be decoded.
    /// The previous credentials are kept in that case.
    pub fn update(&self, pair: TokenPair) -> Result<(), SessionError> {
        let _guard = self.write_lock.lock();
        self.store_locked(pair)
    }

    /// Replace the stored pair only if the current credentials still have
    /// `generation`. Returns `false`, leaving the store untouched, when they
    /// were replaced or cleared in the meantime.
    ///
    /// # Errors
    ///
    /// Same as [`update`](Self::update).
    pub fn update_if_generation(&self, generation: u64, pair: TokenPair) -> Result<bool, SessionError> {
        let _guard = self.write_lock.lock();
        if !self.holds_generation(generation) {
            return Ok(false);
        }
        self.store_locked(pair)?;
        Ok(true)
    }

    /// Drop the stored pair and its persisted copy. Idempotent.
    pub fn clear(&self) {
        let _guard = self.write_lock.lock();
        self.clear_locked();
    }

    /// Clear only if the current credentials still have `generation`.
    /// Returns whether anything was cleared.
    pub fn clear_if_generation(&self, generation: u64) -> bool {
        let _guard = self.write_lock.lock();
        if !self.holds_generation(generation) {
            return false;
        }
        self.clear_locked();
        true
    }

    fn holds_generation(&self, generation: u64) -> bool {
        self.current
            .load()
            .as_deref()
            .is_some_and(|creds| creds.generation == generation)
    }

    fn store_locked(&self, pair: TokenPair) -> Result<(), SessionError> {
        let creds = Credentials::derive(pair, self.bump_generation())?;
        if let Err(e) = self.storage.save(&creds.pair) {
            tracing::warn!(error = %e, "failed to persist tokens");
        }
        tracing::debug!(user = ?creds.claims.user_name(), generation = creds.generation, "update tokens");
        self.current.store(Some(Arc::new(creds)));
        Ok(())
    }

    fn clear_locked(&self) {
        if self.current.swap(None).is_some() {
            tracing::debug!("clear tokens");
        }
        self.remove_persisted();
    }

    fn remove_persisted(&self) {
        if let Err(e) = self.storage.remove() {
            tracing::warn!(error = %e, "failed to remove persisted tokens");
        }
    }

    fn bump_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }
}
