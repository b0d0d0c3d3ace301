//! OAuth state store with a durable file mirror.
//!
//! The in-memory table is authoritative while the process lives. Every
//! mutation is followed by load-merge-save against the persistence backend so
//! that a restarted process (or a sibling process sharing the file) can still
//! validate tokens it did not issue itself.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;

use super::persist::{JsonFilePersistence, MemoryPersistence, StatePersistence};
use super::pkce;
use super::types::{
    OAuthStateEntry, PendingAuthorization, StateMetadata, StateTable, state_prefix,
};
use crate::config::Config;
use crate::error::{ConfigError, StateError, StateResult};

/// Entries plus tokens this process has removed.
///
/// Removed tokens are kept until their original expiry so a merge from a
/// stale copy of the file cannot bring them back. `mirrored` holds the live
/// tokens known to be in the file; one that later disappears from it was
/// consumed or purged by another process.
#[derive(Default)]
struct StateTables {
    live: StateTable,
    removed: HashMap<String, DateTime<Utc>>,
    mirrored: HashSet<String>,
}

impl StateTables {
    /// Reconcile with the persisted table. Returns how many entries were added.
    fn merge(&mut self, persisted: StateTable, now: DateTime<Utc>) -> usize {
        let vanished: Vec<String> = self
            .live
            .keys()
            .filter(|state| self.mirrored.contains(*state) && !persisted.contains_key(*state))
            .cloned()
            .collect();
        for state in &vanished {
            tracing::debug!(state = state_prefix(state), "OAuth state removed by another process");
            self.remove(state);
        }

        let mut merged = 0;
        for (state, mut entry) in persisted {
            if entry.is_expired_at(now)
                || self.removed.contains_key(&state)
                || self.live.contains_key(&state)
            {
                continue;
            }
            entry.state.clone_from(&state);
            self.mirrored.insert(state.clone());
            self.live.insert(state, entry);
            merged += 1;
        }
        merged
    }

    fn remove(&mut self, state: &str) -> Option<OAuthStateEntry> {
        let entry = self.live.remove(state)?;
        self.mirrored.remove(state);
        self.removed.insert(state.to_owned(), entry.expires_at);
        Some(entry)
    }

    fn mark_mirrored(&mut self) {
        self.mirrored = self.live.keys().cloned().collect();
    }

    fn forget_stale_removals(&mut self, now: DateTime<Utc>) {
        self.removed.retain(|_, expires_at| *expires_at >= now);
    }
}

/// Issues, persists and consumes one-time OAuth state tokens.
#[derive(Clone)]
pub struct OAuthStateStore {
    tables: Arc<Mutex<StateTables>>,
    persistence: Arc<dyn StatePersistence>,
    ttl: TimeDelta,
}

impl OAuthStateStore {
    /// Create a store with an explicit backend.
    #[must_use]
    pub fn with_persistence(persistence: Arc<dyn StatePersistence>, ttl: TimeDelta) -> Self {
        Self { tables: Arc::new(Mutex::new(StateTables::default())), persistence, ttl }
    }

    /// Create a store from configuration and load any persisted entries.
    ///
    /// A missing or malformed state file yields an empty store.
    pub async fn open(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let ttl = TimeDelta::from_std(config.state_ttl)
            .map_err(|_| ConfigError::InvalidTtl { ttl: config.state_ttl })?;

        let persistence: Arc<dyn StatePersistence> = match &config.state_file {
            Some(path) => Arc::new(JsonFilePersistence::new(path)),
            None => Arc::new(MemoryPersistence::new()),
        };

        let store = Self::with_persistence(persistence, ttl);
        let loaded = store.reload().await;

        tracing::info!(
            location = %store.persistence.location(),
            loaded,
            ttl_secs = ttl.num_seconds(),
            "OAuth state store ready"
        );

        Ok(store)
    }

    /// Generate an unguessable token from two UUIDs.
    fn generate_state() -> String {
        format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
    }

    /// Issue a new state token for an outbound authorization request.
    ///
    /// Persistence failures are logged; the token is valid in this process
    /// either way.
    pub async fn store_oauth_state(&self, metadata: StateMetadata) -> String {
        let mut tables = self.tables.lock().await;

        let mut state = Self::generate_state();
        while tables.live.contains_key(&state) || tables.removed.contains_key(&state) {
            state = Self::generate_state();
        }

        let created_at = Utc::now();
        let expires_at =
            created_at.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        tables.live.insert(
            state.clone(),
            OAuthStateEntry { state: state.clone(), created_at, expires_at, metadata },
        );

        tracing::debug!(state = state_prefix(&state), "Issued OAuth state");

        self.persist(&mut tables).await;
        state
    }

    /// Issue a state token with a fresh PKCE verifier stored in its metadata.
    pub async fn store_oauth_state_with_pkce(
        &self,
        mut metadata: StateMetadata,
    ) -> PendingAuthorization {
        let verifier = pkce::generate_verifier();
        let code_challenge = pkce::challenge_s256(&verifier);
        metadata.insert(pkce::VERIFIER_KEY.to_owned(), verifier.into());

        let state = self.store_oauth_state(metadata).await;

        PendingAuthorization { state, code_challenge, code_challenge_method: pkce::METHOD_S256 }
    }

    /// Validate a state token from a callback and consume it.
    ///
    /// Succeeds at most once per token. Expired tokens are removed as a side
    /// effect of detection.
    pub async fn validate_and_consume_oauth_state(&self, state: &str) -> StateResult<StateMetadata> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();

        self.merge_persisted(&mut tables, now).await;

        let Some(entry) = tables.remove(state) else {
            tracing::warn!(state = state_prefix(state), "Rejected unknown OAuth state");
            return Err(StateError::InvalidState);
        };

        self.persist(&mut tables).await;

        if entry.is_expired_at(now) {
            tracing::warn!(
                state = state_prefix(state),
                expired_at = %entry.expires_at,
                "Rejected expired OAuth state"
            );
            return Err(StateError::ExpiredState { expired_at: entry.expires_at });
        }

        tracing::info!(state = state_prefix(state), "Consumed OAuth state");
        Ok(entry.metadata)
    }

    /// Merge persisted entries into memory. Returns how many were added.
    pub async fn reload(&self) -> usize {
        let mut tables = self.tables.lock().await;
        self.merge_persisted(&mut tables, Utc::now()).await
    }

    /// Remove every expired entry from memory and the mirror.
    pub async fn purge_expired(&self) -> usize {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();

        self.merge_persisted(&mut tables, now).await;

        let expired: Vec<String> = tables
            .live
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(state, _)| state.clone())
            .collect();
        for state in &expired {
            tables.remove(state);
        }

        self.persist(&mut tables).await;

        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "Purged expired OAuth states");
        }
        expired.len()
    }

    /// Number of unexpired entries in memory.
    pub async fn pending_count(&self) -> usize {
        let now = Utc::now();
        self.tables.lock().await.live.values().filter(|e| !e.is_expired_at(now)).count()
    }

    /// Where entries are persisted, for diagnostics.
    #[must_use]
    pub fn location(&self) -> String {
        self.persistence.location()
    }

    async fn merge_persisted(&self, tables: &mut StateTables, now: DateTime<Utc>) -> usize {
        match self.persistence.load().await {
            Ok(persisted) => {
                let merged = tables.merge(persisted, now);
                if merged > 0 {
                    tracing::debug!(count = merged, "Merged persisted OAuth states");
                }
                merged
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable OAuth state file");
                0
            }
        }
    }

    /// Load-merge-save. Never fails the caller.
    async fn persist(&self, tables: &mut StateTables) {
        let now = Utc::now();
        self.merge_persisted(tables, now).await;
        tables.forget_stale_removals(now);

        match self.persistence.save(&tables.live).await {
            Ok(()) => tables.mark_mirrored(),
            Err(e) => tracing::warn!(
                error = %e,
                location = %self.persistence.location(),
                "Failed to persist OAuth states; continuing in memory"
            ),
        }
    }
}

impl std::fmt::Debug for OAuthStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthStateStore")
            .field("location", &self.persistence.location())
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn metadata(scope: &str) -> StateMetadata {
        let mut metadata = StateMetadata::new();
        metadata.insert("scope".into(), scope.into());
        metadata
    }

    fn memory_store(ttl: TimeDelta) -> OAuthStateStore {
        OAuthStateStore::with_persistence(Arc::new(MemoryPersistence::new()), ttl)
    }

    #[tokio::test]
    async fn test_state_lifecycle() {
        let store = memory_store(TimeDelta::minutes(10));

        let state = store.store_oauth_state(metadata("calendar.readonly")).await;
        assert_eq!(state.len(), 64);

        // First consume succeeds
        let consumed = store.validate_and_consume_oauth_state(&state).await.unwrap();
        assert_eq!(consumed, metadata("calendar.readonly"));

        // Second consume fails (already used)
        assert_eq!(
            store.validate_and_consume_oauth_state(&state).await,
            Err(StateError::InvalidState)
        );
    }

    #[tokio::test]
    async fn test_unknown_state() {
        let store = memory_store(TimeDelta::minutes(10));
        assert_eq!(
            store.validate_and_consume_oauth_state("never-issued").await,
            Err(StateError::InvalidState)
        );
    }

    #[tokio::test]
    async fn test_expired_state_is_removed() {
        let store = memory_store(TimeDelta::milliseconds(20));
        let state = store.store_oauth_state(metadata("gmail.send")).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(matches!(
            store.validate_and_consume_oauth_state(&state).await,
            Err(StateError::ExpiredState { .. })
        ));
        assert_eq!(
            store.validate_and_consume_oauth_state(&state).await,
            Err(StateError::InvalidState)
        );
    }

    #[tokio::test]
    async fn test_entry_timestamps() {
        let store = memory_store(TimeDelta::minutes(10));
        store.store_oauth_state(StateMetadata::new()).await;

        let tables = store.tables.lock().await;
        let entry = tables.live.values().next().unwrap();
        assert!(entry.expires_at > entry.created_at);
        assert_eq!(entry.expires_at - entry.created_at, TimeDelta::minutes(10));
    }

    #[tokio::test]
    async fn test_pkce_verifier_in_metadata() {
        let store = memory_store(TimeDelta::minutes(10));
        let pending = store.store_oauth_state_with_pkce(metadata("drive.file")).await;
        assert_eq!(pending.code_challenge_method, "S256");

        let consumed = store.validate_and_consume_oauth_state(&pending.state).await.unwrap();
        let verifier = consumed[pkce::VERIFIER_KEY].as_str().unwrap();
        assert!(pkce::verify_s256(verifier, &pending.code_challenge));
        assert_eq!(consumed["scope"], "drive.file");
    }

    #[tokio::test]
    async fn test_merge_skips_removed_tokens() {
        let mut tables = StateTables::default();
        let now = Utc::now();
        let entry = OAuthStateEntry {
            state: "abc".into(),
            created_at: now,
            expires_at: now + TimeDelta::minutes(1),
            metadata: StateMetadata::new(),
        };
        tables.live.insert("abc".into(), entry.clone());
        tables.remove("abc");

        let mut stale = StateTable::new();
        stale.insert("abc".into(), entry);
        assert_eq!(tables.merge(stale, now), 0);
        assert!(tables.live.is_empty());
    }

    #[tokio::test]
    async fn test_merge_drops_entries_removed_from_file() {
        let mut tables = StateTables::default();
        let now = Utc::now();
        for state in ["kept", "unsaved"] {
            tables.live.insert(
                state.into(),
                OAuthStateEntry {
                    state: state.into(),
                    created_at: now,
                    expires_at: now + TimeDelta::minutes(1),
                    metadata: StateMetadata::new(),
                },
            );
        }
        tables.mirrored.insert("kept".into());

        // The file no longer has "kept"; "unsaved" was never written
        assert_eq!(tables.merge(StateTable::new(), now), 0);
        assert!(!tables.live.contains_key("kept"));
        assert!(tables.removed.contains_key("kept"));
        assert!(tables.live.contains_key("unsaved"));
    }

    #[tokio::test]
    async fn test_consumed_elsewhere_is_not_written_back() {
        let shared: Arc<dyn StatePersistence> = Arc::new(MemoryPersistence::new());
        let issuer = OAuthStateStore::with_persistence(Arc::clone(&shared), TimeDelta::minutes(10));
        let state = issuer.store_oauth_state(metadata("calendar.readonly")).await;

        let callback = OAuthStateStore::with_persistence(Arc::clone(&shared), TimeDelta::minutes(10));
        assert!(callback.validate_and_consume_oauth_state(&state).await.is_ok());

        issuer.store_oauth_state(StateMetadata::new()).await;
        assert!(!shared.load().await.unwrap().contains_key(&state));

        let fresh = OAuthStateStore::with_persistence(shared, TimeDelta::minutes(10));
        assert_eq!(
            fresh.validate_and_consume_oauth_state(&state).await,
            Err(StateError::InvalidState)
        );
        assert_eq!(
            issuer.validate_and_consume_oauth_state(&state).await,
            Err(StateError::InvalidState)
        );
    }

    #[tokio::test]
    async fn test_oversized_ttl_does_not_overflow() {
        let store = memory_store(TimeDelta::MAX);
        let state = store.store_oauth_state(StateMetadata::new()).await;
        assert!(store.validate_and_consume_oauth_state(&state).await.is_ok());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = memory_store(TimeDelta::milliseconds(20));
        store.store_oauth_state(StateMetadata::new()).await;
        store.store_oauth_state(StateMetadata::new()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(store.pending_count().await, 0);
        assert_eq!(store.purge_expired().await, 2);
        assert_eq!(store.purge_expired().await, 0);
    }
}
