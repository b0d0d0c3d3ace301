//! Durable mirror of the state table.
//!
//! The file is a JSON object mapping token to `{created_at, expires_at, metadata}`
//! with RFC 3339 timestamps. Writes go to a sibling temp file that is renamed
//! over the target, so readers never observe a half-written table.
//!
//! Load-merge-save narrows the window in which two processes overwrite each
//! other's entries but does not close it. Without an exclusive file lock the
//! guarantee only holds for a single writer process.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use super::types::{OAuthStateEntry, StateTable, state_prefix};
use crate::error::{PersistenceError, PersistenceResult};

/// Backend that stores the state table between process lifetimes.
#[async_trait]
pub trait StatePersistence: Send + Sync {
    /// Load the persisted table. A missing or empty file is an empty table.
    async fn load(&self) -> PersistenceResult<StateTable>;

    /// Replace the persisted table.
    async fn save(&self, table: &StateTable) -> PersistenceResult<()>;

    /// Human-readable location for logs.
    fn location(&self) -> String;
}

/// JSON file backend.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_error(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Write { path: self.path.clone(), source }
    }
}

/// Parse file content into a table, restoring each entry's `state` from its key.
///
/// The content must be a JSON object. Records that do not decode are skipped
/// with a warning so one bad entry does not cost every other process its state.
pub fn parse_table(raw: &str) -> Result<StateTable, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(StateTable::new());
    }

    let records: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw)?;
    let mut table = StateTable::with_capacity(records.len());
    for (state, record) in records {
        match serde_json::from_value::<OAuthStateEntry>(record) {
            Ok(mut entry) => {
                entry.state.clone_from(&state);
                table.insert(state, entry);
            }
            Err(e) => {
                tracing::warn!(
                    state = state_prefix(&state),
                    error = %e,
                    "Skipping malformed OAuth state record"
                );
            }
        }
    }
    Ok(table)
}

#[async_trait]
impl StatePersistence for JsonFilePersistence {
    async fn load(&self) -> PersistenceResult<StateTable> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StateTable::new()),
            Err(source) => return Err(PersistenceError::Read { path: self.path.clone(), source }),
        };

        parse_table(&raw).map_err(|source| PersistenceError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    async fn save(&self, table: &StateTable) -> PersistenceResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| self.write_error(e))?;
        }

        let payload = serde_json::to_vec_pretty(table)?;
        let temp_path = self.path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));

        tokio::fs::write(&temp_path, payload).await.map_err(|e| self.write_error(e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = tokio::fs::set_permissions(&temp_path, perms).await {
                tracing::debug!(error = %e, "Could not restrict state file permissions");
            }
        }

        if let Err(e) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(self.write_error(e));
        }

        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Non-durable backend: state lives as long as this value does.
///
/// Two stores sharing one `MemoryPersistence` behave like two processes
/// sharing one file.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    table: Mutex<StateTable>,
}

impl MemoryPersistence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatePersistence for MemoryPersistence {
    async fn load(&self) -> PersistenceResult<StateTable> {
        Ok(self.table.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone())
    }

    async fn save(&self, table: &StateTable) -> PersistenceResult<()> {
        *self.table.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = table.clone();
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, Utc};

    use super::*;
    use crate::oauth::types::StateMetadata;

    fn entry(state: &str) -> OAuthStateEntry {
        let now = Utc::now();
        let mut metadata = StateMetadata::new();
        metadata.insert("scope".into(), "calendar.readonly".into());
        OAuthStateEntry {
            state: state.to_string(),
            created_at: now,
            expires_at: now + TimeDelta::minutes(10),
            metadata,
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = JsonFilePersistence::new(dir.path().join("nope.json"));
        assert!(persistence.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_creates_parent_and_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("oauth_states.json");
        let persistence = JsonFilePersistence::new(&path);

        let mut table = StateTable::new();
        table.insert("abc".into(), entry("abc"));
        persistence.save(&table).await.unwrap();

        let loaded = persistence.load().await.unwrap();
        assert_eq!(loaded, table);
        assert_eq!(loaded["abc"].state, "abc");

        // Only the target file remains; the temp file was renamed away
        let names: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[tokio::test]
    async fn test_token_is_key_not_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oauth_states.json");
        let persistence = JsonFilePersistence::new(&path);

        let mut table = StateTable::new();
        table.insert("abc".into(), entry("abc"));
        persistence.save(&table).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let record = raw["abc"].as_object().unwrap();
        assert!(record.contains_key("created_at"));
        assert!(record.contains_key("expires_at"));
        assert!(!record.contains_key("state"));
    }

    #[test]
    fn test_parse_blank_content() {
        assert!(parse_table("").unwrap().is_empty());
        assert!(parse_table("  \n").unwrap().is_empty());
        assert!(parse_table("{").is_err());
    }

    #[test]
    fn test_parse_skips_bad_records() {
        let raw = serde_json::json!({
            "good": {
                "created_at": "2030-01-01T00:00:00Z",
                "expires_at": "2030-01-01T00:10:00Z",
                "metadata": {"scope": "drive"}
            },
            "bad-timestamp": {
                "created_at": "yesterday",
                "expires_at": "2030-01-01T00:10:00Z"
            },
            "not-an-object": 42
        })
        .to_string();

        let table = parse_table(&raw).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table["good"].state, "good");
        assert_eq!(table["good"].metadata["scope"], "drive");

        // A non-object document is still malformed as a whole
        assert!(parse_table("[1, 2]").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oauth_states.json");
        JsonFilePersistence::new(&path).save(&StateTable::new()).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
