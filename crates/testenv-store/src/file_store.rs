use std::path::{Path, PathBuf};

use testenv_domain::EnvironmentRecord;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::StateStore;

/// [`StateStore`] backed by one JSON file per environment id under
/// `<root>/state/testenv-<id>.json`. Writes land via a sibling temp file
/// and an atomic rename so a crash mid-write never leaves a truncated or
/// half-written record behind.
#[derive(Clone)]
pub struct FileStateStore {
    state_dir: PathBuf,
}

impl FileStateStore {
    /// `root` is the engine's working directory; the state subdirectory is
    /// created on first use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { state_dir: root.into().join("state") }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.state_dir.join(format!("testenv-{id}.json"))
    }

    fn save_sync(state_dir: &Path, id: &str, record: &EnvironmentRecord) -> Result<(), StoreError> {
        std::fs::create_dir_all(state_dir)?;
        let content = serde_json::to_vec_pretty(record)?;
        let final_path = state_dir.join(format!("testenv-{id}.json"));
        let temp_path = state_dir.join(format!("testenv-{id}.json.tmp-{}", Uuid::new_v4()));
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, &final_path)?;
        Ok(())
    }

    fn load_sync(path: &Path) -> Result<Option<EnvironmentRecord>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read(path)?;
        let record: EnvironmentRecord = serde_json::from_slice(&content)?;
        Ok(Some(record))
    }

    fn delete_sync(path: &Path) -> Result<(), StoreError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list_ids_sync(state_dir: &Path) -> Result<Vec<String>, StoreError> {
        if !state_dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(state_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = name.strip_prefix("testenv-").and_then(|s| s.strip_suffix(".json")) {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }
}

#[async_trait::async_trait]
impl StateStore for FileStateStore {
    async fn save(&self, record: &EnvironmentRecord) -> Result<(), StoreError> {
        let state_dir = self.state_dir.clone();
        let id = record.id.clone();
        let record = record.clone();
        tokio::task::spawn_blocking(move || Self::save_sync(&state_dir, &id, &record))
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?
    }

    async fn load(&self, id: &str) -> Result<Option<EnvironmentRecord>, StoreError> {
        let path = self.path_for(id);
        tokio::task::spawn_blocking(move || Self::load_sync(&path))
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let path = self.path_for(id);
        tokio::task::spawn_blocking(move || Self::delete_sync(&path))
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let state_dir = self.state_dir.clone();
        tokio::task::spawn_blocking(move || Self::list_ids_sync(&state_dir))
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dummy_record(id: &str) -> EnvironmentRecord {
        EnvironmentRecord::new(
            id.to_string(),
            "create".into(),
            serde_json::json!({"providers": []}),
            format!("/tmp/{id}"),
            chrono::Utc::now(),
        )
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path());
        let record = dummy_record("env-1");
        store.save(&record).await.unwrap();
        let loaded = store.load("env-1").await.unwrap().unwrap();
        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.stage, record.stage);
    }

    #[tokio::test]
    async fn load_missing_id_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path());
        assert!(store.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path());
        store.save(&dummy_record("env-2")).await.unwrap();
        store.delete("env-2").await.unwrap();
        assert!(store.load("env-2").await.unwrap().is_none());
        // Deleting again must still succeed.
        store.delete("env-2").await.unwrap();
    }

    #[tokio::test]
    async fn save_overwrites_existing_record_atomically() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path());
        let mut record = dummy_record("env-3");
        store.save(&record).await.unwrap();
        record.stage = "delete".into();
        store.save(&record).await.unwrap();
        let loaded = store.load("env-3").await.unwrap().unwrap();
        assert_eq!(loaded.stage, "delete");

        // No leftover temp files after the rename.
        let mut entries = std::fs::read_dir(dir.path().join("state")).unwrap();
        assert!(entries.all(|e| !e.unwrap().file_name().to_string_lossy().contains(".tmp-")));
    }

    #[tokio::test]
    async fn list_ids_reflects_saved_and_deleted_records() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path());
        store.save(&dummy_record("a")).await.unwrap();
        store.save(&dummy_record("b")).await.unwrap();
        let mut ids = store.list_ids().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
        store.delete("a").await.unwrap();
        assert_eq!(store.list_ids().await.unwrap(), vec!["b".to_string()]);
    }
}
