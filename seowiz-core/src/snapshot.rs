use std::path::{Path, PathBuf};
use std::fmt::Write;
use tracing::debug;

use crate::config::StorageConfig;
use crate::error::{WizardError, WizardResult};
use crate::state::RunState;

/// One JSON file per site under a snapshot directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(storage: &StorageConfig) -> WizardResult<Self> {
        storage
            .snapshot_dir()
            .map(Self::new)
            .ok_or_else(|| WizardError::MissingConfig("storage.snapshot_dir".to_string()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot file for `site_id`. Bytes outside `[A-Za-z0-9._-]` are
    /// percent-encoded, so distinct site ids never share a file.
    pub fn path_for(&self, site_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_file_stem(site_id)))
    }

    pub async fn save(&self, state: &RunState) -> WizardResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(&state.site_id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(state)?;

        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(site_id = %state.site_id, path = %path.display(), "Run snapshot saved");
        Ok(path)
    }

    pub async fn load(&self, site_id: &str) -> WizardResult<RunState> {
        self.load_optional(site_id)
            .await?
            .ok_or_else(|| WizardError::SnapshotNotFound(site_id.to_string()))
    }

    pub async fn load_optional(&self, site_id: &str) -> WizardResult<Option<RunState>> {
        let path = self.path_for(site_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let state: RunState = serde_json::from_slice(&bytes)?;
        if state.site_id != site_id {
            return Err(WizardError::SnapshotMismatch {
                expected: site_id.to_string(),
                found: state.site_id,
            });
        }
        Ok(Some(state))
    }

    /// Site ids with a saved snapshot, sorted.
    pub async fn list(&self) -> WizardResult<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sites = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            if let Ok(state) = serde_json::from_slice::<RunState>(&bytes) {
                sites.push(state.site_id);
            }
        }
        sites.sort();
        Ok(sites)
    }
}

fn encode_file_stem(site_id: &str) -> String {
    let mut stem = String::with_capacity(site_id.len());
    for byte in site_id.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            stem.push(byte as char);
        } else {
            let _ = write!(stem, "%{:02X}", byte);
        }
    }
    stem
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StepStatus;

    #[test]
    fn test_path_for_encodes_site_id() {
        let store = SnapshotStore::new("/tmp/runs");
        assert_eq!(
            store.path_for("acme/site 1"),
            PathBuf::from("/tmp/runs/acme%2Fsite%201.json")
        );
        assert_eq!(
            store.path_for("site-1_a.b"),
            PathBuf::from("/tmp/runs/site-1_a.b.json")
        );
        assert_eq!(store.path_for("ü"), PathBuf::from("/tmp/runs/%C3%BC.json"));
    }

    #[test]
    fn test_similar_site_ids_get_distinct_files() {
        let store = SnapshotStore::new("/tmp/runs");
        let ids = ["acme/site", "acme_site", "acme%2Fsite", "acme site"];
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                assert_ne!(store.path_for(a), store.path_for(b), "{} vs {}", a, b);
            }
        }
    }

    #[tokio::test]
    async fn test_snapshots_do_not_cross_sites() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        store.save(&RunState::new("acme/site", 0)).await.unwrap();
        assert!(store.load_optional("acme_site").await.unwrap().is_none());

        store.save(&RunState::new("acme_site", 4)).await.unwrap();
        assert_eq!(store.load("acme/site").await.unwrap().site_id, "acme/site");
        assert_eq!(store.load("acme_site").await.unwrap().abort_generation, 4);
        assert_eq!(
            store.list().await.unwrap(),
            vec!["acme/site".to_string(), "acme_site".to_string()]
        );
    }

    #[tokio::test]
    async fn test_load_rejects_snapshot_of_another_site() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        let body = serde_json::to_vec(&RunState::new("other", 0)).unwrap();
        tokio::fs::write(store.path_for("acme"), body).await.unwrap();

        let err = store.load("acme").await.unwrap_err();
        assert!(matches!(err, WizardError::SnapshotMismatch { .. }));
        assert_eq!(err.error_code(), "E4006");
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("runs"));

        let mut state = RunState::new("site-1", 2);
        state.transition("business-profile", StepStatus::Running).unwrap();
        state.transition("business-profile", StepStatus::Completed).unwrap();
        state.raise_progress(3);

        let path = store.save(&state).await.unwrap();
        assert!(path.exists());

        let loaded = store.load("site-1").await.unwrap();
        assert_eq!(loaded.run_id, state.run_id);
        assert_eq!(loaded.progress, 3);
        assert_eq!(loaded.status_of("business-profile"), StepStatus::Completed);
        assert_eq!(store.list().await.unwrap(), vec!["site-1".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        assert!(store.load_optional("ghost").await.unwrap().is_none());
        assert!(matches!(
            store.load("ghost").await,
            Err(WizardError::SnapshotNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_on_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("never-created"));
        assert!(store.list().await.unwrap().is_empty());
    }
}
