//! File-backed record store.
//!
//! Profiles live in memory and the whole set is written to a MessagePack
//! snapshot after every mutation (temp file, fsync, rename). A mutation only
//! becomes visible once its snapshot is on disk.

use super::RecordStore;
use crate::core::{AssetError, NewProfile, ProfileChanges, ProfileId, Result, UserProfile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

const SNAPSHOT_VERSION: u32 = 1;

// ============================================================================
// Snapshot Format
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct ProfileSnapshot {
    version: u32,
    saved_at: DateTime<Utc>,
    profiles: Vec<UserProfile>,
}

impl ProfileSnapshot {
    fn new(profiles: &HashMap<ProfileId, UserProfile>) -> Self {
        let mut profiles: Vec<_> = profiles.values().cloned().collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            profiles,
        }
    }
}

// ============================================================================
// Snapshot Record Store
// ============================================================================

pub struct SnapshotRecordStore {
    snapshot_path: PathBuf,
    profiles: Arc<RwLock<HashMap<ProfileId, UserProfile>>>,
}

impl SnapshotRecordStore {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
            profiles: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn load(&self) -> Result<Option<ProfileSnapshot>> {
        let data = match tokio::fs::read(&self.snapshot_path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(AssetError::store(format!(
                    "Failed to read snapshot {}: {}",
                    self.snapshot_path.display(),
                    err
                )));
            }
        };
        let snapshot: ProfileSnapshot = rmp_serde::from_slice(&data)
            .map_err(|e| AssetError::store(format!("Failed to deserialize snapshot: {}", e)))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(AssetError::store(format!(
                "Unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(Some(snapshot))
    }

    /// Applies `mutate` to a copy of the current state, persists the copy and
    /// only then swaps it in.
    ///
    /// The work runs on its own task, so a caller that stops waiting (e.g. on
    /// a timeout) cannot leave the file and the in-memory map disagreeing.
    async fn commit<T, F>(&self, mutate: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut HashMap<ProfileId, UserProfile>) -> T + Send + 'static,
    {
        let profiles = Arc::clone(&self.profiles);
        let path = self.snapshot_path.clone();

        tokio::spawn(async move {
            let mut guard = profiles.write_owned().await;
            let mut next = (*guard).clone();
            let outcome = mutate(&mut next);
            write_snapshot(&path, &next).await?;
            *guard = next;
            Ok::<T, AssetError>(outcome)
        })
        .await
        .map_err(|e| AssetError::store(format!("Snapshot commit aborted: {}", e)))?
    }
}

async fn write_snapshot(path: &Path, profiles: &HashMap<ProfileId, UserProfile>) -> Result<()> {
    let serialized = rmp_serde::to_vec(&ProfileSnapshot::new(profiles))
        .map_err(|e| AssetError::store(format!("Failed to serialize snapshot: {}", e)))?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            AssetError::store(format!("Failed to create snapshot directory: {}", e))
        })?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&temp_path)
        .await
        .map_err(|e| AssetError::store(format!("Failed to create temp file: {}", e)))?;
    file.write_all(&serialized)
        .await
        .map_err(|e| AssetError::store(format!("Failed to write snapshot: {}", e)))?;
    file.sync_all()
        .await
        .map_err(|e| AssetError::store(format!("Failed to sync snapshot: {}", e)))?;
    drop(file);
    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|e| AssetError::store(format!("Failed to rename snapshot: {}", e)))?;

    debug!(path = %path.display(), profiles = profiles.len(), "snapshot written");
    Ok(())
}

#[async_trait]
impl RecordStore for SnapshotRecordStore {
    async fn init(&self) -> Result<()> {
        let Some(snapshot) = self.load().await? else {
            info!(path = %self.snapshot_path.display(), "no snapshot found, starting empty");
            return Ok(());
        };

        let count = snapshot.profiles.len();
        let mut profiles = self.profiles.write().await;
        *profiles = snapshot
            .profiles
            .into_iter()
            .map(|profile| (profile.id.clone(), profile))
            .collect();
        info!(
            path = %self.snapshot_path.display(),
            profiles = count,
            saved_at = %snapshot.saved_at,
            "snapshot loaded"
        );
        Ok(())
    }

    async fn insert(&self, fields: NewProfile) -> Result<UserProfile> {
        let profile = UserProfile::from_new(ProfileId::new(Uuid::new_v4().simple().to_string()), fields);
        let stored = profile.clone();
        self.commit(move |profiles| {
            profiles.insert(stored.id.clone(), stored);
        })
        .await?;
        Ok(profile)
    }

    async fn find_by_id(&self, id: &ProfileId) -> Result<Option<UserProfile>> {
        Ok(self.profiles.read().await.get(id).cloned())
    }

    async fn update(&self, id: &ProfileId, changes: ProfileChanges) -> Result<Option<UserProfile>> {
        if !self.profiles.read().await.contains_key(id) {
            return Ok(None);
        }
        let id = id.clone();
        self.commit(move |profiles| {
            profiles.get_mut(&id).map(|profile| {
                changes.apply_to(profile);
                profile.clone()
            })
        })
        .await
    }

    async fn delete_by_id(&self, id: &ProfileId) -> Result<bool> {
        if !self.profiles.read().await.contains_key(id) {
            return Ok(false);
        }
        let id = id.clone();
        self.commit(move |profiles| profiles.remove(&id).is_some())
            .await
    }

    async fn list(&self) -> Result<Vec<UserProfile>> {
        let mut profiles: Vec<_> = self.profiles.read().await.values().cloned().collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(profiles)
    }

    async fn shutdown(&self) -> Result<()> {
        let profiles = self.profiles.read().await;
        write_snapshot(&self.snapshot_path, &profiles).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PictureRef;
    use std::time::Duration;
    use tempfile::TempDir;

    fn ada() -> NewProfile {
        NewProfile {
            name: Some("Ada".to_string()),
            email: Some("ada@x.io".to_string()),
            picture: Some(PictureRef::new("https://store/v1/D10ATest/profile_picture_T1.png")),
        }
    }

    #[tokio::test]
    async fn test_profiles_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("profiles.snapshot");

        let store = SnapshotRecordStore::new(&path);
        store.init().await.unwrap();
        let created = store.insert(ada()).await.unwrap();
        store
            .update(
                &created.id,
                ProfileChanges::picture(PictureRef::new("https://store/v2/D10ATest/b.jpg")),
            )
            .await
            .unwrap();
        assert!(path.exists());

        let reopened = SnapshotRecordStore::new(&path);
        reopened.init().await.unwrap();
        let loaded = reopened.find_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(loaded.name.as_deref(), Some("Ada"));
        assert_eq!(
            loaded.picture.unwrap().url(),
            "https://store/v2/D10ATest/b.jpg"
        );
    }

    #[tokio::test]
    async fn test_delete_is_persisted() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("profiles.snapshot");

        let store = SnapshotRecordStore::new(&path);
        store.init().await.unwrap();
        let created = store.insert(ada()).await.unwrap();
        assert!(store.delete_by_id(&created.id).await.unwrap());
        assert!(!store.delete_by_id(&created.id).await.unwrap());

        let reopened = SnapshotRecordStore::new(&path);
        reopened.init().await.unwrap();
        assert!(reopened.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_insert_lands_in_memory_and_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("profiles.snapshot");

        let store = SnapshotRecordStore::new(&path);
        store.init().await.unwrap();

        // The caller gives up immediately; the commit keeps going.
        let _ = tokio::time::timeout(Duration::ZERO, store.insert(ada())).await;

        let mut in_memory = Vec::new();
        for _ in 0..200 {
            in_memory = store.list().await.unwrap();
            if !in_memory.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(in_memory.len(), 1);

        let reopened = SnapshotRecordStore::new(&path);
        reopened.init().await.unwrap();
        assert_eq!(reopened.list().await.unwrap(), in_memory);
    }

    #[tokio::test]
    async fn test_missing_snapshot_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = SnapshotRecordStore::new(temp_dir.path().join("absent.snapshot"));
        store.init().await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_store_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("profiles.snapshot");
        std::fs::write(&path, b"definitely not msgpack").unwrap();

        let store = SnapshotRecordStore::new(&path);
        let err = store.init().await.unwrap_err();
        assert!(matches!(err, AssetError::StoreUnavailable(_)));
    }
}
