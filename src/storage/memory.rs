use super::{ObjectStore, PictureUpload, RecordStore, StoredObject};
use crate::codec::ObjectIdentifier;
use crate::core::{NewProfile, ProfileChanges, ProfileId, Result, UserProfile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Record store kept entirely in process memory.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    profiles: RwLock<HashMap<ProfileId, UserProfile>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store, e.g. from a snapshot.
    pub fn with_profiles(profiles: impl IntoIterator<Item = UserProfile>) -> Self {
        let profiles = profiles
            .into_iter()
            .map(|profile| (profile.id.clone(), profile))
            .collect();
        Self {
            profiles: RwLock::new(profiles),
        }
    }

    pub async fn len(&self) -> usize {
        self.profiles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.profiles.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn insert(&self, fields: NewProfile) -> Result<UserProfile> {
        let id = ProfileId::new(Uuid::new_v4().simple().to_string());
        let profile = UserProfile::from_new(id, fields);
        self.profiles
            .write()
            .await
            .insert(profile.id.clone(), profile.clone());
        Ok(profile)
    }

    async fn find_by_id(&self, id: &ProfileId) -> Result<Option<UserProfile>> {
        Ok(self.profiles.read().await.get(id).cloned())
    }

    async fn update(&self, id: &ProfileId, changes: ProfileChanges) -> Result<Option<UserProfile>> {
        let mut profiles = self.profiles.write().await;
        let Some(profile) = profiles.get_mut(id) else {
            return Ok(None);
        };
        changes.apply_to(profile);
        Ok(Some(profile.clone()))
    }

    async fn delete_by_id(&self, id: &ProfileId) -> Result<bool> {
        Ok(self.profiles.write().await.remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<UserProfile>> {
        let mut profiles: Vec<_> = self.profiles.read().await.values().cloned().collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(profiles)
    }
}

/// Object store kept in process memory. Only identifiers and upload times
/// are tracked; the payload is discarded.
///
/// URLs follow the versioned delivery shape `{base_url}/v{n}/{folder}/{name}.{ext}`
/// with `n` counting uploads from 1, so they round-trip through the codec.
#[derive(Debug)]
pub struct InMemoryObjectStore {
    base_url: String,
    objects: RwLock<BTreeMap<ObjectIdentifier, DateTime<Utc>>>,
    version: AtomicU64,
}

impl InMemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: RwLock::new(BTreeMap::new()),
            version: AtomicU64::new(0),
        }
    }

    pub async fn contains(&self, identifier: &ObjectIdentifier) -> bool {
        self.objects.read().await.contains_key(identifier)
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    pub async fn identifiers(&self) -> Vec<ObjectIdentifier> {
        self.objects.read().await.keys().cloned().collect()
    }

    /// Moves an object's creation time, for exercising age-based sweeps.
    pub async fn backdate(&self, identifier: &ObjectIdentifier, created_at: DateTime<Utc>) -> bool {
        match self.objects.write().await.get_mut(identifier) {
            Some(uploaded_at) => {
                *uploaded_at = created_at;
                true
            }
            None => false,
        }
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new("memory://objects")
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn upload(&self, upload: PictureUpload) -> Result<String> {
        let identifier = upload.key.identifier();
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let url = format!(
            "{}/v{}/{}.{}",
            self.base_url,
            version,
            identifier,
            upload.extension()
        );

        self.objects.write().await.insert(identifier, Utc::now());
        Ok(url)
    }

    async fn delete(&self, identifier: &ObjectIdentifier) -> Result<bool> {
        Ok(self.objects.write().await.remove(identifier).is_some())
    }

    async fn list(&self, folder: &str) -> Result<Vec<StoredObject>> {
        let folder = folder.trim_matches('/');
        Ok(self
            .objects
            .read()
            .await
            .iter()
            .filter(|(identifier, _)| identifier.folder() == folder)
            .map(|(identifier, uploaded_at)| StoredObject {
                identifier: identifier.clone(),
                created_at: Some(*uploaded_at),
            })
            .collect())
    }
}
