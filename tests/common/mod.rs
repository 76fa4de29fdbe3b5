#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use profile_assets::codec::ObjectIdentifier;
use profile_assets::coordinator::{CoordinatorConfig, ProfileAssetCoordinator};
use profile_assets::core::{
    AssetError, NewProfile, PictureData, ProfileChanges, ProfileId, Result, UserProfile,
};
use profile_assets::storage::{
    InMemoryObjectStore, InMemoryRecordStore, ObjectStore, PictureUpload, RecordStore,
    StoredObject,
};

pub const FOLDER: &str = "D10ATest";
pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";
pub const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

pub fn png() -> PictureData {
    PictureData::new(PNG).with_file_name("me.png")
}

pub fn jpeg() -> PictureData {
    PictureData::new(JPEG).with_file_name("me.jpg")
}

/// In-memory object store with switchable failures.
#[derive(Default)]
pub struct FaultyObjectStore {
    pub inner: InMemoryObjectStore,
    pub fail_upload: AtomicBool,
    pub fail_delete: AtomicBool,
    /// Artificial latency added to every call, in milliseconds
    pub delay_ms: AtomicU64,
    pub uploads: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl FaultyObjectStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryObjectStore::new("https://objects.test"),
            ..Self::default()
        }
    }

    pub fn fail_uploads(&self, on: bool) {
        self.fail_upload.store(on, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, on: bool) {
        self.fail_delete.store(on, Ordering::SeqCst);
    }

    pub fn slow(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn upload_calls(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}

#[async_trait]
impl ObjectStore for FaultyObjectStore {
    async fn upload(&self, upload: PictureUpload) -> Result<String> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(AssetError::upload("injected upload failure"));
        }
        self.inner.upload(upload).await
    }

    async fn delete(&self, identifier: &ObjectIdentifier) -> Result<bool> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(AssetError::ObjectDeleteFailed(format!(
                "injected delete failure for {identifier}"
            )));
        }
        self.inner.delete(identifier).await
    }

    async fn list(&self, folder: &str) -> Result<Vec<StoredObject>> {
        self.inner.list(folder).await
    }
}

/// In-memory record store with switchable failures.
#[derive(Default)]
pub struct FaultyRecordStore {
    pub inner: InMemoryRecordStore,
    pub fail_insert: AtomicBool,
    pub fail_update: AtomicBool,
    pub delay_ms: AtomicU64,
}

impl FaultyRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_inserts(&self, on: bool) {
        self.fail_insert.store(on, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, on: bool) {
        self.fail_update.store(on, Ordering::SeqCst);
    }

    pub fn slow(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    async fn pause(&self) {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}

#[async_trait]
impl RecordStore for FaultyRecordStore {
    async fn init(&self) -> Result<()> {
        self.inner.init().await
    }

    async fn insert(&self, fields: NewProfile) -> Result<UserProfile> {
        self.pause().await;
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(AssetError::store("injected insert failure"));
        }
        self.inner.insert(fields).await
    }

    async fn find_by_id(&self, id: &ProfileId) -> Result<Option<UserProfile>> {
        self.pause().await;
        self.inner.find_by_id(id).await
    }

    async fn update(&self, id: &ProfileId, changes: ProfileChanges) -> Result<Option<UserProfile>> {
        self.pause().await;
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(AssetError::store("injected update failure"));
        }
        self.inner.update(id, changes).await
    }

    async fn delete_by_id(&self, id: &ProfileId) -> Result<bool> {
        self.pause().await;
        self.inner.delete_by_id(id).await
    }

    async fn list(&self) -> Result<Vec<UserProfile>> {
        self.inner.list().await
    }
}

pub struct Harness {
    pub records: Arc<FaultyRecordStore>,
    pub objects: Arc<FaultyObjectStore>,
    pub coordinator: Arc<ProfileAssetCoordinator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(CoordinatorConfig::new().picture_folder(FOLDER))
    }

    pub fn with_config(config: CoordinatorConfig) -> Self {
        let records = Arc::new(FaultyRecordStore::new());
        let objects = Arc::new(FaultyObjectStore::new());
        let coordinator = Arc::new(ProfileAssetCoordinator::new(
            records.clone(),
            objects.clone(),
            config,
        ));
        Self {
            records,
            objects,
            coordinator,
        }
    }

    pub async fn object_count(&self) -> usize {
        self.objects.inner.len().await
    }
}
