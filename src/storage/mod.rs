//! Adapters for the two backends the coordinator talks to.
//!
//! Neither store knows about the other and they share no transaction. The
//! record store owns profiles; the object store owns opaque picture objects
//! addressed by [`ObjectIdentifier`].

pub mod cloudinary;
pub mod memory;
pub mod snapshot;

use crate::codec::{ImageFormat, ObjectIdentifier, UploadKey, file_extension};
use crate::core::{NewProfile, PictureData, ProfileChanges, ProfileId, Result, UserProfile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use cloudinary::{CloudinaryConfig, CloudinaryObjectStore};
pub use memory::{InMemoryObjectStore, InMemoryRecordStore};
pub use snapshot::SnapshotRecordStore;

/// Document store holding profile records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn init(&self) -> Result<()>;
    async fn insert(&self, fields: NewProfile) -> Result<UserProfile>;
    async fn find_by_id(&self, id: &ProfileId) -> Result<Option<UserProfile>>;
    /// Returns `None` when no record with `id` exists.
    async fn update(&self, id: &ProfileId, changes: ProfileChanges) -> Result<Option<UserProfile>>;
    /// Returns `false` when no record with `id` existed.
    async fn delete_by_id(&self, id: &ProfileId) -> Result<bool>;
    async fn list(&self) -> Result<Vec<UserProfile>>;

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Remote object/image store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores the bytes under `upload.key` and returns the public URL.
    async fn upload(&self, upload: PictureUpload) -> Result<String>;
    /// Returns `false` when there was nothing to delete.
    async fn delete(&self, identifier: &ObjectIdentifier) -> Result<bool>;
    async fn list(&self, folder: &str) -> Result<Vec<StoredObject>>;
}

/// One pending upload: where it goes and what it contains.
#[derive(Debug, Clone)]
pub struct PictureUpload {
    pub key: UploadKey,
    pub picture: PictureData,
}

impl PictureUpload {
    pub fn new(key: UploadKey, picture: PictureData) -> Self {
        Self { key, picture }
    }

    /// Sniffed format first, then the client's file name, then `bin`.
    pub fn extension(&self) -> String {
        if let Some(format) = ImageFormat::sniff(&self.picture.bytes) {
            return format.extension().to_string();
        }
        self.picture
            .file_name
            .as_deref()
            .and_then(file_extension)
            .unwrap_or_else(|| "bin".to_string())
    }

    pub fn content_type(&self) -> String {
        ImageFormat::sniff(&self.picture.bytes)
            .map(|format| format.mime_type().to_string())
            .or_else(|| self.picture.content_type.clone())
            .unwrap_or_else(|| "application/octet-stream".to_string())
    }
}

/// An object as reported by a store listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub identifier: ObjectIdentifier,
    pub created_at: Option<DateTime<Utc>>,
}
