//! Profile Asset Coordinator
//!
//! Keeps a profile record and its remotely hosted picture in agreement across
//! create, replace and delete. The two stores share no transaction, so the
//! rules are:
//!
//! - a failure of the first side effect aborts with nothing changed;
//! - failures of later steps are not rolled back, they are logged and the
//!   resulting orphaned object or dangling reference is left for the
//!   out-of-band sweep in [`crate::reconcile`];
//! - failing to delete an old picture never fails the operation.

mod locks;

pub use locks::ProfileLocks;

use crate::codec::{UploadKey, derive_identifier};
use crate::core::{
    AssetError, NewProfile, PictureData, PictureRef, ProfileChanges, ProfileId, Result,
    UserProfile,
};
use crate::storage::{ObjectStore, PictureUpload, RecordStore};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, instrument, warn};

/// Folder pictures are uploaded to unless configured otherwise.
pub const DEFAULT_PICTURE_FOLDER: &str = "D10ATest";

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Object store folder for profile pictures
    pub picture_folder: String,

    /// Upper bound for a single record store call
    pub record_timeout: Duration,

    /// Upper bound for a single object store call
    pub object_timeout: Duration,

    /// Serialize replace/delete calls on the same profile
    pub serialize_per_profile: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            picture_folder: DEFAULT_PICTURE_FOLDER.to_string(),
            record_timeout: Duration::from_secs(5),
            object_timeout: Duration::from_secs(15),
            serialize_per_profile: true,
        }
    }
}

impl CoordinatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn picture_folder(mut self, folder: &str) -> Self {
        self.picture_folder = folder.trim_matches('/').to_string();
        self
    }

    pub fn record_timeout(mut self, timeout: Duration) -> Self {
        self.record_timeout = timeout;
        self
    }

    pub fn object_timeout(mut self, timeout: Duration) -> Self {
        self.object_timeout = timeout;
        self
    }

    pub fn serialize_per_profile(mut self, enabled: bool) -> Self {
        self.serialize_per_profile = enabled;
        self
    }
}

/// Input of [`ProfileAssetCoordinator::create`].
#[derive(Debug, Clone, Default)]
pub struct CreateProfile {
    pub name: Option<String>,
    pub email: Option<String>,
    pub picture: Option<PictureData>,
}

/// Confirmation returned by [`ProfileAssetCoordinator::delete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub id: ProfileId,
    /// Whether a remote object was actually removed.
    pub picture_removed: bool,
}

pub struct ProfileAssetCoordinator {
    records: Arc<dyn RecordStore>,
    objects: Arc<dyn ObjectStore>,
    config: CoordinatorConfig,
    locks: ProfileLocks,
}

impl ProfileAssetCoordinator {
    pub fn new(
        records: Arc<dyn RecordStore>,
        objects: Arc<dyn ObjectStore>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            records,
            objects,
            config,
            locks: ProfileLocks::new(),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    pub async fn init(&self) -> Result<()> {
        self.records.init().await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.records.shutdown().await
    }

    /// Uploads the picture (if any), then inserts the record.
    ///
    /// An upload failure leaves no record behind. An insert failure after a
    /// successful upload orphans the object; that is logged, not compensated.
    #[instrument(skip_all)]
    pub async fn create(&self, request: CreateProfile) -> Result<UserProfile> {
        let picture = match request.picture {
            Some(picture) => Some(self.upload(picture).await?),
            None => None,
        };

        let fields = NewProfile {
            name: request.name,
            email: request.email,
            picture: picture.clone(),
        };

        match self.bounded_record("insert", self.records.insert(fields)).await {
            Ok(profile) => {
                info!(profile_id = %profile.id, has_picture = picture.is_some(), "profile created");
                Ok(profile)
            }
            Err(err) => {
                if let Some(picture) = &picture {
                    error!(url = %picture, error = %err, "record insert failed after upload; object orphaned");
                }
                Err(err)
            }
        }
    }

    #[instrument(skip(self), fields(profile_id = %id))]
    pub async fn fetch(&self, id: &ProfileId) -> Result<UserProfile> {
        self.bounded_record("find", self.records.find_by_id(id))
            .await?
            .ok_or_else(|| AssetError::not_found(id))
    }

    /// Deletes the old picture, uploads the new one, then repoints the record.
    ///
    /// A crash or failure between the delete and the record update leaves the
    /// record referencing a deleted object. That window is accepted over
    /// keeping two live objects per profile.
    #[instrument(skip(self, picture), fields(profile_id = %id, bytes = picture.len()))]
    pub async fn replace_picture(&self, id: &ProfileId, picture: PictureData) -> Result<UserProfile> {
        if picture.is_empty() {
            return Err(AssetError::validation("picture is empty"));
        }

        let _guard = self.lock(id).await;
        let current = self.fetch(id).await?;

        if let Some(old) = &current.picture {
            self.remove_picture(id, old).await;
        }

        let url = self.upload(picture).await?;

        match self
            .bounded_record("update", self.records.update(id, ProfileChanges::picture(url.clone())))
            .await
        {
            Ok(Some(profile)) => {
                info!(url = %url, "profile picture replaced");
                Ok(profile)
            }
            Ok(None) => {
                warn!(url = %url, "profile vanished before update; new object orphaned");
                Err(AssetError::not_found(id))
            }
            Err(err) => {
                error!(url = %url, error = %err, "record update failed after upload; object orphaned");
                Err(err)
            }
        }
    }

    /// Removes the picture (best effort) and then the record.
    ///
    /// A remote delete failure does not block record deletion: an unreferenced
    /// object is clutter, a record pointing nowhere is a visible bug.
    #[instrument(skip(self), fields(profile_id = %id))]
    pub async fn delete(&self, id: &ProfileId) -> Result<DeleteOutcome> {
        let _guard = self.lock(id).await;
        let current = self.fetch(id).await?;

        let picture_removed = match &current.picture {
            Some(picture) => self.remove_picture(id, picture).await,
            None => false,
        };

        if !self
            .bounded_record("delete", self.records.delete_by_id(id))
            .await?
        {
            return Err(AssetError::not_found(id));
        }

        info!(picture_removed, "profile deleted");
        Ok(DeleteOutcome {
            id: id.clone(),
            picture_removed,
        })
    }

    async fn lock(&self, id: &ProfileId) -> Option<OwnedMutexGuard<()>> {
        if self.config.serialize_per_profile {
            Some(self.locks.acquire(id).await)
        } else {
            None
        }
    }

    async fn upload(&self, picture: PictureData) -> Result<PictureRef> {
        if picture.is_empty() {
            return Err(AssetError::validation("picture is empty"));
        }

        let key = UploadKey::generate(&self.config.picture_folder);
        let identifier = key.identifier();
        let upload = self.objects.upload(PictureUpload::new(key, picture));

        let url = match tokio::time::timeout(self.config.object_timeout, upload).await {
            Ok(Ok(url)) => url,
            Ok(Err(AssetError::UploadFailed(message))) => {
                return Err(AssetError::UploadFailed(message));
            }
            Ok(Err(other)) => return Err(AssetError::upload(other.to_string())),
            Err(_) => {
                return Err(AssetError::upload(format!(
                    "upload of {} timed out after {}ms",
                    identifier,
                    self.config.object_timeout.as_millis()
                )));
            }
        };

        debug!(identifier = %identifier, url = %url, "picture uploaded");
        PictureRef::non_empty(url)
            .ok_or_else(|| AssetError::upload("object store returned an empty URL"))
    }

    /// Best-effort delete of the object behind `picture`. Never fails; returns
    /// whether an object was removed.
    async fn remove_picture(&self, id: &ProfileId, picture: &PictureRef) -> bool {
        let identifier = match derive_identifier(picture.url(), &self.config.picture_folder) {
            Ok(identifier) => identifier,
            Err(err) => {
                warn!(profile_id = %id, url = %picture, error = %err, "cannot locate old picture; skipping delete");
                return false;
            }
        };

        let delete = self.objects.delete(&identifier);
        match tokio::time::timeout(self.config.object_timeout, delete).await {
            Ok(Ok(true)) => {
                debug!(identifier = %identifier, "old picture deleted");
                true
            }
            Ok(Ok(false)) => {
                warn!(profile_id = %id, identifier = %identifier, "old picture already absent; reference was dangling");
                false
            }
            Ok(Err(err)) => {
                warn!(profile_id = %id, identifier = %identifier, error = %err, "old picture delete failed; object may be orphaned");
                false
            }
            Err(_) => {
                warn!(
                    profile_id = %id,
                    identifier = %identifier,
                    timeout_ms = self.config.object_timeout.as_millis() as u64,
                    "old picture delete timed out; object may be orphaned"
                );
                false
            }
        }
    }

    async fn bounded_record<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.config.record_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AssetError::store(format!(
                "record {} timed out after {}ms",
                operation,
                self.config.record_timeout.as_millis()
            ))),
        }
    }
}
