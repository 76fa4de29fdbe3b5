// ============================================================================
// Profile Assets Library
// ============================================================================

pub mod codec;
pub mod config;
pub mod coordinator;
pub mod core;
pub mod reconcile;
pub mod storage;
pub mod web;

// Re-export main types for convenience
pub use codec::{ObjectIdentifier, derive_identifier};
pub use coordinator::{CoordinatorConfig, CreateProfile, DeleteOutcome, ProfileAssetCoordinator};
pub use core::{
    AssetError, NewProfile, PictureData, PictureRef, ProfileChanges, ProfileId, Result,
    UserProfile,
};
pub use reconcile::{ReconcileReport, Reconciler};
pub use storage::{ObjectStore, RecordStore};
pub use web::{AppState, build_router};
