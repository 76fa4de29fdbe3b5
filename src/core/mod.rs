pub mod error;
pub mod profile;

pub use error::{AssetError, Result};
pub use profile::{NewProfile, PictureData, PictureRef, ProfileChanges, ProfileId, UserProfile};
