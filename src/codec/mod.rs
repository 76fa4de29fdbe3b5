//! Object identifier codec.
//!
//! The record store keeps only a picture URL. The remote store deletes by an
//! identifier (`{folder}/{basename}` without extension), so the identifier has
//! to be parsed back out of whatever URL shape was stored. Two encodings are
//! accepted:
//!
//! - versioned: `.../v<digits>/<path>.<ext>` where `<path>` is the identifier
//! - bare: `.../<basename>.<ext>`, identifier rebuilt as `{known_folder}/<basename>`
//!
//! Only `jpg`, `jpeg`, `png` and `gif` are recognised. Pictures stored under
//! any other extension cannot be cleaned up automatically.

use crate::core::{AssetError, Result};
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

lazy_static! {
    static ref VERSIONED_URL: Regex =
        Regex::new(r"/v\d+/(?P<path>.+)\.(?i:jpe?g|png|gif)$").unwrap();
    static ref BARE_URL: Regex =
        Regex::new(r"/(?P<base>[^/]+)\.(?i:jpe?g|png|gif)$").unwrap();
}

/// Prefix of every generated picture name.
pub const UPLOAD_NAME_PREFIX: &str = "profile_picture";

/// Addressing key the remote store uses for one object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectIdentifier(String);

impl ObjectIdentifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_parts(folder: &str, basename: &str) -> Self {
        let folder = folder.trim_matches('/');
        if folder.is_empty() {
            Self(basename.to_string())
        } else {
            Self(format!("{folder}/{basename}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Everything before the last `/`, or `""` for a top-level object.
    pub fn folder(&self) -> &str {
        self.0.rsplit_once('/').map_or("", |(folder, _)| folder)
    }

    pub fn basename(&self) -> &str {
        self.0.rsplit_once('/').map_or(self.0.as_str(), |(_, base)| base)
    }
}

impl fmt::Display for ObjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Recovers the deletable identifier from a stored picture URL.
///
/// Returns [`AssetError::IdentifierUndeterminable`] when neither URL shape
/// matches. Callers treat that as "nothing to delete".
pub fn derive_identifier(url: &str, known_folder: &str) -> Result<ObjectIdentifier> {
    let path = strip_query(url);

    if let Some(caps) = VERSIONED_URL.captures(path) {
        return Ok(ObjectIdentifier::new(&caps["path"]));
    }

    if let Some(caps) = BARE_URL.captures(path) {
        return Ok(ObjectIdentifier::from_parts(known_folder, &caps["base"]));
    }

    Err(AssetError::IdentifierUndeterminable(url.to_string()))
}

fn strip_query(url: &str) -> &str {
    match url.find(['?', '#']) {
        Some(idx) => &url[..idx],
        None => url,
    }
}

/// Target location for one upload: folder plus a fresh object name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadKey {
    pub folder: String,
    pub name: String,
}

impl UploadKey {
    /// `profile_picture_<unix-millis>_<8 hex>`. The random suffix keeps two
    /// uploads in the same millisecond apart.
    pub fn generate(folder: &str) -> Self {
        let millis = Utc::now().timestamp_millis();
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            folder: folder.trim_matches('/').to_string(),
            name: format!("{UPLOAD_NAME_PREFIX}_{millis}_{}", &suffix[..8]),
        }
    }

    pub fn identifier(&self) -> ObjectIdentifier {
        ObjectIdentifier::from_parts(&self.folder, &self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
}

impl ImageFormat {
    /// Looks at magic numbers only; unknown content is not an error.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Self::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
        }
    }
}

/// Lowercased extension of an uploaded file name, if it has one.
pub fn file_extension(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.contains('/') {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versioned_url_yields_embedded_path() {
        let id = derive_identifier("https://store/v123/folder/name.png", "ignored").unwrap();
        assert_eq!(id.as_str(), "folder/name");
        assert_eq!(id.folder(), "folder");
        assert_eq!(id.basename(), "name");
    }

    #[test]
    fn cloudinary_delivery_url_is_versioned() {
        let url = "https://res.cloudinary.com/demo/image/upload/v1712345678/D10ATest/profile_picture_1712345678000_ab12cd34.jpg";
        let id = derive_identifier(url, "D10ATest").unwrap();
        assert_eq!(id.as_str(), "D10ATest/profile_picture_1712345678000_ab12cd34");
    }

    #[test]
    fn bare_basename_uses_known_folder() {
        let id = derive_identifier("https://cdn.example.com/name.jpg", "D10ATest").unwrap();
        assert_eq!(id.as_str(), "D10ATest/name");
    }

    #[test]
    fn bare_basename_keeps_inner_dots() {
        let id = derive_identifier("https://cdn.example.com/a/me.v2.gif", "pics").unwrap();
        assert_eq!(id.as_str(), "pics/me.v2");
    }

    #[test]
    fn query_string_is_ignored() {
        let id = derive_identifier("https://store/v9/f/x.jpeg?width=200#top", "f").unwrap();
        assert_eq!(id.as_str(), "f/x");
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let id = derive_identifier("https://store/v1/f/SHOUT.PNG", "f").unwrap();
        assert_eq!(id.as_str(), "f/SHOUT");
    }

    #[test]
    fn unknown_extension_is_undeterminable() {
        let err = derive_identifier("https://store/v1/folder/name.webp", "folder").unwrap_err();
        assert_eq!(
            err,
            AssetError::IdentifierUndeterminable("https://store/v1/folder/name.webp".to_string())
        );
    }

    #[test]
    fn url_without_extension_is_undeterminable() {
        assert!(derive_identifier("https://store/v1/folder/name", "folder").is_err());
        assert!(derive_identifier("", "folder").is_err());
    }

    #[test]
    fn upload_keys_are_unique_and_prefixed() {
        let a = UploadKey::generate("/D10ATest/");
        let b = UploadKey::generate("D10ATest");
        assert_ne!(a.name, b.name);
        assert_eq!(a.folder, "D10ATest");
        assert!(a.name.starts_with("profile_picture_"));
        assert_eq!(a.identifier().folder(), "D10ATest");
    }

    #[test]
    fn sniff_recognises_supported_formats() {
        assert_eq!(ImageFormat::sniff(b"\x89PNG\r\n\x1a\nrest"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::sniff(b"GIF89a...."), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::sniff(b"RIFF....WEBP"), None);
    }

    #[test]
    fn file_extension_is_lowercased() {
        assert_eq!(file_extension("Me.JPG").as_deref(), Some("jpg"));
        assert_eq!(file_extension(".hidden"), None);
        assert_eq!(file_extension("noext"), None);
    }
}
