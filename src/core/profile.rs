use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque record identifier assigned by the record store on insert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(String);

impl ProfileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProfileId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ProfileId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// URL of the remote object currently owned by a profile.
///
/// This text is the only link between a record and its object; the deletable
/// identifier is recovered from it with [`crate::codec::derive_identifier`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PictureRef(String);

impl PictureRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn url(&self) -> &str {
        &self.0
    }

    /// Stored references may be empty strings; those mean "no picture".
    pub fn non_empty(url: impl Into<String>) -> Option<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            None
        } else {
            Some(Self(url))
        }
    }
}

impl fmt::Display for PictureRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: ProfileId,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "profilePicture")]
    pub picture: Option<PictureRef>,
}

/// Fields for a record that does not exist yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewProfile {
    pub name: Option<String>,
    pub email: Option<String>,
    pub picture: Option<PictureRef>,
}

/// Partial update; only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub picture: Option<PictureRef>,
}

impl ProfileChanges {
    pub fn picture(picture: PictureRef) -> Self {
        Self {
            picture: Some(picture),
            ..Self::default()
        }
    }

    pub fn apply_to(self, profile: &mut UserProfile) {
        if let Some(name) = self.name {
            profile.name = Some(name);
        }
        if let Some(email) = self.email {
            profile.email = Some(email);
        }
        if let Some(picture) = self.picture {
            profile.picture = Some(picture);
        }
    }
}

/// Raw picture bytes as received from a client, before upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureData {
    pub bytes: Bytes,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

impl PictureData {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            file_name: None,
            content_type: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl UserProfile {
    pub fn from_new(id: ProfileId, fields: NewProfile) -> Self {
        Self {
            id,
            name: fields.name,
            email: fields.email,
            picture: fields.picture,
        }
    }
}
