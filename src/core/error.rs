use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    #[error("Profile '{0}' not found")]
    NotFound(String),

    #[error("Picture upload failed: {0}")]
    UploadFailed(String),

    #[error("Cannot derive object identifier from '{0}'")]
    IdentifierUndeterminable(String),

    #[error("Record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Object delete failed: {0}")]
    ObjectDeleteFailed(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AssetError>;

impl AssetError {
    pub fn not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound(id.to_string())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::StoreUnavailable(message.into())
    }

    pub fn upload(message: impl Into<String>) -> Self {
        Self::UploadFailed(message.into())
    }

    /// True when the profile addressed by the operation does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<std::io::Error> for AssetError {
    fn from(err: std::io::Error) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}
