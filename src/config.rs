use crate::coordinator::{CoordinatorConfig, DEFAULT_PICTURE_FOLDER};
use crate::storage::CloudinaryConfig;
use crate::storage::cloudinary::DEFAULT_API_BASE;
use crate::web::DEFAULT_MAX_UPLOAD_BYTES;
use anyhow::{Context, Result, anyhow};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordBackend {
    Memory,
    Snapshot(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectBackend {
    Memory,
    Cloudinary,
}

impl ObjectBackend {
    fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "cloudinary" => Ok(Self::Cloudinary),
            _ => Err(anyhow!("OBJECT_BACKEND must be one of: memory, cloudinary")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub record_backend: RecordBackend,
    pub object_backend: ObjectBackend,
    /// URL prefix handed out by the in-memory object store
    pub object_base_url: String,
    pub cloudinary: Option<CloudinaryConfig>,
    pub picture_folder: String,
    pub record_timeout: Duration,
    pub object_timeout: Duration,
    pub max_upload_bytes: usize,
    pub serialize_per_profile: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let host = var("APP_HOST", "0.0.0.0");
        let port = var("APP_PORT", "3000")
            .parse::<u16>()
            .context("APP_PORT must be a valid u16")?;

        let record_backend = match var("RECORD_BACKEND", "memory").to_ascii_lowercase().as_str() {
            "memory" | "mem" => RecordBackend::Memory,
            "snapshot" | "file" => {
                RecordBackend::Snapshot(PathBuf::from(var("SNAPSHOT_PATH", "data/profiles.snapshot")))
            }
            _ => return Err(anyhow!("RECORD_BACKEND must be one of: memory, snapshot")),
        };

        let object_backend = ObjectBackend::parse(&var("OBJECT_BACKEND", "memory"))?;
        let object_base_url = var("OBJECT_BASE_URL", "http://localhost:3000/objects");

        let object_timeout = Duration::from_millis(
            var("OBJECT_TIMEOUT_MS", "15000")
                .parse::<u64>()
                .context("OBJECT_TIMEOUT_MS must be a valid u64")?,
        );
        let record_timeout = Duration::from_millis(
            var("RECORD_TIMEOUT_MS", "5000")
                .parse::<u64>()
                .context("RECORD_TIMEOUT_MS must be a valid u64")?,
        );

        let cloudinary = match object_backend {
            ObjectBackend::Memory => None,
            ObjectBackend::Cloudinary => {
                let required = |key: &str| {
                    lookup(key)
                        .filter(|value| !value.trim().is_empty())
                        .ok_or_else(|| anyhow!("{key} is required when OBJECT_BACKEND=cloudinary"))
                };
                Some(
                    CloudinaryConfig::new(
                        &required("CLOUDINARY_CLOUD_NAME")?,
                        &required("CLOUDINARY_API_KEY")?,
                        &required("CLOUDINARY_API_SECRET")?,
                    )
                    .api_base(&var("CLOUDINARY_API_BASE", DEFAULT_API_BASE))
                    .request_timeout(object_timeout),
                )
            }
        };

        let picture_folder = var("PICTURE_FOLDER", DEFAULT_PICTURE_FOLDER)
            .trim_matches('/')
            .to_string();
        if picture_folder.is_empty() {
            return Err(anyhow!("PICTURE_FOLDER must not be empty"));
        }

        let max_upload_bytes = var("MAX_UPLOAD_BYTES", &DEFAULT_MAX_UPLOAD_BYTES.to_string())
            .parse::<usize>()
            .context("MAX_UPLOAD_BYTES must be a valid usize")?;

        let serialize_per_profile = match var("SERIALIZE_PER_PROFILE", "true")
            .to_ascii_lowercase()
            .as_str()
        {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            other => return Err(anyhow!("SERIALIZE_PER_PROFILE must be a boolean, got '{other}'")),
        };

        Ok(Self {
            host,
            port,
            record_backend,
            object_backend,
            object_base_url,
            cloudinary,
            picture_folder,
            record_timeout,
            object_timeout,
            max_upload_bytes,
            serialize_per_profile,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig::new()
            .picture_folder(&self.picture_folder)
            .record_timeout(self.record_timeout)
            .object_timeout(self.object_timeout)
            .serialize_per_profile(self.serialize_per_profile)
    }
}
