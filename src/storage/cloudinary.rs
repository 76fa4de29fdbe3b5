//! Cloudinary-backed object store.
//!
//! Uploads and destroys are signed requests: the signed parameters are sorted
//! by name, joined as `k=v&k=v`, suffixed with the API secret and hashed with
//! SHA-1. Listing uses the Admin API with basic auth.

use super::{ObjectStore, PictureUpload, StoredObject};
use crate::codec::{ObjectIdentifier, UploadKey};
use crate::core::{AssetError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_API_BASE: &str = "https://api.cloudinary.com";
const LIST_PAGE_SIZE: u32 = 500;

#[derive(Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub api_base: String,
    /// Per-request timeout of the HTTP client.
    pub request_timeout: Duration,
}

impl CloudinaryConfig {
    pub fn new(cloud_name: &str, api_key: &str, api_secret: &str) -> Self {
        Self {
            cloud_name: cloud_name.to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1_1/{}/{}", self.api_base, self.cloud_name, path)
    }
}

// The secret must never end up in logs.
impl fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Signature over `params` as the Cloudinary API expects it.
pub fn sign_params(params: &BTreeMap<&str, String>, api_secret: &str) -> String {
    let joined = params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha1::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Parameters of an upload before signing.
///
/// `public_id` carries the full `{folder}/{name}` path so the delivery URL
/// embeds it in either folder mode. `asset_folder` places the asset in the
/// folder on accounts using dynamic folders; fixed-folder accounts ignore it.
/// `folder` is not sent because it would prefix the path a second time.
fn upload_params(key: &UploadKey) -> BTreeMap<&'static str, String> {
    let mut params = BTreeMap::from([("public_id", key.identifier().to_string())]);
    if !key.folder.is_empty() {
        params.insert("asset_folder", key.folder.clone());
    }
    params
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    resources: Vec<ListedResource>,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListedResource {
    public_id: String,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    message: String,
}

pub struct CloudinaryObjectStore {
    config: CloudinaryConfig,
    http: reqwest::Client,
}

impl CloudinaryObjectStore {
    pub fn new(config: CloudinaryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AssetError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    fn signed(&self, mut params: BTreeMap<&'static str, String>) -> BTreeMap<&'static str, String> {
        params.insert("timestamp", Utc::now().timestamp().to_string());
        let signature = sign_params(&params, &self.config.api_secret);
        params.insert("signature", signature);
        params.insert("api_key", self.config.api_key.clone());
        params
    }

    async fn error_message(response: reqwest::Response) -> String {
        let status = response.status();
        match response.json::<ErrorEnvelope>().await {
            Ok(envelope) => format!("{}: {}", status, envelope.error.message),
            Err(_) => status.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for CloudinaryObjectStore {
    async fn upload(&self, upload: PictureUpload) -> Result<String> {
        let identifier = upload.key.identifier();
        let file_name = format!("{}.{}", upload.key.name, upload.extension());
        let part = Part::bytes(upload.picture.bytes.to_vec())
            .file_name(file_name)
            .mime_str(&upload.content_type())
            .map_err(|e| AssetError::upload(format!("Invalid content type: {}", e)))?;

        let params = self.signed(upload_params(&upload.key));
        let form = params
            .into_iter()
            .fold(Form::new(), |form, (key, value)| form.text(key, value))
            .part("file", part);

        let response = self
            .http
            .post(self.config.endpoint("image/upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| AssetError::upload(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AssetError::upload(Self::error_message(response).await));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| AssetError::upload(format!("Malformed upload response: {}", e)))?;

        let url = body
            .secure_url
            .or(body.url)
            .ok_or_else(|| AssetError::upload("Upload response carried no URL"))?;
        debug!(identifier = %identifier, url = %url, "picture uploaded");
        Ok(url)
    }

    async fn delete(&self, identifier: &ObjectIdentifier) -> Result<bool> {
        let params = self.signed(BTreeMap::from([
            ("invalidate", "true".to_string()),
            ("public_id", identifier.to_string()),
        ]));

        let response = self
            .http
            .post(self.config.endpoint("image/destroy"))
            .form(&params)
            .send()
            .await
            .map_err(|e| AssetError::ObjectDeleteFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AssetError::ObjectDeleteFailed(
                Self::error_message(response).await,
            ));
        }

        let body: DestroyResponse = response.json().await.map_err(|e| {
            AssetError::ObjectDeleteFailed(format!("Malformed destroy response: {}", e))
        })?;

        match body.result.as_str() {
            "ok" => Ok(true),
            "not found" => Ok(false),
            other => {
                warn!(identifier = %identifier, result = other, "unexpected destroy result");
                Err(AssetError::ObjectDeleteFailed(format!(
                    "destroy returned '{}'",
                    other
                )))
            }
        }
    }

    async fn list(&self, folder: &str) -> Result<Vec<StoredObject>> {
        let prefix = format!("{}/", folder.trim_matches('/'));
        let mut objects = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![
                ("prefix", prefix.clone()),
                ("max_results", LIST_PAGE_SIZE.to_string()),
            ];
            if let Some(cursor) = &cursor {
                query.push(("next_cursor", cursor.clone()));
            }

            let response = self
                .http
                .get(self.config.endpoint("resources/image/upload"))
                .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
                .query(&query)
                .send()
                .await
                .map_err(|e| AssetError::store(e.to_string()))?;

            if !response.status().is_success() {
                return Err(AssetError::store(Self::error_message(response).await));
            }

            let page: ListResponse = response
                .json()
                .await
                .map_err(|e| AssetError::store(format!("Malformed listing: {}", e)))?;

            objects.extend(page.resources.into_iter().map(|resource| StoredObject {
                identifier: ObjectIdentifier::new(resource.public_id),
                created_at: resource.created_at,
            }));

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_signature_matches_reference() {
        let params = BTreeMap::from([
            ("timestamp", "1700000000".to_string()),
            ("public_id", "D10ATest/profile_picture_T1".to_string()),
        ]);
        assert_eq!(
            sign_params(&params, "abcd"),
            "9168803f87a860857ad51047d3650fb22c5592ef"
        );
    }

    #[test]
    fn destroy_signature_includes_invalidate() {
        let params = BTreeMap::from([
            ("public_id", "D10ATest/profile_picture_T1".to_string()),
            ("invalidate", "true".to_string()),
            ("timestamp", "1700000000".to_string()),
        ]);
        assert_eq!(
            sign_params(&params, "abcd"),
            "268037d3a80f3d9f3e0f82b5f7e6005eb907ecf4"
        );
    }

    #[test]
    fn upload_params_place_asset_in_folder() {
        let key = UploadKey {
            folder: "D10ATest".to_string(),
            name: "profile_picture_T1".to_string(),
        };
        let params = upload_params(&key);
        assert_eq!(params.get("public_id").map(String::as_str), Some("D10ATest/profile_picture_T1"));
        assert_eq!(params.get("asset_folder").map(String::as_str), Some("D10ATest"));
        assert!(!params.contains_key("folder"));

        let top_level = UploadKey {
            folder: String::new(),
            name: "profile_picture_T1".to_string(),
        };
        assert!(!upload_params(&top_level).contains_key("asset_folder"));
    }

    #[test]
    fn upload_signature_covers_asset_folder() {
        let params = BTreeMap::from([
            ("asset_folder", "D10ATest".to_string()),
            ("public_id", "D10ATest/profile_picture_T1".to_string()),
            ("timestamp", "1700000000".to_string()),
        ]);
        assert_eq!(
            sign_params(&params, "abcd"),
            "53e882cfc6538d9fe1658aabeafdeb566a195067"
        );
    }

    #[test]
    fn endpoints_are_scoped_to_cloud() {
        let config = CloudinaryConfig::new("demo", "key", "secret").api_base("http://localhost:9000/");
        assert_eq!(
            config.endpoint("image/upload"),
            "http://localhost:9000/v1_1/demo/image/upload"
        );
    }

    #[test]
    fn debug_output_redacts_secret() {
        let config = CloudinaryConfig::new("demo", "key", "top-secret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("top-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn signed_params_carry_key_and_signature() {
        let store = CloudinaryObjectStore::new(CloudinaryConfig::new("demo", "key", "secret")).unwrap();
        let params = store.signed(BTreeMap::from([("public_id", "f/x".to_string())]));
        assert_eq!(params.get("api_key").map(String::as_str), Some("key"));
        assert_eq!(params.get("signature").map(String::len), Some(40));
        assert!(params.contains_key("timestamp"));
    }
}
