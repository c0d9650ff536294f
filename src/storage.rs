//! Storage publisher: uploads captured images and derives their public URL.

use crate::{CapturedImage, Error, Result};
use async_trait::async_trait;
use log::{error, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Prefix of generated object keys
pub const DEFAULT_KEY_PREFIX: &str = "report";

/// An S3-style bucket/key store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `bucket/key` in a single atomic write and return
    /// the location reported by the store.
    ///
    /// Transport and store failures are reported as
    /// [`crate::Error::UploadFailure`]; keys failing [`validate_key`] are
    /// refused before anything is sent.
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>, content_type: &str) -> Result<String>;
}

/// Where uploads go and how their URLs are formed
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    /// Public URL under which object keys are served, e.g. `https://img.example.com`
    pub public_base_url: String,
    /// Prefix for generated keys (`<prefix>-<token>.png`)
    pub key_prefix: String,
}

impl StorageConfig {
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), key)
    }
}

/// Result of one upload attempt. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadOutcome {
    pub fn uploaded(url: String, key: String) -> Self {
        Self {
            success: true,
            url: Some(url),
            key: Some(key),
            error: None,
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            success: false,
            url: None,
            key: None,
            error: Some(error),
        }
    }
}

/// Uploads images to an [`ObjectStore`]. Failed uploads are reported, not retried.
#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn ObjectStore>,
    config: StorageConfig,
}

impl Publisher {
    pub fn new(store: Arc<dyn ObjectStore>, config: StorageConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub async fn publish(&self, image: CapturedImage, filename: Option<&str>) -> UploadOutcome {
        let key = match object_key(filename, &self.config.key_prefix) {
            Ok(key) => key,
            Err(e) => {
                warn!("Refusing upload: {}", e);
                return UploadOutcome::failed(e.to_string());
            }
        };
        let size = image.bytes.len();

        match self
            .store
            .put_object(&self.config.bucket, &key, image.bytes, image.mime_type)
            .await
        {
            Ok(location) => {
                info!("Uploaded {} bytes to {}", size, location);
                UploadOutcome::uploaded(self.config.public_url(&key), key)
            }
            Err(e) => {
                error!("Upload of {} to bucket {} failed: {}", key, self.config.bucket, e);
                UploadOutcome::failed(e.to_string())
            }
        }
    }
}

static KEY_CLOCK: AtomicU64 = AtomicU64::new(0);

/// Millisecond timestamp, bumped so that no two calls in this process
/// ever return the same token.
pub fn next_key_token() -> u64 {
    let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let mut prev = KEY_CLOCK.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match KEY_CLOCK.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

/// The caller's filename, or `<prefix>-<token>.png` when none was given.
pub fn object_key(filename: Option<&str>, prefix: &str) -> Result<String> {
    match filename.map(str::trim).filter(|f| !f.is_empty()) {
        Some(name) => {
            validate_key(name)?;
            Ok(name.to_string())
        }
        None => Ok(format!("{}-{}.png", prefix, next_key_token())),
    }
}

/// Keys become URL path segments as-is, so they must survive URL
/// normalisation unchanged: no leading `/`, no empty, `.` or `..` segments.
pub fn validate_key(key: &str) -> Result<()> {
    let invalid = |reason| {
        Err(Error::InvalidFilename {
            value: key.to_string(),
            reason,
        })
    };

    if key.trim().is_empty() {
        return invalid("must not be empty");
    }
    if key.starts_with('/') {
        return invalid("must not start with '/'");
    }
    for segment in key.split('/') {
        match segment {
            "" => return invalid("must not contain empty path segments"),
            "." | ".." => return invalid("must not contain '.' or '..' segments"),
            _ => {}
        }
    }
    Ok(())
}
