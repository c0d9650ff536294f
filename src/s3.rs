//! Minimal S3-compatible client: a single signed `PUT` per object.
//!
//! Requests are path-style (`{endpoint}/{bucket}/{key}`) and signed with
//! AWS Signature Version 4, which is what Cloudflare R2, MinIO and AWS S3
//! all accept.

use crate::storage::{validate_key, ObjectStore};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use log::debug;
use sha2::{Digest, Sha256};
use std::time::Duration;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

const SERVICE: &str = "s3";
const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SIGNED_HEADERS: &str = "content-type;host;x-amz-content-sha256;x-amz-date";

/// Connection settings for an S3-compatible endpoint
#[derive(Debug, Clone)]
pub struct S3Config {
    /// e.g. `https://<account>.r2.cloudflarestorage.com`
    pub endpoint: String,
    /// `auto` for R2
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub timeout_ms: u64,
}

/// [`ObjectStore`] backed by an S3-compatible HTTP endpoint.
pub struct S3Store {
    client: reqwest::Client,
    endpoint: Url,
    config: S3Config,
}

impl S3Store {
    pub fn new(config: S3Config) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| Error::Config(format!("Invalid storage endpoint {:?}: {}", config.endpoint, e)))?;
        if endpoint.host_str().is_none() {
            return Err(Error::Config(format!("Storage endpoint {:?} has no host", config.endpoint)));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    fn host(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    fn canonical_uri(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint.path().trim_end_matches('/'),
            uri_encode(bucket, true),
            uri_encode(key, false)
        )
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>, content_type: &str) -> Result<String> {
        // The URL parser would resolve dot segments after signing.
        validate_key(key)?;
        if matches!(bucket, "" | "." | "..") {
            return Err(Error::Config(format!("Invalid bucket name {:?}", bucket)));
        }

        let host = self.host();
        let path = self.canonical_uri(bucket, key);
        let url = format!("{}://{}{}", self.endpoint.scheme(), host, path);

        let signed = sign_put(
            &SigningInput {
                host: &host,
                canonical_uri: &path,
                content_type,
                payload_sha256: &hex::encode(Sha256::digest(&body)),
                region: &self.config.region,
                access_key_id: &self.config.access_key_id,
                secret_access_key: &self.config.secret_access_key,
            },
            Utc::now(),
        )?;

        debug!("PUT {} ({} bytes)", url, body.len());
        let response = self
            .client
            .put(&url)
            .header("content-type", content_type)
            .header("x-amz-content-sha256", signed.payload_sha256)
            .header("x-amz-date", signed.amz_date)
            .header("authorization", signed.authorization)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::UploadFailure(format!("Request to {} failed: {}", host, e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::UploadFailure(format!(
                "Storage responded {}: {}",
                status,
                detail.trim()
            )));
        }

        Ok(url)
    }
}

/// Everything that goes into a request signature
#[derive(Debug, Clone)]
pub struct SigningInput<'a> {
    pub host: &'a str,
    pub canonical_uri: &'a str,
    pub content_type: &'a str,
    pub payload_sha256: &'a str,
    pub region: &'a str,
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
}

/// Header values produced by [`sign_put`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub amz_date: String,
    pub payload_sha256: String,
    pub authorization: String,
}

/// Sign a `PUT` with AWS Signature Version 4.
pub fn sign_put(input: &SigningInput<'_>, now: DateTime<Utc>) -> Result<SignedRequest> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = now.format("%Y%m%d").to_string();

    let canonical_headers = format!(
        "content-type:{}\nhost:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n",
        input.content_type.trim(),
        input.host,
        input.payload_sha256,
        amz_date
    );
    let canonical_request = format!(
        "PUT\n{}\n\n{}\n{}\n{}",
        input.canonical_uri, canonical_headers, SIGNED_HEADERS, input.payload_sha256
    );

    let scope = format!("{}/{}/{}/aws4_request", date_stamp, input.region, SERVICE);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let key = signing_key(input.secret_access_key, &date_stamp, input.region, SERVICE)?;
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

    Ok(SignedRequest {
        authorization: format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, input.access_key_id, scope, SIGNED_HEADERS, signature
        ),
        amz_date,
        payload_sha256: input.payload_sha256.to_string(),
    })
}

/// Derive the SigV4 signing key for one day/region/service.
pub fn signing_key(secret: &str, date_stamp: &str, region: &str, service: &str) -> Result<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| Error::UploadFailure(format!("Failed to initialise request signer: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Percent-encode per SigV4 rules: unreserved characters pass through,
/// `/` is kept unless `encode_slash`.
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
