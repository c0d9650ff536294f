//! Command-line / environment configuration for the server binary.

use crate::s3::S3Config;
use crate::storage::{StorageConfig, DEFAULT_KEY_PREFIX};
use crate::{Error, RenderConfig, Result};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Secret used when none is configured. The server warns loudly about it.
pub const DEFAULT_API_SECRET: &str = "default-secret-please-change-me";

/// htmlshot: render HTML to PNG with headless Chrome
#[derive(Debug, Clone, Parser)]
#[command(name = "htmlshot", version, about)]
pub struct Cli {
    /// Address to bind
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Shared secret expected in the `x-api-key` header
    #[arg(long, env = "API_SECRET", default_value = DEFAULT_API_SECRET, hide_env_values = true)]
    pub api_secret: String,

    /// Browser executable; searched for when omitted
    #[arg(long, env = "CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    /// Time allowed for content to reach network idle
    #[arg(long, env = "RENDER_TIMEOUT_MS", default_value_t = 30000)]
    pub render_timeout_ms: u64,

    /// Quiet period that counts as network idle
    #[arg(long, env = "NETWORK_IDLE_MS", default_value_t = 500)]
    pub network_idle_ms: u64,

    /// Upper bound for a whole render, launch to teardown
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value_t = 60000)]
    pub request_timeout_ms: u64,

    /// S3-compatible endpoint, e.g. https://<account>.r2.cloudflarestorage.com
    #[arg(long, env = "R2_ENDPOINT")]
    pub r2_endpoint: Option<String>,

    #[arg(long, env = "R2_ACCESS_KEY_ID", hide_env_values = true)]
    pub r2_access_key_id: Option<String>,

    #[arg(long, env = "R2_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub r2_secret_access_key: Option<String>,

    #[arg(long, env = "R2_BUCKET_NAME")]
    pub r2_bucket_name: Option<String>,

    #[arg(long, env = "R2_REGION", default_value = "auto")]
    pub r2_region: String,

    /// Public base URL for uploaded objects; defaults to `<endpoint>/<bucket>`
    #[arg(long, env = "R2_PUBLIC_BASE_URL")]
    pub r2_public_base_url: Option<String>,

    #[arg(long, env = "UPLOAD_TIMEOUT_MS", default_value_t = 30000)]
    pub upload_timeout_ms: u64,

    /// Requests allowed per client per window
    #[arg(long, env = "RATE_LIMIT_MAX", default_value_t = 1000)]
    pub rate_limit_max: u32,

    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value_t = 900)]
    pub rate_limit_window_secs: u64,
}

impl Cli {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            load_timeout_ms: self.render_timeout_ms,
            network_idle_ms: self.network_idle_ms,
            request_timeout_ms: self.request_timeout_ms,
            ..Default::default()
        }
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn uses_default_secret(&self) -> bool {
        self.api_secret == DEFAULT_API_SECRET
    }

    /// Storage settings, or `None` when no storage option is set at all.
    /// A partial configuration is an error.
    pub fn storage(&self) -> Result<Option<(S3Config, StorageConfig)>> {
        let fields = [
            ("R2_ENDPOINT", &self.r2_endpoint),
            ("R2_ACCESS_KEY_ID", &self.r2_access_key_id),
            ("R2_SECRET_ACCESS_KEY", &self.r2_secret_access_key),
            ("R2_BUCKET_NAME", &self.r2_bucket_name),
        ];
        if fields.iter().all(|(_, v)| v.is_none()) {
            return Ok(None);
        }
        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, v)| v.as_deref().map_or(true, str::is_empty))
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "Incomplete object storage settings, missing: {}",
                missing.join(", ")
            )));
        }

        let endpoint = self.r2_endpoint.clone().unwrap_or_default();
        let bucket = self.r2_bucket_name.clone().unwrap_or_default();
        let public_base_url = self
            .r2_public_base_url
            .clone()
            .unwrap_or_else(|| format!("{}/{}", endpoint.trim_end_matches('/'), bucket));

        Ok(Some((
            S3Config {
                endpoint,
                region: self.r2_region.clone(),
                access_key_id: self.r2_access_key_id.clone().unwrap_or_default(),
                secret_access_key: self.r2_secret_access_key.clone().unwrap_or_default(),
                timeout_ms: self.upload_timeout_ms,
            },
            StorageConfig {
                bucket,
                public_base_url,
                key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            },
        )))
    }
}
