//! htmlshot
//!
//! Renders HTML (optionally wrapped in a markdown code fence) to a PNG
//! image with a real headless browser, and optionally uploads the image to
//! an S3-compatible bucket.
//!
//! # Pipeline
//!
//! - [`markup`]: pull HTML out of a fenced payload
//! - [`geometry`]: decide viewport width/height and full-page mode
//! - [`driver`]: one browser session per request, closed on every exit path
//! - [`storage`]: upload bytes and derive a public URL
//! - [`service`]: compose the above and shape the response
//!
//! # Example
//!
//! ```no_run
//! use htmlshot::{RenderConfig, RenderRequest};
//! use htmlshot::discovery::BrowserLocator;
//! use htmlshot::service::{RenderResponse, RenderService};
//!
//! # async fn run() -> htmlshot::Result<()> {
//! let service = RenderService::chrome(RenderConfig::default(), BrowserLocator::default(), None);
//! let request = RenderRequest::new("```html\n<h1>Hello</h1>\n```").with_width(640);
//! if let RenderResponse::Image(image) = service.render(request).await? {
//!     std::fs::write("hello.png", &image.bytes).unwrap();
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod async_api;
pub mod config;
pub mod discovery;
pub mod driver;
pub mod geometry;
pub mod idle;
pub mod markup;
pub mod ratelimit;
pub mod s3;
pub mod server;
pub mod service;
pub mod storage;

// Chrome DevTools Protocol backend
#[cfg(feature = "cdp")]
pub mod cdp;

/// MIME type of every captured image
pub const PNG_MIME: &str = "image/png";

/// Timing configuration for the render pipeline
///
/// The defaults mirror what the service has always used in production:
/// a 30 second load window and a 500 ms network-quiet period before the
/// page counts as idle.
///
/// ```
/// let cfg = htmlshot::RenderConfig::default();
/// assert_eq!(cfg.load_timeout_ms, 30000);
/// ```
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Maximum time for content to reach network idle, in milliseconds
    pub load_timeout_ms: u64,
    /// How long the page must stay quiet to count as idle, in milliseconds
    pub network_idle_ms: u64,
    /// Interval between idle probes, in milliseconds
    pub idle_poll_ms: u64,
    /// Upper bound for a whole request (launch, render, close), in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            load_timeout_ms: 30000,
            network_idle_ms: 500,
            idle_poll_ms: 50,
            request_timeout_ms: 60000,
        }
    }
}

/// One inbound render request
#[derive(Debug, Clone, Default)]
pub struct RenderRequest {
    /// Raw payload: HTML, optionally inside a fenced code block
    pub content: String,
    /// Viewport width; measured from the document when absent
    pub width: Option<u32>,
    /// Viewport height; disables full-page capture when present
    pub height: Option<u32>,
    /// Object key override for uploads
    pub filename: Option<String>,
    /// Upload the image instead of returning it
    pub persist: bool,
}

impl RenderRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    /// Upload the image, optionally under a fixed object key.
    pub fn persisted(mut self, filename: Option<&str>) -> Self {
        self.persist = true;
        self.filename = filename.map(str::to_string);
        self
    }

    pub fn hints(&self) -> geometry::GeometryHints {
        geometry::GeometryHints {
            width: self.width,
            height: self.height,
        }
    }
}

/// A rendered PNG
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

impl CapturedImage {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime_type: PNG_MIME,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RenderConfig::default();
        assert_eq!(config.load_timeout_ms, 30000);
        assert_eq!(config.network_idle_ms, 500);
        assert!(config.request_timeout_ms > config.load_timeout_ms);
    }

    #[test]
    fn test_request_builders() {
        let req = RenderRequest::new("<p>x</p>")
            .with_width(300)
            .with_height(200)
            .persisted(Some("a.png"));
        assert_eq!(req.hints().width, Some(300));
        assert_eq!(req.hints().height, Some(200));
        assert!(req.persist);
        assert_eq!(req.filename.as_deref(), Some("a.png"));
    }

    #[test]
    fn test_captured_image_is_png() {
        let image = CapturedImage::png(vec![1, 2, 3]);
        assert_eq!(image.mime_type, "image/png");
    }
}
