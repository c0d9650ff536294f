//! Render orchestrator: validates a request, runs the pipeline and decides
//! the response shape.

use crate::async_api::render_detached;
use crate::discovery::BrowserLocator;
use crate::driver::Launcher;
use crate::geometry::GeometryPlan;
use crate::markup::extract_html;
use crate::storage::{validate_key, Publisher, UploadOutcome};
use crate::{CapturedImage, Error, RenderConfig, RenderRequest, Result};
use log::{info, warn};
use std::sync::Arc;

/// What the caller gets back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderResponse {
    /// Raw PNG bytes (`persist = false`)
    Image(CapturedImage),
    /// Upload result (`persist = true`); the image itself is not returned
    Stored(UploadOutcome),
}

/// Runs one independent render pipeline per call.
pub struct RenderService<L: Launcher> {
    launcher: Arc<L>,
    locator: BrowserLocator,
    config: RenderConfig,
    publisher: Option<Publisher>,
}

#[cfg(feature = "cdp")]
impl RenderService<crate::cdp::ChromeLauncher> {
    /// Service backed by headless Chrome.
    pub fn chrome(config: RenderConfig, locator: BrowserLocator, publisher: Option<Publisher>) -> Self {
        Self::new(crate::cdp::ChromeLauncher, locator, config, publisher)
    }
}

impl<L: Launcher + 'static> RenderService<L> {
    pub fn new(launcher: L, locator: BrowserLocator, config: RenderConfig, publisher: Option<Publisher>) -> Self {
        Self {
            launcher: Arc::new(launcher),
            locator,
            config,
            publisher,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn can_persist(&self) -> bool {
        self.publisher.is_some()
    }

    /// Render `request`. Validation errors are returned before any browser
    /// is started; upload failures come back as `Stored` with
    /// `success = false`.
    pub async fn render(&self, request: RenderRequest) -> Result<RenderResponse> {
        if request.content.trim().is_empty() {
            return Err(Error::EmptyContent);
        }
        let plan = GeometryPlan::from_hints(request.hints())?;
        if let Some(name) = request.filename.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
            validate_key(name)?;
        }
        let publisher = match (request.persist, &self.publisher) {
            (true, None) => {
                warn!("Upload requested but no object storage is configured");
                return Err(Error::Config("Object storage is not configured".into()));
            }
            (true, Some(publisher)) => Some(publisher),
            (false, _) => None,
        };

        let html = extract_html(&request.content).to_string();
        let executable = self.locator.locate()?;

        info!(
            "Rendering {} bytes of HTML (width: {:?}, height: {:?}, persist: {})",
            html.len(),
            request.width,
            request.height,
            request.persist
        );
        let rendered = render_detached(
            self.launcher.clone(),
            executable,
            self.config.clone(),
            html,
            plan,
        )
        .await?;

        match publisher {
            Some(publisher) => {
                let outcome = publisher
                    .publish(rendered.image, request.filename.as_deref())
                    .await;
                Ok(RenderResponse::Stored(outcome))
            }
            None => Ok(RenderResponse::Image(rendered.image)),
        }
    }
}
