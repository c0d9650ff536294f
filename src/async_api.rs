//! Async facade over the blocking render driver.
//!
//! Each render runs on its own worker thread that owns the browser
//! session for its whole life and reports back through a oneshot channel.
//! If the awaiting task gives up (timeout, client disconnect) the worker
//! still runs the driver through to `Closed`.

use crate::driver::{Launcher, RenderDriver, Rendered};
use crate::geometry::GeometryPlan;
use crate::{Error, RenderConfig, Result};
use log::{error, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;

/// Render `html` on a dedicated worker thread.
pub async fn render_detached<L>(
    launcher: Arc<L>,
    executable: PathBuf,
    config: RenderConfig,
    html: String,
    plan: GeometryPlan,
) -> Result<Rendered>
where
    L: Launcher + 'static,
{
    let request_timeout = Duration::from_millis(config.request_timeout_ms);
    let (tx, rx) = oneshot::channel::<Result<Rendered>>();

    thread::Builder::new()
        .name("render-worker".into())
        .spawn(move || {
            let mut driver = RenderDriver::new(launcher.as_ref(), executable, config);
            let res = driver.render(&html, plan);
            if tx.send(res).is_err() {
                warn!("Render finished after the caller went away; result dropped");
            }
        })
        .map_err(|e| Error::Internal(format!("Failed to spawn render worker: {}", e)))?;

    match tokio::time::timeout(request_timeout, rx).await {
        Ok(Ok(res)) => res,
        Ok(Err(e)) => {
            error!("Render worker exited without a result: {}", e);
            Err(Error::Internal(format!("Render worker canceled: {}", e)))
        }
        Err(_) => {
            warn!("Render exceeded {}ms; abandoning result", request_timeout.as_millis());
            Err(Error::RenderTimeout(request_timeout.as_millis() as u64))
        }
    }
}
