//! Chrome DevTools Protocol backend (uses the `headless_chrome` crate)

use crate::driver::{BrowserSession, Launcher};
use crate::geometry::ResolvedGeometry;
use crate::idle::{IdleState, IdleTracker, NetworkActivity};
use crate::{Error, RenderConfig, Result};
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::{Emulation, Network, Page};
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, info, warn};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

// The service runs inside an already-sandboxed container.
const CHROME_ARGS: [&str; 2] = ["--disable-dev-shm-usage", "--disable-gpu"];

const READY_PROBE: &str = "document.readyState === 'complete' ? 1 : 0";

const WIDTH_PROBE: &str = r#"
    (function() {
        const root = document.body || document.documentElement;
        return root ? root.scrollWidth : 0;
    })()
"#;

const HEIGHT_PROBE: &str = r#"
    (function() {
        const body = document.body ? document.body.scrollHeight : 0;
        const root = document.documentElement ? document.documentElement.scrollHeight : 0;
        return Math.max(body, root);
    })()
"#;

/// Launches headless Chrome/Chromium processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromeLauncher;

impl Launcher for ChromeLauncher {
    type Session = ChromeSession;

    fn launch(&self, executable: &Path, config: &RenderConfig) -> Result<ChromeSession> {
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .path(Some(executable.to_path_buf()))
            .args(CHROME_ARGS.iter().map(OsStr::new).collect())
            .idle_browser_timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| Error::BrowserUnavailable(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::BrowserUnavailable(format!("Failed to launch browser: {}", e)))?;

        info!(
            "Browser launched from {} (pid {:?})",
            executable.display(),
            browser.get_process_id()
        );

        Ok(ChromeSession {
            browser: Some(browser),
            tab: None,
            network: Arc::default(),
        })
    }
}

/// A single headless Chrome process and its one tab.
///
/// Dropping the `Browser` kills the child process, so `close` only has to
/// let go of it.
pub struct ChromeSession {
    browser: Option<Browser>,
    tab: Option<Arc<Tab>>,
    network: Arc<Mutex<NetworkActivity>>,
}

fn lock_activity(network: &Mutex<NetworkActivity>) -> MutexGuard<'_, NetworkActivity> {
    match network.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ChromeSession {
    fn tab(&self) -> Result<&Arc<Tab>> {
        self.tab
            .as_ref()
            .ok_or_else(|| Error::CaptureFailure("No page is open".into()))
    }

    fn eval_number(&self, script: &str) -> Result<i64> {
        let result = self
            .tab()?
            .evaluate(script, false)
            .map_err(|e| Error::CaptureFailure(format!("Evaluation failed: {}", e)))?;

        result
            .value
            .as_ref()
            .and_then(|v| v.as_f64())
            .map(|v| v as i64)
            .ok_or_else(|| Error::CaptureFailure("No numeric value returned from evaluation".into()))
    }

    /// Feed request lifecycle events of the open tab into `self.network`.
    fn track_network(&self) -> Result<()> {
        let tab = self.tab()?;
        tab.call_method(Network::Enable {
            max_total_buffer_size: None,
            max_resource_buffer_size: None,
            max_post_data_size: None,
            report_direct_socket_traffic: None,
            enable_durable_messages: None,
        })
            .map_err(|e| Error::CaptureFailure(format!("Failed to enable network events: {}", e)))?;

        let network = self.network.clone();
        tab.add_event_listener(Arc::new(move |event: &Event| match event {
            Event::NetworkRequestWillBeSent(e) => {
                lock_activity(&network).request_started(&e.params.request_id)
            }
            Event::NetworkLoadingFinished(e) => {
                lock_activity(&network).request_settled(&e.params.request_id)
            }
            Event::NetworkLoadingFailed(e) => {
                lock_activity(&network).request_settled(&e.params.request_id)
            }
            _ => {}
        }))
        .map_err(|e| Error::CaptureFailure(format!("Failed to watch network events: {}", e)))?;
        Ok(())
    }

    fn wait_for_network_idle(&self, config: &RenderConfig) -> Result<()> {
        let started = Instant::now();
        let poll = Duration::from_millis(config.idle_poll_ms.max(1));
        let mut tracker = IdleTracker::new(
            started,
            Duration::from_millis(config.network_idle_ms),
            Duration::from_millis(config.load_timeout_ms),
        );

        loop {
            let complete = self.eval_number(READY_PROBE)? == 1;
            let snapshot = lock_activity(&self.network).snapshot(complete);

            match tracker.observe(Instant::now(), snapshot) {
                IdleState::Idle => {
                    debug!(
                        "Network idle after {}ms ({} requests)",
                        started.elapsed().as_millis(),
                        snapshot.started
                    );
                    return Ok(());
                }
                IdleState::TimedOut => {
                    warn!(
                        "Content did not reach network idle within {}ms ({} requests in flight)",
                        config.load_timeout_ms, snapshot.in_flight
                    );
                    return Err(Error::RenderTimeout(config.load_timeout_ms));
                }
                IdleState::Busy => std::thread::sleep(poll),
            }
        }
    }

    fn content_height(&self) -> Result<u32> {
        let height = self.eval_number(HEIGHT_PROBE)?;
        Ok(height.clamp(1, u32::MAX as i64) as u32)
    }
}

impl BrowserSession for ChromeSession {
    fn open_page(&mut self) -> Result<()> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| Error::BrowserUnavailable("Browser already closed".into()))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::BrowserUnavailable(format!("Failed to create tab: {}", e)))?;

        self.tab = Some(tab);
        Ok(())
    }

    fn load_html(&mut self, html: &str, config: &RenderConfig) -> Result<()> {
        let tab = self.tab()?;
        tab.set_default_timeout(Duration::from_millis(config.load_timeout_ms));

        tab.navigate_to("about:blank")
            .and_then(|t| t.wait_until_navigated())
            .map_err(|e| Error::CaptureFailure(format!("Failed to open blank document: {}", e)))?;

        let frame_id = tab
            .call_method(Page::GetFrameTree(None))
            .map_err(|e| Error::CaptureFailure(format!("Failed to read frame tree: {}", e)))?
            .frame_tree
            .frame
            .id;

        self.track_network()?;

        tab.call_method(Page::SetDocumentContent {
            frame_id,
            html: html.to_string(),
        })
        .map_err(|e| Error::CaptureFailure(format!("Failed to set document content: {}", e)))?;

        self.wait_for_network_idle(config)
    }

    fn content_width(&mut self) -> Result<u32> {
        let width = self.eval_number(WIDTH_PROBE)?;
        Ok(width.clamp(0, u32::MAX as i64) as u32)
    }

    fn set_viewport(&mut self, width: u32, height: u32) -> Result<()> {
        self.tab()?
            .call_method(Emulation::SetDeviceMetricsOverride {
                width,
                height,
                device_scale_factor: 1.0,
                mobile: false,
                scale: None,
                screen_width: None,
                screen_height: None,
                position_x: None,
                position_y: None,
                dont_set_visible_size: None,
                screen_orientation: None,
                viewport: None,
                display_feature: None,
                device_posture: None,
            })
            .map_err(|e| Error::CaptureFailure(format!("Failed to set viewport {}x{}: {}", width, height, e)))?;
        Ok(())
    }

    fn capture_png(&mut self, geometry: &ResolvedGeometry) -> Result<Vec<u8>> {
        if geometry.full_page {
            // Grow the viewport to the laid-out document before capturing.
            let height = self.content_height()?;
            self.set_viewport(geometry.width, height)?;
        }

        self.tab()?
            .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| Error::CaptureFailure(format!("Screenshot failed: {}", e)))
    }

    fn close(&mut self) {
        drop(self.tab.take());
        if let Some(browser) = self.browser.take() {
            debug!("Closing browser (pid {:?})", browser.get_process_id());
            drop(browser);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::BrowserLocator;
    use crate::driver::{DriverState, RenderDriver};
    use crate::geometry::{GeometryHints, GeometryPlan};

    #[test]
    fn test_chrome_render() {
        // This test requires Chrome to be installed, so we skip it in CI
        if std::env::var("CI").is_ok() {
            return;
        }
        let executable = match BrowserLocator::default().locate() {
            Ok(path) => path,
            Err(e) => {
                eprintln!("Skipping Chrome render test: {}", e);
                return;
            }
        };

        let launcher = ChromeLauncher;
        let mut driver = RenderDriver::new(&launcher, executable, RenderConfig::default());
        let plan = GeometryPlan::from_hints(GeometryHints {
            width: Some(320),
            height: Some(200),
        })
        .unwrap();

        match driver.render("<p>hello</p>", plan) {
            Ok(out) => {
                assert_eq!(&out.image.bytes[0..8], b"\x89PNG\r\n\x1a\n");
                assert_eq!(driver.state(), DriverState::Closed);
            }
            Err(e) => eprintln!("Skipping Chrome render test because Chrome failed: {}", e),
        }
    }
}
