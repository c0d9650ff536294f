//! Render driver: one browser session per request.
//!
//! The driver walks a strictly sequential state machine
//!
//! ```text
//! Idle -> Launched -> PageOpen -> ContentLoaded -> ViewportSet -> Captured -> Closed
//! ```
//!
//! and always ends in `Closed`, whichever step fails. The browser backend
//! sits behind the [`Launcher`] / [`BrowserSession`] pair so the driver can
//! be exercised without a real browser.

use crate::geometry::{GeometryPlan, ResolvedGeometry};
use crate::{CapturedImage, RenderConfig, Result};
use log::debug;
use std::fmt;
use std::path::{Path, PathBuf};

/// Starts browser processes.
pub trait Launcher: Send + Sync {
    type Session: BrowserSession;

    /// Start an isolated browser process from `executable`.
    ///
    /// Failures must be reported as [`crate::Error::BrowserUnavailable`].
    fn launch(&self, executable: &Path, config: &RenderConfig) -> Result<Self::Session>;
}

/// A single live browser process with at most one page.
pub trait BrowserSession {
    /// Open the page that content will be loaded into.
    fn open_page(&mut self) -> Result<()>;

    /// Replace the page document with `html` and block until the network
    /// is idle or the load window in `config` runs out.
    fn load_html(&mut self, html: &str, config: &RenderConfig) -> Result<()>;

    /// Natural content width of the loaded document.
    fn content_width(&mut self) -> Result<u32>;

    fn set_viewport(&mut self, width: u32, height: u32) -> Result<()>;

    /// Take a PNG snapshot. With `full_page` the capture spans the whole
    /// scrollable height, otherwise the current viewport.
    fn capture_png(&mut self, geometry: &ResolvedGeometry) -> Result<Vec<u8>>;

    /// Tear the browser process down. Must be idempotent.
    fn close(&mut self);
}

/// Driver lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Launched,
    PageOpen,
    ContentLoaded,
    ViewportSet,
    Captured,
    Closed,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverState::Idle => "idle",
            DriverState::Launched => "launched",
            DriverState::PageOpen => "page-open",
            DriverState::ContentLoaded => "content-loaded",
            DriverState::ViewportSet => "viewport-set",
            DriverState::Captured => "captured",
            DriverState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Successful driver output
#[derive(Debug, Clone)]
pub struct Rendered {
    pub image: CapturedImage,
    pub geometry: ResolvedGeometry,
}

/// Closes the wrapped session when dropped, so a panic in any step still
/// releases the browser process.
struct SessionGuard<S: BrowserSession> {
    session: S,
    closed: bool,
}

impl<S: BrowserSession> SessionGuard<S> {
    fn new(session: S) -> Self {
        Self {
            session,
            closed: false,
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.session.close();
        }
    }
}

impl<S: BrowserSession> std::ops::Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: BrowserSession> std::ops::DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: BrowserSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Drives one render from launch to teardown. Not reusable.
pub struct RenderDriver<'a, L: Launcher> {
    launcher: &'a L,
    executable: PathBuf,
    config: RenderConfig,
    state: DriverState,
}

impl<'a, L: Launcher> RenderDriver<'a, L> {
    /// `executable` is the already-resolved browser binary; the driver
    /// never searches for one itself.
    pub fn new(launcher: &'a L, executable: PathBuf, config: RenderConfig) -> Self {
        Self {
            launcher,
            executable,
            config,
            state: DriverState::Idle,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Render `html` according to `plan`.
    ///
    /// The browser is closed before this returns, on success and failure
    /// alike. No partial image is ever returned.
    pub fn render(&mut self, html: &str, plan: GeometryPlan) -> Result<Rendered> {
        debug!("Launching browser from {}", self.executable.display());
        let session = self.launcher.launch(&self.executable, &self.config)?;
        let mut guard = SessionGuard::new(session);
        self.advance(DriverState::Launched);

        let result = self.drive(&mut guard, html, plan);

        guard.close();
        self.advance(DriverState::Closed);
        result
    }

    fn drive(
        &mut self,
        session: &mut SessionGuard<L::Session>,
        html: &str,
        plan: GeometryPlan,
    ) -> Result<Rendered> {
        session.open_page()?;
        self.advance(DriverState::PageOpen);

        session.load_html(html, &self.config)?;
        self.advance(DriverState::ContentLoaded);

        let geometry = plan.resolve(|| session.content_width())?;
        session.set_viewport(geometry.width, geometry.viewport_height())?;
        self.advance(DriverState::ViewportSet);

        let bytes = session.capture_png(&geometry)?;
        self.advance(DriverState::Captured);
        debug!(
            "Captured {} bytes at width {} (full page: {})",
            bytes.len(),
            geometry.width,
            geometry.full_page
        );

        Ok(Rendered {
            image: CapturedImage::png(bytes),
            geometry,
        })
    }

    fn advance(&mut self, next: DriverState) {
        debug!("render driver: {} -> {}", self.state, next);
        self.state = next;
    }
}
