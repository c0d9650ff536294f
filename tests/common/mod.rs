//! Shared test doubles: a browser launcher that never starts a real
//! process, and a tiny_http server standing in for an S3 endpoint.

#![allow(dead_code)]

use htmlshot::driver::{BrowserSession, Launcher};
use htmlshot::geometry::ResolvedGeometry;
use htmlshot::{Error, RenderConfig, Result};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tiny_http::{Response, Server};

pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nstub-image";

/// Stage at which a stub session fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    None,
    Launch,
    OpenPage,
    Load,
    Measure,
    Viewport,
    Capture,
}

/// Launcher whose sessions count themselves in and out of `live`.
#[derive(Clone)]
pub struct StubLauncher {
    pub failure: Failure,
    pub launches: Arc<AtomicUsize>,
    pub live: Arc<AtomicUsize>,
    pub viewports: Arc<Mutex<Vec<(u32, u32)>>>,
    pub loaded_html: Arc<Mutex<Vec<String>>>,
    pub measured_width: u32,
}

impl StubLauncher {
    pub fn new(failure: Failure) -> Self {
        Self {
            failure,
            launches: Arc::new(AtomicUsize::new(0)),
            live: Arc::new(AtomicUsize::new(0)),
            viewports: Arc::new(Mutex::new(Vec::new())),
            loaded_html: Arc::new(Mutex::new(Vec::new())),
            measured_width: 800,
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

pub struct StubSession {
    launcher: StubLauncher,
    open: bool,
}

impl Launcher for StubLauncher {
    type Session = StubSession;

    fn launch(&self, _executable: &Path, _config: &RenderConfig) -> Result<StubSession> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.failure == Failure::Launch {
            return Err(Error::BrowserUnavailable("stub launch failure".into()));
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(StubSession {
            launcher: self.clone(),
            open: true,
        })
    }
}

impl StubSession {
    fn fail_if(&self, stage: Failure, err: impl FnOnce() -> Error) -> Result<()> {
        if self.launcher.failure == stage {
            return Err(err());
        }
        Ok(())
    }
}

impl BrowserSession for StubSession {
    fn open_page(&mut self) -> Result<()> {
        self.fail_if(Failure::OpenPage, || Error::BrowserUnavailable("no tab".into()))
    }

    fn load_html(&mut self, html: &str, config: &RenderConfig) -> Result<()> {
        self.launcher.loaded_html.lock().unwrap().push(html.to_string());
        self.fail_if(Failure::Load, || Error::RenderTimeout(config.load_timeout_ms))
    }

    fn content_width(&mut self) -> Result<u32> {
        self.fail_if(Failure::Measure, || Error::CaptureFailure("measure".into()))?;
        Ok(self.launcher.measured_width)
    }

    fn set_viewport(&mut self, width: u32, height: u32) -> Result<()> {
        self.fail_if(Failure::Viewport, || Error::CaptureFailure("viewport".into()))?;
        self.launcher.viewports.lock().unwrap().push((width, height));
        Ok(())
    }

    fn capture_png(&mut self, _geometry: &ResolvedGeometry) -> Result<Vec<u8>> {
        self.fail_if(Failure::Capture, || Error::CaptureFailure("screenshot".into()))?;
        Ok(FAKE_PNG.to_vec())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.launcher.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// One request received by the fake S3 endpoint
#[derive(Debug, Clone)]
pub struct RecordedPut {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedPut {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Start a fake S3 endpoint answering every request with `status`.
/// Returns the endpoint URL and the log of received requests.
pub fn start_s3_stub(status: u16) -> (String, Arc<Mutex<Vec<RecordedPut>>>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let endpoint = format!("http://{}", server.server_addr());
    let log = Arc::new(Mutex::new(Vec::new()));
    let seen = log.clone();

    std::thread::spawn(move || {
        for mut request in server.incoming_requests() {
            let mut body = Vec::new();
            let _ = request.as_reader().read_to_end(&mut body);
            seen.lock().unwrap().push(RecordedPut {
                method: request.method().to_string(),
                url: request.url().to_string(),
                headers: request
                    .headers()
                    .iter()
                    .map(|h| (h.field.to_string(), h.value.to_string()))
                    .collect(),
                body,
            });

            let text = if status < 300 { "" } else { "<Error><Code>AccessDenied</Code></Error>" };
            let _ = request.respond(Response::from_string(text).with_status_code(status));
        }
    });

    (endpoint, log)
}
