//! Browser executable discovery.
//!
//! The search is explicit and bounded: a configured path, the
//! `PUPPETEER_EXECUTABLE_PATH` variable, a fixed list of install locations,
//! then a handful of names on `PATH`. There is no recursive filesystem scan.

use crate::{Error, Result};
use log::{info, warn};
use std::ffi::OsString;
use std::path::PathBuf;

/// Environment variable honoured for compatibility with Puppeteer setups.
pub const PUPPETEER_ENV: &str = "PUPPETEER_EXECUTABLE_PATH";

const INSTALL_PATHS: [&str; 5] = [
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/usr/lib/chromium/chromium",
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
];

const PATH_NAMES: [&str; 3] = ["chromium", "chromium-browser", "google-chrome"];

/// Resolves the browser binary handed to the render driver.
#[derive(Debug, Clone)]
pub struct BrowserLocator {
    preferred: Vec<PathBuf>,
    install_paths: Vec<PathBuf>,
    search_path: Option<OsString>,
}

impl Default for BrowserLocator {
    fn default() -> Self {
        Self::from_env(None)
    }
}

impl BrowserLocator {
    /// Locator using `configured` first, then the process environment.
    pub fn from_env(configured: Option<PathBuf>) -> Self {
        let mut preferred: Vec<PathBuf> = configured.into_iter().collect();
        if let Some(p) = std::env::var_os(PUPPETEER_ENV).filter(|p| !p.is_empty()) {
            preferred.push(PathBuf::from(p));
        }

        Self {
            preferred,
            install_paths: INSTALL_PATHS.iter().map(PathBuf::from).collect(),
            search_path: std::env::var_os("PATH"),
        }
    }

    /// Locator that only ever considers `path`.
    pub fn fixed(path: impl Into<PathBuf>) -> Self {
        Self {
            preferred: vec![path.into()],
            install_paths: Vec::new(),
            search_path: None,
        }
    }

    /// Every location considered, in priority order.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut out = self.preferred.clone();
        out.extend(self.install_paths.iter().cloned());
        if let Some(search_path) = &self.search_path {
            for dir in std::env::split_paths(search_path) {
                out.extend(PATH_NAMES.iter().map(|name| dir.join(name)));
            }
        }
        out
    }

    /// First candidate that exists as a file.
    pub fn locate(&self) -> Result<PathBuf> {
        let candidates = self.candidates();
        match candidates.iter().find(|p| p.is_file()) {
            Some(found) => {
                info!("Using browser executable {}", found.display());
                Ok(found.clone())
            }
            None => {
                warn!("No browser executable found in {} locations", candidates.len());
                Err(Error::BrowserUnavailable(format!(
                    "No Chromium executable found (checked {} locations)",
                    candidates.len()
                )))
            }
        }
    }
}
