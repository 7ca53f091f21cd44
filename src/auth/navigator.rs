//! Browser navigation abstraction
//!
//! The flow controller needs three things from its host: the current URL
//! (to detect a callback), a full-page redirect, and a history replace that
//! rewrites the visible URL without reloading.

use std::sync::RwLock;

use url::Url;

use crate::error::{Result, TokenProbeError};

/// Host navigation primitives.
pub trait Navigator: Send + Sync {
    /// URL the application is currently showing.
    fn current_url(&self) -> Url;

    /// Full-page navigation to `url`.
    fn redirect(&self, url: &Url) -> Result<()>;

    /// Replaces the visible URL without a reload or new history entry.
    fn replace_url(&self, url: &Url) -> Result<()>;
}

// ---------------------------------------------------------------------------
// MemoryNavigator
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct NavigatorState {
    current: Url,
    redirects: Vec<Url>,
    replacements: Vec<Url>,
}

/// Records navigation instead of performing it.
///
/// `redirect` does not change the current URL, mirroring a page that is
/// about to unload; use [`MemoryNavigator::navigate_to`] to simulate the
/// browser coming back.
#[derive(Debug)]
pub struct MemoryNavigator {
    state: RwLock<NavigatorState>,
}

impl MemoryNavigator {
    pub fn new(current: Url) -> Self {
        Self {
            state: RwLock::new(NavigatorState {
                current,
                redirects: Vec::new(),
                replacements: Vec::new(),
            }),
        }
    }

    /// Simulates a page load at `url`.
    pub fn navigate_to(&self, url: Url) {
        if let Ok(mut state) = self.state.write() {
            state.current = url;
        }
    }

    /// Every URL passed to `redirect`, in order.
    pub fn redirects(&self) -> Vec<Url> {
        self.state
            .read()
            .map(|s| s.redirects.clone())
            .unwrap_or_default()
    }

    /// Every URL passed to `replace_url`, in order.
    pub fn replacements(&self) -> Vec<Url> {
        self.state
            .read()
            .map(|s| s.replacements.clone())
            .unwrap_or_default()
    }
}

fn poisoned() -> TokenProbeError {
    TokenProbeError::Callback("navigator state lock poisoned".to_string())
}

impl Navigator for MemoryNavigator {
    fn current_url(&self) -> Url {
        match self.state.read() {
            Ok(state) => state.current.clone(),
            Err(poison) => poison.into_inner().current.clone(),
        }
    }

    fn redirect(&self, url: &Url) -> Result<()> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        state.redirects.push(url.clone());
        Ok(())
    }

    fn replace_url(&self, url: &Url) -> Result<()> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        state.current = url.clone();
        state.replacements.push(url.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SystemBrowser
// ---------------------------------------------------------------------------

/// Opens redirects in the platform browser and tracks the "visible" URL in
/// memory. Used by the CLI.
pub struct SystemBrowser {
    inner: MemoryNavigator,
    open_browser: bool,
}

impl SystemBrowser {
    /// `open_browser = false` only prints the URL.
    pub fn new(current: Url, open_browser: bool) -> Self {
        Self {
            inner: MemoryNavigator::new(current),
            open_browser,
        }
    }

    /// Simulates a page load at `url`.
    pub fn navigate_to(&self, url: Url) {
        self.inner.navigate_to(url);
    }

    fn try_open(&self, url: &str) {
        #[cfg(target_os = "macos")]
        {
            let _ = std::process::Command::new("open").arg(url).spawn();
        }
        #[cfg(target_os = "linux")]
        {
            let _ = std::process::Command::new("xdg-open").arg(url).spawn();
        }
        #[cfg(target_os = "windows")]
        {
            let _ = std::process::Command::new("cmd")
                .args(["/C", "start", "", url])
                .spawn();
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            let _ = url;
        }
    }
}

impl Navigator for SystemBrowser {
    fn current_url(&self) -> Url {
        self.inner.current_url()
    }

    fn redirect(&self, url: &Url) -> Result<()> {
        eprintln!("Open the following URL in your browser to sign in:\n{}", url);
        if self.open_browser {
            self.try_open(url.as_str());
        }
        self.inner.redirect(url)
    }

    fn replace_url(&self, url: &Url) -> Result<()> {
        tracing::debug!(url = %url, "Replacing visible URL");
        self.inner.replace_url(url)
    }
}
