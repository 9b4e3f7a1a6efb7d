//! Headless Chrome lifecycle for a single audit.
//!
//! [`BrowserProcess`] owns the launched Chrome for as long as it lives.
//! The child is spawned with `kill_on_drop(true)`, so a dropped handle
//! (watchdog timeout, shutdown) still takes the browser down with it.
//! [`BrowserProcess::terminate`] is the explicit, awaited teardown and may
//! be called any number of times.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};

/// Line Chrome prints on stderr once the DevTools endpoint accepts connections.
const DEVTOOLS_BANNER: &str = "DevTools listening on ";

/// Flags applied to every launch. They cut resource use in containers.
const BASE_FLAGS: &[&str] = &[
    "--headless=new",
    "--no-sandbox",
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--disable-software-rasterizer",
    "--no-first-run",
    "--no-default-browser-check",
];

/// Extra flags for the optimized profile: no image decoding or rendering.
const OPTIMIZED_FLAGS: &[&str] = &["--blink-settings=imagesEnabled=false"];

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Chrome executable (absolute path or name on `PATH`)
    pub chrome_path: String,
    /// Parent directory for the throwaway profile
    pub temp_dir: PathBuf,
    pub optimized: bool,
    /// Bound on how long Chrome may take to open its DevTools endpoint
    pub startup_timeout: Duration,
}

/// Command-line flags for a launch, excluding port and profile directory.
pub fn chrome_flags(optimized: bool) -> Vec<&'static str> {
    let mut flags = BASE_FLAGS.to_vec();
    if optimized {
        flags.extend_from_slice(OPTIMIZED_FLAGS);
    }
    flags
}

/// A launched Chrome instance exclusively owned by one audit.
pub struct BrowserProcess {
    child: Option<Child>,
    pid: Option<u32>,
    port: u16,
    // Removed when the handle drops, after the child is gone.
    _profile: TempDir,
}

impl BrowserProcess {
    /// Launch Chrome and wait until its DevTools endpoint is listening.
    pub async fn launch(options: &BrowserOptions) -> Result<Self, BrowserError> {
        let profile = tempfile::Builder::new()
            .prefix("lighthouse-chrome-")
            .tempdir_in(&options.temp_dir)
            .map_err(BrowserError::Profile)?;

        let mut cmd = Command::new(&options.chrome_path);
        cmd.args(chrome_flags(options.optimized))
            .arg("--remote-debugging-port=0")
            .arg(format!("--user-data-dir={}", profile.path().display()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| BrowserError::Spawn {
            path: options.chrome_path.clone(),
            source,
        })?;
        let pid = child.id();
        let stderr = child.stderr.take();

        let mut browser = Self {
            child: Some(child),
            pid,
            port: 0,
            _profile: profile,
        };

        let Some(stderr) = stderr else {
            browser.terminate().await.ok();
            return Err(BrowserError::Startup("stderr not captured".to_string()));
        };

        match tokio::time::timeout(options.startup_timeout, wait_for_devtools(stderr)).await {
            Ok(Ok(port)) => {
                browser.port = port;
                tracing::debug!(pid = ?pid, port, "Chrome DevTools endpoint ready");
                Ok(browser)
            }
            Ok(Err(e)) => {
                browser.terminate().await.ok();
                Err(e)
            }
            Err(_) => {
                browser.terminate().await.ok();
                Err(BrowserError::Startup(format!(
                    "DevTools endpoint not ready after {} seconds",
                    options.startup_timeout.as_secs()
                )))
            }
        }
    }

    /// DevTools remote debugging port.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether this handle still owns a live process.
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Kill the browser and reap it. Calling this again is a no-op.
    pub async fn terminate(&mut self) -> std::io::Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        match child.kill().await {
            Ok(()) => Ok(()),
            // Already exited and reaped.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for BrowserProcess {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}

/// Read Chrome's stderr until the DevTools banner appears and return its port.
///
/// Once the banner is found the rest of stderr is drained in the background
/// so a chatty browser never blocks on a full pipe.
async fn wait_for_devtools(stderr: ChildStderr) -> Result<u16, BrowserError> {
    let mut lines = BufReader::new(stderr).lines();
    let mut last_line = String::new();

    while let Some(line) = lines.next_line().await.map_err(BrowserError::Io)? {
        if let Some(endpoint) = line.split(DEVTOOLS_BANNER).nth(1) {
            let port = parse_devtools_port(endpoint.trim())?;
            tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::trace!(target: "chrome", "{}", line);
                }
            });
            return Ok(port);
        }
        if !line.trim().is_empty() {
            last_line = line;
        }
    }

    Err(BrowserError::Startup(if last_line.is_empty() {
        "Chrome exited before opening its DevTools endpoint".to_string()
    } else {
        format!("Chrome exited during startup: {}", last_line.trim())
    }))
}

/// Extract the port from a `ws://host:port/devtools/browser/<id>` URL.
pub fn parse_devtools_port(endpoint: &str) -> Result<u16, BrowserError> {
    endpoint
        .strip_prefix("ws://")
        .and_then(|rest| rest.split('/').next())
        .and_then(|authority| authority.rsplit(':').next())
        .and_then(|port| port.parse().ok())
        .ok_or_else(|| BrowserError::Startup(format!("unrecognized DevTools endpoint: {endpoint}")))
}

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("failed to create Chrome profile directory: {0}")]
    Profile(#[source] std::io::Error),

    #[error("failed to launch Chrome at '{path}': {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Chrome failed to start: {0}")]
    Startup(String),

    #[error("failed to read Chrome output: {0}")]
    Io(#[source] std::io::Error),
}
