//! Stand-in `chrome` and `lighthouse` executables for exercising the real
//! process adapter without a browser installed.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lighthouse_worker::services::audit::AuditorOptions;
use lighthouse_worker::services::browser::BrowserOptions;

pub const FAKE_DEVTOOLS_PORT: u16 = 9555;

pub const FAKE_REPORT: &str =
    r#"{"lighthouseVersion":"12.0.0","categories":{"performance":{"score":0.91}}}"#;

/// Scratch directory holding the fake executables and their side files.
pub struct Sandbox {
    pub dir: tempfile::TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("failed to create sandbox"),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Directory the adapter writes report artifacts and profiles into.
    pub fn work_dir(&self) -> PathBuf {
        let dir = self.path("work");
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub fn write_script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Chrome that records its pid, announces DevTools and then idles.
    pub fn healthy_chrome(&self) -> PathBuf {
        let pid_file = self.path("chrome.pid");
        self.write_script(
            "chrome",
            &format!(
                "echo $$ > '{}'\n\
                 echo 'DevTools listening on ws://127.0.0.1:{}/devtools/browser/fake' >&2\n\
                 exec sleep 30",
                pid_file.display(),
                FAKE_DEVTOOLS_PORT
            ),
        )
    }

    /// Chrome that dies during startup.
    pub fn crashing_chrome(&self) -> PathBuf {
        self.write_script(
            "chrome",
            "echo 'Missing X server or $DISPLAY' >&2\nexit 1",
        )
    }

    /// Lighthouse that records its arguments, writes `report` to the
    /// output path, then exits with `exit_code` after printing `stderr`.
    pub fn lighthouse(&self, report: &str, stderr: &str, exit_code: i32) -> PathBuf {
        let args_file = self.path("lighthouse.args");
        self.write_script(
            "lighthouse",
            &format!(
                "printf '%s\\n' \"$@\" > '{args}'\n\
                 for arg in \"$@\"; do\n\
                   case \"$arg\" in\n\
                     --output-path=*) out=\"${{arg#--output-path=}}\" ;;\n\
                   esac\n\
                 done\n\
                 printf '%s' '{report}' > \"$out\"\n\
                 if [ -n '{stderr}' ]; then echo '{stderr}' >&2; fi\n\
                 exit {exit_code}",
                args = args_file.display(),
            ),
        )
    }

    /// Lighthouse that writes `report` to the output path and then never exits.
    pub fn hanging_lighthouse(&self, report: &str) -> PathBuf {
        let args_file = self.path("lighthouse.args");
        self.write_script(
            "lighthouse",
            &format!(
                "printf '%s\\n' \"$@\" > '{args}'\n\
                 for arg in \"$@\"; do\n\
                   case \"$arg\" in\n\
                     --output-path=*) out=\"${{arg#--output-path=}}\" ;;\n\
                   esac\n\
                 done\n\
                 printf '%s' '{report}' > \"$out\"\n\
                 exec sleep 30",
                args = args_file.display(),
            ),
        )
    }

    /// Arguments the fake lighthouse was last invoked with.
    pub fn lighthouse_args(&self) -> Vec<String> {
        std::fs::read_to_string(self.path("lighthouse.args"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Report artifact path the adapter handed to lighthouse.
    pub fn artifact_path(&self) -> Option<PathBuf> {
        self.lighthouse_args()
            .iter()
            .find_map(|a| a.strip_prefix("--output-path=").map(PathBuf::from))
    }

    pub fn chrome_pid(&self) -> Option<u32> {
        std::fs::read_to_string(self.path("chrome.pid"))
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    pub fn options(&self, chrome: &Path, lighthouse: &Path) -> AuditorOptions {
        let work = self.work_dir();
        AuditorOptions {
            lighthouse_path: lighthouse.display().to_string(),
            temp_dir: work.clone(),
            browser: BrowserOptions {
                chrome_path: chrome.display().to_string(),
                temp_dir: work,
                optimized: true,
                startup_timeout: Duration::from_secs(10),
            },
        }
    }
}

/// Wait up to five seconds for `pid` to go away; killed children are
/// reaped in the background.
pub async fn wait_for_exit(pid: u32) -> bool {
    for _ in 0..100 {
        if !process_alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Whether a process with this pid is still alive.
pub fn process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
