//! Native browser management using `chromiumoxide`.
//!
//! This module is the single place that knows how to:
//! * find a usable browser executable (Brave → Chrome → Chromium, cross-platform),
//! * build a launch config with stealth defaults,
//! * launch one browser and keep its CDP event loop running.
//!
//! Every task attempt gets its own browser process and its own throw-away
//! profile directory from here; nothing is pooled or reused across attempts.

use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Browser;
use futures::StreamExt;
use rand::distr::{Distribution, Uniform};
use std::path::Path;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{info, warn};

// ── Realistic User-Agent pool ────────────────────────────────────────────────

const DESKTOP_USER_AGENTS: &[&str] = &[
    // Chrome 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 132 – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 131 – Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Edge 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36 Edg/132.0.0.0",
];

/// Returns a randomly-chosen realistic desktop User-Agent string.
///
/// Only Chromium-family agents: the engine underneath is always Chromium and
/// a Firefox/Safari UA on it is an easy tell.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    Uniform::new(0, DESKTOP_USER_AGENTS.len())
        .map(|dist| DESKTOP_USER_AGENTS[dist.sample(&mut rng)])
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. explicit override (config file / `CHROME_EXECUTABLE`, already validated)
/// 2. PATH scan – finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable(explicit: Option<&str>) -> Option<String> {
    if let Some(p) = explicit {
        if Path::new(p).exists() {
            return Some(p.to_string());
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "brave-browser",
            "brave",
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/brave-browser",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

// ── Launch config builder ────────────────────────────────────────────────────

/// Fresh, empty profile directory for one browser process. Removed when the
/// returned guard is dropped.
pub fn new_profile_dir() -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix("hotel-sweep-profile-")
        .tempdir()
        .map_err(|e| anyhow!("Failed to create browser profile dir: {}", e))
}

/// Build a `BrowserConfig` with stealth defaults.
///
/// * `profile_dir` becomes `--user-data-dir`; without it every launch would
///   share chromiumoxide's single default profile.
/// * `--no-sandbox` / `--disable-dev-shm-usage` keep 24 parallel instances
///   alive in containers.
/// * `--disable-blink-features=AutomationControlled` hides
///   `navigator.webdriver`; the UA is drawn from `DESKTOP_USER_AGENTS`.
pub fn build_browser_config(
    exe: &str,
    headless: bool,
    width: u32,
    height: u32,
    profile_dir: &Path,
) -> Result<BrowserConfig> {
    let ua = random_user_agent();

    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .user_data_dir(profile_dir)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", ua));

    if !headless {
        builder = builder.with_head();
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

/// A launched browser with its event loop and private profile.
pub struct LaunchedBrowser {
    pub browser: Browser,
    pub handler: JoinHandle<()>,
    /// Keep alive until the browser has exited; dropping it deletes the profile.
    pub profile: TempDir,
}

/// Launch a browser on a fresh profile and spawn its CDP event loop.
///
/// The returned handle must be aborted once the browser is closed.
pub async fn launch_browser(exe: &str, headless: bool) -> Result<LaunchedBrowser> {
    let profile = new_profile_dir()?;
    let config = build_browser_config(exe, headless, 1920, 1080, profile.path())?;

    info!(
        "🚀 Launching browser ({}, headless={}, profile={})",
        exe,
        headless,
        profile.path().display()
    );
    let (browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| anyhow!("Failed to launch browser ({}): {}", exe, e))?;

    let handle = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("CDP handler error: {}", e);
            }
        }
    });

    Ok(LaunchedBrowser {
        browser,
        handler: handle,
        profile,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agents_are_chromium_family() {
        for _ in 0..20 {
            let ua = random_user_agent();
            assert!(ua.contains("Chrome/"), "unexpected UA {ua}");
        }
    }

    #[test]
    fn each_config_gets_its_own_profile_dir() {
        let a = new_profile_dir().unwrap();
        let b = new_profile_dir().unwrap();
        assert_ne!(a.path(), b.path());

        let config_a = build_browser_config("/bin/true", true, 800, 600, a.path()).unwrap();
        let config_b = build_browser_config("/bin/true", true, 800, 600, b.path()).unwrap();
        assert_eq!(config_a.user_data_dir.as_deref(), Some(a.path()));
        assert_eq!(config_b.user_data_dir.as_deref(), Some(b.path()));
        assert_ne!(config_a.user_data_dir, config_b.user_data_dir);
    }

    #[test]
    fn profile_dir_is_removed_on_drop() {
        let dir = new_profile_dir().unwrap();
        let path = dir.path().to_path_buf();
        assert!(path.is_dir());
        drop(dir);
        assert!(!path.exists());
    }

    #[test]
    fn explicit_executable_must_exist() {
        let missing = "/definitely/not/a/browser";
        assert_ne!(
            find_chrome_executable(Some(missing)).as_deref(),
            Some(missing)
        );
    }
}
