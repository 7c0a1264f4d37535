//! Managed Chromium install: locate a previous download or fetch a new one.

use crate::types::{GatherError, Result};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use std::path::{Path, PathBuf};
use tracing::info;

/// File names the fetcher (or a system install) uses for the browser binary.
const CHROME_BINARY_NAMES: &[&str] = &[
    "chrome",
    "chromium",
    "Chromium",
    "Google Chrome",
    "chrome.exe",
    "chromium.exe",
];

/// Directory holding the managed install: `~/.scriptgather/chrome/`
pub fn managed_chrome_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| {
        GatherError::ConfigError("Could not determine home directory".to_string())
    })?;
    Ok(home.join(".scriptgather").join("chrome"))
}

/// Path of a previously downloaded Chromium, if any.
pub fn resolve_chrome_executable() -> Option<PathBuf> {
    let chrome_dir = managed_chrome_dir().ok()?;
    find_chrome_in_dir(&chrome_dir)
}

/// Download Chromium into the managed directory and return the executable.
///
/// An existing install is reused unless `force` is set.
pub async fn download_chrome(force: bool) -> Result<PathBuf> {
    let chrome_dir = managed_chrome_dir()?;

    if !force {
        if let Some(exe) = find_chrome_in_dir(&chrome_dir) {
            info!("Chromium already installed at {:?}", exe);
            return Ok(exe);
        }
    } else if chrome_dir.exists() {
        info!("Removing managed Chromium at {:?} before re-download", chrome_dir);
        tokio::fs::remove_dir_all(&chrome_dir).await?;
    }

    tokio::fs::create_dir_all(&chrome_dir).await?;
    info!("Downloading Chromium to {:?}...", chrome_dir);

    let options = BrowserFetcherOptions::builder()
        .with_path(&chrome_dir)
        .build()
        .map_err(|e| GatherError::ConfigError(format!("Failed to configure browser fetcher: {}", e)))?;

    let installation = BrowserFetcher::new(options)
        .fetch()
        .await
        .map_err(|e| GatherError::Browser(format!("Failed to download Chromium: {}", e)))?;

    info!("Chromium ready at {:?}", installation.executable_path);
    Ok(installation.executable_path)
}

/// Depth-first search below `dir` for a browser binary.
///
/// A macOS `Chromium.app` bundle resolves to the binary inside it.
pub fn find_chrome_in_dir(dir: &Path) -> Option<PathBuf> {
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if name == "Chromium.app" {
                let inner = path.join("Contents/MacOS/Chromium");
                if inner.is_file() {
                    return Some(inner);
                }
                continue;
            }

            if path.is_dir() {
                pending.push(path);
            } else if CHROME_BINARY_NAMES.contains(&&*name) {
                return Some(path);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("scriptgather-test-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_managed_chrome_dir() {
        let dir = managed_chrome_dir().unwrap();
        assert!(dir.ends_with("chrome"));
        assert!(dir.to_string_lossy().contains(".scriptgather"));
    }

    #[test]
    fn test_find_chrome_in_nested_dir() {
        let root = scratch_dir("nested");
        let nested = root.join("linux-1234").join("chrome-linux");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("chrome"), b"").unwrap();
        std::fs::write(nested.join("README"), b"").unwrap();

        assert_eq!(find_chrome_in_dir(&root), Some(nested.join("chrome")));
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn test_find_chrome_missing() {
        let root = scratch_dir("missing");
        assert_eq!(find_chrome_in_dir(&root), None);
        assert_eq!(find_chrome_in_dir(&root.join("does-not-exist")), None);
        let _ = std::fs::remove_dir_all(root);
    }
}
