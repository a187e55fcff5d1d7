// Opens the recordings folder in the desktop file manager.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

/// Desktop integration seam for "show me my recordings".
pub trait FolderOpener: Send + Sync {
    /// Open `dir` in the file manager.
    fn open_folder(&self, dir: &Path) -> Result<()>;

    /// Reveal `file` in its containing folder, selected where supported.
    fn reveal(&self, file: &Path) -> Result<()>;
}

/// Shells out to the platform file manager.
pub struct SystemOpener;

impl FolderOpener for SystemOpener {
    #[cfg(target_os = "macos")]
    fn open_folder(&self, dir: &Path) -> Result<()> {
        Command::new("open")
            .arg(dir)
            .spawn()
            .with_context(|| format!("failed to open {}", dir.display()))?;
        Ok(())
    }

    #[cfg(target_os = "macos")]
    fn reveal(&self, file: &Path) -> Result<()> {
        Command::new("open")
            .arg("-R")
            .arg(file)
            .spawn()
            .with_context(|| format!("failed to reveal {}", file.display()))?;
        Ok(())
    }

    #[cfg(target_os = "windows")]
    fn open_folder(&self, dir: &Path) -> Result<()> {
        Command::new("explorer")
            .arg(dir)
            .spawn()
            .with_context(|| format!("failed to open {}", dir.display()))?;
        Ok(())
    }

    #[cfg(target_os = "windows")]
    fn reveal(&self, file: &Path) -> Result<()> {
        Command::new("explorer")
            .arg(format!("/select,{}", file.display()))
            .spawn()
            .with_context(|| format!("failed to reveal {}", file.display()))?;
        Ok(())
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    fn open_folder(&self, dir: &Path) -> Result<()> {
        Command::new("xdg-open")
            .arg(dir)
            .spawn()
            .with_context(|| format!("failed to open {}", dir.display()))?;
        Ok(())
    }

    /// File managers reached through xdg-open cannot select a file, so the
    /// containing directory is opened instead.
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    fn reveal(&self, file: &Path) -> Result<()> {
        let dir = file.parent().unwrap_or(file);
        self.open_folder(dir)
    }
}

/// Used where no desktop session is available; logs instead of opening.
pub struct NoopOpener;

impl FolderOpener for NoopOpener {
    fn open_folder(&self, dir: &Path) -> Result<()> {
        warn!("no desktop integration; recordings are in {}", dir.display());
        Ok(())
    }

    fn reveal(&self, file: &Path) -> Result<()> {
        info!("no desktop integration; recording is at {}", file.display());
        Ok(())
    }
}

/// Picks the opener for this machine. Headless Linux sessions get the
/// logging stand-in; everything else shells out to the file manager.
pub fn detect_opener() -> Arc<dyn FolderOpener> {
    if cfg!(target_os = "linux") && !has_display_session() {
        info!("no display session detected, folder open requests will be logged");
        Arc::new(NoopOpener)
    } else {
        Arc::new(SystemOpener)
    }
}

fn has_display_session() -> bool {
    std::env::var("DISPLAY").is_ok() || std::env::var("WAYLAND_DISPLAY").is_ok()
}
