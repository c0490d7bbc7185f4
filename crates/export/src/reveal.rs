//! Showing the output directory to the user once something was exported.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Notified with the output directory after a run that exported at least one
/// file. Failures are the implementation's to log; they never fail a run.
pub trait Reveal: Send + Sync {
    fn reveal(&self, directory: &Path);
}

/// Does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReveal;
impl Reveal for NoReveal {
    fn reveal(&self, _directory: &Path) {}
}

#[cfg(target_os = "macos")]
const OPENERS: &[&str] = &["open"];
#[cfg(target_os = "windows")]
const OPENERS: &[&str] = &["explorer"];
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const OPENERS: &[&str] = &["xdg-open", "gio"];

/// Opens the directory with the platform's file manager.
#[derive(Debug, Clone)]
pub struct SystemOpener {
    program: PathBuf,
}
impl SystemOpener {
    /// Look for the platform's opener on `PATH`.
    pub fn discover() -> Option<Self> {
        let program = OPENERS.iter().find_map(|name| which::which(name).ok());
        match program {
            Some(program) => {
                tracing::debug!(program = %program.display(), "Discovered directory opener");
                Some(Self { program })
            },
            None => {
                tracing::info!(candidates = ?OPENERS, "No directory opener found");
                None
            },
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, directory: &Path) -> Command {
        let mut command = Command::new(&self.program);
        // `gio` needs a subcommand, the others take the path directly.
        if self.program.file_stem().is_some_and(|stem| stem == "gio") {
            command.arg("open");
        }
        command.arg(directory).stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
        command
    }
}
impl Reveal for SystemOpener {
    fn reveal(&self, directory: &Path) {
        match self.command(directory).spawn() {
            // Reap in the background; the file manager may outlive us.
            Ok(mut child) => {
                std::thread::spawn(move || child.wait());
            },
            Err(err) => {
                tracing::warn!(program = %self.program.display(), error = %err, "Could not open output directory");
            },
        }
    }
}
