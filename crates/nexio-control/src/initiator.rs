//! Remote NVMe-oF initiator session
//!
//! Wraps the external `nvme` tool for the attach/detach lifecycle
//! against one published target. The session holds no cluster-side
//! state; its lifetime nests inside the target's published window.

use crate::error::{Error, Result};
use crate::uri::TargetUri;
use std::process::Command;
use tracing::{debug, warn};

/// Attach/detach session against one published NVMe-oF target
pub struct NvmeSession {
    target: TargetUri,
}

impl NvmeSession {
    /// Create a session for a published device URI
    #[must_use]
    pub const fn new(target: TargetUri) -> Self {
        Self { target }
    }

    /// Target this session operates against
    #[must_use]
    pub const fn target(&self) -> &TargetUri {
        &self.target
    }

    /// Check whether the `nvme` tool is installed
    #[must_use]
    pub fn is_available() -> bool {
        Command::new("nvme")
            .arg("version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Run discovery against the target's host and port.
    ///
    /// The target counts as discovered when its subsystem NQN appears in
    /// the listing. This is a string-containment check, not a structured
    /// parse of the discovery log page.
    pub fn discover(&self) -> Result<()> {
        let output = Command::new("nvme").args(discover_args(&self.target)).output()?;
        if !output.status.success() {
            return Err(Error::NotDiscovered(format!(
                "discovery against {} failed: {}",
                self.target,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let listing = String::from_utf8_lossy(&output.stdout);
        if !listing.contains(self.target.nqn()) {
            return Err(Error::NotDiscovered(self.target.nqn().to_string()));
        }
        debug!(target = %self.target, "target discovered");
        Ok(())
    }

    /// Connect the local initiator to the target.
    ///
    /// Success is the tool's exit status, nothing more; whether the
    /// attached device is visible is the caller's check.
    pub fn connect(&self) -> Result<()> {
        let output = Command::new("nvme").args(connect_args(&self.target)).output()?;
        if !output.status.success() {
            return Err(Error::ConnectFailed(format!(
                "{}: {}",
                self.target,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        debug!(target = %self.target, "initiator connected");
        Ok(())
    }

    /// Disconnect from the target by NQN, best-effort.
    ///
    /// Safe to call with no session attached; failures are logged and
    /// swallowed.
    pub fn disconnect(&self) {
        match Command::new("nvme").args(disconnect_args(&self.target)).output() {
            Ok(output) if output.status.success() => {
                debug!(target = %self.target, "initiator disconnected");
            }
            Ok(output) => {
                warn!(
                    target = %self.target,
                    "disconnect failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Err(e) => warn!(target = %self.target, "disconnect failed: {e}"),
        }
    }
}

fn discover_args(target: &TargetUri) -> Vec<String> {
    vec![
        "discover".to_string(),
        "-t".to_string(),
        "tcp".to_string(),
        "-s".to_string(),
        target.port().to_string(),
        "-a".to_string(),
        target.host().to_string(),
    ]
}

fn connect_args(target: &TargetUri) -> Vec<String> {
    vec![
        "connect".to_string(),
        "-t".to_string(),
        "tcp".to_string(),
        "-s".to_string(),
        target.port().to_string(),
        "-a".to_string(),
        target.host().to_string(),
        "-n".to_string(),
        target.nqn().to_string(),
    ]
}

fn disconnect_args(target: &TargetUri) -> Vec<String> {
    vec![
        "disconnect".to_string(),
        "-n".to_string(),
        target.nqn().to_string(),
    ]
}
