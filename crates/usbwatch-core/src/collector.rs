//! One-shot device listing.
//!
//! The collector runs the platform's enumeration command and feeds its
//! stdout to the platform grammar. It is used directly for `list` and by the
//! polling monitor on every cycle.

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::device::DeviceRecord;
use crate::error::{CoreError, CoreResult};
use crate::parse::Parser;
use crate::platform::Platform;

/// Default ceiling on captured command output.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Collector settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Bytes of stdout kept from the enumeration command; the rest is dropped
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self { max_output_bytes: default_max_output_bytes() }
    }
}

fn default_max_output_bytes() -> usize {
    DEFAULT_MAX_OUTPUT_BYTES
}

/// Runs a shell command and captures its stdout.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner: Send + Sync {
    /// Run `command`, returning at most `max_output_bytes` of its stdout.
    ///
    /// # Errors
    /// Returns an error if the process cannot be started or its output
    /// cannot be read. The exit status is not an error.
    fn run(&self, command: &str, max_output_bytes: usize) -> CoreResult<Vec<u8>>;
}

/// Runs commands through the system shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str, max_output_bytes: usize) -> CoreResult<Vec<u8>> {
        let mut child = shell(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| CoreError::CommandSpawn { command: command.to_string(), source })?;

        let mut output = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            let limit = u64::try_from(max_output_bytes).unwrap_or(u64::MAX);
            stdout
                .take(limit)
                .read_to_end(&mut output)
                .map_err(|source| CoreError::CommandIo { command: command.to_string(), source })?;
        }

        if output.len() >= max_output_bytes {
            warn!(command, limit = max_output_bytes, "Enumeration output truncated");
            // The child may still be blocked writing into the closed pipe.
            let _ = child.kill();
        }

        // Partial output from a failing command is still worth parsing.
        let status = child.wait()?;
        debug!(command, %status, bytes = output.len(), "Enumeration command finished");

        Ok(output)
    }
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

/// `cmd.exe` does its own parsing, so the line is passed through unquoted.
#[cfg(windows)]
fn shell(command: &str) -> Command {
    use std::os::windows::process::CommandExt;

    let mut cmd = Command::new("cmd");
    cmd.arg("/C").raw_arg(command);
    cmd
}

/// Anything that can produce the current set of attached devices.
pub trait DeviceSource: Send + Sync {
    /// List the devices attached right now.
    ///
    /// # Errors
    /// Returns an error if the underlying enumeration could not run.
    fn list_devices(&self) -> CoreResult<Vec<DeviceRecord>>;
}

/// Lists devices by running the platform enumeration command.
#[derive(Clone)]
pub struct Collector {
    platform: Platform,
    parser: Parser,
    runner: Arc<dyn CommandRunner>,
    config: CollectorConfig,
}

impl Collector {
    /// Collector for the current platform.
    #[must_use]
    pub fn new(config: CollectorConfig) -> Self {
        Self::for_platform(Platform::detect(), config)
    }

    /// Collector for an explicit platform, running commands through the shell.
    #[must_use]
    pub fn for_platform(platform: Platform, config: CollectorConfig) -> Self {
        Self::with_runner(platform, config, Arc::new(ShellRunner))
    }

    /// Collector with a custom command runner.
    #[must_use]
    pub fn with_runner(
        platform: Platform,
        config: CollectorConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self { platform, parser: Parser::for_platform(platform), runner, config }
    }

    /// Platform this collector enumerates.
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// List the attached USB devices.
    ///
    /// Unsupported platforms yield an empty list.
    ///
    /// # Errors
    /// Returns an error if the enumeration command cannot be run.
    pub fn list_devices(&self) -> CoreResult<Vec<DeviceRecord>> {
        if !self.platform.is_supported() {
            debug!(platform = %self.platform, "USB listing not supported on this platform");
            return Ok(Vec::new());
        }
        let Some(command) = self.platform.enumeration_command() else {
            return Ok(Vec::new());
        };

        let output = self.runner.run(&command, self.config.max_output_bytes)?;
        let text = String::from_utf8_lossy(&output);
        let devices = self.parser.parse(&text);

        debug!(platform = %self.platform, count = devices.len(), "Listed USB devices");
        Ok(devices)
    }
}

impl DeviceSource for Collector {
    fn list_devices(&self) -> CoreResult<Vec<DeviceRecord>> {
        Collector::list_devices(self)
    }
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("platform", &self.platform)
            .field("parser", &self.parser)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
