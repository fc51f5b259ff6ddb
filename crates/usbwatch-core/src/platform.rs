//! Platform detection and enumeration commands.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::parse::Parser;

/// Environment variable holding the Windows installation directory.
const SYSTEM_ROOT_VAR: &str = "SystemRoot";
/// Used when `SystemRoot` is not set.
const DEFAULT_SYSTEM_ROOT: &str = r"C:\Windows";

const LINUX_COMMAND: &str = "lsusb -v";
const MAC_COMMAND: &str = "ioreg -p IOUSB -l -w 0";

/// Operating system family the process runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Linux,
    Mac,
    Unknown,
}

impl Platform {
    /// Detect the platform this binary was built for.
    #[must_use]
    pub fn detect() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(target_os = "macos") {
            Self::Mac
        } else {
            Self::Unknown
        }
    }

    /// Whether USB listing and monitoring are available.
    #[must_use]
    pub fn is_supported(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Shell command whose stdout the platform's grammar understands.
    ///
    /// `None` means the platform has no text enumeration source.
    #[must_use]
    pub fn enumeration_command(self) -> Option<String> {
        match self {
            Self::Linux => Some(LINUX_COMMAND.to_string()),
            Self::Mac => Some(MAC_COMMAND.to_string()),
            Self::Windows => {
                let root = std::env::var(SYSTEM_ROOT_VAR).ok();
                Some(windows_command(root.as_deref()))
            }
            Self::Unknown => None,
        }
    }

    /// The output grammar for this platform.
    #[must_use]
    pub fn parser(self) -> Parser {
        Parser::for_platform(self)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::Mac => "mac",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Build the WMIC invocation rooted at the given Windows directory.
fn windows_command(system_root: Option<&str>) -> String {
    let root = system_root.filter(|root| !root.is_empty()).unwrap_or(DEFAULT_SYSTEM_ROOT);
    format!(
        r#"{root}\System32\wbem\WMIC.exe path Win32_PnPEntity where "PNPDeviceID like 'USB%'" get /format:list"#
    )
}
