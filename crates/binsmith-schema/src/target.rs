//! Operating-system build targets.
//!
//! A [`BuildTarget`] selects the toolchain flavour (the platform token handed
//! to the ahead-of-time compiler) and the output naming (the executable
//! extension). Both are table-driven so adding a target is a one-line change
//! per table.
//!
//! # Example
//!
//! ```
//! use binsmith_schema::BuildTarget;
//!
//! assert_eq!(BuildTarget::Windows.exe_suffix(), ".exe");
//! assert_eq!(BuildTarget::Linux.exe_suffix(), "");
//! ```

use serde::{Deserialize, Serialize};

use crate::types::SpecError;

/// Operating system an artifact is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildTarget {
    /// Microsoft Windows (PE executables, `.exe`).
    Windows,
    /// Apple macOS (Mach-O executables).
    Macos,
    /// Linux (ELF executables).
    Linux,
}

impl BuildTarget {
    /// Every supported target, in display order.
    pub const ALL: [Self; 3] = [Self::Windows, Self::Macos, Self::Linux];

    /// Target matching the host operating system.
    pub fn current() -> Self {
        #[cfg(target_os = "windows")]
        {
            Self::Windows
        }
        #[cfg(target_os = "macos")]
        {
            Self::Macos
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            Self::Linux
        }
    }

    /// Lowercase tag used in file names, storage and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Macos => "macos",
            Self::Linux => "linux",
        }
    }

    /// Executable file extension, including the dot.
    pub fn exe_suffix(&self) -> &'static str {
        match self {
            Self::Windows => ".exe",
            Self::Macos | Self::Linux => "",
        }
    }

    /// Whether produced binaries need the executable permission bit.
    pub fn is_unix_like(&self) -> bool {
        matches!(self, Self::Macos | Self::Linux)
    }

    /// Platform token understood by the `pkg` Node.js packager.
    pub fn pkg_platform(&self) -> &'static str {
        match self {
            Self::Windows => "win",
            Self::Macos => "macos",
            Self::Linux => "linux",
        }
    }
}

impl Default for BuildTarget {
    fn default() -> Self {
        Self::current()
    }
}

impl std::fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BuildTarget {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "windows" | "win" | "win32" => Ok(Self::Windows),
            "macos" | "darwin" | "mac" | "osx" => Ok(Self::Macos),
            "linux" => Ok(Self::Linux),
            other => Err(SpecError::UnknownTarget(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_aliases() {
        assert_eq!("win".parse::<BuildTarget>().unwrap(), BuildTarget::Windows);
        assert_eq!("Darwin".parse::<BuildTarget>().unwrap(), BuildTarget::Macos);
        assert_eq!("linux".parse::<BuildTarget>().unwrap(), BuildTarget::Linux);
        assert!("freebsd".parse::<BuildTarget>().is_err());
    }

    #[test]
    fn test_display_round_trips_through_from_str() {
        for target in BuildTarget::ALL {
            assert_eq!(target.to_string().parse::<BuildTarget>().unwrap(), target);
        }
    }

    #[test]
    fn test_unix_like() {
        assert!(!BuildTarget::Windows.is_unix_like());
        assert!(BuildTarget::Macos.is_unix_like());
        assert!(BuildTarget::Linux.is_unix_like());
    }
}
