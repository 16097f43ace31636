// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Resolve details about the buildpy execution environment.

use {
    anyhow::{anyhow, Result},
    log::info,
    std::{env, fmt},
};

pub const BUILDPY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Python version built when none is requested.
pub const DEFAULT_PYTHON_VERSION: &str = "3.13.11";

/// Latest known patch release of each supported minor version.
pub const DEFAULT_PYTHON_VERSIONS: &[(&str, &str)] = &[
    ("3.14", "3.14.2"),
    ("3.13", "3.13.11"),
    ("3.12", "3.12.12"),
    ("3.11", "3.11.14"),
];

/// Deployment target exported to builds on macOS when none is set.
pub const DEFAULT_MACOSX_DEPLOYMENT_TARGET: &str = "12.6";

/// Expand a bare `X.Y` version to its default patch release.
///
/// Full versions and unknown minors are returned unchanged.
pub fn resolve_python_version(version: &str) -> String {
    DEFAULT_PYTHON_VERSIONS
        .iter()
        .find(|(minor, _)| *minor == version)
        .map(|(_, full)| full.to_string())
        .unwrap_or_else(|| version.to_string())
}

/// Operating systems buildpy distinguishes between.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Platform {
    Darwin,
    Linux,
    Windows,
    Other,
}

impl Platform {
    /// The platform of the running process.
    pub fn current() -> Self {
        match env::consts::OS {
            "macos" => Self::Darwin,
            "linux" => Self::Linux,
            "windows" => Self::Windows,
            _ => Self::Other,
        }
    }

    pub fn is_unix(&self) -> bool {
        matches!(self, Self::Darwin | Self::Linux)
    }

    /// Values accepted by `--type` on this platform.
    pub fn build_types(&self) -> &'static [&'static str] {
        match self {
            Self::Darwin => &[
                "local",
                "shared-ext",
                "static-ext",
                "framework-ext",
                "framework-pkg",
            ],
            Self::Windows => &["local", "windows-pkg"],
            Self::Linux => &["local", "shared-ext", "static-ext"],
            Self::Other => &["local"],
        }
    }

    /// Suffix of executables.
    pub fn exe_suffix(&self) -> &'static str {
        match self {
            Self::Windows => ".exe",
            _ => "",
        }
    }

    /// Suffix of static libraries.
    pub fn staticlib_suffix(&self) -> &'static str {
        match self {
            Self::Windows => ".lib",
            _ => ".a",
        }
    }

    /// Suffix of dynamic libraries.
    pub fn dylib_suffix(&self) -> Result<&'static str> {
        match self {
            Self::Darwin => Ok(".dylib"),
            Self::Linux => Ok(".so"),
            Self::Windows => Ok(".dll"),
            Self::Other => Err(anyhow!("platform not supported: {}", env::consts::OS)),
        }
    }

    /// Prepare process environment variables needed by child builds.
    pub fn setup_environment(&self) {
        if *self == Self::Darwin && env::var_os("MACOSX_DEPLOYMENT_TARGET").is_none() {
            info!(
                "setting MACOSX_DEPLOYMENT_TARGET={}",
                DEFAULT_MACOSX_DEPLOYMENT_TARGET
            );
            env::set_var("MACOSX_DEPLOYMENT_TARGET", DEFAULT_MACOSX_DEPLOYMENT_TARGET);
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Darwin => "Darwin",
            Self::Linux => "Linux",
            Self::Windows => "Windows",
            Self::Other => env::consts::OS,
        })
    }
}

/// Machine architecture of the running process, as `uname -m` spells it.
pub fn machine_arch() -> &'static str {
    match env::consts::ARCH {
        "aarch64" if cfg!(target_os = "macos") => "arm64",
        "x86_64" if cfg!(target_os = "windows") => "AMD64",
        arch => arch,
    }
}
