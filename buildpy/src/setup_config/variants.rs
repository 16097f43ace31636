// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Build variants layered on top of a versioned configuration.

use super::{Bucket, BuildType, BuildVariant, ConfigError, Platform, SetupConfig, SizeType};

/// Modules that reference interpreter internals and cannot be shared.
const MUST_STAY_STATIC: &[&str] = &[
    "_functools",
    "_locale",
    "_signal",
    "_sre",
    "_thread",
    "posix",
    "time",
    "_typing",
];

impl SetupConfig {
    /// Apply a build variant.
    pub fn apply_variant(&mut self, variant: BuildVariant) -> Result<(), ConfigError> {
        match (variant.build_type, variant.size_type) {
            (BuildType::Static, SizeType::Max) => Ok(()),
            (BuildType::Static, SizeType::Mid) => self.static_mid(),
            (BuildType::Static, SizeType::Tiny) => self.static_tiny(),
            (BuildType::Static, SizeType::Bootstrap) => {
                self.static_bootstrap();
                Ok(())
            }
            (BuildType::Shared, SizeType::Max) => self.shared_max(),
            (BuildType::Shared, SizeType::Mid) => self.shared_mid(),
            (BuildType::Shared, SizeType::Vanilla) => self.shared_vanilla(),
            (BuildType::Framework, SizeType::Max) => self.framework_max(),
            (BuildType::Framework, SizeType::Mid) => self.framework_mid(),
            _ => Err(ConfigError::InvalidVariant(variant.to_string())),
        }
    }

    fn static_mid(&mut self) -> Result<(), ConfigError> {
        self.disable_static(&["_decimal"])?;

        if self.platform == Platform::Linux {
            // Keep OpenSSL symbols out of the exported symbol table.
            self.set_rule(
                "_ssl",
                &[
                    "_ssl.c",
                    "-I$(OPENSSL)/include",
                    "-L$(OPENSSL)/lib",
                    "-l:libssl.a -Wl,--exclude-libs,libssl.a",
                    "-l:libcrypto.a -Wl,--exclude-libs,libcrypto.a",
                ],
            );
            self.set_rule(
                "_hashlib",
                &[
                    "_hashopenssl.c",
                    "-I$(OPENSSL)/include",
                    "-L$(OPENSSL)/lib",
                    "-l:libcrypto.a -Wl,--exclude-libs,libcrypto.a",
                ],
            );
        }

        Ok(())
    }

    fn static_tiny(&mut self) -> Result<(), ConfigError> {
        self.disable_static(&[
            "_bz2", "_decimal", "_csv", "_json", "_lzma", "_sqlite3", "_ssl", "pyexpat",
        ])?;

        if self.contains(Bucket::Static, "_scproxy") {
            self.disable_static(&["_scproxy"])?;
        }

        Ok(())
    }

    fn static_bootstrap(&mut self) {
        let previous_static = std::mem::take(&mut self.static_);
        self.disabled.extend(previous_static);
        self.static_ = std::mem::take(&mut self.core);
    }

    fn shared_max(&mut self) -> Result<(), ConfigError> {
        self.remove_entry(Bucket::Disabled, "_ctypes")?;
        self.move_static_to_shared(&["_decimal", "_ssl", "_hashlib"])
    }

    fn shared_mid(&mut self) -> Result<(), ConfigError> {
        self.disable_static(&["_decimal", "_ssl", "_hashlib"])
    }

    /// Build nearly everything as a shared extension so unused ones can be
    /// deleted after the build.
    fn shared_vanilla(&mut self) -> Result<(), ConfigError> {
        for name in [
            "_ctypes",
            "_curses",
            "_curses_panel",
            "_dbm",
            "_scproxy",
            "_tkinter",
            "resource",
            "syslog",
            "termios",
        ] {
            self.discard_entry(Bucket::Disabled, name);
        }

        let movable = self
            .static_
            .iter()
            .filter(|name| !MUST_STAY_STATIC.contains(&name.as_str()))
            .cloned()
            .collect::<Vec<_>>();

        for name in movable {
            self.move_static_to_shared(&[name.as_str()])?;
        }

        Ok(())
    }

    fn framework_max(&mut self) -> Result<(), ConfigError> {
        self.shared_max()?;
        self.move_static_to_shared(&["_bz2", "_lzma", "_sqlite3"])?;

        if self.contains(Bucket::Static, "_scproxy") {
            self.move_static_to_shared(&["_scproxy"])?;
        }

        self.move_static_to_shared(&["zlib", "binascii"])
    }

    fn framework_mid(&mut self) -> Result<(), ConfigError> {
        self.framework_max()?;
        self.disable_shared(&["_decimal", "_ssl", "_hashlib"])
    }
}

#[cfg(test)]
mod tests {
    use {super::*, anyhow::Result, std::str::FromStr};

    fn build(version: &str, platform: Platform, variant: &str) -> Result<SetupConfig> {
        let variant = BuildVariant::from_str(variant)?;
        let mut config = SetupConfig::for_version(version, platform, variant.build_type)?;
        config.apply_variant(variant)?;

        Ok(config)
    }

    #[test]
    fn test_every_variant_renders() -> Result<()> {
        for version in ["3.11", "3.12", "3.13", "3.14"] {
            for platform in [Platform::Darwin, Platform::Linux] {
                for variant in BuildVariant::names() {
                    let config = build(version, platform, &variant)?;
                    config.render_setup_local()?;
                }
            }
        }

        Ok(())
    }

    #[test]
    fn test_static_mid_linux_openssl() -> Result<()> {
        let linux = build("3.13", Platform::Linux, "static_mid")?;
        assert!(linux.contains(Bucket::Disabled, "_decimal"));
        assert!(linux.extensions["_ssl"]
            .iter()
            .any(|a| a == "-l:libssl.a -Wl,--exclude-libs,libssl.a"));

        let darwin = build("3.13", Platform::Darwin, "static_mid")?;
        assert!(darwin.extensions["_ssl"]
            .iter()
            .any(|a| a == "$(OPENSSL)/lib/libssl.a"));

        Ok(())
    }

    #[test]
    fn test_static_tiny() -> Result<()> {
        let darwin = build("3.12", Platform::Darwin, "static_tiny")?;
        for name in ["_bz2", "_ssl", "pyexpat", "_scproxy"] {
            assert!(darwin.contains(Bucket::Disabled, name));
        }

        let linux = build("3.12", Platform::Linux, "static_tiny")?;
        assert!(linux.contains(Bucket::Disabled, "_scproxy"));
        assert!(!linux.contains(Bucket::Static, "_sqlite3"));

        Ok(())
    }

    #[test]
    fn test_static_bootstrap() -> Result<()> {
        let base = SetupConfig::for_version("3.13", Platform::Darwin, BuildType::Static)?;
        let c = build("3.13", Platform::Darwin, "static_bootstrap")?;

        assert!(c.core.is_empty());
        assert_eq!(c.static_, base.core);
        for name in &base.static_ {
            assert!(c.contains(Bucket::Disabled, name));
        }

        Ok(())
    }

    #[test]
    fn test_shared_variants() -> Result<()> {
        let max = build("3.13", Platform::Darwin, "shared_max")?;
        assert!(!max.contains(Bucket::Disabled, "_ctypes"));
        for name in ["_decimal", "_ssl", "_hashlib"] {
            assert!(max.contains(Bucket::Shared, name));
        }

        let mid = build("3.13", Platform::Darwin, "shared_mid")?;
        assert!(mid.shared.is_empty());
        assert!(mid.contains(Bucket::Disabled, "_ssl"));

        Ok(())
    }

    #[test]
    fn test_shared_vanilla() -> Result<()> {
        let c = build("3.13", Platform::Linux, "shared_vanilla")?;

        assert!(!c.contains(Bucket::Disabled, "_ctypes"));
        assert!(!c.contains(Bucket::Disabled, "termios"));
        for name in &c.static_ {
            assert!(MUST_STAY_STATIC.contains(&name.as_str()));
        }
        assert!(c.contains(Bucket::Shared, "_json"));
        assert!(c.contains(Bucket::Static, "_typing"));

        Ok(())
    }

    #[test]
    fn test_framework_variants() -> Result<()> {
        let max = build("3.12", Platform::Darwin, "framework_max")?;
        for name in ["_bz2", "_lzma", "_sqlite3", "_scproxy", "zlib", "binascii", "_ssl"] {
            assert!(max.contains(Bucket::Shared, name));
        }

        let mid = build("3.12", Platform::Darwin, "framework_mid")?;
        for name in ["_decimal", "_ssl", "_hashlib"] {
            assert!(mid.contains(Bucket::Disabled, name));
        }
        assert!(mid.contains(Bucket::Shared, "zlib"));

        Ok(())
    }
}
