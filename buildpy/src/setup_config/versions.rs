// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-version adjustments of the base table.

use super::{Bucket, ConfigError, Platform, SetupConfig};

const HACL_FLAGS: [&str; 3] = [
    "-I$(srcdir)/Modules/_hacl/include",
    "-D_BSD_SOURCE",
    "-D_DEFAULT_SOURCE",
];

fn hacl_rule<'a>(module_source: &'a str, hacl_source: &'a str) -> [&'a str; 5] {
    [
        module_source,
        HACL_FLAGS[0],
        hacl_source,
        HACL_FLAGS[1],
        HACL_FLAGS[2],
    ]
}

impl SetupConfig {
    pub(super) fn patch_311(&mut self) -> Result<(), ConfigError> {
        match self.platform {
            Platform::Darwin => self.enable_static(&["_scproxy"]),
            Platform::Linux => self.enable_static(&["ossaudiodev"]),
            _ => Ok(()),
        }
    }

    /// 3.12 moved the hash modules onto HACL* and merged sha256/sha512.
    pub(super) fn patch_312(&mut self) -> Result<(), ConfigError> {
        self.set_rule("_md5", &hacl_rule("md5module.c", "_hacl/Hacl_Hash_MD5.c"));
        self.set_rule("_sha1", &hacl_rule("sha1module.c", "_hacl/Hacl_Hash_SHA1.c"));
        self.set_rule("_sha2", &hacl_rule("sha2module.c", "_hacl/Hacl_Hash_SHA2.c"));
        self.set_rule("_sha3", &hacl_rule("sha3module.c", "_hacl/Hacl_Hash_SHA3.c"));

        self.remove_rule("_sha256");
        self.remove_rule("_sha512");

        self.static_.push("_sha2".to_string());
        self.remove_entry(Bucket::Static, "_sha256")?;
        self.remove_entry(Bucket::Static, "_sha512")?;
        self.disabled.push("_xxinterpchannels".to_string());

        Ok(())
    }

    pub(super) fn patch_313(&mut self) -> Result<(), ConfigError> {
        self.set_rule("_interpchannels", &["_interpchannelsmodule.c"]);
        self.set_rule("_interpqueues", &["_interpqueuesmodule.c"]);
        self.set_rule("_interpreters", &["_interpretersmodule.c"]);
        self.set_rule("_sysconfig", &["_sysconfig.c"]);
        self.set_rule("_testexternalinspection", &["_testexternalinspection.c"]);

        for name in ["_crypt", "ossaudiodev", "spwd"] {
            self.remove_rule(name);
        }

        for name in ["_interpchannels", "_interpqueues", "_interpreters", "_sysconfig"] {
            self.static_.push(name.to_string());
        }

        for name in ["_crypt", "_xxsubinterpreters", "audioop", "nis", "spwd"] {
            self.remove_entry(Bucket::Disabled, name)?;
        }

        // Linux builds of 3.11 enabled ossaudiodev, so it may be in any list.
        for bucket in [Bucket::Disabled, Bucket::Static, Bucket::Shared] {
            self.discard_entry(bucket, "ossaudiodev");
        }

        self.disabled.push("_testexternalinspection".to_string());

        Ok(())
    }

    pub(super) fn patch_314(&mut self) -> Result<(), ConfigError> {
        self.set_rule("_types", &["_typesmodule.c"]);
        self.set_rule("_hmac", &["hmacmodule.c"]);
        self.set_rule("_remote_debugging", &["_remote_debugging_module.c"]);
        self.set_rule(
            "_zstd",
            &["_zstd/_zstdmodule.c", "-lzstd", "-I$(srcdir)/Modules/_zstd"],
        );

        self.set_rule("_blake2", &["blake2module.c"]);
        self.set_rule("_md5", &["md5module.c"]);
        self.set_rule("_sha1", &["sha1module.c"]);
        self.set_rule("_sha2", &["sha2module.c"]);
        self.set_rule("_sha3", &["sha3module.c"]);

        // _contextvars became part of the core interpreter.
        self.remove_rule("_contextvars");
        self.discard_entry(Bucket::Static, "_contextvars");

        self.remove_rule("_testexternalinspection");
        self.discard_entry(Bucket::Disabled, "_testexternalinspection");

        self.static_.push("_types".to_string());
        self.static_.push("_hmac".to_string());

        self.disabled.push("_remote_debugging".to_string());
        self.disabled.push("_zstd".to_string());

        // The hash modules are built by the default module setup in 3.14.
        for name in ["_sha1", "_sha2", "_sha3", "_hmac"] {
            self.remove_entry(Bucket::Static, name)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::setup_config::BuildType,
        anyhow::Result,
    };

    fn config(version: &str, platform: Platform) -> Result<SetupConfig> {
        Ok(SetupConfig::for_version(version, platform, BuildType::Static)?)
    }

    #[test]
    fn test_311_platform_patches() -> Result<()> {
        let darwin = config("3.11", Platform::Darwin)?;
        assert!(darwin.contains(Bucket::Static, "_scproxy"));
        assert!(!darwin.contains(Bucket::Disabled, "_scproxy"));
        assert!(darwin.contains(Bucket::Disabled, "ossaudiodev"));

        let linux = config("3.11", Platform::Linux)?;
        assert!(linux.contains(Bucket::Static, "ossaudiodev"));
        assert!(linux.contains(Bucket::Disabled, "_scproxy"));

        Ok(())
    }

    #[test]
    fn test_312_hash_modules() -> Result<()> {
        let c = config("3.12", Platform::Darwin)?;

        assert!(c.contains(Bucket::Static, "_sha2"));
        assert!(!c.contains(Bucket::Static, "_sha256"));
        assert!(!c.extensions.contains_key("_sha512"));
        assert!(c.contains(Bucket::Disabled, "_xxinterpchannels"));
        assert_eq!(
            c.extensions["_md5"],
            vec![
                "md5module.c",
                "-I$(srcdir)/Modules/_hacl/include",
                "_hacl/Hacl_Hash_MD5.c",
                "-D_BSD_SOURCE",
                "-D_DEFAULT_SOURCE"
            ]
        );

        Ok(())
    }

    #[test]
    fn test_313_on_both_platforms() -> Result<()> {
        for platform in [Platform::Darwin, Platform::Linux] {
            let c = config("3.13", platform)?;

            for name in ["_interpchannels", "_interpqueues", "_interpreters", "_sysconfig"] {
                assert!(c.contains(Bucket::Static, name));
            }
            assert!(c.contains(Bucket::Disabled, "_testexternalinspection"));
            assert!(!c.extensions.contains_key("_crypt"));
            assert!(!c.enabled_modules().contains("ossaudiodev"));
            assert!(!c.contains(Bucket::Disabled, "ossaudiodev"));
            assert!(!c.contains(Bucket::Disabled, "nis"));
        }

        Ok(())
    }

    #[test]
    fn test_314_patches() -> Result<()> {
        let c = config("3.14", Platform::Darwin)?;

        assert!(c.contains(Bucket::Static, "_types"));
        assert!(c.contains(Bucket::Disabled, "_zstd"));
        assert!(c.contains(Bucket::Disabled, "_remote_debugging"));
        assert!(!c.contains(Bucket::Disabled, "_testexternalinspection"));
        assert!(!c.extensions.contains_key("_contextvars"));
        assert_eq!(c.extensions["_blake2"], vec!["blake2module.c"]);

        for name in ["_sha1", "_sha2", "_sha3", "_hmac", "_contextvars"] {
            assert!(!c.enabled_modules().contains(name));
            assert!(!c.contains(Bucket::Disabled, name));
        }

        // Every built module still has a rule to render.
        c.render_setup_local()?;

        Ok(())
    }
}
