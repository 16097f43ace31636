// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Extension module configuration for a CPython build.

A configuration is a table of C extension build rules plus four buckets
deciding how each module is built: compiled into the core, linked
statically, built as a shared extension or not built at all. Version
patches and build variants move modules between buckets, and the result is
rendered as a `Modules/Setup.local` makefile fragment or as JSON.
*/

mod base;
mod variants;
mod versions;

pub use crate::environment::Platform;

use {
    anyhow::{Context, Result},
    linked_hash_map::LinkedHashMap,
    log::info,
    serde::Serialize,
    std::{collections::BTreeSet, fmt, path::Path, str::FromStr},
    thiserror::Error,
};

/// Errors raised while manipulating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot move {name}: not in the {bucket} list")]
    MissingEntry { bucket: Bucket, name: String },

    #[error("no build rule for extension module {0}")]
    MissingRule(String),

    #[error("unsupported python version: {0} (supported: 3.11, 3.12, 3.13, 3.14)")]
    UnsupportedVersion(String),

    #[error("invalid build variant: {0}")]
    InvalidVariant(String),
}

/// The lists a module can be placed in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Bucket {
    Core,
    Static,
    Shared,
    Disabled,
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Core => "core",
            Self::Static => "static",
            Self::Shared => "shared",
            Self::Disabled => "disabled",
        })
    }
}

/// How libpython is produced.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildType {
    Static,
    Shared,
    Framework,
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Static => "static",
            Self::Shared => "shared",
            Self::Framework => "framework",
        })
    }
}

/// How many extension modules a build carries.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeType {
    Max,
    Mid,
    Tiny,
    Bootstrap,
    Vanilla,
}

impl fmt::Display for SizeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Max => "max",
            Self::Mid => "mid",
            Self::Tiny => "tiny",
            Self::Bootstrap => "bootstrap",
            Self::Vanilla => "vanilla",
        })
    }
}

/// A named combination of build type and size, such as `shared_mid`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BuildVariant {
    pub build_type: BuildType,
    pub size_type: SizeType,
}

impl BuildVariant {
    /// Every supported variant.
    pub const ALL: [BuildVariant; 9] = [
        Self::new(BuildType::Static, SizeType::Max),
        Self::new(BuildType::Static, SizeType::Mid),
        Self::new(BuildType::Static, SizeType::Tiny),
        Self::new(BuildType::Static, SizeType::Bootstrap),
        Self::new(BuildType::Shared, SizeType::Max),
        Self::new(BuildType::Shared, SizeType::Mid),
        Self::new(BuildType::Shared, SizeType::Vanilla),
        Self::new(BuildType::Framework, SizeType::Max),
        Self::new(BuildType::Framework, SizeType::Mid),
    ];

    pub const fn new(build_type: BuildType, size_type: SizeType) -> Self {
        Self {
            build_type,
            size_type,
        }
    }

    /// Names of every supported variant.
    pub fn names() -> Vec<String> {
        Self::ALL.iter().map(|v| v.to_string()).collect()
    }
}

impl fmt::Display for BuildVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.build_type, self.size_type)
    }
}

impl FromStr for BuildVariant {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace('-', "_");

        Self::ALL
            .iter()
            .find(|v| v.to_string() == normalized)
            .copied()
            .ok_or_else(|| ConfigError::InvalidVariant(s.to_string()))
    }
}

impl Serialize for BuildVariant {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Reduce a version string to its `X.Y` form.
pub fn short_version(version: &str) -> String {
    version.split('.').take(2).collect::<Vec<_>>().join(".")
}

/// The extension module configuration of a Python build.
#[derive(Clone, Debug, Serialize)]
pub struct SetupConfig {
    pub header: Vec<String>,
    pub extensions: LinkedHashMap<String, Vec<String>>,
    pub core: Vec<String>,
    pub shared: Vec<String>,
    #[serde(rename = "static")]
    pub static_: Vec<String>,
    pub disabled: Vec<String>,

    /// Install name for the framework library on macOS.
    #[serde(skip)]
    pub install_name_id: Option<String>,

    /// Python version in `X.Y` form.
    #[serde(skip)]
    pub version: String,

    #[serde(skip)]
    pub platform: Platform,
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl SetupConfig {
    /// The unpatched base table.
    pub fn base(platform: Platform) -> Self {
        Self {
            header: to_strings(base::HEADER),
            extensions: base::EXTENSIONS
                .iter()
                .map(|(name, args)| (name.to_string(), to_strings(args)))
                .collect(),
            core: to_strings(base::CORE),
            shared: to_strings(base::SHARED),
            static_: to_strings(base::STATIC),
            disabled: to_strings(base::DISABLED),
            install_name_id: None,
            version: String::new(),
            platform,
        }
    }

    /// Construct the configuration for a Python version.
    ///
    /// `version` may be `X.Y` or `X.Y.Z`. Patches for every version up to
    /// and including the requested one are applied in order.
    pub fn for_version(
        version: &str,
        platform: Platform,
        build_type: BuildType,
    ) -> Result<Self, ConfigError> {
        let ver = short_version(version);
        let minor = match ver.split_once('.') {
            Some(("3", minor)) => minor
                .parse::<u32>()
                .map_err(|_| ConfigError::UnsupportedVersion(version.to_string()))?,
            _ => return Err(ConfigError::UnsupportedVersion(version.to_string())),
        };
        if !(11..=14).contains(&minor) {
            return Err(ConfigError::UnsupportedVersion(version.to_string()));
        }

        let mut config = Self::base(platform);
        config.version = ver.clone();

        config.patch_311()?;
        if minor >= 12 {
            config.patch_312()?;
        }
        if minor >= 13 {
            config.patch_313()?;
        }
        if minor >= 14 {
            config.patch_314()?;
        }

        if build_type == BuildType::Framework {
            config.install_name_id = Some(format!("@rpath/Python.framework/Versions/{}/Python", ver));
        }

        Ok(config)
    }

    pub fn bucket(&self, bucket: Bucket) -> &Vec<String> {
        match bucket {
            Bucket::Core => &self.core,
            Bucket::Static => &self.static_,
            Bucket::Shared => &self.shared,
            Bucket::Disabled => &self.disabled,
        }
    }

    pub fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<String> {
        match bucket {
            Bucket::Core => &mut self.core,
            Bucket::Static => &mut self.static_,
            Bucket::Shared => &mut self.shared,
            Bucket::Disabled => &mut self.disabled,
        }
    }

    /// Whether a module is present in a bucket.
    pub fn contains(&self, bucket: Bucket, name: &str) -> bool {
        self.bucket(bucket).iter().any(|n| n == name)
    }

    /// Remove a module from a bucket, failing if it is absent.
    pub fn remove_entry(&mut self, bucket: Bucket, name: &str) -> Result<(), ConfigError> {
        let entries = self.bucket_mut(bucket);

        match entries.iter().position(|n| n == name) {
            Some(idx) => {
                entries.remove(idx);
                Ok(())
            }
            None => Err(ConfigError::MissingEntry {
                bucket,
                name: name.to_string(),
            }),
        }
    }

    /// Remove a module from a bucket if it is present.
    pub fn discard_entry(&mut self, bucket: Bucket, name: &str) -> bool {
        self.remove_entry(bucket, name).is_ok()
    }

    /// Move modules from one bucket to another.
    pub fn move_entries(&mut self, src: Bucket, dst: Bucket, names: &[&str]) -> Result<(), ConfigError> {
        for name in names {
            info!("{} -> {}: {}", src, dst, name);
            self.remove_entry(src, name)?;
            self.bucket_mut(dst).push(name.to_string());
        }

        Ok(())
    }

    pub fn enable_static(&mut self, names: &[&str]) -> Result<(), ConfigError> {
        self.move_entries(Bucket::Disabled, Bucket::Static, names)
    }

    pub fn enable_shared(&mut self, names: &[&str]) -> Result<(), ConfigError> {
        self.move_entries(Bucket::Disabled, Bucket::Shared, names)
    }

    pub fn disable_static(&mut self, names: &[&str]) -> Result<(), ConfigError> {
        self.move_entries(Bucket::Static, Bucket::Disabled, names)
    }

    pub fn disable_shared(&mut self, names: &[&str]) -> Result<(), ConfigError> {
        self.move_entries(Bucket::Shared, Bucket::Disabled, names)
    }

    pub fn move_static_to_shared(&mut self, names: &[&str]) -> Result<(), ConfigError> {
        self.move_entries(Bucket::Static, Bucket::Shared, names)
    }

    pub fn move_shared_to_static(&mut self, names: &[&str]) -> Result<(), ConfigError> {
        self.move_entries(Bucket::Shared, Bucket::Static, names)
    }

    /// Replace or add the build rule of a module.
    ///
    /// Existing rules keep their position in the table.
    pub fn set_rule(&mut self, name: &str, args: &[&str]) {
        match self.extensions.get_mut(name) {
            Some(rule) => *rule = to_strings(args),
            None => {
                self.extensions.insert(name.to_string(), to_strings(args));
            }
        }
    }

    pub fn remove_rule(&mut self, name: &str) -> Option<Vec<String>> {
        self.extensions.remove(name)
    }

    /// Modules that will be built, whether in the core, statically or shared.
    pub fn enabled_modules(&self) -> BTreeSet<String> {
        self.core
            .iter()
            .chain(self.static_.iter())
            .chain(self.shared.iter())
            .cloned()
            .collect()
    }

    fn rule_line(&self, name: &str) -> Result<String, ConfigError> {
        let args = self
            .extensions
            .get(name)
            .ok_or_else(|| ConfigError::MissingRule(name.to_string()))?;

        let mut parts = vec![name];
        parts.extend(args.iter().map(|s| s.as_str()));

        Ok(parts.join(" "))
    }

    /// Render the configuration as a `Setup.local` makefile fragment.
    pub fn render_setup_local(&self) -> Result<String, ConfigError> {
        let mut out = vec!["# -*- makefile -*-".to_string()];
        out.extend(self.header.iter().cloned());
        out.push("\n# core\n".to_string());

        for name in &self.core {
            out.push(self.rule_line(name)?);
        }

        for bucket in [Bucket::Shared, Bucket::Static, Bucket::Disabled] {
            let entries = self.bucket(bucket);
            if entries.is_empty() {
                continue;
            }

            out.push(format!("\n*{}*\n", bucket));

            let mut sorted = entries.clone();
            sorted.sort();
            for name in sorted {
                if bucket == Bucket::Disabled {
                    out.push(name);
                } else {
                    out.push(self.rule_line(&name)?);
                }
            }
        }

        out.push("# end \n".to_string());

        Ok(out.join("\n"))
    }

    /// Write the `Setup.local` rendering to a file.
    pub fn write_setup_local(&self, path: &Path) -> Result<()> {
        info!("write Setup.local to {}", path.display());
        let content = self.render_setup_local()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;

        Ok(())
    }

    /// Render the configuration as 4-space indented JSON.
    pub fn to_json(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser).context("serializing configuration")?;

        Ok(String::from_utf8(buf)?)
    }

    /// Write the JSON rendering to a file.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        info!("write json configuration to {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("writing {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_parsing() -> Result<()> {
        let v = BuildVariant::from_str("shared-mid")?;
        assert_eq!(v, BuildVariant::new(BuildType::Shared, SizeType::Mid));
        assert_eq!(v.to_string(), "shared_mid");
        assert_eq!(
            BuildVariant::from_str("static_bootstrap")?.size_type,
            SizeType::Bootstrap
        );
        assert!(BuildVariant::from_str("framework_tiny").is_err());
        assert!(BuildVariant::from_str("bogus").is_err());
        assert_eq!(BuildVariant::names().len(), 9);

        Ok(())
    }

    #[test]
    fn test_unsupported_versions() {
        for v in ["3.10", "3.15", "2.7", "x.y", "3"] {
            assert!(matches!(
                SetupConfig::for_version(v, Platform::Linux, BuildType::Shared),
                Err(ConfigError::UnsupportedVersion(_))
            ));
        }
    }

    #[test]
    fn test_move_entries() -> Result<()> {
        let mut config = SetupConfig::base(Platform::Linux);

        config.disable_static(&["_decimal"])?;
        assert!(config.contains(Bucket::Disabled, "_decimal"));
        assert!(!config.contains(Bucket::Static, "_decimal"));
        assert_eq!(config.disabled.last().map(|s| s.as_str()), Some("_decimal"));

        let err = config.disable_static(&["_decimal"]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingEntry {
                bucket: Bucket::Static,
                ..
            }
        ));

        config.enable_shared(&["_decimal"])?;
        config.move_shared_to_static(&["_decimal"])?;
        assert!(config.contains(Bucket::Static, "_decimal"));

        Ok(())
    }

    #[test]
    fn test_set_rule_keeps_position() {
        let mut config = SetupConfig::base(Platform::Linux);
        let before = config.extensions.keys().cloned().collect::<Vec<_>>();

        config.set_rule("_md5", &["md5module.c"]);
        config.set_rule("_new", &["new.c"]);

        let after = config.extensions.keys().cloned().collect::<Vec<_>>();
        assert_eq!(&after[..before.len()], &before[..]);
        assert_eq!(after.last().map(|s| s.as_str()), Some("_new"));
        assert_eq!(config.extensions["_md5"], vec!["md5module.c".to_string()]);
    }

    #[test]
    fn test_render_setup_local() -> Result<()> {
        let config = SetupConfig::for_version("3.12", Platform::Linux, BuildType::Static)?;
        let rendered = config.render_setup_local()?;

        assert!(rendered.starts_with("# -*- makefile -*-\nDESTLIB=$(LIBDEST)\n"));
        assert!(rendered.contains("LZMA=$(srcdir)/../../install/xz\n\n# core\n\n_abc _abc.c\n"));
        assert!(rendered.contains("\n\n*static*\n\n_asyncio _asynciomodule.c\n"));
        assert!(rendered.contains("\n\n*disabled*\n\n_codecs_cn\n"));
        assert!(!rendered.contains("*shared*"));
        assert!(rendered.ends_with("\n# end \n"));

        // Rendering has no side effects.
        assert_eq!(rendered, config.render_setup_local()?);

        Ok(())
    }

    #[test]
    fn test_json_layout() -> Result<()> {
        let config = SetupConfig::for_version("3.13", Platform::Darwin, BuildType::Shared)?;
        let json = config.to_json()?;

        let header = json.find("\"header\"").unwrap_or(usize::MAX);
        let extensions = json.find("\"extensions\"").unwrap_or(usize::MAX);
        let core = json.find("\"core\"").unwrap_or(usize::MAX);
        let shared = json.find("\"shared\"").unwrap_or(usize::MAX);
        let static_ = json.find("\"static\"").unwrap_or(usize::MAX);
        let disabled = json.find("\"disabled\"").unwrap_or(usize::MAX);
        assert!(header < extensions);
        assert!(extensions < core);
        assert!(core < shared);
        assert!(shared < static_);
        assert!(static_ < disabled);
        assert!(disabled < usize::MAX);

        assert!(json.starts_with("{\n    \"header\": [\n        \"DESTLIB=$(LIBDEST)\","));
        assert!(json.contains("\"shared\": [],"));

        let value: serde_json::Value = serde_json::from_str(&json)?;
        let keys = value["extensions"]
            .as_object()
            .map(|o| o.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        assert!(keys.contains(&"_interpreters".to_string()));

        Ok(())
    }

    #[test]
    fn test_framework_install_name() -> Result<()> {
        let config = SetupConfig::for_version("3.13.11", Platform::Darwin, BuildType::Framework)?;
        assert_eq!(config.version, "3.13");
        assert_eq!(
            config.install_name_id.as_deref(),
            Some("@rpath/Python.framework/Versions/3.13/Python")
        );

        Ok(())
    }
}
