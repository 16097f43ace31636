// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Handle file layout of buildpy projects.

use {
    anyhow::{Context, Result},
    buildpy_common::fs::remove_path,
    std::path::{Path, PathBuf},
};

/// Directory structure of a build tree.
#[derive(Clone, Debug)]
pub struct Project {
    pub root: PathBuf,
    pub build: PathBuf,
    pub support: PathBuf,
    pub downloads: PathBuf,
    pub src: PathBuf,
    pub install: PathBuf,
    pub bin: PathBuf,
    pub lib: PathBuf,
    pub lib_static: PathBuf,
}

impl Project {
    /// Layout rooted at an arbitrary directory.
    pub fn new(root: &Path) -> Self {
        let build = root.join("build");

        Self {
            root: root.to_path_buf(),
            support: root.join("support"),
            downloads: build.join("downloads"),
            src: build.join("src"),
            install: build.join("install"),
            bin: build.join("bin"),
            lib: build.join("lib"),
            lib_static: build.join("lib").join("static"),
            build,
        }
    }

    /// Layout rooted at the current working directory.
    pub fn from_cwd() -> Result<Self> {
        let cwd = std::env::current_dir().context("resolving current directory")?;

        Ok(Self::new(&cwd))
    }

    /// Create the main project directories.
    pub fn setup(&self) -> Result<()> {
        for dir in [&self.build, &self.downloads, &self.install, &self.src] {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }

        Ok(())
    }

    /// Prepare the project for a rebuild.
    pub fn reset(&self) -> Result<()> {
        remove_path(&self.src)?;
        remove_path(&self.install.join("python"))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_and_reset() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let project = Project::new(temp_dir.path());

        assert_eq!(project.lib_static, temp_dir.path().join("build/lib/static"));

        project.setup()?;
        assert!(project.downloads.is_dir());
        assert!(project.src.is_dir());
        assert!(!project.bin.exists());

        std::fs::create_dir_all(project.install.join("python").join("lib"))?;
        std::fs::write(project.downloads.join("keep.tar.gz"), b"x")?;
        project.reset()?;

        assert!(!project.src.exists());
        assert!(!project.install.join("python").exists());
        assert!(project.downloads.join("keep.tar.gz").exists());

        Ok(())
    }
}
