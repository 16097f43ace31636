// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Builders for CPython and the native libraries it links against.

Every builder wraps a source package: a pinned release of an upstream
project that is downloaded, extracted into `build/src` and driven through
its own build system. The [Builder] trait supplies the derived paths and a
fixed lifecycle (`pre_process`, `setup`, `configure`, `build`, `install`,
`clean`, `post_process`) that implementations override piecemeal.
*/

mod dependencies;
mod python;
mod windows;

pub use {
    dependencies::{python_dependencies, Bzip2Builder, OpensslBuilder, XzBuilder},
    python::{PythonBuildOptions, PythonBuilder, REMOVE_PATTERNS},
    windows::{WindowsEmbeddableBuilder, WindowsPythonBuilder},
};

use {
    crate::{environment::Platform, project_layout::Project},
    anyhow::{anyhow, Result},
    buildpy_common::{archive::extract_archive, fs::remove_path, http::download_to_dir, BuildError},
    log::info,
    std::path::{Path, PathBuf},
};

/// A pinned upstream source release.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourcePackage {
    pub name: String,
    pub version: String,
    pub repo_url: String,
    /// Archive file name, with `{ver}` standing for the version.
    pub archive_template: String,
    /// Download URL, with `{archive}` and `{ver}` placeholders.
    pub url_template: String,
    /// Libraries under `<prefix>/lib` whose presence means the build is done.
    pub lib_products: Vec<String>,
}

impl SourcePackage {
    pub fn new(
        name: &str,
        version: &str,
        repo_url: &str,
        archive_template: &str,
        url_template: &str,
        lib_products: &[&str],
    ) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            repo_url: repo_url.to_string(),
            archive_template: archive_template.to_string(),
            url_template: url_template.to_string(),
            lib_products: lib_products.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn component(&self, idx: usize) -> &str {
        self.version.split('.').nth(idx).unwrap_or("")
    }

    /// `X.Y` form of the version.
    pub fn ver(&self) -> String {
        self.version
            .split('.')
            .take(2)
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn ver_major(&self) -> &str {
        self.component(0)
    }

    pub fn ver_minor(&self) -> &str {
        self.component(1)
    }

    pub fn ver_patch(&self) -> &str {
        self.component(2)
    }

    /// `XY` form of the version, e.g. `313`.
    pub fn ver_nodot(&self) -> String {
        self.ver().replace('.', "")
    }

    /// e.g. `Python-3.13.11`.
    pub fn name_version(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// e.g. `python3.13`.
    pub fn name_ver(&self) -> String {
        format!("{}{}", self.name.to_lowercase(), self.ver())
    }

    /// e.g. `python313`.
    pub fn name_ver_nodot(&self) -> String {
        format!("{}{}", self.name.to_lowercase(), self.ver_nodot())
    }

    pub fn download_archive(&self) -> String {
        self.archive_template.replace("{ver}", &self.version)
    }

    pub fn download_url(&self) -> String {
        self.url_template
            .replace("{archive}", &self.download_archive())
            .replace("{ver}", &self.version)
    }

    pub fn repo_branch(&self) -> String {
        self.name.to_lowercase()
    }
}

/// Download the archive of a package unless it is already present.
pub fn ensure_downloaded(package: &SourcePackage, project: &Project) -> Result<PathBuf> {
    let archive = project.downloads.join(package.download_archive());
    if archive.exists() {
        return Ok(archive);
    }

    let archive = download_to_dir(&package.download_url(), &project.downloads, None)?;
    info!("downloaded {}", archive.display());

    Ok(archive)
}

/// Replace the source tree of a package with a fresh extraction.
pub fn extract_fresh(archive: &Path, src_dir: &Path, project: &Project) -> Result<()> {
    remove_path(src_dir)?;
    extract_archive(archive, &project.src)?;

    if !src_dir.exists() {
        return Err(
            BuildError::Extraction(format!("could not extract from {}", archive.display())).into(),
        );
    }

    Ok(())
}

/// A buildable source package.
pub trait Builder {
    fn package(&self) -> &SourcePackage;

    fn project(&self) -> &Project;

    fn platform(&self) -> Platform {
        Platform::current()
    }

    /// Installation prefix.
    fn prefix(&self) -> PathBuf {
        self.project()
            .install
            .join(self.package().name.to_lowercase())
    }

    fn downloaded_archive(&self) -> PathBuf {
        self.project()
            .downloads
            .join(self.package().download_archive())
    }

    /// Extracted source tree.
    fn src_dir(&self) -> PathBuf {
        self.project().src.join(self.package().name_version())
    }

    fn build_dir(&self) -> PathBuf {
        self.src_dir().join("build")
    }

    fn executable_name(&self) -> String {
        match self.platform() {
            Platform::Windows => format!("{}.exe", self.package().name),
            _ => self.package().name.to_lowercase(),
        }
    }

    fn executable(&self) -> PathBuf {
        self.project().bin.join(self.executable_name())
    }

    /// Library name without suffix, e.g. `libssl`.
    fn libname(&self) -> String {
        format!("lib{}", self.package().name)
    }

    fn staticlib_name(&self) -> String {
        format!("{}{}", self.libname(), self.platform().staticlib_suffix())
    }

    fn dylib_name(&self) -> Result<String> {
        Ok(format!("{}{}", self.libname(), self.platform().dylib_suffix()?))
    }

    /// Name of the unversioned link to the dynamic library.
    fn dylib_linkname(&self) -> Result<String> {
        match self.platform() {
            Platform::Darwin | Platform::Linux => self.dylib_name(),
            platform => Err(anyhow!("platform not supported: {}", platform)),
        }
    }

    fn dylib(&self) -> Result<PathBuf> {
        Ok(self.prefix().join("lib").join(self.dylib_name()?))
    }

    fn dylib_link(&self) -> Result<PathBuf> {
        Ok(self.project().lib.join(self.dylib_linkname()?))
    }

    fn staticlib(&self) -> PathBuf {
        self.prefix().join("lib").join(self.staticlib_name())
    }

    /// Whether every library this package produces is installed.
    fn lib_products_exist(&self) -> bool {
        let lib = self.prefix().join("lib");

        self.package()
            .lib_products
            .iter()
            .all(|product| lib.join(product).exists())
    }

    fn pre_process(&self) -> Result<()> {
        Ok(())
    }

    /// Download and extract the sources.
    ///
    /// Extraction is skipped when the library products already exist.
    fn setup(&self) -> Result<()> {
        self.project().setup()?;
        let archive = ensure_downloaded(self.package(), self.project())?;

        if !self.lib_products_exist() {
            extract_fresh(&archive, &self.src_dir(), self.project())?;
        }

        Ok(())
    }

    fn configure(&self) -> Result<()> {
        Ok(())
    }

    fn build(&self) -> Result<()> {
        Ok(())
    }

    fn install(&self) -> Result<()> {
        Ok(())
    }

    fn clean(&self) -> Result<()> {
        Ok(())
    }

    fn post_process(&self) -> Result<()> {
        Ok(())
    }

    /// Run the full lifecycle.
    fn process(&self) -> Result<()> {
        self.pre_process()?;
        self.setup()?;
        self.configure()?;
        self.build()?;
        self.install()?;
        self.clean()?;
        self.post_process()
    }
}
