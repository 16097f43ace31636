// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Windows builds, from source via `PCbuild` or from the embeddable zip.

use {
    super::{
        ensure_downloaded, extract_fresh,
        python::{precompile_dir, zip_stdlib, PythonBuildOptions, PythonBuilder},
        Builder, SourcePackage,
    },
    crate::{
        environment::{Platform, DEFAULT_PYTHON_VERSION},
        project_layout::Project,
        shell::{env_flag, run, Command},
    },
    anyhow::{anyhow, Context, Result},
    buildpy_common::{
        archive::extract_archive,
        fs::{copy_path, glob_move, glob_remove, move_path, remove_path},
    },
    log::info,
    std::{io::Write, path::PathBuf},
};

/// Patterns pruned from a Windows installation.
pub const WINDOWS_REMOVE_PATTERNS: &[&str] = &[
    "*.pdb",
    "*.exp",
    "_test*",
    "xx*",
    "py.exe",
    "pyw.exe",
    "pythonw.exe",
    "venvlauncher.exe",
    "venvwlauncher.exe",
    "_ctypes_test*",
    "LICENSE.txt",
    "*tcl*",
    "*tdbc*",
    "*tk*",
    "__phello__",
    "__pycache__",
    "_tk*",
    "ensurepip",
    "idlelib",
    "pydoc*",
    "test",
    "Tk*",
    "turtle*",
    "venv",
];

/// Builds CPython with the Visual Studio solution in `PCbuild`.
#[derive(Clone, Debug)]
pub struct WindowsPythonBuilder {
    inner: PythonBuilder,
}

impl WindowsPythonBuilder {
    pub fn new(version: &str, project: Project, options: PythonBuildOptions) -> Self {
        Self {
            inner: PythonBuilder::new(version, project, options).with_platform(Platform::Windows),
        }
    }

    pub fn python_builder(&self) -> &PythonBuilder {
        &self.inner
    }

    /// Directory the binaries are built into.
    pub fn binary_dir(&self) -> PathBuf {
        self.src_dir().join("PCbuild").join("amd64")
    }

    /// `pythonXY._pth` search path file.
    pub fn pth(&self) -> String {
        format!("{}._pth", self.inner.package().name_ver_nodot())
    }

    pub fn pyconfig_h(&self) -> Result<PathBuf> {
        let path = self.binary_dir().join("pyconfig.h");
        if path.exists() {
            Ok(path)
        } else {
            Err(anyhow!("pyconfig.h not found in {}", self.binary_dir().display()))
        }
    }

    pub fn can_run(&self) -> Result<bool> {
        Ok(!self.dylib()?.exists())
    }

    /// Zip `Lib` into `pythonXY.zip` next to the interpreter.
    pub fn ziplib(&self) -> Result<()> {
        let src = self.inner.stdlib_dir();
        let options = self.inner.options();

        if options.precompile || env_flag("PRECOMPILE", false)? {
            precompile_dir(
                &self.executable(),
                &src,
                &PathBuf::from("Lib"),
                options.optimize_bytecode,
            )?;
        }

        zip_stdlib(&src, &self.inner.zip_path())
    }
}

impl Builder for WindowsPythonBuilder {
    fn package(&self) -> &SourcePackage {
        self.inner.package()
    }

    fn project(&self) -> &Project {
        self.inner.project()
    }

    fn platform(&self) -> Platform {
        Platform::Windows
    }

    fn prefix(&self) -> PathBuf {
        self.inner.prefix()
    }

    fn executable(&self) -> PathBuf {
        self.inner.executable()
    }

    fn libname(&self) -> String {
        self.inner.libname()
    }

    fn dylib(&self) -> Result<PathBuf> {
        self.inner.dylib()
    }

    fn setup(&self) -> Result<()> {
        self.project().setup()?;
        let archive = ensure_downloaded(self.package(), self.project())?;

        extract_fresh(&archive, &self.src_dir(), self.project())
    }

    fn build(&self) -> Result<()> {
        run(
            &Command::args(["PCbuild\\build.bat", "-e", "--no-tkinter"]),
            &self.src_dir(),
        )
    }

    fn install(&self) -> Result<()> {
        let binary_dir = self.binary_dir();
        if !binary_dir.exists() {
            return Err(anyhow!("build error: {} does not exist", binary_dir.display()));
        }
        self.pyconfig_h()?;

        let prefix = self.prefix();
        let src_dir = self.src_dir();
        remove_path(&prefix)?;

        copy_path(&binary_dir, &prefix)?;
        copy_path(&src_dir.join("Include"), &prefix.join("include"))?;
        move_path(&prefix.join("pyconfig.h"), &prefix.join("include"))?;
        copy_path(&src_dir.join("Lib"), &prefix.join("Lib"))?;
        move_path(&prefix.join("Lib").join("site-packages"), &prefix)?;

        let libs = prefix.join("libs");
        std::fs::create_dir_all(&libs).with_context(|| format!("creating {}", libs.display()))?;
        glob_move(&prefix, "*.lib", &libs)?;

        let pth_path = prefix.join(self.pth());
        let mut fh = std::fs::File::create(&pth_path)
            .with_context(|| format!("creating {}", pth_path.display()))?;
        for line in [
            "Lib".to_string(),
            format!("{}.zip", self.inner.package().name_ver_nodot()),
            "site-packages".to_string(),
            ".".to_string(),
        ] {
            writeln!(fh, "{}", line)?;
        }

        Ok(())
    }

    fn clean(&self) -> Result<()> {
        let prefix = self.prefix();
        remove_path(&prefix.join("pybuilddir.txt"))?;
        glob_remove(&prefix, WINDOWS_REMOVE_PATTERNS, &[".git"])?;

        Ok(())
    }

    fn post_process(&self) -> Result<()> {
        info!("{} DONE", self.inner.variant());

        Ok(())
    }

    fn process(&self) -> Result<()> {
        if !self.can_run()? {
            info!("everything built: skipping run");
            return Ok(());
        }

        self.pre_process()?;
        self.setup()?;
        self.configure()?;
        self.build()?;
        self.install()?;
        self.clean()?;
        self.ziplib()?;
        self.post_process()
    }
}

/// Installs the official embeddable Windows distribution into `support/`.
#[derive(Clone, Debug)]
pub struct WindowsEmbeddableBuilder {
    package: SourcePackage,
    project: Project,
}

impl WindowsEmbeddableBuilder {
    pub fn new(version: &str, project: Project) -> Self {
        Self {
            package: SourcePackage::new(
                "Python",
                version,
                "https://github.com/python/cpython.git",
                "python-{ver}-embed-amd64.zip",
                "https://www.python.org/ftp/python/{ver}/{archive}",
                &[],
            ),
            project,
        }
    }

    pub fn with_defaults(project: Project) -> Self {
        Self::new(DEFAULT_PYTHON_VERSION, project)
    }

    pub fn install_dir(&self) -> PathBuf {
        self.project.support.clone()
    }
}

impl Builder for WindowsEmbeddableBuilder {
    fn package(&self) -> &SourcePackage {
        &self.package
    }

    fn project(&self) -> &Project {
        &self.project
    }

    fn setup(&self) -> Result<()> {
        let install_dir = self.install_dir();
        remove_path(&install_dir)?;
        self.project.setup()?;
        std::fs::create_dir_all(&install_dir)
            .with_context(|| format!("creating {}", install_dir.display()))?;

        let archive = ensure_downloaded(&self.package, &self.project)?;
        extract_archive(&archive, &install_dir)?;

        Ok(())
    }
}
