// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Building CPython from a source release.

The build writes `Modules/Setup.local` from the extension configuration,
runs `configure`, `make` and `make install`, prunes the installation and
finally zips the pure-Python standard library into `lib/pythonXY.zip`.
*/

use {
    super::{dependencies::python_dependencies, ensure_downloaded, extract_fresh, Builder, SourcePackage},
    crate::{
        environment::{Platform, DEFAULT_PYTHON_VERSION},
        project_layout::Project,
        setup_config::{BuildType, BuildVariant, SetupConfig, SizeType},
        shell::{capture, env_flag, pip_install_command, run, Command},
    },
    anyhow::{Context, Result},
    buildpy_common::{
        archive::write_zip_from_directory,
        fs::{glob_remove, move_path, remove_path, set_executable, walk_matching},
    },
    log::{debug, error, info, warn},
    md5::{Digest, Md5},
    std::path::{Path, PathBuf},
};

/// File name patterns pruned from an installed standard library.
pub const REMOVE_PATTERNS: &[&str] = &[
    "*.exe",
    "*config-3*",
    "*tcl*",
    "*tdbc*",
    "*tk*",
    "__phello__",
    "__pycache__",
    "_codecs_*.so",
    "_test*",
    "_tk*",
    "_xx*.so",
    "distutils",
    "idlelib",
    "lib2to3",
    "libpython*",
    "LICENSE.txt",
    "pkgconfig",
    "pydoc_data",
    "site-packages",
    "test",
    "Tk*",
    "turtle*",
    "venv",
    "xx*.so",
];

const CONFIGURE_OPTIONS: &[&str] = &["--disable-test-modules"];

const DEBUG_CONFIGURE_OPTIONS: &[&str] = &[
    "--disable-test-modules",
    "--without-static-libpython",
    "--with-pydebug",
];

/// Settings of a Python build.
#[derive(Clone, Debug)]
pub struct PythonBuildOptions {
    pub variant: BuildVariant,
    /// Compile the standard library to bytecode before zipping it.
    pub precompile: bool,
    /// Pass `--enable-optimizations` to configure.
    pub optimize: bool,
    /// `compileall` optimization level, -1 through 2.
    pub optimize_bytecode: i32,
    /// Packages to install into the finished build.
    pub pkgs: Vec<String>,
    /// Extra configure options, written without the leading `--`.
    pub cfg_opts: Vec<String>,
    pub jobs: usize,
    /// Install into `support/` instead of `build/install`.
    pub is_package: bool,
    pub install_dir: Option<PathBuf>,
    pub skip_ziplib: bool,
    pub skip_pkg_install: bool,
    /// Build a debug interpreter.
    pub debug: bool,
}

impl Default for PythonBuildOptions {
    fn default() -> Self {
        Self {
            variant: BuildVariant::new(BuildType::Shared, SizeType::Max),
            precompile: true,
            optimize: false,
            optimize_bytecode: -1,
            pkgs: vec![],
            cfg_opts: vec![],
            jobs: 1,
            is_package: false,
            install_dir: None,
            skip_ziplib: false,
            skip_pkg_install: false,
            debug: false,
        }
    }
}

/// Builds CPython on Unix-like platforms.
#[derive(Clone, Debug)]
pub struct PythonBuilder {
    package: SourcePackage,
    project: Project,
    platform: Platform,
    options: PythonBuildOptions,
    install_dir: PathBuf,
}

impl PythonBuilder {
    pub fn new(version: &str, project: Project, options: PythonBuildOptions) -> Self {
        let install_dir = match (&options.install_dir, options.is_package) {
            (Some(dir), _) => dir.clone(),
            (None, true) => project.support.clone(),
            (None, false) => project.install.clone(),
        };

        Self {
            package: SourcePackage::new(
                "Python",
                version,
                "https://github.com/python/cpython.git",
                "Python-{ver}.tar.xz",
                "https://www.python.org/ftp/python/{ver}/{archive}",
                &[],
            ),
            project,
            platform: Platform::current(),
            options,
            install_dir,
        }
    }

    /// Builder for the default Python version.
    pub fn with_defaults(project: Project) -> Self {
        Self::new(DEFAULT_PYTHON_VERSION, project, PythonBuildOptions::default())
    }

    /// Target another platform's layout.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn options(&self) -> &PythonBuildOptions {
        &self.options
    }

    pub fn version(&self) -> &str {
        &self.package.version
    }

    /// `X.Y` version.
    pub fn ver(&self) -> String {
        self.package.ver()
    }

    pub fn variant(&self) -> BuildVariant {
        self.options.variant
    }

    pub fn build_type(&self) -> BuildType {
        self.options.variant.build_type
    }

    pub fn size_type(&self) -> SizeType {
        self.options.variant.size_type
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn pkgs(&self) -> &[String] {
        &self.options.pkgs
    }

    /// Extension configuration for this version and variant.
    pub fn config(&self) -> Result<SetupConfig> {
        let mut config = SetupConfig::for_version(self.version(), self.platform, self.build_type())?;
        config.apply_variant(self.variant())?;

        Ok(config)
    }

    /// Options passed to `configure` after `--prefix`.
    pub fn configure_options(&self) -> Vec<String> {
        let base = if self.options.debug {
            DEBUG_CONFIGURE_OPTIONS
        } else {
            CONFIGURE_OPTIONS
        };
        let mut options = base.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let mut add = |option: String| {
            if !options.contains(&option) {
                options.push(option);
            }
        };

        match self.build_type() {
            BuildType::Static => {}
            BuildType::Shared => {
                add("--enable-shared".to_string());
                add("--without-static-libpython".to_string());
            }
            BuildType::Framework => {
                add(format!("--enable-framework={}", self.install_dir.display()));
            }
        }

        if self.options.optimize {
            add("--enable-optimizations".to_string());
        }

        if self.options.pkgs.is_empty() {
            add("--without-ensurepip".to_string());
        }

        for cfg_opt in &self.options.cfg_opts {
            add(format!("--{}", cfg_opt.replace('_', "-")));
        }

        options
    }

    /// Patterns pruned from the installed standard library.
    pub fn remove_patterns(&self) -> Vec<&'static str> {
        let mut patterns = REMOVE_PATTERNS.to_vec();
        if self.options.pkgs.is_empty() {
            patterns.push("ensurepip");
        }

        patterns
    }

    /// The installed standard library: `lib/pythonX.Y`, or `Lib` on Windows.
    pub fn stdlib_dir(&self) -> PathBuf {
        match self.platform {
            Platform::Windows => self.prefix().join("Lib"),
            _ => self.prefix().join("lib").join(self.package.name_ver()),
        }
    }

    /// The zipped standard library, `lib/pythonXY.zip`.
    ///
    /// Windows keeps the zip next to the interpreter.
    pub fn zip_path(&self) -> PathBuf {
        let name = format!("{}.zip", self.package.name_ver_nodot());

        match self.platform {
            Platform::Windows => self.prefix().join(name),
            _ => self.prefix().join("lib").join(name),
        }
    }

    pub fn python(&self) -> PathBuf {
        self.executable()
    }

    pub fn pip(&self) -> PathBuf {
        match self.platform {
            Platform::Windows => self.prefix().join("pip.exe"),
            _ => self.prefix().join("bin").join("pip3"),
        }
    }

    /// Install name that lets an embedding binary find the framework.
    ///
    /// Embedding apps are expected in `install/Resources` for default builds
    /// and in the project root otherwise.
    pub fn compute_loader_path(&self) -> String {
        let ver = self.ver();

        match self.install_dir.strip_prefix(&self.project.root) {
            Ok(_) if self.install_dir == self.project.install => {
                format!("@loader_path/../Python.framework/Versions/{}/Python", ver)
            }
            Ok(rel) => format!(
                "@loader_path/{}/Python.framework/Versions/{}/Python",
                rel.display(),
                ver
            ),
            Err(e) => {
                warn!(
                    "could not compute relative loader_path: {}, using absolute path",
                    e
                );
                self.install_dir
                    .join("Python.framework")
                    .join("Versions")
                    .join(ver)
                    .join("Python")
                    .display()
                    .to_string()
            }
        }
    }

    /// Point shared library references at paths relative to the binaries.
    pub fn make_relocatable(&self) -> Result<()> {
        let cwd = self.project.root.as_path();
        let exe = self.prefix().join("bin").join(self.package.name_ver());

        match (self.platform, self.build_type()) {
            (Platform::Darwin, BuildType::Shared) => {
                let dylib_name = self.dylib_name()?;
                let dylib = self.prefix().join("lib").join(&dylib_name);
                set_executable(&dylib, 0o755)?;

                run(
                    &Command::Args(vec![
                        "install_name_tool".to_string(),
                        "-id".to_string(),
                        format!("@loader_path/../Resources/lib/{}", dylib_name),
                        dylib.display().to_string(),
                    ]),
                    cwd,
                )?;
                run(
                    &install_name_change(&dylib, &format!("@executable_path/../lib/{}", dylib_name), &exe),
                    cwd,
                )?;
            }
            (Platform::Darwin, BuildType::Framework) => {
                let dylib = self.prefix().join(&self.package.name);
                set_executable(&dylib, 0o755)?;

                let id = match self.config()?.install_name_id {
                    Some(id) => id,
                    None => self.compute_loader_path(),
                };
                run(
                    &Command::Args(vec![
                        "install_name_tool".to_string(),
                        "-id".to_string(),
                        id,
                        dylib.display().to_string(),
                    ]),
                    cwd,
                )?;

                run(&install_name_change(&dylib, "@executable_path/../Python", &exe), cwd)?;

                let app = self
                    .prefix()
                    .join("Resources")
                    .join("Python.app")
                    .join("Contents")
                    .join("MacOS")
                    .join("Python");
                run(
                    &install_name_change(&dylib, "@executable_path/../../../../Python", &app),
                    cwd,
                )?;
            }
            (Platform::Linux, BuildType::Shared) => {
                run(
                    &Command::Args(vec![
                        "patchelf".to_string(),
                        "--set-rpath".to_string(),
                        "$ORIGIN/../lib".to_string(),
                        exe.display().to_string(),
                    ]),
                    cwd,
                )?;
            }
            _ => {}
        }

        Ok(())
    }

    /// Smoke test the installed interpreter.
    pub fn validate_build(&self) -> bool {
        let exe = self.executable();
        if !exe.exists() {
            error!("python executable not found: {}", exe.display());
            return false;
        }

        match capture(
            &Command::Args(vec![exe.display().to_string(), "--version".to_string()]),
            &self.project.root,
        ) {
            Ok(version) => {
                info!("python version: {}", version);
                true
            }
            Err(e) => {
                error!("build validation failed: {}", e);
                false
            }
        }
    }

    /// Short identifier of the version, build type and variant.
    pub fn build_cache_key(&self) -> String {
        let key = format!("{}:{}:{}", self.version(), self.build_type(), self.variant());

        hex::encode(Md5::digest(key.as_bytes()))[..8].to_string()
    }

    fn is_build_cached(&self) -> Result<bool> {
        let library = match self.build_type() {
            BuildType::Static => self.staticlib(),
            _ => self.dylib()?,
        };

        if !library.exists() || !self.executable().exists() {
            return Ok(false);
        }

        info!(
            "found cached build for Python {} ({}) [{}]",
            self.version(),
            self.build_type(),
            self.build_cache_key()
        );

        Ok(true)
    }

    /// Whether any part of the build still has to run.
    pub fn can_run(&self) -> Result<bool> {
        for dep in python_dependencies(&self.project) {
            if !dep.lib_products_exist() {
                debug!("dependency {} not built", dep.package().name);
                return Ok(true);
            }
        }

        if self.is_build_cached()? {
            return Ok(false);
        }

        debug!("build artifacts not found or incomplete");
        Ok(true)
    }

    /// Zip the standard library into `lib/pythonXY.zip`.
    ///
    /// `lib-dynload` and the `os` module stay on disk since the interpreter
    /// needs them before it can import from a zip file.
    pub fn ziplib(&self) -> Result<()> {
        let src = self.stdlib_dir();
        let should_compile = self.options.precompile || env_flag("PRECOMPILE", false)?;

        let dynload = src.join("lib-dynload");
        let dynload_parked = self.project.build.join("lib-dynload");
        if dynload.exists() {
            remove_path(&dynload_parked)?;
            move_path(&dynload, &dynload_parked)?;
        }

        if should_compile {
            precompile_dir(&self.executable(), &src, &src, self.options.optimize_bytecode)?;
        }

        let os_module = if should_compile { "os.pyc" } else { "os.py" };
        let os_parked = self.project.build.join(os_module);
        remove_path(&os_parked)?;
        move_path(&src.join(os_module), &os_parked)
            .with_context(|| format!("preserving {}", os_module))?;

        zip_stdlib(&src, &self.zip_path())?;

        remove_path(&self.prefix().join("lib").join("pkgconfig"))?;
        std::fs::create_dir_all(src.join("site-packages"))
            .with_context(|| format!("recreating {}", src.display()))?;

        if dynload_parked.exists() {
            move_path(&dynload_parked, &dynload)?;
        }
        move_path(&os_parked, &src.join(os_module))?;

        Ok(())
    }

    /// Install the requested packages with the freshly built pip.
    pub fn install_pkgs(&self) -> Result<()> {
        run(
            &Command::Args(vec![
                self.python().display().to_string(),
                "-m".to_string(),
                "ensurepip".to_string(),
            ]),
            &self.project.root,
        )?;
        run(
            &pip_install_command(&self.options.pkgs, None, false, Some(&self.pip())),
            &self.project.root,
        )
    }
}

fn install_name_change(old: &Path, new: &str, target: &Path) -> Command {
    Command::Args(vec![
        "install_name_tool".to_string(),
        "-change".to_string(),
        old.display().to_string(),
        new.to_string(),
        target.display().to_string(),
    ])
}

/// Compile a library tree to bytecode next to the sources, then delete the
/// sources.
///
/// `target` is passed to `compileall` and resolved relative to `cwd`.
pub(crate) fn precompile_dir(python: &Path, lib: &Path, target: &Path, level: i32) -> Result<()> {
    let cwd = lib.parent().unwrap_or(lib);
    run(
        &Command::Args(vec![
            python.display().to_string(),
            "-m".to_string(),
            "compileall".to_string(),
            "-f".to_string(),
            "-b".to_string(),
            "-o".to_string(),
            level.to_string(),
            target.display().to_string(),
        ]),
        cwd,
    )?;

    walk_matching(
        lib,
        &[],
        &|p: &Path| p.is_file() && p.extension().map(|e| e == "py").unwrap_or(false),
        &mut |p: &Path| remove_path(p),
    )?;

    Ok(())
}

/// Write a directory to a zip file and delete the directory.
pub(crate) fn zip_stdlib(src: &Path, zip_path: &Path) -> Result<()> {
    remove_path(zip_path)?;
    let count = write_zip_from_directory(src, zip_path)
        .with_context(|| format!("zipping {}", src.display()))?;
    info!("zipped {} files into {}", count, zip_path.display());

    remove_path(src)?;

    Ok(())
}

impl Builder for PythonBuilder {
    fn package(&self) -> &SourcePackage {
        &self.package
    }

    fn project(&self) -> &Project {
        &self.project
    }

    fn platform(&self) -> Platform {
        self.platform
    }

    fn prefix(&self) -> PathBuf {
        if self.platform == Platform::Windows {
            return self.install_dir.clone();
        }

        if self.platform == Platform::Darwin && self.build_type() == BuildType::Framework {
            return self
                .install_dir
                .join("Python.framework")
                .join("Versions")
                .join(self.ver());
        }

        if self.install_dir != self.project.install {
            return self.install_dir.clone();
        }

        self.project.install.join(format!(
            "{}-{}",
            self.package.name.to_lowercase(),
            self.build_type()
        ))
    }

    fn executable(&self) -> PathBuf {
        match self.platform {
            Platform::Windows => self.prefix().join("python.exe"),
            _ => self.prefix().join("bin").join("python3"),
        }
    }

    fn libname(&self) -> String {
        match self.platform {
            Platform::Windows => self.package.name_ver_nodot(),
            _ => format!("lib{}", self.package.name_ver()),
        }
    }

    fn dylib(&self) -> Result<PathBuf> {
        let name = self.dylib_name()?;

        match self.platform {
            Platform::Windows => Ok(self.prefix().join(name)),
            _ => Ok(self.prefix().join("lib").join(name)),
        }
    }

    /// Always start from a fresh source tree.
    fn setup(&self) -> Result<()> {
        self.project.setup()?;
        let archive = ensure_downloaded(&self.package, &self.project)?;

        extract_fresh(&archive, &self.src_dir(), &self.project)
    }

    fn configure(&self) -> Result<()> {
        info!(
            "configuring Python {} ({} build)...",
            self.version(),
            self.build_type()
        );

        let src_dir = self.src_dir();
        self.config()?
            .write_setup_local(&src_dir.join("Modules").join("Setup.local"))?;

        let mut args = vec![
            "./configure".to_string(),
            format!("--prefix={}", self.prefix().display()),
        ];
        args.extend(self.configure_options());

        run(&Command::Args(args), &src_dir)
    }

    fn build(&self) -> Result<()> {
        info!(
            "building Python {} (using {} jobs)...",
            self.version(),
            self.options.jobs
        );
        run(
            &Command::Args(vec!["make".to_string(), format!("-j{}", self.options.jobs)]),
            &self.src_dir(),
        )?;
        info!("Python {} build complete", self.version());

        Ok(())
    }

    fn install(&self) -> Result<()> {
        remove_path(&self.prefix())?;
        run(&Command::args(["make", "install"]), &self.src_dir())
    }

    fn clean(&self) -> Result<()> {
        let stdlib = self.stdlib_dir();
        if stdlib.is_dir() {
            let removed = glob_remove(&stdlib, &self.remove_patterns(), &[".git"])?;
            debug!("removed {} entries from {}", removed.len(), stdlib.display());
        }

        let ver = self.ver();
        let bin = self.prefix().join("bin");
        for name in [
            "2to3".to_string(),
            "idle3".to_string(),
            format!("idle{}", ver),
            "pydoc3".to_string(),
            format!("pydoc{}", ver),
            format!("2to3-{}", ver),
        ] {
            remove_path(&bin.join(name))?;
        }

        Ok(())
    }

    fn post_process(&self) -> Result<()> {
        if matches!(self.build_type(), BuildType::Shared | BuildType::Framework) {
            self.make_relocatable()?;
        }

        if !self.validate_build() {
            warn!("build validation failed, but continuing");
        }

        info!("{} DONE", self.variant());

        Ok(())
    }

    fn process(&self) -> Result<()> {
        if !self.can_run()? {
            info!("everything built: skipping run");
            return Ok(());
        }

        info!("found unbuilt dependencies, proceeding with run");
        for dep in python_dependencies(&self.project) {
            dep.process()?;
        }

        self.pre_process()?;
        self.setup()?;
        self.configure()?;
        self.build()?;
        self.install()?;
        self.clean()?;

        if self.options.skip_ziplib {
            info!("skipping ziplib (--skip-ziplib specified)");
        } else {
            self.ziplib()?;
        }

        if !self.options.pkgs.is_empty() && !self.options.skip_pkg_install {
            self.install_pkgs()?;
        }

        self.post_process()
    }
}
