// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Shrinking a finished build to what a set of packages needs.

A reduction manifest lists the extension modules and pure Python parts of
the standard library that analyzed packages never import. Applying it
deletes the matching files from an installation, after the build and
before the standard library is zipped.
*/

use {
    crate::{
        analysis::{analyze_package_deps, AnalysisResult},
        builders::{Builder, PythonBuildOptions, PythonBuilder},
        setup_config::{BuildType, BuildVariant, SizeType},
        shell::{run_within, Command, TimedOutcome},
    },
    anyhow::{Context, Result},
    buildpy_common::fs::{copy_tree_preserving_symlinks, directory_size, move_path, remove_path},
    log::{debug, warn},
    python_import_scan::{
        module_util::import_name_from_requirement,
        stdlib::{is_core_module, STDLIB_MODULE_PATHS},
    },
    serde::{Deserialize, Serialize},
    std::{
        collections::BTreeSet,
        path::{Component, Path, PathBuf},
        time::Duration,
    },
};

/// Default file name of a manifest written by [auto_configure].
pub const DEFAULT_MANIFEST_NAME: &str = "reduction-manifest.json";

const MANIFEST_VERSION: &str = "1.0";

/// Stdlib entries that are kept regardless of the analysis.
const ALWAYS_KEPT: &[&str] = &["ensurepip", "pip", "setuptools"];

/// `site-packages` entries dropped after packages are installed.
const INSTALLER_PATTERNS: &[&str] = &["pip", "pip-*", "setuptools", "setuptools-*", "_distutils_hack"];

const IMPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// What to delete from an installation.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Reductions {
    pub extensions_to_remove: Vec<String>,
    /// File name patterns matched in `lib-dynload`.
    pub extension_patterns: Vec<String>,
    /// Paths relative to the standard library directory.
    pub stdlib_to_remove: Vec<String>,
}

impl Reductions {
    pub fn from_analysis(result: &AnalysisResult) -> Self {
        let extensions_to_remove = result
            .potentially_unused
            .iter()
            .filter(|name| !is_core_module(name))
            .cloned()
            .collect::<Vec<_>>();

        let extension_patterns = extensions_to_remove
            .iter()
            .flat_map(|name| [format!("{}.cpython-*.so", name), format!("{}.*.so", name)])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let stdlib_to_remove = STDLIB_MODULE_PATHS
            .iter()
            .filter(|(module, _)| {
                !result.stdlib_imports.contains(*module) && !ALWAYS_KEPT.contains(module)
            })
            .flat_map(|(_, paths)| paths.iter().map(|p| p.to_string()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Self {
            extensions_to_remove,
            extension_patterns,
            stdlib_to_remove,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct ManifestAnalysis {
    pub required_extensions: Vec<String>,
    pub stdlib_imports: Vec<String>,
    pub third_party: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ManifestWarning {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub modules: Vec<String>,
}

/// A reduction manifest as written to disk.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct ReductionManifest {
    pub version: String,
    pub python_version: String,
    pub config: String,
    pub packages_analyzed: Vec<String>,
    pub analysis: ManifestAnalysis,
    pub reductions: Reductions,
    pub warnings: Vec<ManifestWarning>,
}

impl ReductionManifest {
    pub fn new(builder: &PythonBuilder, result: &AnalysisResult) -> Self {
        let mut warnings = vec![];
        if !result.needed_but_disabled.is_empty() {
            warnings.push(ManifestWarning {
                kind: "required_but_disabled".to_string(),
                message: "These modules are required but disabled in current config".to_string(),
                modules: result.needed_but_disabled.iter().cloned().collect(),
            });
        }

        Self {
            version: MANIFEST_VERSION.to_string(),
            python_version: builder.version().to_string(),
            config: builder.variant().to_string(),
            packages_analyzed: builder.pkgs().to_vec(),
            analysis: ManifestAnalysis {
                required_extensions: result.required_extensions.iter().cloned().collect(),
                stdlib_imports: result.stdlib_imports.iter().cloned().collect(),
                third_party: result.third_party.iter().cloned().collect(),
            },
            reductions: Reductions::from_analysis(result),
            warnings,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;

        serde_json::from_slice(&data).with_context(|| format!("parsing {}", path.display()))
    }

    /// Write the manifest as JSON, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }

        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data).with_context(|| format!("writing {}", path.display()))
    }
}

/// Tally of a reduction pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ReductionStats {
    pub extensions_removed: usize,
    pub stdlib_removed: usize,
    pub bytes_saved: u64,
}

impl ReductionStats {
    pub fn megabytes_saved(&self) -> f64 {
        self.bytes_saved as f64 / 1024.0 / 1024.0
    }
}

/// A manifest stdlib entry as a path relative to the library directory.
///
/// Entries with a root, `.` or `..` components are rejected.
fn stdlib_relative(entry: &str) -> Option<PathBuf> {
    let path = Path::new(entry.trim_end_matches('/'));

    let normal = path
        .components()
        .all(|c| matches!(c, Component::Normal(_)));

    if normal && path.components().next().is_some() {
        Some(path.to_path_buf())
    } else {
        None
    }
}

/// Delete the files named by `reductions` from a standard library directory.
pub fn remove_reduced_files(stdlib_dir: &Path, reductions: &Reductions) -> Result<ReductionStats> {
    let mut stats = ReductionStats::default();

    let dynload = stdlib_dir.join("lib-dynload");
    if dynload.is_dir() {
        let patterns = reductions
            .extension_patterns
            .iter()
            .map(|p| glob::Pattern::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries = std::fs::read_dir(&dynload)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort();

        for path in entries.into_iter().filter(|p| p.is_file()) {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            if patterns.iter().any(|p| p.matches(&name)) {
                let size = directory_size(&path);
                remove_path(&path)?;
                debug!("removed extension: {} ({} bytes)", name, size);
                stats.extensions_removed += 1;
                stats.bytes_saved += size;
            }
        }
    }

    for rel in &reductions.stdlib_to_remove {
        let target = match stdlib_relative(rel) {
            Some(rel) => stdlib_dir.join(rel),
            None => {
                warn!("ignoring stdlib entry outside the library directory: {}", rel);
                continue;
            }
        };
        if !target.exists() {
            continue;
        }

        let size = directory_size(&target);
        remove_path(&target)?;
        debug!("removed {} ({} bytes)", rel, size);
        stats.stdlib_removed += 1;
        stats.bytes_saved += size;
    }

    Ok(stats)
}

/// Analyze the configured packages and write a reduction manifest.
///
/// Returns the manifest path, or `None` when there was nothing to analyze.
pub fn auto_configure(builder: &PythonBuilder, output: Option<&Path>) -> Result<Option<PathBuf>> {
    println!("\n{}", "=".repeat(70));
    println!("GENERATING REDUCTION MANIFEST");
    println!("{}", "=".repeat(70));

    match analyze_package_deps(builder, true)? {
        Some(result) => Ok(Some(write_reduction_manifest(builder, &result, output)?)),
        None => Ok(None),
    }
}

/// Write the manifest for an analysis and print a summary of it.
///
/// `output` defaults to `reduction-manifest.json` in the working directory.
pub fn write_reduction_manifest(
    builder: &PythonBuilder,
    result: &AnalysisResult,
    output: Option<&Path>,
) -> Result<PathBuf> {
    let output = match output {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir()?.join(DEFAULT_MANIFEST_NAME),
    };

    let manifest = ReductionManifest::new(builder, result);
    manifest.write(&output)?;

    let reductions = &manifest.reductions;
    println!("\n[Analysis Summary]");
    println!("  Packages analyzed:     {}", builder.pkgs().len());
    println!("  Required extensions:   {}", result.required_extensions.len());
    println!("  Removable extensions:  {}", reductions.extensions_to_remove.len());
    println!("  Removable stdlib dirs: {}", reductions.stdlib_to_remove.len());

    if !result.needed_but_disabled.is_empty() {
        println!("\n[WARNING] Required modules are DISABLED in config:");
        for name in &result.needed_but_disabled {
            println!("    {}", name);
        }
        println!("  Consider using a config that enables these modules.");
    }

    print_truncated(
        "Removable Extensions",
        &reductions.extensions_to_remove,
        15,
    );
    print_truncated("Removable Stdlib", &reductions.stdlib_to_remove, 10);

    let variant = builder.variant();
    let manifest_path = output.display();
    println!("\n[Output]");
    println!("  Manifest: {}", manifest_path);

    println!("\n[Next Steps]");
    println!("  1. Build Python without zipping stdlib:");
    println!("       buildpy -c {} --skip-ziplib", variant);
    println!("  2. Apply reductions to the build:");
    println!("       buildpy --apply-reductions {}", manifest_path);
    println!("  3. Compress the reduced stdlib:");
    println!("       buildpy --ziplib");
    println!("  Or apply to a copy for testing:");
    println!(
        "       buildpy --apply-reductions {} --reduction-copy build/reduced",
        manifest_path
    );
    println!("       buildpy --ziplib --install-dir build/reduced");
    println!("\n{}", "=".repeat(70));

    Ok(output)
}

fn print_truncated(title: &str, items: &[String], limit: usize) {
    println!("\n[{}] ({})", title, items.len());
    for item in items.iter().take(limit) {
        println!("    {}", item);
    }
    if items.len() > limit {
        println!("    ... and {} more", items.len() - limit);
    }
}

/// Whether every top-level entry of the stdlib other than `lib-dynload`
/// and `site-packages` is gone, as after zipping.
fn stdlib_looks_zipped(stdlib_dir: &Path) -> Result<bool> {
    for entry in std::fs::read_dir(stdlib_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if entry.file_type()?.is_dir()
            && !matches!(
                name.to_string_lossy().as_ref(),
                "lib-dynload" | "site-packages" | "__pycache__"
            )
        {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Apply a manifest to the build of `builder`, or to a copy of it.
///
/// Returns the prefix that was reduced, or `None` when the manifest or the
/// standard library could not be found.
pub fn apply_reductions(
    builder: &PythonBuilder,
    manifest_path: &Path,
    copy_to: Option<&Path>,
) -> Result<Option<PathBuf>> {
    if !manifest_path.exists() {
        println!("Error: Manifest file not found: {}", manifest_path.display());
        return Ok(None);
    }
    let manifest = ReductionManifest::from_path(manifest_path)?;

    println!("\n{}", "=".repeat(70));
    println!("APPLYING REDUCTIONS");
    println!("{}", "=".repeat(70));

    let prefix = builder.prefix();
    let target = match copy_to {
        Some(dest) => {
            println!("\n[Copying Build]");
            println!("  Source: {}", prefix.display());
            println!("  Target: {}", dest.display());
            if dest.exists() {
                println!("  Removing existing target directory...");
                remove_path(dest)?;
            }
            copy_tree_preserving_symlinks(&prefix, dest)?;
            println!("  Copy complete.");
            dest.to_path_buf()
        }
        None => {
            println!("\n[Target Build]");
            println!("  {}", prefix.display());
            prefix.clone()
        }
    };

    let stdlib_dir = relocate(&builder.stdlib_dir(), &prefix, &target);
    if !stdlib_dir.exists() {
        println!("Error: Library directory not found: {}", stdlib_dir.display());
        return Ok(None);
    }

    let zip_path = relocate(&builder.zip_path(), &prefix, &target);
    if zip_path.exists() && stdlib_looks_zipped(&stdlib_dir)? {
        println!("\n[WARNING] Stdlib appears to be zipped already!");
        println!("  Found: {}", zip_path.display());
        println!("  Stdlib reductions will have no effect on zipped content.");
        println!("  Rebuild with --skip-ziplib to apply stdlib reductions.");
        println!("  Extension reductions may still work if using shared builds.");
    }

    let stats = remove_reduced_files(&stdlib_dir, &manifest.reductions)?;

    println!("\n[Removing Extensions]");
    println!("  Removed {} extension files", stats.extensions_removed);
    println!("\n[Removing Stdlib Modules]");
    println!("  Removed {} stdlib modules/directories", stats.stdlib_removed);

    println!("\n[Summary]");
    println!("  Extensions removed: {}", stats.extensions_removed);
    println!("  Stdlib removed:     {}", stats.stdlib_removed);
    println!("  Space saved:        {:.2} MB", stats.megabytes_saved());
    println!("  Reduced build at:   {}", target.display());

    println!("\n[Testing]");
    println!(
        "  Test with: {} -c \"import sys; print(sys.version)\"",
        relocate(&builder.executable(), &prefix, &target).display()
    );
    println!("\n{}", "=".repeat(70));

    Ok(Some(target))
}

/// Map a path under `from` to the same place under `to`.
fn relocate(path: &Path, from: &Path, to: &Path) -> PathBuf {
    match path.strip_prefix(from) {
        Ok(rel) => to.join(rel),
        Err(_) => path.to_path_buf(),
    }
}

fn derived_builder(builder: &PythonBuilder, options: PythonBuildOptions) -> PythonBuilder {
    PythonBuilder::new(builder.version(), builder.project().clone(), options)
        .with_platform(builder.platform())
}

/// Render the verification result of importing one package.
///
/// Failures show the last line of stderr, usually the exception.
fn verification_report(import_name: &str, outcome: &TimedOutcome) -> String {
    match outcome {
        TimedOutcome::Success => format!("  import {}: OK\n", import_name),
        TimedOutcome::Failed(stderr) => format!(
            "  import {}: FAILED\n    {}\n",
            import_name,
            stderr.lines().last().unwrap_or("")
        ),
        TimedOutcome::TimedOut => format!("  import {}: TIMEOUT\n", import_name),
    }
}

/// Analyze, build, reduce and compress in one go.
///
/// A `shared_vanilla` build is cached in `install/python-shared-vanilla` and
/// copied to `install/python-shared-reduced`, where the configured packages
/// are installed and everything they do not import is removed. Returns
/// whether every package could be imported from the reduced build.
pub fn auto_reduce(builder: &PythonBuilder) -> Result<bool> {
    println!("\n{}", "=".repeat(70));
    println!("AUTO-REDUCE WORKFLOW");
    println!("{}", "=".repeat(70));

    let pkgs = builder.pkgs().to_vec();
    if pkgs.is_empty() {
        println!("\nError: --auto-reduce requires packages to analyze.");
        println!("       Use -i/--install to specify packages, e.g.:");
        println!("       buildpy -i ipython --auto-reduce");
        return Ok(false);
    }

    let vanilla = BuildVariant::new(BuildType::Shared, SizeType::Vanilla);
    let project = builder.project();

    println!("\n[Step 1/6] Analyzing package dependencies...");
    let analyzer = derived_builder(
        builder,
        PythonBuildOptions {
            variant: vanilla,
            ..builder.options().clone()
        },
    );
    let result = match analyze_package_deps(&analyzer, false)? {
        Some(result) => result,
        None => {
            println!("Error: Dependency analysis failed.");
            return Ok(false);
        }
    };
    println!("  Packages: {}", pkgs.join(", "));
    println!("  Required extensions: {}", result.required_extensions.len());
    println!("  Potentially unused: {}", result.potentially_unused.len());
    let reductions = Reductions::from_analysis(&result);

    println!("\n[Step 2/6] Preparing vanilla build...");
    let vanilla_cache = project.install.join("python-shared-vanilla");
    let reduced_prefix = project.install.join("python-shared-reduced");

    if vanilla_cache.exists() {
        println!("  Using cached vanilla build: {}", vanilla_cache.display());
    } else {
        println!("  Building vanilla cache (first time only)...");
        println!("  (All modules built as shared extensions)");

        let cache_builder = derived_builder(
            builder,
            PythonBuildOptions {
                variant: vanilla,
                install_dir: Some(vanilla_cache.clone()),
                skip_ziplib: true,
                skip_pkg_install: true,
                ..builder.options().clone()
            },
        );
        if let Err(e) = cache_builder.process() {
            println!("\nError during build: {:#}", e);
            return Ok(false);
        }
    }

    println!("  Copying to: {}", reduced_prefix.display());
    remove_path(&reduced_prefix)?;
    copy_tree_preserving_symlinks(&vanilla_cache, &reduced_prefix)?;

    let reduced = derived_builder(
        builder,
        PythonBuildOptions {
            variant: vanilla,
            install_dir: Some(reduced_prefix.clone()),
            ..builder.options().clone()
        },
    );
    let stdlib_dir = reduced.stdlib_dir();
    let site_packages = stdlib_dir.join("site-packages");

    println!("\n[Step 3/6] Installing packages...");
    println!("  Packages: {}", pkgs.join(", "));
    reduced.install_pkgs()?;

    println!("  Moving packages to temp (extensions can't be in zips)...");
    let pkg_temp = project.build.join("pkg_temp");
    remove_path(&pkg_temp)?;
    let parked = if site_packages.exists() {
        move_path(&site_packages, &pkg_temp)?;
        println!("  Moved to: {}", pkg_temp.display());
        true
    } else {
        warn!("site-packages not found at {}", site_packages.display());
        false
    };
    std::fs::create_dir_all(&site_packages)
        .with_context(|| format!("creating {}", site_packages.display()))?;

    println!("\n[Step 4/6] Applying reductions...");
    let stats = remove_reduced_files(&stdlib_dir, &reductions)?;
    println!("  Extensions removed: {}", stats.extensions_removed);
    println!("  Stdlib removed: {}", stats.stdlib_removed);
    println!("  Space saved: {:.2} MB", stats.megabytes_saved());

    println!("\n[Step 5/6] Compressing stdlib...");
    reduced.ziplib()?;

    if parked && pkg_temp.exists() {
        println!("\n[Step 6/6] Restoring packages to site-packages...");
        println!("  Source: {}", pkg_temp.display());
        remove_path(&site_packages)?;
        copy_tree_preserving_symlinks(&pkg_temp, &site_packages)?;
        remove_path(&pkg_temp)?;

        for pattern in INSTALLER_PATTERNS {
            for entry in glob::glob(&site_packages.join(pattern).display().to_string())? {
                remove_path(&entry?)?;
            }
        }

        let mut restored = std::fs::read_dir(&site_packages)?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|name| !name.starts_with('.'))
            .collect::<Vec<_>>();
        restored.sort();
        println!("  Packages restored: {}", restored.join(", "));
    } else {
        println!("\n[Step 6/6] WARNING: No packages to restore (pkg_temp missing)");
    }

    println!("\n{}", "=".repeat(70));
    println!("AUTO-REDUCE COMPLETE");
    println!("{}", "=".repeat(70));
    println!("\n  Python version:     {}", builder.version());
    println!("  Packages analyzed:  {}", pkgs.join(", "));
    println!("  Extensions removed: {}", stats.extensions_removed);
    println!("  Stdlib removed:     {}", stats.stdlib_removed);
    println!("  Space saved:        {:.2} MB", stats.megabytes_saved());
    println!("  Vanilla cache:      {}", vanilla_cache.display());
    println!("  Reduced build:      {}", reduced_prefix.display());

    println!("\n[Verification]");
    let python = reduced.python();
    let mut passed = true;
    for pkg in &pkgs {
        let import_name = import_name_from_requirement(pkg);
        let command = Command::Args(vec![
            python.display().to_string(),
            "-c".to_string(),
            format!("import {}", import_name),
        ]);

        match run_within(&command, &project.root, IMPORT_TIMEOUT) {
            Ok(outcome) => {
                print!("{}", verification_report(&import_name, &outcome));
                passed &= outcome.success();
            }
            Err(e) => {
                println!("  import {}: ERROR ({})", import_name, e);
                passed = false;
            }
        }
    }

    if !passed {
        println!("\n  WARNING: Some imports failed. The build may be missing required modules.");
    }
    println!("\n{}", "=".repeat(70));

    Ok(passed)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{environment::Platform, project_layout::Project},
    };

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn analysis() -> AnalysisResult {
        AnalysisResult {
            stdlib_imports: names(&["json", "email", "os"]),
            third_party: names(&["urllib3"]),
            required_extensions: names(&["_json"]),
            needed_but_disabled: names(&["_lzma"]),
            potentially_unused: names(&["_curses", "_sqlite3", "zlib"]),
            files_analyzed: 4,
        }
    }

    fn builder(root: &Path) -> PythonBuilder {
        PythonBuilder::new(
            "3.12.12",
            Project::new(root),
            PythonBuildOptions {
                pkgs: vec!["urllib3".to_string()],
                ..Default::default()
            },
        )
        .with_platform(Platform::Linux)
    }

    #[test]
    fn test_reductions_from_analysis() {
        let reductions = Reductions::from_analysis(&analysis());

        assert_eq!(reductions.extensions_to_remove, vec!["_curses", "_sqlite3"]);
        assert_eq!(
            reductions.extension_patterns,
            vec![
                "_curses.*.so",
                "_curses.cpython-*.so",
                "_sqlite3.*.so",
                "_sqlite3.cpython-*.so",
            ]
        );
        assert!(reductions.stdlib_to_remove.contains(&"idlelib/".to_string()));
        assert!(reductions.stdlib_to_remove.contains(&"turtle.py".to_string()));
        assert!(!reductions.stdlib_to_remove.contains(&"json/".to_string()));
        assert!(!reductions.stdlib_to_remove.contains(&"email/".to_string()));

        let mut sorted = reductions.stdlib_to_remove.clone();
        sorted.sort();
        assert_eq!(sorted, reductions.stdlib_to_remove);
    }

    #[test]
    fn test_manifest_round_trip() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let b = builder(temp_dir.path());
        let manifest = ReductionManifest::new(&b, &analysis());

        assert_eq!(manifest.version, "1.0");
        assert_eq!(manifest.config, "shared_max");
        assert_eq!(manifest.packages_analyzed, vec!["urllib3"]);
        assert_eq!(manifest.warnings.len(), 1);
        assert_eq!(manifest.warnings[0].modules, vec!["_lzma"]);

        let path = temp_dir.path().join("out").join("manifest.json");
        manifest.write(&path)?;

        let text = std::fs::read_to_string(&path)?;
        assert!(text.contains("\n  \"version\": \"1.0\""));
        assert!(text.contains("\"type\": \"required_but_disabled\""));

        assert_eq!(ReductionManifest::from_path(&path)?, manifest);

        Ok(())
    }

    #[test]
    fn test_write_reduction_manifest() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let b = builder(temp_dir.path());
        let output = temp_dir.path().join("nested").join("reduce.json");

        let written = write_reduction_manifest(&b, &analysis(), Some(&output))?;
        assert_eq!(written, output);

        let manifest = ReductionManifest::from_path(&output)?;
        assert_eq!(manifest.python_version, "3.12.12");
        assert_eq!(manifest.analysis.third_party, vec!["urllib3"]);
        assert_eq!(manifest.reductions.extensions_to_remove, vec!["_curses", "_sqlite3"]);

        Ok(())
    }

    #[test]
    fn test_partial_manifest() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("m.json");
        std::fs::write(&path, r#"{"reductions": {"stdlib_to_remove": ["idlelib/"]}}"#)?;

        let manifest = ReductionManifest::from_path(&path)?;
        assert_eq!(manifest.reductions.stdlib_to_remove, vec!["idlelib/"]);
        assert!(manifest.reductions.extension_patterns.is_empty());

        Ok(())
    }

    fn populate_stdlib(stdlib: &Path) -> Result<()> {
        let dynload = stdlib.join("lib-dynload");
        std::fs::create_dir_all(&dynload)?;
        std::fs::create_dir_all(stdlib.join("idlelib"))?;
        std::fs::write(stdlib.join("idlelib").join("run.py"), vec![0u8; 100])?;
        std::fs::write(stdlib.join("turtle.py"), vec![0u8; 50])?;
        std::fs::write(stdlib.join("os.py"), b"")?;
        std::fs::write(dynload.join("_curses.cpython-312-x86_64-linux-gnu.so"), vec![0u8; 10])?;
        std::fs::write(dynload.join("_json.cpython-312-x86_64-linux-gnu.so"), vec![0u8; 10])?;

        Ok(())
    }

    #[test]
    fn test_remove_reduced_files() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let stdlib = temp_dir.path().join("python3.12");
        populate_stdlib(&stdlib)?;

        let stats = remove_reduced_files(&stdlib, &Reductions::from_analysis(&analysis()))?;

        assert_eq!(stats.extensions_removed, 1);
        assert_eq!(stats.stdlib_removed, 2);
        assert_eq!(stats.bytes_saved, 160);
        assert!(!stdlib.join("idlelib").exists());
        assert!(!stdlib.join("turtle.py").exists());
        assert!(stdlib.join("os.py").exists());
        assert!(stdlib
            .join("lib-dynload")
            .join("_json.cpython-312-x86_64-linux-gnu.so")
            .exists());

        Ok(())
    }

    #[test]
    fn test_stdlib_entries_stay_inside_library() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let stdlib = temp_dir.path().join("lib").join("python3.12");
        populate_stdlib(&stdlib)?;
        let outside = temp_dir.path().join("lib").join("keep.txt");
        std::fs::write(&outside, b"keep")?;

        let reductions = Reductions {
            stdlib_to_remove: vec![
                "../keep.txt".to_string(),
                outside.display().to_string(),
                "./turtle.py".to_string(),
                "".to_string(),
                "idlelib/".to_string(),
            ],
            ..Default::default()
        };

        let stats = remove_reduced_files(&stdlib, &reductions)?;

        assert_eq!(stats.stdlib_removed, 1);
        assert!(outside.exists());
        assert!(stdlib.join("turtle.py").exists());
        assert!(!stdlib.join("idlelib").exists());

        assert_eq!(stdlib_relative("json/"), Some(PathBuf::from("json")));
        assert_eq!(stdlib_relative("a/../b"), None);
        assert_eq!(stdlib_relative("/etc"), None);

        Ok(())
    }

    #[test]
    fn test_verification_report() {
        assert_eq!(
            verification_report("six", &TimedOutcome::Success),
            "  import six: OK\n"
        );
        assert_eq!(
            verification_report(
                "yaml",
                &TimedOutcome::Failed(
                    "Traceback (most recent call last):\n  File \"<string>\", line 1\nModuleNotFoundError: No module named '_yaml'".to_string()
                )
            ),
            "  import yaml: FAILED\n    ModuleNotFoundError: No module named '_yaml'\n"
        );
        assert_eq!(
            verification_report("numpy", &TimedOutcome::TimedOut),
            "  import numpy: TIMEOUT\n"
        );
    }

    #[test]
    fn test_apply_reductions_to_copy() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let b = builder(temp_dir.path());
        populate_stdlib(&b.stdlib_dir())?;

        let manifest_path = temp_dir.path().join(DEFAULT_MANIFEST_NAME);
        ReductionManifest::new(&b, &analysis()).write(&manifest_path)?;

        let copy = temp_dir.path().join("reduced");
        let target = apply_reductions(&b, &manifest_path, Some(&copy))?;
        assert_eq!(target, Some(copy.clone()));

        let reduced_stdlib = copy.join("lib").join("python3.12");
        assert!(!reduced_stdlib.join("idlelib").exists());
        assert!(reduced_stdlib.join("os.py").exists());
        assert!(b.stdlib_dir().join("idlelib").exists());

        Ok(())
    }

    #[test]
    fn test_apply_reductions_missing_inputs() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let b = builder(temp_dir.path());

        let missing = temp_dir.path().join("nope.json");
        assert!(apply_reductions(&b, &missing, None)?.is_none());

        let manifest_path = temp_dir.path().join("m.json");
        ReductionManifest::default().write(&manifest_path)?;
        std::fs::create_dir_all(b.prefix())?;
        assert!(apply_reductions(&b, &manifest_path, None)?.is_none());

        Ok(())
    }

    #[test]
    fn test_stdlib_looks_zipped() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let stdlib = temp_dir.path();
        std::fs::create_dir_all(stdlib.join("lib-dynload"))?;
        std::fs::create_dir_all(stdlib.join("site-packages"))?;
        std::fs::write(stdlib.join("os.py"), b"")?;
        assert!(stdlib_looks_zipped(stdlib)?);

        std::fs::create_dir_all(stdlib.join("json"))?;
        assert!(!stdlib_looks_zipped(stdlib)?);

        Ok(())
    }

    #[test]
    fn test_auto_reduce_requires_packages() -> Result<()> {
        let b = PythonBuilder::with_defaults(Project::new(Path::new("/work")));

        assert!(!auto_reduce(&b)?);

        Ok(())
    }
}
