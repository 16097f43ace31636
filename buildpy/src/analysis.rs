// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Standard library dependency analysis of third-party packages.

Packages named with `--install` are downloaded with pip, their Python
sources are scanned for imports and the imported standard library modules
are mapped to the C extension modules they need. The result is compared to
the extension configuration of the selected build variant.
*/

use {
    crate::{
        builders::PythonBuilder,
        setup_config::{Bucket, BuildType, SetupConfig},
        shell::{capture, Command},
    },
    anyhow::{Context, Result},
    log::{debug, warn},
    python_import_scan::{
        package_scan::{is_scannable_archive, scan_directory},
        stdlib::{extensions_for, is_core_module, is_stdlib_module, required_extensions},
    },
    serde::Serialize,
    std::{collections::BTreeSet, fmt::Write, path::Path},
};

/// What a set of packages needs from a Python build.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub stdlib_imports: BTreeSet<String>,
    pub third_party: BTreeSet<String>,
    pub required_extensions: BTreeSet<String>,
    pub needed_but_disabled: BTreeSet<String>,
    pub potentially_unused: BTreeSet<String>,
    pub files_analyzed: usize,
}

/// Compare imported modules to an extension configuration.
pub fn analyze_from_imports(
    imports: &BTreeSet<String>,
    files_analyzed: usize,
    config: &SetupConfig,
) -> AnalysisResult {
    let (stdlib_imports, third_party): (BTreeSet<String>, BTreeSet<String>) = imports
        .iter()
        .cloned()
        .partition(|name| is_stdlib_module(name));

    let required = required_extensions(stdlib_imports.iter().map(|s| s.as_str()));

    let potentially_unused = config
        .enabled_modules()
        .into_iter()
        .filter(|name| !required.contains(name) && !is_core_module(name))
        .collect();

    let needed_but_disabled = config
        .bucket(Bucket::Disabled)
        .iter()
        .filter(|name| required.contains(*name))
        .cloned()
        .collect();

    AnalysisResult {
        stdlib_imports,
        third_party,
        required_extensions: required,
        needed_but_disabled,
        potentially_unused,
        files_analyzed,
    }
}

/// Candidate `pip download` invocations, in order of preference.
fn pip_download_commands(dest: &Path, pkgs: &[String]) -> Vec<Command> {
    let mut launchers: Vec<Vec<String>> = vec![];

    for pip in ["pip3", "pip"] {
        if let Ok(path) = which::which(pip) {
            launchers.push(vec![path.display().to_string()]);
        }
    }
    if let Ok(python) = which::which("python3") {
        launchers.push(vec![
            python.display().to_string(),
            "-m".to_string(),
            "pip".to_string(),
        ]);
    }

    launchers
        .into_iter()
        .map(|mut args| {
            args.extend(
                ["download", "--no-deps", "-d"]
                    .iter()
                    .map(|s| s.to_string()),
            );
            args.push(dest.display().to_string());
            args.extend(pkgs.iter().cloned());
            Command::Args(args)
        })
        .collect()
}

fn download_packages(dest: &Path, pkgs: &[String]) -> bool {
    for command in pip_download_commands(dest, pkgs) {
        match capture(&command, dest) {
            Ok(_) => return true,
            Err(e) => debug!("{} failed: {}", command, e),
        }
    }

    false
}

/// One `Analyzing:` line per downloaded file, noting formats not scanned.
fn downloads_report(dir: &Path) -> Result<String> {
    let mut names = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    names.sort();

    let mut out = String::new();
    for path in names {
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => continue,
        };

        writeln!(out, "  Analyzing: {}", name)?;
        if !is_scannable_archive(&path) {
            writeln!(out, "    Skipped {}: unsupported archive format", name)?;
        }
    }

    Ok(out)
}

/// Download and scan the packages a builder would install.
///
/// Returns `None` when no packages are configured.
pub fn analyze_package_deps(builder: &PythonBuilder, verbose: bool) -> Result<Option<AnalysisResult>> {
    let pkgs = builder.pkgs();

    if pkgs.is_empty() {
        if verbose {
            println!("\nError: No packages specified. Use -i/--install to specify packages.");
            println!("Example: buildpy -A -i requests numpy");
        }
        return Ok(None);
    }

    if verbose {
        println!("\n[Packages to Analyze]");
        for pkg in pkgs {
            println!("  - {}", pkg);
        }
        println!("\n[Downloading Packages]");
    }

    let temp_dir = tempfile::Builder::new()
        .prefix("buildpy-analysis-")
        .tempdir()
        .context("creating temporary directory")?;

    if !download_packages(temp_dir.path(), pkgs) {
        warn!("could not download packages (pip not available)");
        if verbose {
            println!("  Attempting analysis without downloading...");
        }
    }

    let (summary, _) = scan_directory(temp_dir.path())?;
    if verbose {
        print!("{}", downloads_report(temp_dir.path())?);
        println!("\n  Files analyzed: {}", summary.files_analyzed);
    }

    let config = builder.config()?;

    Ok(Some(analyze_from_imports(
        &summary.imports,
        summary.files_analyzed,
        &config,
    )))
}

/// The variant suggested to shrink a build of the given type.
pub fn smaller_variant(build_type: BuildType) -> &'static str {
    match build_type {
        BuildType::Static => "static_tiny",
        BuildType::Shared => "shared_mid",
        BuildType::Framework => "framework_mid",
    }
}

/// Render the findings of an analysis.
pub fn analysis_report(builder: &PythonBuilder, result: &AnalysisResult) -> Result<String> {
    let config = builder.config()?;
    let mut out = String::new();

    writeln!(out, "\n[Stdlib Modules Used] ({})", result.stdlib_imports.len())?;
    for name in &result.stdlib_imports {
        let extensions = extensions_for(name);
        if extensions.is_empty() {
            writeln!(out, "  {}", name)?;
        } else {
            writeln!(out, "  {} -> {}", name, extensions.join(", "))?;
        }
    }

    if !result.third_party.is_empty() {
        writeln!(out, "\n[Third-Party Dependencies] ({})", result.third_party.len())?;
        for name in &result.third_party {
            writeln!(out, "  {}", name)?;
        }
    }

    writeln!(out, "\n[Configuration Analysis]")?;
    writeln!(out, "  Current config:     {}", builder.variant())?;
    writeln!(out, "  Enabled modules:    {}", config.enabled_modules().len())?;
    writeln!(out, "  Required by pkgs:   {}", result.required_extensions.len())?;

    if !result.needed_but_disabled.is_empty() {
        writeln!(out, "\n[WARNING: Required modules are DISABLED]")?;
        for name in &result.needed_but_disabled {
            writeln!(out, "  {} - NEEDS TO BE ENABLED", name)?;
        }
    }

    let unused = result.potentially_unused.len();
    if unused > 0 {
        writeln!(out, "\n[Potentially Unused Modules] ({})", unused)?;
        writeln!(out, "  These modules are enabled but may not be needed:")?;
        for name in result.potentially_unused.iter().take(20) {
            writeln!(out, "  {}", name)?;
        }
        if unused > 20 {
            writeln!(out, "  ... and {} more", unused - 20)?;
        }
    }

    writeln!(out, "\n[Recommendations]")?;
    if !result.needed_but_disabled.is_empty() {
        writeln!(out, "  1. Enable these disabled modules for your packages to work:")?;
        for name in &result.needed_but_disabled {
            writeln!(out, "     --cfg-opts enable_{}", name.trim_start_matches('_'))?;
        }
    }

    if unused > 10 {
        writeln!(
            out,
            "  2. Consider using a smaller config (e.g., {})",
            smaller_variant(builder.build_type())
        )?;
        writeln!(out, "     or create a custom config disabling unused modules")?;
    }

    if result.needed_but_disabled.is_empty() && unused <= 5 {
        writeln!(
            out,
            "  Your current configuration appears well-suited for these packages."
        )?;
    }

    writeln!(out, "\n{}", "=".repeat(70))?;
    writeln!(out, "Note: This analysis is based on static import detection.")?;
    writeln!(out, "Runtime imports (importlib, __import__) may not be detected.")?;
    writeln!(out, "{}", "=".repeat(70))?;

    Ok(out)
}

/// Run the analysis and print the full report.
///
/// Returns the result so callers can go on to write a reduction manifest.
pub fn print_analysis(builder: &PythonBuilder) -> Result<Option<AnalysisResult>> {
    println!("\n{}", "=".repeat(70));
    println!("DEPENDENCY ANALYSIS");
    println!("{}", "=".repeat(70));

    let result = match analyze_package_deps(builder, true)? {
        Some(result) => result,
        None => return Ok(None),
    };

    print!("{}", analysis_report(builder, &result)?);

    Ok(Some(result))
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            builders::PythonBuildOptions,
            environment::Platform,
            project_layout::Project,
            setup_config::{BuildVariant, SizeType},
        },
    };

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn builder(variant: BuildVariant) -> PythonBuilder {
        PythonBuilder::new(
            "3.12.12",
            Project::new(Path::new("/work")),
            PythonBuildOptions {
                variant,
                pkgs: vec!["requests".to_string()],
                ..Default::default()
            },
        )
        .with_platform(Platform::Linux)
    }

    #[test]
    fn test_analyze_from_imports() -> Result<()> {
        let config = builder(BuildVariant::new(BuildType::Static, SizeType::Tiny)).config()?;

        let result = analyze_from_imports(&names(&["json", "ssl", "requests", "urllib3", "os"]), 7, &config);

        assert_eq!(result.files_analyzed, 7);
        assert_eq!(result.stdlib_imports, names(&["json", "os", "ssl"]));
        assert_eq!(result.third_party, names(&["requests", "urllib3"]));
        assert!(result.required_extensions.contains("_ssl"));
        assert!(result.required_extensions.contains("_json"));

        for name in &result.needed_but_disabled {
            assert!(config.contains(Bucket::Disabled, name));
            assert!(result.required_extensions.contains(name));
        }
        for name in &result.potentially_unused {
            assert!(!result.required_extensions.contains(name));
            assert!(!is_core_module(name));
        }
        assert!(!result.potentially_unused.contains("zlib"));

        Ok(())
    }

    #[test]
    fn test_underscore_imports_are_required() -> Result<()> {
        let config = builder(BuildVariant::new(BuildType::Shared, SizeType::Max)).config()?;
        let result = analyze_from_imports(&names(&["_ctypes"]), 1, &config);

        assert!(result.required_extensions.contains("_ctypes"));
        assert!(!result.potentially_unused.contains("_ctypes"));

        Ok(())
    }

    #[test]
    fn test_analysis_report() -> Result<()> {
        let b = builder(BuildVariant::new(BuildType::Shared, SizeType::Max));
        let result = AnalysisResult {
            stdlib_imports: names(&["json", "textwrap"]),
            third_party: names(&["urllib3"]),
            required_extensions: names(&["_json", "_lzma"]),
            needed_but_disabled: names(&["_lzma"]),
            potentially_unused: (0..25).map(|i| format!("_mod{:02}", i)).collect(),
            files_analyzed: 3,
        };

        let report = analysis_report(&b, &result)?;

        assert!(report.contains("  json -> _json\n"));
        assert!(report.contains("  textwrap\n"));
        assert!(report.contains("[Third-Party Dependencies] (1)"));
        assert!(report.contains("  Current config:     shared_max\n"));
        assert!(report.contains("  _lzma - NEEDS TO BE ENABLED\n"));
        assert!(report.contains("     --cfg-opts enable_lzma\n"));
        assert!(report.contains("  ... and 5 more\n"));
        assert!(report.contains("(e.g., shared_mid)"));
        assert!(!report.contains("well-suited"));

        Ok(())
    }

    #[test]
    fn test_downloads_report_lists_every_file() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        for name in ["six-1.16.0-py2.py3-none-any.whl", "pkg-1.0.zip", "tool-2.0.tar.gz"] {
            std::fs::write(temp_dir.path().join(name), b"")?;
        }

        assert_eq!(
            downloads_report(temp_dir.path())?,
            "  Analyzing: pkg-1.0.zip\n    Skipped pkg-1.0.zip: unsupported archive format\n  Analyzing: six-1.16.0-py2.py3-none-any.whl\n  Analyzing: tool-2.0.tar.gz\n"
        );

        Ok(())
    }

    #[test]
    fn test_analysis_without_packages() -> Result<()> {
        let b = PythonBuilder::with_defaults(Project::new(Path::new("/work")));

        assert!(analyze_package_deps(&b, false)?.is_none());

        Ok(())
    }
}
