// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Human readable reports about a build.

[dry_run_report] describes what a build would do without touching the
filesystem. [size_report] breaks an existing installation down by
component.
*/

use {
    crate::{
        builders::{python_dependencies, Builder, PythonBuilder},
        environment::machine_arch,
        setup_config::{Bucket, BuildType},
    },
    anyhow::Result,
    buildpy_common::fs::directory_size,
    std::{
        fmt::Write,
        path::{Path, PathBuf},
    },
};

/// Format a byte count with binary units, e.g. `1,234.5 KB`.
pub fn format_size(size_bytes: u64) -> String {
    let mut size = size_bytes as f64;

    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{} {}", group_thousands(size), unit);
        }
        size /= 1024.0;
    }

    format!("{} TB", group_thousands(size))
}

fn group_thousands(value: f64) -> String {
    let formatted = format!("{:.1}", value);
    let (int_part, frac_part) = formatted.split_at(formatted.find('.').unwrap_or(formatted.len()));

    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    grouped + frac_part
}

fn write_modules(out: &mut String, title: &str, modules: &[String], show_none: bool) -> std::fmt::Result {
    let mut sorted = modules.to_vec();
    sorted.sort();

    writeln!(out, "\n[Modules - {}] ({})", title, sorted.len())?;
    if sorted.is_empty() && show_none {
        writeln!(out, "  (none)")?;
    }
    for name in sorted {
        writeln!(out, "  {}", name)?;
    }

    Ok(())
}

/// Describe the build a builder would perform.
pub fn dry_run_report(builder: &PythonBuilder) -> Result<String> {
    let config = builder.config()?;
    let options = builder.options();
    let mut out = String::new();

    writeln!(out, "\n{}", "=".repeat(60))?;
    writeln!(out, "BUILD PLAN (dry-run)")?;
    writeln!(out, "{}", "=".repeat(60))?;

    writeln!(out, "\n[Build Target]")?;
    writeln!(out, "  Python version:    {}", builder.version())?;
    writeln!(out, "  Configuration:     {}", builder.variant())?;
    writeln!(out, "  Build type:        {}", builder.build_type())?;
    writeln!(out, "  Size type:         {}", builder.size_type())?;
    writeln!(
        out,
        "  Platform:          {} ({})",
        builder.platform(),
        machine_arch()
    )?;

    writeln!(out, "\n[Directories]")?;
    writeln!(out, "  Install directory: {}", builder.install_dir().display())?;
    writeln!(out, "  Prefix:            {}", builder.prefix().display())?;
    writeln!(out, "  Source directory:  {}", builder.src_dir().display())?;

    writeln!(out, "\n[Build Options]")?;
    writeln!(out, "  Parallel jobs:     {}", options.jobs)?;
    writeln!(out, "  Optimize build:    {}", options.optimize)?;
    writeln!(out, "  Precompile stdlib: {}", options.precompile)?;
    writeln!(out, "  Bytecode opt:      {}", options.optimize_bytecode)?;

    writeln!(out, "\n[Configure Options]")?;
    let mut configure_options = builder.configure_options();
    let type_option = match builder.build_type() {
        BuildType::Static => "--disable-shared",
        BuildType::Shared => "--enable-shared",
        BuildType::Framework => "--enable-framework",
    };
    if !configure_options.iter().any(|o| o == type_option) {
        configure_options.push(type_option.to_string());
    }
    configure_options.sort();
    for option in configure_options {
        writeln!(out, "  {}", option)?;
    }

    writeln!(out, "\n[Dependencies]")?;
    let dependencies = python_dependencies(builder.project());
    if dependencies.is_empty() {
        writeln!(out, "  (none)")?;
    }
    for dep in dependencies {
        writeln!(out, "  {} {}", dep.package().name, dep.package().version)?;
    }

    write_modules(&mut out, "Core", config.bucket(Bucket::Core), false)?;
    write_modules(&mut out, "Static", config.bucket(Bucket::Static), true)?;
    write_modules(&mut out, "Shared", config.bucket(Bucket::Shared), true)?;
    write_modules(&mut out, "Disabled", config.bucket(Bucket::Disabled), true)?;

    if !builder.pkgs().is_empty() {
        writeln!(out, "\n[Packages to Install] ({})", builder.pkgs().len())?;
        for pkg in builder.pkgs() {
            writeln!(out, "  {}", pkg)?;
        }
    }

    writeln!(out, "\n{}", "=".repeat(60))?;
    writeln!(out, "End of build plan. No changes were made.")?;
    writeln!(out, "{}", "=".repeat(60))?;

    Ok(out)
}

/// Print the build plan to stdout.
pub fn dry_run(builder: &PythonBuilder) -> Result<()> {
    print!("{}", dry_run_report(builder)?);

    Ok(())
}

fn files_in(dir: &Path) -> Vec<(PathBuf, u64)> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok().map(|m| (e.into_path(), m.len())))
        .collect()
}

/// Sizes of the components of an installation, largest first.
pub fn size_components(builder: &PythonBuilder) -> Vec<(String, u64)> {
    let prefix = builder.prefix();
    let mut components = vec![];

    let bin_dir = prefix.join("bin");
    if bin_dir.exists() {
        components.push(("bin/ (executables)".to_string(), directory_size(&bin_dir)));
    }

    let lib_dir = prefix.join("lib");
    if let Ok(entries) = std::fs::read_dir(&lib_dir) {
        let libraries = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.metadata().ok())
            .filter(|m| m.is_file())
            .map(|m| m.len())
            .sum::<u64>();
        if libraries > 0 {
            components.push(("lib/*.{so,dylib,a} (libraries)".to_string(), libraries));
        }
    }

    let stdlib_dir = builder.stdlib_dir();
    if stdlib_dir.exists() {
        let dynload = stdlib_dir.join("lib-dynload");
        let stdlib = files_in(&stdlib_dir)
            .into_iter()
            .filter(|(path, _)| !path.starts_with(&dynload))
            .map(|(_, size)| size)
            .sum::<u64>();
        components.push(("lib/pythonX.Y/ (stdlib)".to_string(), stdlib));

        if dynload.exists() {
            components.push(("lib/pythonX.Y/lib-dynload/".to_string(), directory_size(&dynload)));
        }
    }

    let zip_path = builder.zip_path();
    if zip_path.exists() {
        components.push(("pythonXY.zip (zipped stdlib)".to_string(), directory_size(&zip_path)));
    }

    for (dir, label) in [("include", "include/ (headers)"), ("share", "share/ (docs/man)")] {
        let path = prefix.join(dir);
        if path.exists() {
            components.push((label.to_string(), directory_size(&path)));
        }
    }

    if builder.build_type() == BuildType::Framework {
        let resources = prefix.join("Resources");
        if resources.exists() {
            components.push(("Resources/".to_string(), directory_size(&resources)));
        }
    }

    components.sort_by(|a, b| b.1.cmp(&a.1));

    components
}

fn percent(size: u64, total: u64) -> f64 {
    if total > 0 {
        size as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

/// Describe the size of an existing installation.
///
/// Returns `None` when the installation prefix does not exist.
pub fn size_report_text(builder: &PythonBuilder) -> Result<Option<String>> {
    let prefix = builder.prefix();
    if !prefix.exists() {
        return Ok(None);
    }

    let components = size_components(builder);
    let total = directory_size(&prefix);
    let mut out = String::new();

    writeln!(out, "\n{}", "=".repeat(70))?;
    writeln!(out, "BUILD SIZE REPORT")?;
    writeln!(out, "{}", "=".repeat(70))?;

    writeln!(out, "\n[Build Info]")?;
    writeln!(out, "  Location:      {}", prefix.display())?;
    writeln!(out, "  Configuration: {}", builder.variant())?;
    writeln!(out, "  Build type:    {}", builder.build_type())?;
    writeln!(out, "  Python:        {}", builder.version())?;

    let rule = format!("  {} {} {}", "-".repeat(40), "-".repeat(12), "-".repeat(8));

    writeln!(out, "\n[Size Breakdown]")?;
    writeln!(out, "  {:<40} {:>12} {:>8}", "Component", "Size", "%")?;
    writeln!(out, "{}", rule)?;
    for (name, size) in &components {
        writeln!(
            out,
            "  {:<40} {:>12} {:>7.1}%",
            name,
            format_size(*size),
            percent(*size, total)
        )?;
    }

    let accounted = components.iter().map(|(_, size)| size).sum::<u64>();
    if total > accounted {
        let other = total - accounted;
        writeln!(
            out,
            "  {:<40} {:>12} {:>7.1}%",
            "(other)",
            format_size(other),
            percent(other, total)
        )?;
    }
    writeln!(out, "{}", rule)?;
    writeln!(out, "  {:<40} {:>12} {:>8}", "TOTAL", format_size(total), "100.0%")?;

    writeln!(out, "\n[Largest Files]")?;
    writeln!(out, "  {:<50} {:>12}", "File", "Size")?;
    writeln!(out, "  {} {}", "-".repeat(50), "-".repeat(12))?;

    let mut files = files_in(&prefix);
    files.sort_by(|a, b| b.1.cmp(&a.1));
    for (path, size) in files.into_iter().take(10) {
        let rel = path.strip_prefix(&prefix).unwrap_or(&path);
        let mut name = rel.display().to_string();
        let chars = name.chars().count();
        if chars > 48 {
            name = format!("...{}", name.chars().skip(chars - 45).collect::<String>());
        }
        writeln!(out, "  {:<50} {:>12}", name, format_size(size))?;
    }

    writeln!(out, "\n{}", "=".repeat(70))?;

    Ok(Some(out))
}

/// Print the size report to stdout.
pub fn size_report(builder: &PythonBuilder) -> Result<()> {
    match size_report_text(builder)? {
        Some(text) => print!("{}", text),
        None => {
            println!("\nError: Build directory not found: {}", builder.prefix().display());
            println!("Run a build first, then use --size-report to analyze it.");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            builders::PythonBuildOptions, environment::Platform, project_layout::Project,
            setup_config::{BuildVariant, SizeType},
        },
    };

    fn builder(root: &Path, variant: BuildVariant, pkgs: &[&str]) -> PythonBuilder {
        PythonBuilder::new(
            "3.12.12",
            Project::new(root),
            PythonBuildOptions {
                variant,
                pkgs: pkgs.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
        )
        .with_platform(Platform::Linux)
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0.0 B");
        assert_eq!(format_size(1023), "1,023.0 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
        assert_eq!(format_size(2048 * 1024 * 1024 * 1024), "2,048.0 GB");
        assert_eq!(format_size(4096 * 1024 * 1024 * 1024 * 1024), "4,096.0 TB");
    }

    #[test]
    fn test_dry_run_report() -> Result<()> {
        let b = builder(
            Path::new("/work"),
            BuildVariant::new(BuildType::Static, SizeType::Mid),
            &["requests"],
        );
        let report = dry_run_report(&b)?;

        assert!(report.contains("BUILD PLAN (dry-run)"));
        assert!(report.contains("  Python version:    3.12.12\n"));
        assert!(report.contains("  Configuration:     static_mid\n"));
        assert!(report.contains("  Platform:          Linux ("));
        assert!(report.contains("  Prefix:            /work/build/install/python-static\n"));
        assert!(report.contains("  openssl 1.1.1w\n"));
        assert!(report.contains("[Modules - Core] ("));
        assert!(report.contains("[Packages to Install] (1)\n  requests\n"));
        assert!(!report.contains("--without-ensurepip"));
        assert!(report.contains("  --disable-shared\n"));
        assert!(report.contains("End of build plan. No changes were made."));

        let disabled = b.config()?.bucket(Bucket::Disabled).len();
        assert!(report.contains(&format!("[Modules - Disabled] ({})", disabled)));

        Ok(())
    }

    #[test]
    fn test_dry_run_report_without_packages() -> Result<()> {
        let b = builder(
            Path::new("/work"),
            BuildVariant::new(BuildType::Shared, SizeType::Max),
            &[],
        );
        let report = dry_run_report(&b)?;

        assert!(report.contains("  --enable-shared\n"));
        assert!(report.contains("  --without-ensurepip\n"));
        assert!(!report.contains("[Packages to Install]"));

        Ok(())
    }

    #[test]
    fn test_size_report() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let b = builder(
            temp_dir.path(),
            BuildVariant::new(BuildType::Shared, SizeType::Max),
            &[],
        );

        assert!(size_report_text(&b)?.is_none());

        let prefix = b.prefix();
        let stdlib = b.stdlib_dir();
        std::fs::create_dir_all(prefix.join("bin"))?;
        std::fs::create_dir_all(stdlib.join("lib-dynload"))?;
        std::fs::write(prefix.join("bin").join("python3"), vec![0u8; 4000])?;
        std::fs::write(prefix.join("lib").join("libpython3.12.so"), vec![0u8; 3000])?;
        std::fs::write(stdlib.join("os.py"), vec![0u8; 1000])?;
        std::fs::write(stdlib.join("lib-dynload").join("_ssl.so"), vec![0u8; 2000])?;
        std::fs::write(prefix.join("README"), vec![0u8; 10])?;

        let components = size_components(&b);
        assert_eq!(
            components,
            vec![
                ("bin/ (executables)".to_string(), 4000),
                ("lib/*.{so,dylib,a} (libraries)".to_string(), 3000),
                ("lib/pythonX.Y/lib-dynload/".to_string(), 2000),
                ("lib/pythonX.Y/ (stdlib)".to_string(), 1000),
            ]
        );

        let report = size_report_text(&b)?.unwrap();
        assert!(report.contains("BUILD SIZE REPORT"));
        assert!(report.contains("  Configuration: shared_max\n"));
        assert!(report.contains("(other)"));
        assert!(report.contains(&format!("  {:<40} {:>12} {:>8}", "TOTAL", "9.8 KB", "100.0%")));
        assert!(report.contains("bin/python3"));

        Ok(())
    }
}
