// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    crate::{
        analysis::print_analysis,
        builders::{Builder, PythonBuildOptions, PythonBuilder, WindowsEmbeddableBuilder, WindowsPythonBuilder},
        environment::{resolve_python_version, Platform, BUILDPY_VERSION, DEFAULT_PYTHON_VERSION},
        logging,
        project_layout::Project,
        reduction::{apply_reductions, auto_configure, auto_reduce, write_reduction_manifest},
        report::{dry_run, size_report},
        setup_config::BuildVariant,
        shell::env_flag,
    },
    anyhow::{anyhow, Result},
    buildpy_common::fs::remove_path,
    clap::{value_parser, Arg, ArgAction, ArgMatches, Command},
    std::{
        path::{Path, PathBuf},
        str::FromStr,
    },
};

const ABOUT: &str = "\
Build a distributable CPython runtime from source.

Downloads CPython and the libraries it links against, configures which
extension modules are built and how, then compiles, installs, prunes and
compresses the result.

Instead of building, the build plan can be shown (--dry-run), an existing
build measured (--size-report), or packages given with --install analyzed
for the parts of the standard library they need (--analyze-deps).
";

/// The interpreter builder for the host platform.
enum Target {
    Unix(PythonBuilder),
    Windows(WindowsPythonBuilder),
}

impl Target {
    fn new(version: &str, project: Project, options: PythonBuildOptions) -> Self {
        match Platform::current() {
            Platform::Windows => Self::Windows(WindowsPythonBuilder::new(version, project, options)),
            _ => Self::Unix(PythonBuilder::new(version, project, options)),
        }
    }

    fn python(&self) -> &PythonBuilder {
        match self {
            Self::Unix(builder) => builder,
            Self::Windows(builder) => builder.python_builder(),
        }
    }

    fn process(&self) -> Result<()> {
        match self {
            Self::Unix(builder) => builder.process(),
            Self::Windows(builder) => builder.process(),
        }
    }

    fn ziplib(&self) -> Result<()> {
        match self {
            Self::Unix(builder) => builder.ziplib(),
            Self::Windows(builder) => builder.ziplib(),
        }
    }
}

/// The variant and packaging mode a `--type` value stands for.
///
/// Returns `None` for `local`, which builds nothing.
pub fn variant_for_type(build_type: &str) -> Result<Option<(BuildVariant, bool)>> {
    let name = match build_type {
        "local" => return Ok(None),
        "shared-ext" => "shared_mid",
        "static-ext" => "static_mid",
        "framework-ext" | "framework-pkg" => "framework_mid",
        "windows-pkg" => "shared_max",
        other => return Err(anyhow!("unknown build type: {}", other)),
    };

    Ok(Some((BuildVariant::from_str(name)?, build_type.ends_with("pkg"))))
}

fn app() -> Command {
    Command::new("buildpy")
        .version(BUILDPY_VERSION)
        .about("A python builder")
        .long_about(ABOUT)
        .disable_version_flag(true)
        .arg(
            Arg::new("app_version")
                .short('V')
                .long("app-version")
                .action(ArgAction::Version)
                .help("Print buildpy version"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase logging verbosity"),
        )
        .arg(
            Arg::new("cfg_opts")
                .short('a')
                .long("cfg-opts")
                .value_name("CFG")
                .num_args(1..)
                .action(ArgAction::Append)
                .help("add config options"),
        )
        .arg(
            Arg::new("optimize_bytecode")
                .short('b')
                .long("optimize-bytecode")
                .value_parser(value_parser!(i32).range(-1..=2))
                .allow_negative_numbers(true)
                .default_value("-1")
                .help("set optimization levels -1 .. 2"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("NAME")
                .default_value("shared_mid")
                .help("build configuration"),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .action(ArgAction::SetTrue)
                .help("build debug python"),
        )
        .arg(
            Arg::new("dry_run")
                .short('n')
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("show build plan without building"),
        )
        .arg(
            Arg::new("embeddable_pkg")
                .short('e')
                .long("embeddable-pkg")
                .action(ArgAction::SetTrue)
                .help("install python embeddable package"),
        )
        .arg(
            Arg::new("install")
                .short('i')
                .long("install")
                .value_name("PKG")
                .num_args(1..)
                .action(ArgAction::Append)
                .help("install python pkgs"),
        )
        .arg(
            Arg::new("package")
                .short('m')
                .long("package")
                .action(ArgAction::SetTrue)
                .help("package build"),
        )
        .arg(
            Arg::new("optimize")
                .short('o')
                .long("optimize")
                .action(ArgAction::SetTrue)
                .help("enable optimization during build"),
        )
        .arg(
            Arg::new("precompile")
                .short('p')
                .long("precompile")
                .action(ArgAction::SetTrue)
                .help("precompile stdlib to bytecode"),
        )
        .arg(
            Arg::new("reset")
                .short('r')
                .long("reset")
                .action(ArgAction::SetTrue)
                .help("reset build"),
        )
        .arg(
            Arg::new("version")
                .short('v')
                .long("version")
                .default_value(DEFAULT_PYTHON_VERSION)
                .help("python version"),
        )
        .arg(
            Arg::new("write")
                .short('w')
                .long("write")
                .action(ArgAction::SetTrue)
                .help("write configuration"),
        )
        .arg(
            Arg::new("jobs")
                .short('j')
                .long("jobs")
                .value_parser(value_parser!(usize))
                .default_value("4")
                .help("# of build jobs"),
        )
        .arg(
            Arg::new("json")
                .short('s')
                .long("json")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .help("serialize config to json file"),
        )
        .arg(
            Arg::new("type")
                .short('t')
                .long("type")
                .help("build based on build type"),
        )
        .arg(
            Arg::new("size_report")
                .short('S')
                .long("size-report")
                .action(ArgAction::SetTrue)
                .help("show size breakdown of build"),
        )
        .arg(
            Arg::new("analyze_deps")
                .short('A')
                .long("analyze-deps")
                .action(ArgAction::SetTrue)
                .help("analyze stdlib dependencies of packages"),
        )
        .arg(
            Arg::new("auto_reduce")
                .long("auto-reduce")
                .action(ArgAction::SetTrue)
                .help("analyze deps, build with shared_vanilla, apply reductions, zip stdlib"),
        )
        .arg(
            Arg::new("auto_config")
                .long("auto-config")
                .action(ArgAction::SetTrue)
                .help("generate reduction manifest based on dependency analysis"),
        )
        .arg(
            Arg::new("auto_config_output")
                .long("auto-config-output")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .help("output path for reduction manifest (default: reduction-manifest.json)"),
        )
        .arg(
            Arg::new("apply_reductions")
                .long("apply-reductions")
                .value_name("MANIFEST")
                .value_parser(value_parser!(PathBuf))
                .help("apply reduction manifest to remove unused files from build"),
        )
        .arg(
            Arg::new("reduction_copy")
                .long("reduction-copy")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("copy build to DIR before applying reductions"),
        )
        .arg(
            Arg::new("skip_ziplib")
                .long("skip-ziplib")
                .action(ArgAction::SetTrue)
                .help("skip stdlib compression"),
        )
        .arg(
            Arg::new("ziplib")
                .long("ziplib")
                .action(ArgAction::SetTrue)
                .help("compress stdlib of existing build"),
        )
        .arg(
            Arg::new("install_dir")
                .long("install-dir")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("custom installation directory (overrides --package)"),
        )
}

fn strings(args: &ArgMatches, id: &str) -> Vec<String> {
    args.get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

fn build_options(args: &ArgMatches, variant: BuildVariant, is_package: bool) -> Result<PythonBuildOptions> {
    Ok(PythonBuildOptions {
        variant,
        precompile: args.get_flag("precompile"),
        optimize: args.get_flag("optimize"),
        optimize_bytecode: *args
            .get_one::<i32>("optimize_bytecode")
            .ok_or_else(|| anyhow!("missing --optimize-bytecode"))?,
        pkgs: strings(args, "install"),
        cfg_opts: strings(args, "cfg_opts"),
        jobs: *args
            .get_one::<usize>("jobs")
            .ok_or_else(|| anyhow!("missing --jobs"))?,
        is_package,
        install_dir: args.get_one::<PathBuf>("install_dir").cloned(),
        skip_ziplib: args.get_flag("skip_ziplib"),
        skip_pkg_install: false,
        debug: args.get_flag("debug"),
    })
}

/// File `--write` puts `Setup.local` in: `patch/shared.mid` for `shared_mid`.
pub fn setup_local_patch_path(root: &Path, variant: BuildVariant) -> PathBuf {
    root.join("patch").join(variant.to_string().replace('_', "."))
}

fn exit_code(ok: bool) -> i32 {
    if ok {
        0
    } else {
        1
    }
}

/// Parse arguments and run the requested action.
///
/// Returns the process exit code.
pub fn run_cli() -> Result<i32> {
    let args = app().get_matches();

    let level = logging::log_level(env_flag("DEBUG", true)?, args.get_count("verbose"));
    logging::init_logging(level, env_flag("COLOR", true)?);

    let platform = Platform::current();
    platform.setup_environment();

    let project = Project::from_cwd()?;
    let version = resolve_python_version(
        args.get_one::<String>("version")
            .map(|s| s.as_str())
            .unwrap_or(DEFAULT_PYTHON_VERSION),
    );

    if platform == Platform::Windows && args.get_flag("embeddable_pkg") {
        WindowsEmbeddableBuilder::new(&version, project).setup()?;
        return Ok(0);
    }

    let (variant, is_package) = match args.get_one::<String>("type") {
        Some(build_type) => {
            if !platform.build_types().contains(&build_type.as_str()) {
                return Err(anyhow!(
                    "build type {} is not available on {} (available: {})",
                    build_type,
                    platform,
                    platform.build_types().join(", ")
                ));
            }
            match variant_for_type(build_type)? {
                Some(mapped) => mapped,
                None => return Ok(0),
            }
        }
        None => {
            let name = args
                .get_one::<String>("config")
                .ok_or_else(|| anyhow!("missing --config"))?;
            (BuildVariant::from_str(name)?, args.get_flag("package"))
        }
    };

    let target = Target::new(&version, project.clone(), build_options(&args, variant, is_package)?);
    let builder = target.python();

    if args.get_flag("ziplib") {
        let prefix = builder.prefix();
        if !prefix.exists() {
            println!("Error: Build not found at {}", prefix.display());
            return Ok(1);
        }
        println!("Compressing stdlib at {}...", prefix.display());
        target.ziplib()?;
        println!("Done.");
        return Ok(0);
    }

    if args.get_flag("write") {
        let config = builder.config()?;
        match args.get_one::<PathBuf>("json") {
            Some(path) => config.write_json(path)?,
            None => config.write_setup_local(&setup_local_patch_path(&project.root, variant))?,
        }
        return Ok(0);
    }

    if args.get_flag("dry_run") {
        dry_run(builder)?;
        return Ok(0);
    }

    if args.get_flag("size_report") {
        size_report(builder)?;
        return Ok(0);
    }

    if args.get_flag("auto_reduce") {
        return Ok(exit_code(auto_reduce(builder)?));
    }

    let manifest_output = args.get_one::<PathBuf>("auto_config_output").map(|p| p.as_path());

    if args.get_flag("analyze_deps") {
        if let Some(result) = print_analysis(builder)? {
            if args.get_flag("auto_config") {
                let path = write_reduction_manifest(builder, &result, manifest_output)?;
                println!("Reduction manifest written to: {}", path.display());
            }
        }
        return Ok(0);
    }

    if args.get_flag("auto_config") {
        if let Some(path) = auto_configure(builder, manifest_output)? {
            println!("Reduction manifest written to: {}", path.display());
        }
        return Ok(0);
    }

    if let Some(manifest) = args.get_one::<PathBuf>("apply_reductions") {
        let copy_to = args.get_one::<PathBuf>("reduction_copy").map(|p| p.as_path());
        return Ok(exit_code(apply_reductions(builder, manifest, copy_to)?.is_some()));
    }

    if args.get_flag("reset") {
        remove_path(&project.build)?;
    }

    target.process()?;

    Ok(0)
}
