// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Running external tools.

Builds shell out to `configure`, `make`, `pip` and friends. Commands are
either an explicit argument vector or a single command line. Command lines
are tokenized with shell quoting rules and only handed to a real shell when
they use pipes, redirection or command chaining.
*/

use {
    anyhow::{anyhow, Context, Result},
    buildpy_common::BuildError,
    duct::cmd,
    log::{info, warn},
    std::{
        fmt,
        io::{BufRead, BufReader},
        path::Path,
        time::{Duration, Instant},
    },
};

/// Characters that require a command line to run under a shell.
const SHELL_METACHARS: &[char] = &['|', '>', '<', '&', ';'];

/// URL schemes accepted by [git_clone].
const GIT_URL_PREFIXES: &[&str] = &["https://", "http://", "git://", "ssh://", "git@"];

/// A command to execute.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    /// Program followed by its arguments.
    Args(Vec<String>),

    /// A command line as typed at a shell prompt.
    Line(String),
}

impl Command {
    pub fn args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Args(args.into_iter().map(Into::into).collect())
    }

    pub fn line(line: impl Into<String>) -> Self {
        Self::Line(line.into())
    }

    /// Whether the command must be run by a shell interpreter.
    pub fn needs_shell(&self) -> bool {
        match self {
            Self::Args(_) => false,
            Self::Line(line) => line.contains(SHELL_METACHARS),
        }
    }

    /// Resolve the program and arguments to execute.
    pub fn argv(&self) -> Result<Vec<String>> {
        let argv = match self {
            Self::Args(args) => args.clone(),
            Self::Line(line) if self.needs_shell() => {
                if cfg!(windows) {
                    vec!["cmd".to_string(), "/C".to_string(), line.clone()]
                } else {
                    vec!["sh".to_string(), "-c".to_string(), line.clone()]
                }
            }
            Self::Line(line) => shlex::split(line)
                .ok_or_else(|| BuildError::Validation(format!("cannot parse command: {}", line)))?,
        };

        if argv.is_empty() {
            return Err(BuildError::Validation("empty command".to_string()).into());
        }

        Ok(argv)
    }

    fn expression(&self) -> Result<duct::Expression> {
        let argv = self.argv()?;

        Ok(cmd(&argv[0], &argv[1..]))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Args(args) => f.write_str(&args.join(" ")),
            Self::Line(line) => f.write_str(line),
        }
    }
}

/// Run a command in `cwd`, streaming its output to the log.
///
/// A nonzero exit status is a [BuildError::Command].
pub fn run(command: &Command, cwd: &Path) -> Result<()> {
    info!("{}", command);

    let reader = command
        .expression()?
        .dir(cwd)
        .stderr_to_stdout()
        .unchecked()
        .reader()
        .with_context(|| format!("invoking {}", command))?;
    {
        let mut reader = BufReader::new(&reader);
        let mut line = Vec::new();
        loop {
            line.clear();
            if reader
                .read_until(b'\n', &mut line)
                .with_context(|| format!("reading output of {}", command))?
                == 0
            {
                break;
            }
            info!("{}", String::from_utf8_lossy(&line).trim_end());
        }
    }
    let output = reader
        .try_wait()
        .with_context(|| format!("waiting on {}", command))?
        .ok_or_else(|| anyhow!("unable to wait on command"))?;

    if !output.status.success() {
        return Err(BuildError::Command(command.to_string()).into());
    }

    Ok(())
}

/// Run a command and return its trimmed standard output.
pub fn capture(command: &Command, cwd: &Path) -> Result<String> {
    let output = command
        .expression()?
        .dir(cwd)
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .run()
        .with_context(|| format!("invoking {}", command))?;

    if !output.status.success() {
        return Err(BuildError::Command(format!(
            "{}: {}",
            command,
            String::from_utf8_lossy(&output.stderr).trim()
        ))
        .into());
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// How a command run with a time limit ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TimedOutcome {
    Success,
    /// Nonzero exit, with the captured stderr.
    Failed(String),
    TimedOut,
}

impl TimedOutcome {
    pub fn success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Run a command quietly, killing it once `timeout` has elapsed.
pub fn run_within(command: &Command, cwd: &Path, timeout: Duration) -> Result<TimedOutcome> {
    let handle = command
        .expression()?
        .dir(cwd)
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .start()
        .with_context(|| format!("invoking {}", command))?;

    let started = Instant::now();
    loop {
        if let Some(output) = handle.try_wait()? {
            if output.status.success() {
                return Ok(TimedOutcome::Success);
            }

            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("{}: {}", command, stderr);
            return Ok(TimedOutcome::Failed(stderr));
        }

        if started.elapsed() >= timeout {
            warn!("{} timed out after {}s", command, timeout.as_secs());
            handle.kill()?;
            return Ok(TimedOutcome::TimedOut);
        }

        std::thread::sleep(Duration::from_millis(100));
    }
}

/// Whether a command succeeded within `timeout`.
///
/// Commands that run too long are killed and count as failures.
pub fn succeeds_within(command: &Command, cwd: &Path, timeout: Duration) -> Result<bool> {
    Ok(run_within(command, cwd, timeout)?.success())
}

/// Read a `"0"`/`"1"` style boolean from the environment.
pub fn env_flag(key: &str, default: bool) -> Result<bool> {
    match std::env::var(key) {
        Ok(value) => {
            let value = value
                .trim()
                .parse::<i64>()
                .map_err(|_| anyhow!("{} must be an integer (0 or 1), got {:?}", key, value))?;
            Ok(value != 0)
        }
        Err(std::env::VarError::NotPresent) => Ok(default),
        Err(e) => Err(anyhow!("reading {}: {}", key, e)),
    }
}

/// Shallow clone of a git repository.
pub fn git_clone_command(
    url: &str,
    branch: Option<&str>,
    directory: Option<&Path>,
    recurse: bool,
) -> Result<Command> {
    if !GIT_URL_PREFIXES.iter().any(|p| url.starts_with(p)) {
        return Err(BuildError::Validation(format!("invalid git URL: {}", url)).into());
    }

    let mut args = vec!["git", "clone", "--depth", "1"]
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>();

    if let Some(branch) = branch {
        args.push("--branch".to_string());
        args.push(branch.to_string());
    }
    if recurse {
        args.push("--recurse-submodules".to_string());
        args.push("--shallow-submodules".to_string());
    }
    args.push(url.to_string());
    if let Some(directory) = directory {
        args.push(directory.display().to_string());
    }

    Ok(Command::Args(args))
}

pub fn git_clone(
    url: &str,
    branch: Option<&str>,
    directory: Option<&Path>,
    recurse: bool,
    cwd: &Path,
) -> Result<()> {
    run(&git_clone_command(url, branch, directory, recurse)?, cwd)
}

pub fn pip_install_command(
    pkgs: &[String],
    requirements: Option<&Path>,
    upgrade: bool,
    pip: Option<&Path>,
) -> Command {
    let mut args = vec![pip
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "pip3".to_string())];
    args.push("install".to_string());

    match requirements {
        Some(reqs) => {
            args.push("-r".to_string());
            args.push(reqs.display().to_string());
        }
        None => {
            if upgrade {
                args.push("--upgrade".to_string());
            }
            args.extend(pkgs.iter().cloned());
        }
    }

    Command::Args(args)
}

pub fn pip_install(
    pkgs: &[String],
    requirements: Option<&Path>,
    upgrade: bool,
    pip: Option<&Path>,
    cwd: &Path,
) -> Result<()> {
    run(&pip_install_command(pkgs, requirements, upgrade, pip), cwd)
}

pub fn apt_install_command(pkgs: &[&str], update: bool) -> Command {
    let mut args = vec!["sudo", "apt", "install"];
    if update {
        args.push("--upgrade");
    }
    args.extend(pkgs);

    Command::args(args)
}

pub fn apt_install(pkgs: &[&str], update: bool) -> Result<()> {
    run(&apt_install_command(pkgs, update), Path::new("."))
}

pub fn brew_install(pkgs: &[&str], update: bool) -> Result<()> {
    if update {
        run(&Command::args(["brew", "update"]), Path::new("."))?;
    }

    let mut args = vec!["brew", "install"];
    args.extend(pkgs);

    run(&Command::args(args), Path::new("."))
}

pub fn cmake_configure_command(
    src_dir: &Path,
    build_dir: &Path,
    scripts: &[&Path],
    options: &[(&str, &str)],
) -> Command {
    let mut args = vec![
        "cmake".to_string(),
        "-S".to_string(),
        src_dir.display().to_string(),
        "-B".to_string(),
        build_dir.display().to_string(),
    ];

    for script in scripts {
        args.push("-C".to_string());
        args.push(script.display().to_string());
    }
    for (key, value) in options {
        args.push(format!("-D{}={}", key, value));
    }

    Command::Args(args)
}

pub fn cmake_configure(
    src_dir: &Path,
    build_dir: &Path,
    scripts: &[&Path],
    options: &[(&str, &str)],
) -> Result<()> {
    run(
        &cmake_configure_command(src_dir, build_dir, scripts, options),
        Path::new("."),
    )
}

pub fn cmake_build(build_dir: &Path, release: bool) -> Result<()> {
    let mut args = vec![
        "cmake".to_string(),
        "--build".to_string(),
        build_dir.display().to_string(),
    ];
    if release {
        args.push("--config".to_string());
        args.push("Release".to_string());
    }

    run(&Command::Args(args), Path::new("."))
}

pub fn cmake_install(build_dir: &Path, prefix: Option<&Path>) -> Result<()> {
    let mut args = vec![
        "cmake".to_string(),
        "--install".to_string(),
        build_dir.display().to_string(),
    ];
    if let Some(prefix) = prefix {
        args.push("--prefix".to_string());
        args.push(prefix.display().to_string());
    }

    run(&Command::Args(args), Path::new("."))
}

#[cfg(test)]
mod tests {
    use {super::*, std::path::PathBuf};

    #[test]
    fn test_argv() -> Result<()> {
        assert_eq!(
            Command::line("make -j4 'CFLAGS=-fPIC -O2'").argv()?,
            vec!["make", "-j4", "CFLAGS=-fPIC -O2"]
        );

        let piped = Command::line("echo hi | tr a-z A-Z");
        assert!(piped.needs_shell());
        let argv = piped.argv()?;
        assert_eq!(argv.last().map(|s| s.as_str()), Some("echo hi | tr a-z A-Z"));

        assert!(!Command::args(["a|b"]).needs_shell());
        assert!(Command::line("").argv().is_err());
        assert!(Command::line("echo 'unterminated").argv().is_err());

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_run_and_capture() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;

        run(&Command::line("echo hello > out.txt"), temp_dir.path())?;
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("out.txt"))?,
            "hello\n"
        );

        assert_eq!(
            capture(&Command::args(["cat", "out.txt"]), temp_dir.path())?,
            "hello"
        );

        let err = run(&Command::line("false"), temp_dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::Command(_))
        ));

        assert!(succeeds_within(
            &Command::line("true"),
            temp_dir.path(),
            Duration::from_secs(10)
        )?);
        assert!(!succeeds_within(
            &Command::line("sleep 5"),
            temp_dir.path(),
            Duration::from_millis(200)
        )?);

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_run_within_outcomes() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;

        assert_eq!(
            run_within(&Command::line("true"), temp_dir.path(), Duration::from_secs(10))?,
            TimedOutcome::Success
        );
        assert_eq!(
            run_within(
                &Command::line("echo first >&2; echo 'No module named x' >&2; exit 1"),
                temp_dir.path(),
                Duration::from_secs(10)
            )?,
            TimedOutcome::Failed("first\nNo module named x".to_string())
        );
        assert_eq!(
            run_within(
                &Command::line("sleep 5"),
                temp_dir.path(),
                Duration::from_millis(200)
            )?,
            TimedOutcome::TimedOut
        );

        Ok(())
    }

    #[test]
    fn test_env_flag() -> Result<()> {
        std::env::set_var("BUILDPY_TEST_FLAG_ON", "1");
        std::env::set_var("BUILDPY_TEST_FLAG_OFF", "0");
        std::env::set_var("BUILDPY_TEST_FLAG_BAD", "yes");

        assert!(env_flag("BUILDPY_TEST_FLAG_ON", false)?);
        assert!(!env_flag("BUILDPY_TEST_FLAG_OFF", true)?);
        assert!(env_flag("BUILDPY_TEST_FLAG_MISSING", true)?);
        assert!(env_flag("BUILDPY_TEST_FLAG_BAD", false).is_err());

        Ok(())
    }

    #[test]
    fn test_git_clone_command() -> Result<()> {
        let command = git_clone_command(
            "https://github.com/python/cpython.git",
            Some("v3.13.11"),
            Some(Path::new("cpython")),
            true,
        )?;
        assert_eq!(
            command.to_string(),
            "git clone --depth 1 --branch v3.13.11 --recurse-submodules \
             --shallow-submodules https://github.com/python/cpython.git cpython"
        );

        let err = git_clone_command("file:///tmp/repo", None, None, false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::Validation(_))
        ));

        Ok(())
    }

    #[test]
    fn test_install_commands() {
        let pkgs = vec!["requests".to_string(), "rich".to_string()];
        assert_eq!(
            pip_install_command(&pkgs, None, true, None).to_string(),
            "pip3 install --upgrade requests rich"
        );
        assert_eq!(
            pip_install_command(
                &pkgs,
                Some(Path::new("reqs.txt")),
                true,
                Some(&PathBuf::from("bin/pip3"))
            )
            .to_string(),
            "bin/pip3 install -r reqs.txt"
        );
        assert_eq!(
            apt_install_command(&["patchelf"], true).to_string(),
            "sudo apt install --upgrade patchelf"
        );
        assert_eq!(
            cmake_configure_command(
                Path::new("src"),
                Path::new("build"),
                &[Path::new("cache.cmake")],
                &[("CMAKE_BUILD_TYPE", "Release")]
            )
            .to_string(),
            "cmake -S src -B build -C cache.cmake -DCMAKE_BUILD_TYPE=Release"
        );
    }
}
