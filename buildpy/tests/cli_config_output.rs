// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    anyhow::Result,
    assert_cmd::Command,
    assert_fs::{prelude::*, TempDir},
    predicates::prelude::*,
};

fn get_command(temp_dir: &TempDir) -> Result<Command> {
    let mut command = Command::cargo_bin("buildpy")?;
    command
        .current_dir(temp_dir.path())
        .env("DEBUG", "0")
        .env("COLOR", "0");

    Ok(command)
}

fn app_version() -> Result<()> {
    let temp_dir = TempDir::new()?;

    get_command(&temp_dir)?
        .arg("-V")
        .assert()
        .success()
        .stdout(predicates::str::contains(env!("CARGO_PKG_VERSION")));

    Ok(())
}

fn write_setup_local() -> Result<()> {
    let temp_dir = TempDir::new()?;

    get_command(&temp_dir)?
        .args(["-c", "static_tiny", "-v", "3.12", "-w"])
        .assert()
        .success();

    let patch = temp_dir.child("patch").child("static.tiny");
    patch.assert(predicates::path::is_file());
    patch.assert(predicates::str::starts_with("# -*- makefile -*-"));
    patch.assert(predicates::str::contains("\n# core\n"));
    patch.assert(predicates::str::contains("*disabled*"));
    patch.assert(predicates::str::contains("# end"));

    temp_dir.child("build").assert(predicates::path::missing());

    Ok(())
}

fn write_setup_local_with_dashes() -> Result<()> {
    let temp_dir = TempDir::new()?;

    get_command(&temp_dir)?
        .args(["-c", "shared-mid", "-w"])
        .assert()
        .success();

    temp_dir
        .child("patch")
        .child("shared.mid")
        .assert(predicates::path::is_file());

    Ok(())
}

fn write_json() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let out = temp_dir.child("out").child("config.json");

    get_command(&temp_dir)?
        .args(["-c", "shared_max", "-v", "3.13.11", "-w", "-s"])
        .arg(out.path())
        .assert()
        .success();

    out.assert(predicates::path::is_file());
    out.assert(predicates::str::contains("    \"header\": ["));
    out.assert(predicates::str::contains("\"extensions\": {"));
    out.assert(predicates::str::contains("\"static\": ["));
    temp_dir.child("patch").assert(predicates::path::missing());

    Ok(())
}

fn invalid_config_fails() -> Result<()> {
    let temp_dir = TempDir::new()?;

    get_command(&temp_dir)?
        .args(["-c", "shared_tiny", "-w"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("invalid build variant: shared_tiny"));

    Ok(())
}

fn unsupported_version_fails() -> Result<()> {
    let temp_dir = TempDir::new()?;

    get_command(&temp_dir)?
        .args(["-v", "3.9.18", "-w"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("unsupported python version"));

    Ok(())
}

fn unknown_build_type_fails() -> Result<()> {
    let temp_dir = TempDir::new()?;

    get_command(&temp_dir)?
        .args(["-t", "bogus-ext", "-n"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("build type bogus-ext is not available"));

    Ok(())
}

fn local_build_type_does_nothing() -> Result<()> {
    let temp_dir = TempDir::new()?;

    get_command(&temp_dir)?
        .args(["-t", "local"])
        .assert()
        .success()
        .stdout(predicates::str::is_empty());

    temp_dir.child("build").assert(predicates::path::missing());

    Ok(())
}

fn bad_bytecode_level_fails() -> Result<()> {
    let temp_dir = TempDir::new()?;

    get_command(&temp_dir)?
        .args(["-b", "5", "-n"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("--optimize-bytecode").normalize());

    Ok(())
}

fn run() -> Result<()> {
    app_version()?;
    write_setup_local()?;
    write_setup_local_with_dashes()?;
    write_json()?;
    invalid_config_fails()?;
    unsupported_version_fails()?;
    unknown_build_type_fails()?;
    local_build_type_does_nothing()?;
    bad_bytecode_level_fails()?;

    Ok(())
}

fn main() {
    run().expect("all tests should pass");
}
