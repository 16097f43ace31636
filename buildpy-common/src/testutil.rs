// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {once_cell::sync::Lazy, std::path::PathBuf};

pub static DEFAULT_TEMP_DIR: Lazy<tempfile::TempDir> = Lazy::new(|| {
    tempfile::Builder::new()
        .prefix("buildpy-test")
        .tempdir()
        .expect("unable to create temporary directory")
});

/// Create a fresh, uniquely named directory under [DEFAULT_TEMP_DIR].
pub fn scratch_dir(name: &str) -> PathBuf {
    let p = tempfile::Builder::new()
        .prefix(name)
        .tempdir_in(DEFAULT_TEMP_DIR.path())
        .expect("unable to create scratch directory")
        .into_path();

    std::fs::create_dir_all(&p).expect("unable to create scratch directory");

    p
}
