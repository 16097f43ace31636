// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Shared functionality for the buildpy crates.

This crate downloads and verifies source archives, extracts and writes
tar and zip files, and provides the filesystem primitives used when
assembling and trimming a Python installation.
*/

pub mod archive;
pub mod error;
pub mod fs;
pub mod http;
pub mod testutil;

pub use error::{BuildError, Result};
