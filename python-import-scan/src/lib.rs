// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Discovering what a Python package needs from the standard library.

This crate finds the modules imported by Python source code (including
source inside wheels and sdists) and maps standard library imports to the
C extension modules a CPython build has to provide for them.
*/

pub mod imports;
pub mod module_util;
pub mod package_scan;
pub mod python_source;
pub mod stdlib;
