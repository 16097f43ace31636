// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*!
Building distributable CPython runtimes from source.

buildpy downloads CPython and the native libraries it links against,
decides which extension modules are compiled into the interpreter, built as
shared extensions or left out, and turns the installed result into a
compact, relocatable runtime with a zipped standard library.

Packages that will run on the runtime can be analyzed for the parts of the
standard library they import, and everything else removed from a build.
*/

pub mod analysis;
pub mod builders;
pub mod cli;
pub mod environment;
pub mod logging;
pub mod project_layout;
pub mod reduction;
pub mod report;
pub mod setup_config;
pub mod shell;
