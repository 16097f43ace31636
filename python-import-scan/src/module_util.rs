// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Utility functions related to Python module names. */

/// Resolve the top-level package of a fully qualified module name.
///
/// `foo.bar.baz` resolves to `foo`.
pub fn top_level_package(module: &str) -> &str {
    match module.find('.') {
        Some(idx) => &module[0..idx],
        None => module,
    }
}

/// Whether a string is a valid Python identifier.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();

    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }

    chars.all(|c| c == '_' || c.is_alphanumeric())
}

/// Whether a dotted module name is made of valid identifiers.
pub fn is_module_name(s: &str) -> bool {
    !s.is_empty() && s.split('.').all(is_identifier)
}

/// Derive the import name from a pip requirement string.
///
/// Extras and version specifiers are stripped, `-` becomes `_` and the
/// result is lowercased: `Foo-Bar[extra]>=1.0` becomes `foo_bar`.
pub fn import_name_from_requirement(requirement: &str) -> String {
    let end = requirement
        .find(|c: char| matches!(c, '[' | '<' | '>' | '=' | '!' | '~' | ';' | ' ' | '@'))
        .unwrap_or(requirement.len());

    requirement[..end].replace('-', "_").to_lowercase()
}
