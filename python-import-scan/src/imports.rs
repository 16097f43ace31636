// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Extraction of imported module names from Python source code.

Source is parsed with the tree-sitter Python grammar and every `import`
and `from ... import` statement in the tree is visited. A file that is not
valid Python 3 contributes no imports at all.
*/

use {
    crate::module_util::{is_module_name, top_level_package},
    log::debug,
    std::collections::BTreeSet,
    tree_sitter::{Node, Parser, Tree},
};

/// Statements the grammar accepts for Python 2 compatibility only.
const PYTHON2_STATEMENTS: &[&str] = &["print_statement", "exec_statement"];

fn parse(source: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    let language = tree_sitter_python::language();
    if let Err(e) = parser.set_language(&language) {
        debug!("failed to set language: {}", e);
        return None;
    }

    parser.parse(source, None)
}

fn node_text<'a>(node: &Node, source: &'a str) -> &'a str {
    &source[node.start_byte()..node.end_byte()]
}

/// Dotted names may be written with whitespace around the dots.
fn insert_top_level(dotted: &str, imports: &mut BTreeSet<String>) {
    let name = dotted.split_whitespace().collect::<String>();
    if is_module_name(&name) {
        imports.insert(top_level_package(&name).to_string());
    }
}

/// `import a.b, c as d`
fn visit_import(node: &Node, source: &str, imports: &mut BTreeSet<String>) {
    let mut cursor = node.walk();

    for child in node.children_by_field_name("name", &mut cursor) {
        let dotted = match child.kind() {
            "aliased_import" => child.child_by_field_name("name"),
            "dotted_name" => Some(child),
            _ => None,
        };

        if let Some(dotted) = dotted {
            insert_top_level(node_text(&dotted, source), imports);
        }
    }
}

/// `from a.b import c`, `from .a import b` and `from . import c`
fn visit_import_from(node: &Node, source: &str, imports: &mut BTreeSet<String>) {
    let module = match node.child_by_field_name("module_name") {
        Some(module) => module,
        None => return,
    };

    match module.kind() {
        "dotted_name" => insert_top_level(node_text(&module, source), imports),
        "relative_import" => {
            let mut cursor = module.walk();
            let dotted = module
                .named_children(&mut cursor)
                .find(|n| n.kind() == "dotted_name");
            if let Some(dotted) = dotted {
                insert_top_level(node_text(&dotted, source), imports);
            }
        }
        _ => {}
    }
}

/// Extract the top-level names of all modules imported by Python source.
///
/// Both `import a.b` and `from a.b import c` forms contribute `a`, wherever
/// the statement appears. Relative imports contribute the named module, if
/// any. Source that does not parse yields an empty set.
pub fn extract_imports(source: &str) -> BTreeSet<String> {
    let tree = match parse(source) {
        Some(tree) => tree,
        None => return BTreeSet::new(),
    };

    let root = tree.root_node();
    if root.has_error() {
        debug!("skipping source with syntax errors");
        return BTreeSet::new();
    }

    let mut imports = BTreeSet::new();
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        match node.kind() {
            "import_statement" => visit_import(&node, source, &mut imports),
            "import_from_statement" => visit_import_from(&node, source, &mut imports),
            "future_import_statement" => {
                imports.insert("__future__".to_string());
            }
            kind if PYTHON2_STATEMENTS.contains(&kind) => {
                debug!("skipping source with python 2 {}", kind);
                return BTreeSet::new();
            }
            _ => {
                let mut cursor = node.walk();
                stack.extend(node.named_children(&mut cursor));
            }
        }
    }

    imports
}
