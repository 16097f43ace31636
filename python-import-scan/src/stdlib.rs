// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Knowledge about the CPython standard library.

The tables here cover Python 3.11 through 3.14 and relate importable
standard library modules to the C extension modules a build must provide
for them.
*/

use {
    once_cell::sync::Lazy,
    std::collections::{BTreeMap, BTreeSet},
};

/// Top-level standard library module names, including private C extensions.
pub static STDLIB_MODULES: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    [
        "abc", "aifc", "argparse", "array", "ast", "asyncio", "atexit", "base64", "bdb",
        "binascii", "bisect", "builtins", "bz2", "calendar", "cgi", "cgitb", "chunk", "cmath",
        "cmd", "code", "codecs", "codeop", "collections", "colorsys", "compileall", "concurrent",
        "configparser", "contextlib", "contextvars", "copy", "copyreg", "cProfile", "crypt", "csv",
        "ctypes", "curses", "dataclasses", "datetime", "dbm", "decimal", "difflib", "dis",
        "doctest", "email", "encodings", "enum", "errno", "faulthandler", "fcntl", "filecmp",
        "fileinput", "fnmatch", "fractions", "ftplib", "functools", "gc", "getopt", "getpass",
        "gettext", "glob", "graphlib", "grp", "gzip", "hashlib", "heapq", "hmac", "html", "http",
        "idlelib", "imaplib", "imghdr", "importlib", "inspect", "io", "ipaddress", "itertools",
        "json", "keyword", "lib2to3", "linecache", "locale", "logging", "lzma", "mailbox",
        "mailcap", "marshal", "math", "mimetypes", "mmap", "modulefinder", "multiprocessing",
        "netrc", "nis", "nntplib", "numbers", "operator", "optparse", "os", "ossaudiodev",
        "pathlib", "pdb", "pickle", "pickletools", "pipes", "pkgutil", "platform", "plistlib",
        "poplib", "posix", "posixpath", "pprint", "profile", "pstats", "pty", "pwd", "py_compile",
        "pyclbr", "pydoc", "queue", "quopri", "random", "re", "readline", "reprlib", "resource",
        "rlcompleter", "runpy", "sched", "secrets", "select", "selectors", "shelve", "shlex",
        "shutil", "signal", "site", "smtpd", "smtplib", "sndhdr", "socket", "socketserver", "spwd",
        "sqlite3", "ssl", "stat", "statistics", "string", "stringprep", "struct", "subprocess",
        "sunau", "symtable", "sys", "sysconfig", "syslog", "tabnanny", "tarfile", "telnetlib",
        "tempfile", "termios", "test", "textwrap", "threading", "time", "timeit", "tkinter",
        "token", "tokenize", "tomllib", "trace", "traceback", "tracemalloc", "tty", "turtle",
        "turtledemo", "types", "typing", "unicodedata", "unittest", "urllib", "uu", "uuid", "venv",
        "warnings", "wave", "weakref", "webbrowser", "winreg", "winsound", "wsgiref", "xdrlib",
        "xml", "xmlrpc", "zipapp", "zipfile", "zipimport", "zlib", "zoneinfo", "_abc", "_asyncio",
        "_bisect", "_blake2", "_bz2", "_codecs", "_collections", "_contextvars", "_csv", "_ctypes",
        "_datetime", "_decimal", "_elementtree", "_functools", "_hashlib", "_heapq", "_io",
        "_json", "_locale", "_lsprof", "_lzma", "_md5", "_multibytecodec", "_multiprocessing",
        "_opcode", "_operator", "_pickle", "_posixshmem", "_posixsubprocess", "_queue", "_random",
        "_sha1", "_sha256", "_sha512", "_sha3", "_signal", "_socket", "_sqlite3", "_sre", "_ssl",
        "_stat", "_statistics", "_struct", "_symtable", "_thread", "_tracemalloc", "_typing",
        "_uuid", "_weakref", "_zoneinfo",
    ]
    .into_iter()
    .collect()
});

/// Standard library modules and the C extension modules they require.
///
/// Some edges are transitive, e.g. `inspect` imports `dis` which needs
/// `_opcode`.
pub static STDLIB_TO_EXTENSION: &[(&str, &[&str])] = &[
    (
        "hashlib",
        &["_hashlib", "_md5", "_sha1", "_sha256", "_sha512", "_sha3", "_blake2"],
    ),
    ("ssl", &["_ssl"]),
    ("sqlite3", &["_sqlite3"]),
    ("json", &["_json"]),
    ("pickle", &["_pickle"]),
    ("datetime", &["_datetime"]),
    ("decimal", &["_decimal"]),
    ("ctypes", &["_ctypes"]),
    ("lzma", &["_lzma"]),
    ("bz2", &["_bz2"]),
    ("zlib", &["zlib"]),
    ("xml", &["_elementtree", "pyexpat"]),
    ("csv", &["_csv"]),
    ("asyncio", &["_asyncio"]),
    ("multiprocessing", &["_multiprocessing", "_posixshmem"]),
    ("collections", &["_collections"]),
    ("functools", &["_functools"]),
    ("itertools", &["itertools"]),
    ("math", &["math", "cmath"]),
    ("struct", &["_struct"]),
    ("array", &["array"]),
    ("select", &["select"]),
    ("socket", &["_socket"]),
    ("unicodedata", &["unicodedata"]),
    ("binascii", &["binascii"]),
    ("mmap", &["mmap"]),
    ("fcntl", &["fcntl"]),
    ("grp", &["grp"]),
    ("pwd", &["pwd"]),
    ("readline", &["readline"]),
    ("uuid", &["_uuid"]),
    ("statistics", &["_statistics"]),
    ("typing", &["_typing"]),
    ("inspect", &["_opcode"]),
    ("dis", &["_opcode"]),
    ("subprocess", &["_posixsubprocess", "select", "fcntl"]),
    ("random", &["_random"]),
    ("heapq", &["_heapq"]),
    ("bisect", &["_bisect"]),
    ("contextvars", &["_contextvars"]),
    ("zoneinfo", &["_zoneinfo"]),
];

/// Extension modules that are never candidates for removal.
///
/// `zlib` is needed to import from a zipped standard library.
pub static CORE_MODULES: &[&str] = &[
    "_abc",
    "_io",
    "_sre",
    "_codecs",
    "_collections",
    "_functools",
    "_locale",
    "_operator",
    "_signal",
    "_stat",
    "_symtable",
    "_thread",
    "_tracemalloc",
    "_weakref",
    "atexit",
    "errno",
    "faulthandler",
    "itertools",
    "posix",
    "pwd",
    "time",
    "zlib",
];

/// Removable paths, relative to `lib/pythonX.Y`, of pure Python packages.
///
/// `ensurepip` maps to nothing so it is never removed.
pub static STDLIB_MODULE_PATHS: &[(&str, &[&str])] = &[
    ("tkinter", &["tkinter/", "turtle.py", "turtledemo/"]),
    ("idlelib", &["idlelib/"]),
    ("test", &["test/"]),
    ("lib2to3", &["lib2to3/"]),
    ("ensurepip", &[]),
    ("distutils", &["distutils/"]),
    ("curses", &["curses/"]),
    ("dbm", &["dbm/"]),
    ("multiprocessing", &["multiprocessing/"]),
    ("concurrent", &["concurrent/"]),
    ("asyncio", &["asyncio/"]),
    ("email", &["email/"]),
    ("html", &["html/"]),
    ("http", &["http/"]),
    ("json", &["json/"]),
    ("logging", &["logging/"]),
    ("unittest", &["unittest/"]),
    ("urllib", &["urllib/"]),
    ("xml", &["xml/"]),
    ("xmlrpc", &["xmlrpc/"]),
    ("ctypes", &["ctypes/"]),
    ("sqlite3", &["sqlite3/"]),
    ("pydoc_data", &["pydoc_data/"]),
];

static EXTENSION_MAP: Lazy<BTreeMap<&'static str, &'static [&'static str]>> =
    Lazy::new(|| STDLIB_TO_EXTENSION.iter().copied().collect());

/// Whether a top-level module name belongs to the standard library.
pub fn is_stdlib_module(name: &str) -> bool {
    STDLIB_MODULES.contains(name)
}

/// Whether an extension module is one that must always be built.
pub fn is_core_module(name: &str) -> bool {
    CORE_MODULES.contains(&name)
}

/// The C extension modules a standard library module needs.
pub fn extensions_for(module: &str) -> &'static [&'static str] {
    EXTENSION_MAP.get(module).copied().unwrap_or(&[])
}

/// Resolve the extension modules required by a set of stdlib imports.
///
/// Imports starting with `_` are taken to be extension modules themselves.
pub fn required_extensions<'a, I>(stdlib_imports: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut required = BTreeSet::new();

    for module in stdlib_imports {
        required.extend(extensions_for(module).iter().map(|s| s.to_string()));

        if module.starts_with('_') {
            required.insert(module.to_string());
        }
    }

    required
}
