// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Scanning downloaded package archives for imports. */

use {
    crate::{imports::extract_imports, python_source::decode_python_source},
    buildpy_common::{archive::read_archive_members, Result},
    log::{debug, warn},
    serde::Serialize,
    std::{
        collections::BTreeSet,
        path::{Path, PathBuf},
    },
};

/// Imports found across a set of Python source files.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ScanSummary {
    pub imports: BTreeSet<String>,
    pub files_analyzed: usize,
}

impl ScanSummary {
    /// Record the imports of a single source file.
    pub fn add_source(&mut self, data: &[u8]) {
        let source = decode_python_source(data);
        self.imports.extend(extract_imports(&source));
        self.files_analyzed += 1;
    }

    pub fn merge(&mut self, other: ScanSummary) {
        self.imports.extend(other.imports);
        self.files_analyzed += other.files_analyzed;
    }
}

/// Whether a downloaded file is an archive this module knows how to scan.
pub fn is_scannable_archive(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    name.ends_with(".whl") || name.ends_with(".tar.gz")
}

/// Scan the `.py` members of a wheel or source tarball.
pub fn scan_archive(path: &Path) -> Result<ScanSummary> {
    let mut summary = ScanSummary::default();

    for (name, data) in read_archive_members(path, |name| name.ends_with(".py"))? {
        debug!("scanning {}", name);
        summary.add_source(&data);
    }

    Ok(summary)
}

/// Scan every recognized archive in a directory.
///
/// Archives that cannot be read are reported and skipped. The paths of the
/// archives visited are returned alongside the combined summary.
pub fn scan_directory(dir: &Path) -> Result<(ScanSummary, Vec<PathBuf>)> {
    let mut paths = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    paths.sort();

    let mut summary = ScanSummary::default();
    let mut visited = vec![];

    for path in paths.into_iter().filter(|p| is_scannable_archive(p)) {
        match scan_archive(&path) {
            Ok(s) => summary.merge(s),
            Err(e) => warn!("could not analyze {}: {}", path.display(), e),
        }
        visited.push(path);
    }

    Ok((summary, visited))
}

#[cfg(test)]
mod tests {
    use {super::*, indoc::indoc, std::io::Write};

    fn write_wheel(path: &Path, files: &[(&str, &str)]) -> Result<()> {
        let mut zf = zip::ZipWriter::new(std::fs::File::create(path)?);

        for (name, content) in files {
            zf.start_file(*name, zip::write::FileOptions::default())?;
            zf.write_all(content.as_bytes())?;
        }
        zf.finish()?;

        Ok(())
    }

    fn write_sdist(path: &Path, files: &[(&str, &str)]) -> Result<()> {
        let encoder = flate2::write::GzEncoder::new(
            std::fs::File::create(path)?,
            flate2::Compression::default(),
        );
        let mut builder = tar::Builder::new(encoder);

        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, name, content.as_bytes())?;
        }
        builder.into_inner()?.finish()?;

        Ok(())
    }

    #[test]
    fn test_scan_wheel() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let wheel = temp_dir.path().join("demo-1.0-py3-none-any.whl");
        write_wheel(
            &wheel,
            &[
                (
                    "demo/__init__.py",
                    indoc! {"
                        import json
                        from urllib.parse import urlparse
                        from . import util
                    "},
                ),
                ("demo/util.py", "import requests\n"),
                ("demo-1.0.dist-info/METADATA", "import notpython\n"),
            ],
        )?;

        let summary = scan_archive(&wheel)?;
        assert_eq!(summary.files_analyzed, 2);
        assert_eq!(
            summary.imports.into_iter().collect::<Vec<_>>(),
            vec!["json", "requests", "urllib"]
        );

        Ok(())
    }

    #[test]
    fn test_scan_directory() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        write_wheel(
            &temp_dir.path().join("a-1.0-py3-none-any.whl"),
            &[("a/__init__.py", "import ssl\n")],
        )?;
        write_sdist(
            &temp_dir.path().join("b-2.0.tar.gz"),
            &[("b-2.0/b.py", "import sqlite3\n")],
        )?;
        std::fs::write(temp_dir.path().join("broken-1.0-py3-none-any.whl"), b"nope")?;
        std::fs::write(temp_dir.path().join("notes.txt"), b"import os")?;

        let (summary, visited) = scan_directory(temp_dir.path())?;

        assert_eq!(visited.len(), 3);
        assert_eq!(summary.files_analyzed, 2);
        assert!(summary.imports.contains("ssl"));
        assert!(summary.imports.contains("sqlite3"));
        assert!(!summary.imports.contains("os"));

        Ok(())
    }
}
