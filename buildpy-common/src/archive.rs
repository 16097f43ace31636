// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Reading, extracting, and writing tar and zip archives. */

use {
    crate::error::{BuildError, Result},
    log::{debug, warn},
    std::{
        fs::File,
        io::{BufReader, Read, Seek, Write},
        path::{Component, Path, PathBuf},
    },
};

/// Archive formats understood by this crate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArchiveFormat {
    TarGz,
    TarXz,
    Tar,
    Zip,
}

impl ArchiveFormat {
    /// Resolve the format from a file name.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();

        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Self::TarXz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else if name.ends_with(".zip") || name.ends_with(".whl") {
            Some(Self::Zip)
        } else {
            None
        }
    }

    /// Resolve the format from the leading bytes of a file.
    pub fn from_magic(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0x1f, 0x8b]) {
            Some(Self::TarGz)
        } else if data.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
            Some(Self::TarXz)
        } else if data.starts_with(b"PK\x03\x04") {
            Some(Self::Zip)
        } else if data.len() > 262 && &data[257..262] == b"ustar" {
            Some(Self::Tar)
        } else {
            None
        }
    }

    /// Detect the format of an archive on disk.
    pub fn detect(path: &Path) -> Result<Self> {
        if let Some(format) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(Self::from_file_name)
        {
            return Ok(format);
        }

        let mut header = Vec::with_capacity(512);
        File::open(path)?.take(512).read_to_end(&mut header)?;

        Self::from_magic(&header).ok_or_else(|| {
            BuildError::Extraction(format!("unsupported archive type: {}", path.display()))
        })
    }
}

fn get_decompression_stream(format: ArchiveFormat, fh: File) -> Result<Box<dyn Read>> {
    let reader = BufReader::new(fh);

    match format {
        ArchiveFormat::TarGz => Ok(Box::new(flate2::read::GzDecoder::new(reader))),
        ArchiveFormat::TarXz => Ok(Box::new(xz2::read::XzDecoder::new(reader))),
        ArchiveFormat::Tar => Ok(Box::new(reader)),
        ArchiveFormat::Zip => Err(BuildError::Extraction(
            "zip archives are not tar streams".to_string(),
        )),
    }
}

/// Lexically resolve `.` and `..` components.
///
/// Returns `None` if the path climbs above its starting point.
fn normalize_relative(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::Normal(c) => out.push(c),
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    Some(out)
}

/// Whether a symlink at `entry_path` pointing at `target` stays inside the
/// extraction root. Both paths are relative to the root.
fn symlink_stays_inside(entry_path: &Path, target: &Path) -> bool {
    if target.is_absolute() {
        return false;
    }

    let base = entry_path.parent().unwrap_or_else(|| Path::new(""));
    normalize_relative(&base.join(target)).is_some()
}

fn extract_tar(format: ArchiveFormat, archive: &Path, dest: &Path) -> Result<()> {
    let mut tf = tar::Archive::new(get_decompression_stream(format, File::open(archive)?)?);

    for entry in tf.entries()? {
        let mut entry = entry
            .map_err(|e| BuildError::Extraction(format!("failed to iterate over archive: {}", e)))?;

        entry.set_preserve_mtime(false);

        let path = entry.path()?.to_path_buf();
        if normalize_relative(&path).is_none() {
            return Err(BuildError::Extraction(format!(
                "path traversal detected: {}",
                path.display()
            )));
        }

        if let Some(link) = entry.link_name()? {
            if entry.header().entry_type().is_symlink() && !symlink_stays_inside(&path, &link) {
                warn!(
                    "skipping symlink escaping archive root: {} -> {}",
                    path.display(),
                    link.display()
                );
                continue;
            }
        }

        if !entry.unpack_in(dest)? {
            return Err(BuildError::Extraction(format!(
                "path traversal detected: {}",
                path.display()
            )));
        }
    }

    Ok(())
}

fn extract_zip<R: Read + Seek>(reader: R, dest: &Path) -> Result<()> {
    let mut za = zip::ZipArchive::new(reader)?;

    for i in 0..za.len() {
        let mut file = za.by_index(i)?;

        let rel_path = file.enclosed_name().map(|p| p.to_path_buf()).ok_or_else(|| {
            BuildError::Extraction(format!("path traversal detected: {}", file.name()))
        })?;
        let dest_path = dest.join(&rel_path);

        if file.is_dir() {
            std::fs::create_dir_all(&dest_path)?;
            continue;
        }

        if let Some(parent) = dest_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut fh = File::create(&dest_path)?;
        std::io::copy(&mut file, &mut fh)?;

        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dest_path, std::fs::Permissions::from_mode(mode & 0o777))?;
        }
    }

    Ok(())
}

/// Ensure everything under a directory is writable.
///
/// Source archives sometimes carry read-only members, which later breaks
/// overwriting or removing them.
fn make_tree_writable(root: &Path) -> Result<()> {
    for entry in walkdir::WalkDir::new(root) {
        let entry = entry?;

        if entry.path_is_symlink() {
            continue;
        }

        let mut permissions = entry.metadata()?.permissions();
        if permissions.readonly() {
            #[allow(clippy::permissions_set_readonly_false)]
            permissions.set_readonly(false);
            std::fs::set_permissions(entry.path(), permissions)?;
        }
    }

    Ok(())
}

/// Extract an archive into a directory.
///
/// Members that would land outside `dest` abort the extraction. Symlinks
/// pointing outside `dest` are skipped.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let format = ArchiveFormat::detect(archive)?;
    debug!("extracting {} ({:?}) to {}", archive.display(), format, dest.display());

    std::fs::create_dir_all(dest)?;

    match format {
        ArchiveFormat::Zip => extract_zip(BufReader::new(File::open(archive)?), dest)?,
        _ => extract_tar(format, archive, dest)?,
    }

    make_tree_writable(dest)
}

/// Write the content of a directory to a deflate-compressed zip file.
///
/// Entries are added in sorted order with paths relative to `source`.
/// Symlinks are followed. Returns the number of files written.
pub fn write_zip_from_directory(source: &Path, dest_zip: &Path) -> Result<usize> {
    if let Some(parent) = dest_zip.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut zf = zip::ZipWriter::new(File::create(dest_zip)?);
    let mut count = 0;

    let walk = walkdir::WalkDir::new(source)
        .follow_links(true)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()));

    for entry in walk {
        let entry = entry?;

        let rel_path = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| BuildError::General(e.to_string()))?;
        if rel_path.as_os_str().is_empty() {
            continue;
        }

        let name = rel_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        if entry.file_type().is_dir() {
            zf.add_directory(name, options)?;
            continue;
        }

        #[cfg(unix)]
        let options = {
            use std::os::unix::fs::PermissionsExt;
            options.unix_permissions(entry.metadata()?.permissions().mode() & 0o777)
        };

        zf.start_file(name, options)?;
        let mut fh = File::open(entry.path())?;
        std::io::copy(&mut fh, &mut zf)?;
        count += 1;
    }

    zf.finish()?.flush()?;

    Ok(count)
}

/// Read the content of archive members whose name matches a predicate.
///
/// Zip files (including wheels) and tarballs are supported. Directory
/// entries are never returned.
pub fn read_archive_members<F>(archive: &Path, predicate: F) -> Result<Vec<(String, Vec<u8>)>>
where
    F: Fn(&str) -> bool,
{
    let format = ArchiveFormat::detect(archive)?;
    let mut members = vec![];

    match format {
        ArchiveFormat::Zip => {
            let mut za = zip::ZipArchive::new(BufReader::new(File::open(archive)?))?;

            for i in 0..za.len() {
                let mut file = za.by_index(i)?;
                if file.is_dir() || !predicate(file.name()) {
                    continue;
                }

                let name = file.name().to_string();
                let mut data = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut data)?;
                members.push((name, data));
            }
        }
        _ => {
            let mut tf =
                tar::Archive::new(get_decompression_stream(format, File::open(archive)?)?);

            for entry in tf.entries()? {
                let mut entry = entry?;
                if !entry.header().entry_type().is_file() {
                    continue;
                }

                let name = entry.path()?.to_string_lossy().to_string();
                if !predicate(&name) {
                    continue;
                }

                let mut data = vec![];
                entry.read_to_end(&mut data)?;
                members.push((name, data));
            }
        }
    }

    Ok(members)
}
