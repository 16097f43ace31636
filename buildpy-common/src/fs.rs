// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Filesystem helpers used while assembling an installation. */

use {
    crate::error::{BuildError, Result},
    log::debug,
    std::path::{Path, PathBuf},
};

fn clear_readonly(path: &Path) -> Result<()> {
    let mut permissions = std::fs::symlink_metadata(path)?.permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    permissions.set_readonly(false);
    std::fs::set_permissions(path, permissions)?;

    Ok(())
}

/// Remove a file, symlink, or directory tree.
///
/// Missing paths are silently ignored. Read-only files are made writable
/// and removal is retried.
pub fn remove_path(path: &Path) -> Result<()> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    if metadata.is_dir() {
        debug!("removing folder: {}", path.display());
        remove_dir_all::remove_dir_all(path)?;
    } else {
        debug!("removing file: {}", path.display());
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::PermissionDenied {
                return Err(e.into());
            }
            clear_readonly(path)?;
            std::fs::remove_file(path)?;
        }
    }

    Ok(())
}

/// Copy a file or directory tree, behaving like `cp -rf`.
///
/// Directory trees are merged into `dst`. Symlinks are followed.
pub fn copy_path(src: &Path, dst: &Path) -> Result<()> {
    debug!("copy {} to {}", src.display(), dst.display());

    if !src.is_dir() {
        let dst = if dst.is_dir() {
            dst.join(file_name(src)?)
        } else {
            dst.to_path_buf()
        };
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(src, &dst)?;
        return Ok(());
    }

    for entry in walkdir::WalkDir::new(src).follow_links(true) {
        let entry = entry?;
        let dest_path = dst.join(relative_to(entry.path(), src)?);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest_path)?;
        } else {
            std::fs::copy(entry.path(), &dest_path)?;
        }
    }

    Ok(())
}

/// Copy a directory tree, recreating symlinks instead of following them.
///
/// Symlinks are copied as the file they point to on platforms without
/// symlink support.
pub fn copy_tree_preserving_symlinks(src: &Path, dst: &Path) -> Result<()> {
    debug!("copy tree {} to {}", src.display(), dst.display());

    for entry in walkdir::WalkDir::new(src).sort_by_file_name() {
        let entry = entry?;
        let dest_path = dst.join(relative_to(entry.path(), src)?);

        if entry.path_is_symlink() {
            let target = std::fs::read_link(entry.path())?;

            #[cfg(unix)]
            std::os::unix::fs::symlink(&target, &dest_path)?;

            #[cfg(not(unix))]
            {
                let resolved = entry
                    .path()
                    .parent()
                    .map(|p| p.join(&target))
                    .unwrap_or(target);
                std::fs::copy(resolved, &dest_path)?;
            }
        } else if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest_path)?;
        } else {
            std::fs::copy(entry.path(), &dest_path)?;
        }
    }

    Ok(())
}

/// Move a file or directory.
///
/// When `dst` is an existing directory, `src` is moved inside it. Moves
/// across filesystems fall back to copy and remove.
pub fn move_path(src: &Path, dst: &Path) -> Result<PathBuf> {
    let dst = if dst.is_dir() {
        dst.join(file_name(src)?)
    } else {
        dst.to_path_buf()
    };
    debug!("moving {} to {}", src.display(), dst.display());

    if std::fs::rename(src, &dst).is_err() {
        if src.is_dir() {
            copy_tree_preserving_symlinks(src, &dst)?;
        } else {
            std::fs::copy(src, &dst)?;
        }
        remove_path(src)?;
    }

    Ok(dst)
}

/// Move every entry of `src_dir` matching a glob pattern into `dst`.
pub fn glob_move(src_dir: &Path, pattern: &str, dst: &Path) -> Result<Vec<PathBuf>> {
    let full = src_dir.join(pattern);
    let full = full
        .to_str()
        .ok_or_else(|| BuildError::General(format!("non-utf8 path: {}", full.display())))?;

    let mut moved = vec![];
    for entry in glob::glob(full)? {
        let path = entry.map_err(|e| BuildError::Io(e.into_error()))?;
        moved.push(move_path(&path, dst)?);
    }

    Ok(moved)
}

/// Recursively walk `root`, calling `action` on every directory and file
/// for which `matcher` returns true.
///
/// Directories whose name appears in `skip_dirs` are neither matched nor
/// descended into. Entries that no longer exist after `action` ran are not
/// descended into either.
pub fn walk_matching<M, A>(root: &Path, skip_dirs: &[&str], matcher: &M, action: &mut A) -> Result<()>
where
    M: Fn(&Path) -> bool,
    A: FnMut(&Path) -> Result<()>,
{
    let mut entries = std::fs::read_dir(root)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() && skip_dirs.iter().any(|s| entry.file_name() == *s) {
            continue;
        }

        if matcher(&path) {
            action(&path)?;
        }

        if file_type.is_dir() && path.is_dir() {
            walk_matching(&path, skip_dirs, matcher, action)?;
        }
    }

    Ok(())
}

/// Remove everything under `root` whose file name matches any of the
/// shell-style `patterns`.
///
/// Returns the paths that were removed.
pub fn glob_remove(root: &Path, patterns: &[&str], skip_dirs: &[&str]) -> Result<Vec<PathBuf>> {
    let patterns = patterns
        .iter()
        .map(|p| glob::Pattern::new(p))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let matcher = |path: &Path| {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|name| patterns.iter().any(|p| p.matches(name)))
            .unwrap_or(false)
    };

    let mut removed = vec![];
    walk_matching(root, skip_dirs, &matcher, &mut |path: &Path| -> Result<()> {
        remove_path(path)?;
        removed.push(path.to_path_buf());
        Ok(())
    })?;

    Ok(removed)
}

/// Total size in bytes of the regular files under a path.
///
/// A file path yields its own size. Missing paths yield 0.
pub fn directory_size(path: &Path) -> u64 {
    if path.is_file() {
        return std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    }

    walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Set the permission bits of a file.
#[cfg(unix)]
pub fn set_executable(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    debug!("change permission of {} to {:o}", path.display(), mode);
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;

    Ok(())
}

/// Set the permission bits of a file.
#[cfg(not(unix))]
pub fn set_executable(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

fn file_name(path: &Path) -> Result<&std::ffi::OsStr> {
    path.file_name()
        .ok_or_else(|| BuildError::General(format!("{} has no file name", path.display())))
}

fn relative_to<'a>(path: &'a Path, base: &Path) -> Result<&'a Path> {
    path.strip_prefix(base)
        .map_err(|e| BuildError::General(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, b"x")?;
        Ok(())
    }

    #[test]
    fn test_remove_missing_is_ok() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        remove_path(&temp_dir.path().join("nope"))?;

        Ok(())
    }

    #[test]
    fn test_glob_remove() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let lib = temp_dir.path().join("python3.13");
        touch(&lib.join("os.py"))?;
        touch(&lib.join("test").join("test_os.py"))?;
        touch(&lib.join("json").join("__pycache__").join("x.pyc"))?;
        touch(&lib.join("lib-dynload").join("_test_capi.so"))?;
        touch(&lib.join(".git").join("__pycache__").join("keep.pyc"))?;

        let removed = glob_remove(&lib, &["test", "__pycache__", "_test*"], &[".git"])?;

        assert_eq!(removed.len(), 3);
        assert!(lib.join("os.py").exists());
        assert!(!lib.join("test").exists());
        assert!(!lib.join("json").join("__pycache__").exists());
        assert!(lib.join("json").exists());
        assert!(!lib.join("lib-dynload").join("_test_capi.so").exists());
        assert!(lib.join(".git").join("__pycache__").exists());

        Ok(())
    }

    #[test]
    fn test_glob_move_into_directory() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let src = temp_dir.path().join("lib");
        let dst = temp_dir.path().join("libs");
        touch(&src.join("python3.lib"))?;
        touch(&src.join("python313.lib"))?;
        touch(&src.join("python3.dll"))?;
        std::fs::create_dir_all(&dst)?;

        let moved = glob_move(&src, "*.lib", &dst)?;
        assert_eq!(moved.len(), 2);
        assert!(dst.join("python313.lib").exists());
        assert!(src.join("python3.dll").exists());

        Ok(())
    }

    #[test]
    fn test_copy_and_size() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let src = temp_dir.path().join("a");
        touch(&src.join("one"))?;
        touch(&src.join("sub").join("two"))?;

        let dst = temp_dir.path().join("b");
        copy_path(&src, &dst)?;
        assert!(dst.join("sub").join("two").exists());
        assert_eq!(directory_size(&dst), 2);
        assert_eq!(directory_size(&dst.join("one")), 1);
        assert_eq!(directory_size(&temp_dir.path().join("missing")), 0);

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_tree_preserves_symlinks() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let src = temp_dir.path().join("prefix");
        touch(&src.join("bin").join("python3.13"))?;
        std::os::unix::fs::symlink("python3.13", src.join("bin").join("python3"))?;

        let dst = temp_dir.path().join("copy");
        copy_tree_preserving_symlinks(&src, &dst)?;

        let link = dst.join("bin").join("python3");
        assert!(std::fs::symlink_metadata(&link)?.file_type().is_symlink());
        assert_eq!(std::fs::read_link(&link)?, PathBuf::from("python3.13"));

        Ok(())
    }
}
