// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Fetching source archives over HTTP. */

use {
    crate::error::{BuildError, Result},
    fs2::FileExt,
    log::{debug, info, warn},
    sha2::Digest,
    std::{
        fs::File,
        io::{BufReader, Read},
        path::{Path, PathBuf},
        str::FromStr,
    },
    url::Url,
};

/// Obtain an HTTP client, taking proxy environment variables into account.
pub fn get_http_client() -> reqwest::Result<reqwest::blocking::Client> {
    let mut builder = reqwest::blocking::ClientBuilder::new();

    for (key, value) in std::env::vars() {
        let key = key.to_lowercase();
        if key.ends_with("_proxy") {
            let end = key.len() - "_proxy".len();
            let schema = &key[..end];

            if let Ok(url) = Url::parse(&value) {
                if let Some(Ok(proxy)) = match schema {
                    "http" => Some(reqwest::Proxy::http(url.as_str())),
                    "https" => Some(reqwest::Proxy::https(url.as_str())),
                    _ => None,
                } {
                    builder = builder.proxy(proxy);
                }
            }
        }
    }

    builder.build()
}

/// Hash algorithms accepted for archive verification.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChecksumAlgorithm {
    Sha256,
    Sha512,
    Md5,
}

impl FromStr for ChecksumAlgorithm {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            "md5" => Ok(Self::Md5),
            other => Err(BuildError::Validation(format!(
                "unsupported checksum algorithm: {}",
                other
            ))),
        }
    }
}

fn digest_reader<D: Digest>(mut reader: impl Read) -> Result<String> {
    let mut hasher = D::new();
    let mut buffer = [0; 32768];

    loop {
        let count = reader.read(&mut buffer)?;
        if count == 0 {
            break;
        }
        hasher.update(&buffer[..count]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compute the hex digest of a file.
pub fn file_digest(path: &Path, algorithm: ChecksumAlgorithm) -> Result<String> {
    let reader = BufReader::new(File::open(path)?);

    match algorithm {
        ChecksumAlgorithm::Sha256 => digest_reader::<sha2::Sha256>(reader),
        ChecksumAlgorithm::Sha512 => digest_reader::<sha2::Sha512>(reader),
        ChecksumAlgorithm::Md5 => digest_reader::<md5::Md5>(reader),
    }
}

/// Whether the digest of a file matches an expected hex digest.
///
/// Comparison is case insensitive.
pub fn validate_checksum(path: &Path, expected: &str, algorithm: ChecksumAlgorithm) -> Result<bool> {
    Ok(file_digest(path, algorithm)?.eq_ignore_ascii_case(expected))
}

/// Resolve the file name a URL downloads to.
pub fn url_filename(url: &str) -> Result<String> {
    let u = Url::parse(url)?;

    u.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| BuildError::Download(format!("cannot resolve file name of {}", url)))
}

/// Held while a download directory is being written to.
///
/// Multiple processes could race to populate the same cache directory.
struct DownloadLock {
    file: File,
}

impl DownloadLock {
    fn new(dest_dir: &Path) -> Result<Self> {
        let file = File::create(dest_dir.join(".download-lock"))?;
        file.lock_exclusive()?;

        Ok(Self { file })
    }
}

impl Drop for DownloadLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn fetch_to_path(url: &str, dest: &Path) -> Result<()> {
    let client = get_http_client()?;
    let mut response = client.get(Url::parse(url)?).send()?.error_for_status()?;

    let temp = tempfile::NamedTempFile::new_in(
        dest.parent()
            .ok_or_else(|| BuildError::Download(format!("{} has no parent", dest.display())))?,
    )?;
    {
        let mut fh = temp.as_file();
        response.copy_to(&mut fh)?;
    }
    temp.persist(dest).map_err(|e| BuildError::Io(e.error))?;

    Ok(())
}

/// Ensure the file at a URL is present in a local directory.
///
/// A previously downloaded file is reused when no checksum is requested or
/// when its checksum matches. A cached file failing verification is deleted
/// and fetched again. The path to the downloaded file is returned.
pub fn download_to_dir(
    url: &str,
    dest_dir: &Path,
    checksum: Option<(&str, ChecksumAlgorithm)>,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dest_dir)?;
    let dest = dest_dir.join(url_filename(url)?);

    let _lock = DownloadLock::new(dest_dir)?;

    if dest.exists() {
        match checksum {
            Some((expected, algorithm)) => {
                info!("validating cached file...");
                if validate_checksum(&dest, expected, algorithm)? {
                    debug!("using cached file: {}", dest.display());
                    return Ok(dest);
                }
                warn!("existing file checksum mismatch, re-downloading");
                std::fs::remove_file(&dest)?;
            }
            None => {
                debug!("using cached file: {}", dest.display());
                return Ok(dest);
            }
        }
    }

    info!("downloading {}...", url);
    if let Err(e) = fetch_to_path(url, &dest) {
        if dest.exists() {
            std::fs::remove_file(&dest)?;
        }
        return Err(BuildError::Download(format!("failed to download {}: {}", url, e)));
    }
    info!("download complete: {}", dest.display());

    if let Some((expected, algorithm)) = checksum {
        info!("verifying checksum...");
        if !validate_checksum(&dest, expected, algorithm)? {
            std::fs::remove_file(&dest)?;
            return Err(BuildError::Download(format!(
                "checksum validation failed for {}",
                url
            )));
        }
        info!("checksum verified");
    }

    Ok(dest)
}

#[cfg(test)]
mod tests {
    use {super::*, std::io::Write};

    #[test]
    fn test_checksum_algorithm_parse() -> Result<()> {
        assert_eq!(ChecksumAlgorithm::from_str("sha256")?, ChecksumAlgorithm::Sha256);
        assert_eq!(ChecksumAlgorithm::from_str("SHA512")?, ChecksumAlgorithm::Sha512);
        assert_eq!(ChecksumAlgorithm::from_str("md5")?, ChecksumAlgorithm::Md5);
        assert!(ChecksumAlgorithm::from_str("crc32").is_err());

        Ok(())
    }

    #[test]
    fn test_file_digest() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("hello.txt");
        File::create(&path)?.write_all(b"hello")?;

        assert_eq!(
            file_digest(&path, ChecksumAlgorithm::Sha256)?,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(
            file_digest(&path, ChecksumAlgorithm::Md5)?,
            "5d41402abc4b2a76b9719d911017c592"
        );
        assert!(validate_checksum(
            &path,
            "5D41402ABC4B2A76B9719D911017C592",
            ChecksumAlgorithm::Md5
        )?);
        assert!(!validate_checksum(&path, "00", ChecksumAlgorithm::Sha256)?);

        Ok(())
    }

    #[test]
    fn test_url_filename() -> Result<()> {
        assert_eq!(
            url_filename("https://www.python.org/ftp/python/3.13.11/Python-3.13.11.tar.xz")?,
            "Python-3.13.11.tar.xz"
        );
        assert!(url_filename("https://example.com/").is_err());

        Ok(())
    }

    #[test]
    fn test_cached_file_reused() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let cached = temp_dir.path().join("pkg-1.0.tar.gz");
        File::create(&cached)?.write_all(b"hello")?;

        // An unreachable host proves no network access happens.
        let url = "http://127.0.0.1:9/pkg-1.0.tar.gz";
        assert_eq!(download_to_dir(url, temp_dir.path(), None)?, cached);
        assert_eq!(
            download_to_dir(
                url,
                temp_dir.path(),
                Some((
                    "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
                    ChecksumAlgorithm::Sha256
                ))
            )?,
            cached
        );

        Ok(())
    }

    #[test]
    fn test_failed_download_cleans_up() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let url = "http://127.0.0.1:9/missing-1.0.tar.gz";

        let res = download_to_dir(url, temp_dir.path(), None);
        assert!(matches!(res, Err(BuildError::Download(_))));
        assert!(!temp_dir.path().join("missing-1.0.tar.gz").exists());

        Ok(())
    }
}
