//! Local archives: file listing and content digests
//!
//! An archive is either a single file or a directory tree. Both the
//! provider packing it and the digest computed at plan time walk it through
//! [`archive_files`], so they agree on which files make up the package.

use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// Files of an archive as `(name inside the archive, path on disk)`, sorted
/// by name
///
/// Names use `/` separators whatever the platform. A single file is listed
/// under its own file name.
pub fn archive_files(root: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let metadata = fs::metadata(root)?;
    if metadata.is_file() {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        return Ok(vec![(name, root.to_path_buf())]);
    }

    let mut files = Vec::new();
    collect(root, root, &mut files)?;
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

fn collect(root: &Path, dir: &Path, files: &mut Vec<(String, PathBuf)>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect(root, &path, files)?;
        } else if path.is_file() {
            let name = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push((name, path));
        }
    }
    Ok(())
}

/// SHA-256 over every file name and file content of the archive
pub fn content_digest(root: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    for (name, path) in archive_files(root)? {
        let size = fs::metadata(&path)?.len();
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(size.to_le_bytes());
        io::copy(&mut File::open(&path)?, &mut hasher)?;
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.dll"), b"v1").unwrap();
        fs::create_dir(dir.path().join("wwwroot")).unwrap();
        fs::write(dir.path().join("wwwroot").join("index.html"), b"<h1>hi</h1>").unwrap();
        dir
    }

    #[test]
    fn test_archive_files_are_sorted_with_forward_slashes() {
        let dir = site();
        let names: Vec<String> = archive_files(dir.path())
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["app.dll", "wwwroot/index.html"]);

        let single = archive_files(&dir.path().join("app.dll")).unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].0, "app.dll");
    }

    #[test]
    fn test_digest_follows_content_and_names() {
        let dir = site();
        let first = content_digest(dir.path()).unwrap();
        assert_eq!(first, content_digest(dir.path()).unwrap());

        fs::write(dir.path().join("app.dll"), b"v2").unwrap();
        let rebuilt = content_digest(dir.path()).unwrap();
        assert_ne!(first, rebuilt);

        fs::rename(dir.path().join("app.dll"), dir.path().join("main.dll")).unwrap();
        assert_ne!(rebuilt, content_digest(dir.path()).unwrap());
    }

    #[test]
    fn test_missing_archive_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(content_digest(&dir.path().join("missing")).is_err());
    }
}
