//! Working-tree scanner
//!
//! Walks the repository root, skipping the metadata directory and anything
//! matched by `.gyattignore`, and turns files into blobs/metadata for the
//! index to track.

use crate::areas::ignore_rules::IgnoreRules;
use crate::artifacts::index::index_entry::EntryMetadata;
use crate::artifacts::objects::blob::Blob;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const METADATA_DIR: &str = ".gyatt";
const IGNORE_FILE: &str = ".gyattignore";

#[derive(Debug)]
pub struct Workspace {
    path: Box<Path>,
}

impl Workspace {
    pub fn new(path: Box<Path>) -> Self {
        Workspace { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse `.gyattignore` without scanning, so a malformed pattern is
    /// reported at repository-open time rather than on the first `status`.
    pub fn validate_ignore_file(&self) -> anyhow::Result<()> {
        self.ignore_rules()?;
        Ok(())
    }

    pub(crate) fn ignore_rules(&self) -> anyhow::Result<IgnoreRules> {
        let ignore_path = self.path.join(IGNORE_FILE);
        if !ignore_path.exists() {
            return Ok(IgnoreRules::empty());
        }
        let contents = std::fs::read_to_string(&ignore_path)?;
        Ok(IgnoreRules::parse(&contents)?)
    }

    fn is_always_skipped(relative: &Path) -> bool {
        relative
            .components()
            .next()
            .is_some_and(|c| c.as_os_str() == METADATA_DIR)
    }

    /// List every regular file under the repository root, relative to it,
    /// excluding the metadata directory and anything `.gyattignore`
    /// matches.
    pub fn list_files(&self) -> anyhow::Result<Vec<PathBuf>> {
        let rules = self.ignore_rules()?;

        let mut files: Vec<PathBuf> = WalkDir::new(self.path.as_ref())
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(self.path.as_ref()).ok()?.to_path_buf();
                if Self::is_always_skipped(&relative) {
                    return None;
                }
                let relative_str = relative.to_string_lossy().replace('\\', "/");
                if rules.is_ignored(&relative_str) {
                    return None;
                }
                Some(relative)
            })
            .collect();

        files.sort();
        Ok(files)
    }

    pub fn read_file(&self, relative_path: &Path) -> anyhow::Result<Vec<u8>> {
        let path = self.path.join(relative_path);
        std::fs::read(&path).map_err(|cause| {
            crate::error::Error::Io {
                path: path.clone(),
                cause,
            }
            .into()
        })
    }

    pub fn parse_blob(&self, relative_path: &Path) -> anyhow::Result<Blob> {
        Ok(Blob::new(self.read_file(relative_path)?))
    }

    /// Stat a file for index metadata. The executable check needs the real
    /// filesystem path, not the path relative to the repo root.
    pub fn stat_file(&self, relative_path: &Path) -> anyhow::Result<EntryMetadata> {
        let absolute = self.path.join(relative_path);
        let metadata = std::fs::metadata(&absolute).map_err(|cause| crate::error::Error::Io {
            path: absolute.clone(),
            cause,
        })?;

        if !metadata.is_file() {
            anyhow::bail!(crate::error::Error::RegularFileRequired(relative_path.to_path_buf()));
        }

        (absolute.as_path(), metadata).try_into()
    }

    pub fn exists(&self, relative_path: &Path) -> bool {
        self.path.join(relative_path).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn list_files_skips_metadata_dir_and_ignored_files() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".gyatt/objects")).unwrap();
        std::fs::write(dir.path().join(".gyatt/objects/junk"), b"x").unwrap();
        std::fs::write(dir.path().join(".gyattignore"), "*.log\n").unwrap();
        std::fs::write(dir.path().join("debug.log"), b"noisy").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();

        let workspace = Workspace::new(dir.path().to_path_buf().into_boxed_path());
        let files = workspace.list_files().unwrap();

        assert_eq!(files, vec![PathBuf::from(".gyattignore"), PathBuf::from("a.txt")]);
    }

    #[test]
    fn read_file_returns_raw_bytes() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("bin"), [0xff, 0x00, 0x01]).unwrap();
        let workspace = Workspace::new(dir.path().to_path_buf().into_boxed_path());
        assert_eq!(workspace.read_file(Path::new("bin")).unwrap(), vec![0xff, 0x00, 0x01]);
    }

    #[test]
    fn stat_file_rejects_directories() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();
        let workspace = Workspace::new(dir.path().to_path_buf().into_boxed_path());
        assert!(workspace.stat_file(Path::new("subdir")).is_err());
    }
}
