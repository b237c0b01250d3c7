//! Staging filesystem the physics engine compiles from

use std::collections::{BTreeMap, BTreeSet};

use rovi_assets::resolver;

use crate::error::{SimError, SimResult};

/// The directory surface an engine's virtual filesystem exposes.
///
/// Paths are `/`-separated and relative to the filesystem root; `mkdir`
/// and `write_file` require the parent directory to exist, and `rmdir`
/// only removes empty directories, matching the hosted engine's VFS.
pub trait StagingFs {
    fn mkdir(&mut self, path: &str) -> SimResult<()>;
    fn write_file(&mut self, path: &str, bytes: &[u8]) -> SimResult<()>;
    /// Direct child names of a directory, sorted. Missing directories
    /// list as empty.
    fn read_dir(&self, path: &str) -> Vec<String>;
    fn unlink(&mut self, path: &str) -> SimResult<()>;
    fn rmdir(&mut self, path: &str) -> SimResult<()>;
    fn is_dir(&self, path: &str) -> bool;
}

/// Remove a directory tree bottom-up through the trait surface.
pub fn remove_dir_recursive(fs: &mut dyn StagingFs, path: &str) -> SimResult<()> {
    for entry in fs.read_dir(path) {
        let child = format!("{path}/{entry}");
        if fs.is_dir(&child) {
            remove_dir_recursive(fs, &child)?;
        } else {
            fs.unlink(&child)?;
        }
    }
    fs.rmdir(path)
}

/// In-memory staging filesystem for engines and tests.
#[derive(Debug, Default)]
pub struct MemoryFs {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_file(&self, path: &str) -> Option<&[u8]> {
        self.files.get(&normalize(path)).map(Vec::as_slice)
    }

    pub fn contains_file(&self, path: &str) -> bool {
        self.files.contains_key(&normalize(path))
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

impl StagingFs for MemoryFs {
    fn mkdir(&mut self, path: &str) -> SimResult<()> {
        let path = normalize(path);
        if path.is_empty() {
            return Ok(());
        }
        self.require_parent(&path)?;
        self.dirs.insert(path);
        Ok(())
    }

    fn write_file(&mut self, path: &str, bytes: &[u8]) -> SimResult<()> {
        let path = normalize(path);
        if path.is_empty() {
            return Err(SimError::Staging("empty file path".into()));
        }
        self.require_parent(&path)?;
        self.files.insert(path, bytes.to_vec());
        Ok(())
    }

    fn read_dir(&self, path: &str) -> Vec<String> {
        let path = normalize(path);
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };
        let mut entries: Vec<String> = Vec::new();
        for key in self.dirs.iter().chain(self.files.keys()) {
            if let Some(rest) = key.strip_prefix(prefix.as_str())
                && !rest.is_empty()
                && !rest.contains('/')
            {
                entries.push(rest.to_string());
            }
        }
        entries.sort();
        entries.dedup();
        entries
    }

    fn unlink(&mut self, path: &str) -> SimResult<()> {
        let path = normalize(path);
        self.files
            .remove(&path)
            .map(|_| ())
            .ok_or_else(|| SimError::Staging(format!("no such file '{path}'")))
    }

    fn rmdir(&mut self, path: &str) -> SimResult<()> {
        let path = normalize(path);
        if !self.dirs.contains(&path) {
            return Err(SimError::Staging(format!("no such directory '{path}'")));
        }
        if !self.read_dir(&path).is_empty() {
            return Err(SimError::Staging(format!(
                "directory '{path}' is not empty"
            )));
        }
        self.dirs.remove(&path);
        Ok(())
    }

    fn is_dir(&self, path: &str) -> bool {
        self.dirs.contains(&normalize(path))
    }
}

impl MemoryFs {
    fn require_parent(&self, path: &str) -> SimResult<()> {
        let parent = resolver::parent_dir(path);
        if parent.is_empty() || self.dirs.contains(parent) {
            Ok(())
        } else {
            Err(SimError::Staging(format!("no such directory '{parent}'")))
        }
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_requires_parent_directory() {
        let mut fs = MemoryFs::new();
        assert!(fs.write_file("working/model.xml", b"x").is_err());
        fs.mkdir("working").unwrap();
        fs.write_file("working/model.xml", b"x").unwrap();
        assert_eq!(fs.read_file("working/model.xml"), Some(b"x".as_slice()));
    }

    #[test]
    fn test_mkdir_requires_parent_directory() {
        let mut fs = MemoryFs::new();
        assert!(fs.mkdir("a/b").is_err());
        fs.mkdir("a").unwrap();
        fs.mkdir("a/b").unwrap();
        assert!(fs.is_dir("a/b"));
    }

    #[test]
    fn test_read_dir_lists_direct_children_sorted() {
        let mut fs = MemoryFs::new();
        fs.mkdir("working").unwrap();
        fs.mkdir("working/meshes").unwrap();
        fs.write_file("working/model.xml", b"m").unwrap();
        fs.write_file("working/meshes/arm.stl", b"s").unwrap();
        assert_eq!(fs.read_dir("working"), vec!["meshes", "model.xml"]);
        assert_eq!(fs.read_dir(""), vec!["working"]);
    }

    #[test]
    fn test_rmdir_refuses_non_empty() {
        let mut fs = MemoryFs::new();
        fs.mkdir("working").unwrap();
        fs.write_file("working/model.xml", b"m").unwrap();
        assert!(fs.rmdir("working").is_err());
        fs.unlink("working/model.xml").unwrap();
        fs.rmdir("working").unwrap();
        assert!(!fs.is_dir("working"));
    }

    #[test]
    fn test_remove_dir_recursive_clears_tree() {
        let mut fs = MemoryFs::new();
        fs.mkdir("working").unwrap();
        fs.mkdir("working/meshes").unwrap();
        fs.mkdir("working/meshes/deep").unwrap();
        fs.write_file("working/model.xml", b"m").unwrap();
        fs.write_file("working/meshes/deep/arm.stl", b"s").unwrap();

        remove_dir_recursive(&mut fs, "working").unwrap();
        assert!(!fs.is_dir("working"));
        assert_eq!(fs.file_count(), 0);
    }
}
