//! Read-only bundle of user-supplied files

use std::collections::BTreeMap;
use std::sync::Arc;

/// The set of files a load session works from, keyed by path-like names.
///
/// Keys are normalized to forward slashes without a leading slash at
/// insertion. The map is ordered so every iteration over keys is
/// deterministic, which keeps resolver fallbacks reproducible.
#[derive(Debug, Clone, Default)]
pub struct FileBundle {
    files: BTreeMap<String, Arc<[u8]>>,
}

impl FileBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file under a normalized form of `path`.
    pub fn insert(&mut self, path: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        let key = normalize_key(&path.into());
        if !key.is_empty() {
            self.files.insert(key, bytes.into());
        }
    }

    pub fn get(&self, path: &str) -> Option<&Arc<[u8]>> {
        self.files.get(&normalize_key(path))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(&normalize_key(path))
    }

    /// File contents decoded as UTF-8, lossily.
    pub fn text(&self, path: &str) -> Option<String> {
        self.get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<[u8]>)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Distinct first path components of keys that have one, sorted.
    pub fn top_level_dirs(&self) -> Vec<String> {
        let mut dirs: Vec<String> = Vec::new();
        for key in self.files.keys() {
            if let Some(idx) = key.find('/') {
                let dir = &key[..idx];
                if dirs.last().map(String::as_str) != Some(dir) {
                    dirs.push(dir.to_string());
                }
            }
        }
        dirs
    }
}

impl<P: Into<String>, B: Into<Arc<[u8]>>> FromIterator<(P, B)> for FileBundle {
    fn from_iter<T: IntoIterator<Item = (P, B)>>(iter: T) -> Self {
        let mut bundle = FileBundle::new();
        for (path, bytes) in iter {
            bundle.insert(path, bytes);
        }
        bundle
    }
}

/// Normalize a bundle key: forward slashes, no leading slash, no `.`
/// segments.
pub(crate) fn normalize_key(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_normalized() {
        let mut bundle = FileBundle::new();
        bundle.insert("/robot\\meshes\\arm.stl", b"abc".to_vec());
        assert!(bundle.contains("robot/meshes/arm.stl"));
        assert_eq!(bundle.get("robot/meshes/arm.stl").unwrap().len(), 3);
    }

    #[test]
    fn test_dot_segments_collapse() {
        assert_eq!(normalize_key("a/./b/../c.stl"), "a/c.stl");
        assert_eq!(normalize_key("../escape.stl"), "escape.stl");
    }

    #[test]
    fn test_iteration_is_sorted() {
        let bundle: FileBundle = [
            ("z.urdf", b"z".to_vec()),
            ("a/mesh.stl", b"a".to_vec()),
            ("m/tex.png", b"m".to_vec()),
        ]
        .into_iter()
        .collect();
        let keys: Vec<&str> = bundle.keys().collect();
        assert_eq!(keys, vec!["a/mesh.stl", "m/tex.png", "z.urdf"]);
    }

    #[test]
    fn test_top_level_dirs() {
        let bundle: FileBundle = [
            ("robot/a.stl", Vec::from(*b"1")),
            ("robot/meshes/b.stl", Vec::from(*b"2")),
            ("scene.xml", Vec::from(*b"3")),
            ("assets/c.png", Vec::from(*b"4")),
        ]
        .into_iter()
        .collect();
        assert_eq!(bundle.top_level_dirs(), vec!["assets", "robot"]);
    }

    #[test]
    fn test_text_lookup() {
        let mut bundle = FileBundle::new();
        bundle.insert("hello.urdf", b"<robot/>".to_vec());
        assert_eq!(bundle.text("hello.urdf").unwrap(), "<robot/>");
        assert!(bundle.text("missing.urdf").is_none());
    }
}
