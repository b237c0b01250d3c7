//! Resolution of document asset references against the file bundle
//!
//! Robot descriptions reference meshes through a mix of conventions:
//! `package://` URIs, paths relative to the document, bare basenames, and
//! occasionally names without an extension. Resolution tries a fixed
//! sequence of interpretations and returns the first hit, so the same
//! bundle always resolves the same way.

use std::sync::Arc;

use crate::bundle::{FileBundle, normalize_key};

/// Extensions tried when a reference has none.
const MESH_EXTENSIONS: &[&str] = &["stl", "obj", "dae", "glb", "gltf"];

/// A successful lookup: the bundle key that matched and its contents.
#[derive(Debug, Clone)]
pub struct ResolvedAsset {
    pub path: String,
    pub bytes: Arc<[u8]>,
}

/// Strip scheme and package prefixes and normalize the remaining path.
///
/// `package://name/mesh.stl` and `model://name/mesh.stl` drop both the
/// scheme and the package name; `file://` drops the scheme only.
pub fn normalize_reference(reference: &str) -> String {
    let rest = if let Some(rest) = reference
        .strip_prefix("package://")
        .or_else(|| reference.strip_prefix("model://"))
    {
        match rest.split_once('/') {
            Some((_package, path)) => path,
            None => rest,
        }
    } else if let Some(rest) = reference.strip_prefix("file://") {
        rest
    } else {
        reference
    };
    normalize_key(rest)
}

/// Resolve `reference` against the bundle.
///
/// Tries, in order: the path relative to `context_dir`, the normalized
/// path from the bundle root, the normalized path with its scheme stripped
/// but the package prefix kept, the raw reference, a case-insensitive
/// basename match, and finally each known mesh extension appended when the
/// reference has none. Returns `None` when nothing matches.
pub fn resolve(reference: &str, bundle: &FileBundle, context_dir: &str) -> Option<ResolvedAsset> {
    if reference.is_empty() || bundle.is_empty() {
        return None;
    }

    let normalized = normalize_reference(reference);
    let mut candidates: Vec<String> = Vec::new();
    if !context_dir.is_empty() {
        candidates.push(format!("{}/{}", context_dir.trim_end_matches('/'), normalized));
    }
    candidates.push(normalized.clone());
    // Keep the package directory in case the bundle was rooted above it.
    let scheme_stripped = reference
        .strip_prefix("package://")
        .or_else(|| reference.strip_prefix("model://"))
        .or_else(|| reference.strip_prefix("file://"))
        .unwrap_or(reference);
    candidates.push(normalize_key(scheme_stripped));
    candidates.push(reference.to_string());

    for candidate in &candidates {
        if let Some(found) = lookup(bundle, candidate) {
            return Some(found);
        }
    }

    if let Some(found) = basename_match(bundle, &normalized) {
        return Some(found);
    }

    if !has_extension(&normalized) {
        for ext in MESH_EXTENSIONS {
            let with_ext = format!("{normalized}.{ext}");
            if !context_dir.is_empty() {
                let ctx = format!("{}/{}", context_dir.trim_end_matches('/'), with_ext);
                if let Some(found) = lookup(bundle, &ctx) {
                    return Some(found);
                }
            }
            if let Some(found) = lookup(bundle, &with_ext) {
                return Some(found);
            }
        }
    }

    None
}

fn lookup(bundle: &FileBundle, path: &str) -> Option<ResolvedAsset> {
    bundle.get(path).map(|bytes| ResolvedAsset {
        path: normalize_key(path),
        bytes: bytes.clone(),
    })
}

/// First bundle key, in sorted order, whose basename matches the
/// reference's basename case-insensitively.
fn basename_match(bundle: &FileBundle, normalized: &str) -> Option<ResolvedAsset> {
    let wanted = basename(normalized).to_ascii_lowercase();
    if wanted.is_empty() {
        return None;
    }
    for (key, bytes) in bundle.iter() {
        if basename(key).to_ascii_lowercase() == wanted {
            return Some(ResolvedAsset {
                path: key.to_string(),
                bytes: bytes.clone(),
            });
        }
    }
    None
}

pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Directory portion of a path-like key, empty for bare names.
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

fn has_extension(path: &str) -> bool {
    basename(path).rsplit_once('.').is_some()
}
