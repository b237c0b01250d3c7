//! Document preparation and asset staging for engine compilation
//!
//! The engine compiles from its own virtual filesystem and resolves mesh
//! references relative to the compiled document. Bundle keys keep whatever
//! directory layout the archive shipped with, so every asset is staged
//! under several candidate prefixes and the reference is satisfied
//! wherever the document happens to point.

use rovi_assets::{FileBundle, resolver};
use rovi_formats::xml::{XmlNode, parse_document};
use tracing::{debug, warn};

use crate::error::{SimError, SimResult};
use crate::vfs::{StagingFs, remove_dir_recursive};

/// Directory all staged files live under, cleared on unload.
pub const STAGE_ROOT: &str = "working";

/// Ensure the scene has a ground plane, injecting one when absent.
///
/// Returns the document to compile and whether it was modified. A plane
/// geom anywhere in the document counts, including inside nested bodies.
pub fn inject_ground_plane(text: &str) -> SimResult<(String, bool)> {
    let mut root = parse_document(text).map_err(|e| SimError::Parse(e.to_string()))?;
    if root.tag != "mujoco" {
        return Err(SimError::Parse(format!(
            "expected a <mujoco> document, found <{}>",
            root.tag
        )));
    }
    let has_plane =
        root.any_element(&|node| node.tag == "geom" && node.attr("type") == Some("plane"));
    if has_plane {
        return Ok((text.to_string(), false));
    }

    let mut ground = XmlNode::new("geom");
    ground.set_attr("name", "ground");
    ground.set_attr("type", "plane");
    ground.set_attr("size", "10 10 0.1");
    ground.set_attr("rgba", "0.5 0.5 0.55 1");
    match root.child_mut("worldbody") {
        Some(worldbody) => worldbody.push(ground),
        None => {
            let mut worldbody = XmlNode::new("worldbody");
            worldbody.push(ground);
            root.push(worldbody);
        }
    }
    Ok((root.to_xml(), true))
}

/// Stage every bundle file plus the prepared document, returning the
/// staged document path to hand to the compiler.
///
/// The document is written last so it wins any basename collision with a
/// bundled copy of itself.
pub fn stage_assets(
    fs: &mut dyn StagingFs,
    bundle: &FileBundle,
    filename: &str,
    document: &str,
) -> SimResult<String> {
    fs.mkdir(STAGE_ROOT)?;
    let mut keys: Vec<&str> = bundle.keys().collect();
    keys.sort_unstable();

    let mut staged = 0usize;
    for key in keys {
        let Some(bytes) = bundle.get(key) else {
            continue;
        };
        for guess in prefix_guesses(key) {
            let target = format!("{STAGE_ROOT}/{guess}");
            ensure_parents(fs, &target)?;
            fs.write_file(&target, bytes)?;
            staged += 1;
        }
    }

    let main = format!("{STAGE_ROOT}/{}", resolver::basename(filename));
    fs.write_file(&main, document.as_bytes())?;
    debug!(files = staged, main = %main, "staged assets for compilation");
    Ok(main)
}

/// Remove the staging directory, tolerating a missing or broken one.
pub fn clear_staging(fs: &mut dyn StagingFs) {
    if !fs.is_dir(STAGE_ROOT) {
        return;
    }
    if let Err(err) = remove_dir_recursive(fs, STAGE_ROOT) {
        warn!(%err, "failed to clear the staging directory");
    }
}

/// Candidate staging paths for one bundle key: as-is, with the leading
/// directory stripped, and as a bare basename.
fn prefix_guesses(key: &str) -> Vec<String> {
    let mut guesses = vec![key.to_string()];
    if let Some((_, rest)) = key.split_once('/') {
        guesses.push(rest.to_string());
    }
    let base = resolver::basename(key);
    if !guesses.iter().any(|g| g == base) {
        guesses.push(base.to_string());
    }
    guesses
}

/// Create the ancestor directories of `path` one level at a time.
fn ensure_parents(fs: &mut dyn StagingFs, path: &str) -> SimResult<()> {
    let parent = resolver::parent_dir(path);
    if parent.is_empty() {
        return Ok(());
    }
    let mut built = String::new();
    for part in parent.split('/') {
        if !built.is_empty() {
            built.push('/');
        }
        built.push_str(part);
        if !fs.is_dir(&built) {
            fs.mkdir(&built)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::MemoryFs;

    const BARE_SCENE: &str = r#"<mujoco model="bare">
  <worldbody>
    <body name="ball" pos="0 0 1">
      <geom type="sphere" size="0.1"/>
    </body>
  </worldbody>
</mujoco>"#;

    #[test]
    fn test_inject_adds_ground_plane() {
        let (text, changed) = inject_ground_plane(BARE_SCENE).unwrap();
        assert!(changed);
        let root = parse_document(&text).unwrap();
        let worldbody = root.child("worldbody").unwrap();
        let ground = worldbody
            .elements()
            .find(|e| e.tag == "geom" && e.attr("name") == Some("ground"))
            .unwrap();
        assert_eq!(ground.attr("type"), Some("plane"));
        assert_eq!(ground.attr("size"), Some("10 10 0.1"));
    }

    #[test]
    fn test_inject_skips_existing_plane() {
        let scene = r#"<mujoco>
  <worldbody>
    <body name="table">
      <geom name="top" type="plane" size="1 1 0.1"/>
    </body>
  </worldbody>
</mujoco>"#;
        let (text, changed) = inject_ground_plane(scene).unwrap();
        assert!(!changed);
        assert_eq!(text, scene);
    }

    #[test]
    fn test_inject_creates_missing_worldbody() {
        let (text, changed) = inject_ground_plane("<mujoco model=\"empty\"/>").unwrap();
        assert!(changed);
        let root = parse_document(&text).unwrap();
        assert!(root.child("worldbody").unwrap().child("geom").is_some());
    }

    #[test]
    fn test_inject_rejects_non_mujoco() {
        let err = inject_ground_plane("<robot name=\"r\"/>").unwrap_err();
        assert!(matches!(err, SimError::Parse(_)));
    }

    #[test]
    fn test_prefix_guesses_strip_one_level_then_all() {
        assert_eq!(
            prefix_guesses("pkg/meshes/ball.stl"),
            vec!["pkg/meshes/ball.stl", "meshes/ball.stl", "ball.stl"]
        );
        assert_eq!(prefix_guesses("meshes/ball.stl"), vec!["meshes/ball.stl", "ball.stl"]);
        assert_eq!(prefix_guesses("ball.stl"), vec!["ball.stl"]);
    }

    #[test]
    fn test_stage_assets_writes_every_guess() {
        let mut fs = MemoryFs::new();
        let mut bundle = FileBundle::new();
        bundle.insert("pkg/meshes/ball.stl", b"solid".as_slice());

        let main = stage_assets(&mut fs, &bundle, "models/robot.xml", BARE_SCENE).unwrap();
        assert_eq!(main, "working/robot.xml");
        assert!(fs.contains_file("working/pkg/meshes/ball.stl"));
        assert!(fs.contains_file("working/meshes/ball.stl"));
        assert!(fs.contains_file("working/ball.stl"));
        assert_eq!(fs.read_file(&main), Some(BARE_SCENE.as_bytes()));
    }

    #[test]
    fn test_main_document_wins_basename_collision() {
        let mut fs = MemoryFs::new();
        let mut bundle = FileBundle::new();
        bundle.insert("archive/robot.xml", b"<mujoco/>".as_slice());

        let main = stage_assets(&mut fs, &bundle, "robot.xml", BARE_SCENE).unwrap();
        assert_eq!(fs.read_file(&main), Some(BARE_SCENE.as_bytes()));
        // The bundled copy still stages under its own prefix.
        assert_eq!(
            fs.read_file("working/archive/robot.xml"),
            Some(b"<mujoco/>".as_slice())
        );
    }

    #[test]
    fn test_clear_staging_removes_the_tree() {
        let mut fs = MemoryFs::new();
        let mut bundle = FileBundle::new();
        bundle.insert("meshes/ball.stl", b"solid".as_slice());
        stage_assets(&mut fs, &bundle, "robot.xml", BARE_SCENE).unwrap();

        clear_staging(&mut fs);
        assert_eq!(fs.file_count(), 0);
        assert!(!fs.is_dir(STAGE_ROOT));

        // A second clear on an empty filesystem is a quiet no-op.
        clear_staging(&mut fs);
    }
}
