//! COLLADA (.dae) mesh decoding
//!
//! Pulls geometry out of `library_geometries` only. Light and camera
//! libraries are skipped outright so their color and parameter tables
//! never bleed into geometry extraction; scene-level node transforms are
//! not applied. The document's unit and up-axis declarations are honored
//! so output is meters, Y-up.

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use rovi_model::MeshData;

use crate::decode::MeshDecoder;
use crate::error::{AssetError, AssetResult};

/// Decoder for COLLADA documents.
pub struct ColladaDecoder;

impl MeshDecoder for ColladaDecoder {
    fn extensions(&self) -> &[&str] {
        &["dae"]
    }

    fn decode(&self, bytes: &[u8], name: &str) -> AssetResult<MeshData> {
        let xml = std::str::from_utf8(bytes)
            .map_err(|_| AssetError::decode(name, "COLLADA document is not UTF-8"))?;
        let doc = parse_collada(xml).map_err(|reason| AssetError::decode(name, reason))?;
        let mut mesh = build_mesh(&doc, name);
        if mesh.is_empty() {
            return Err(AssetError::decode(name, "no triangle geometry found"));
        }
        apply_conventions(&mut mesh, &doc);
        Ok(mesh)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpAxis {
    X,
    Y,
    Z,
}

#[derive(Debug)]
struct TriInput {
    semantic: String,
    source: String,
    offset: usize,
}

#[derive(Debug, Default)]
struct TriBatch {
    inputs: Vec<TriInput>,
    vcounts: Vec<usize>,
    indices: Vec<u32>,
}

#[derive(Debug)]
struct ColladaDoc {
    up_axis: UpAxis,
    unit: f32,
    /// Float arrays keyed by their `<source>` id and the array's own id.
    sources: HashMap<String, Vec<f32>>,
    /// `<vertices>` id to POSITION source id.
    vertices: HashMap<String, String>,
    batches: Vec<TriBatch>,
    diffuse: Option<[f32; 4]>,
}

#[derive(Default, PartialEq)]
enum TextTarget {
    #[default]
    None,
    UpAxis,
    FloatArray,
    VCount,
    Primitives,
    DiffuseColor,
}

/// Mutable cursor state while walking the document.
#[derive(Default)]
struct ParseState {
    source_id: Option<String>,
    float_array_id: Option<String>,
    vertices_id: Option<String>,
    batch: Option<TriBatch>,
    in_diffuse: bool,
    text_target: TextTarget,
}

fn parse_collada(xml: &str) -> Result<ColladaDoc, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut doc = ColladaDoc {
        up_axis: UpAxis::Y,
        unit: 1.0,
        sources: HashMap::new(),
        vertices: HashMap::new(),
        batches: Vec::new(),
        diffuse: None,
    };

    // Depth inside a skipped library subtree; zero means live content.
    let mut skip_depth = 0usize;
    let mut state = ParseState::default();

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if skip_depth > 0 {
                    skip_depth += 1;
                } else if is_skipped_library(e.name().as_ref()) {
                    skip_depth = 1;
                } else {
                    handle_open(e, &mut doc, &mut state);
                }
            }
            Ok(Event::Empty(ref e)) => {
                if skip_depth == 0 {
                    handle_leaf(e, &mut doc, &mut state);
                }
            }
            Ok(Event::End(ref e)) => {
                if skip_depth > 0 {
                    skip_depth -= 1;
                } else {
                    match e.name().as_ref() {
                        b"source" => state.source_id = None,
                        b"float_array" => state.float_array_id = None,
                        b"vertices" => state.vertices_id = None,
                        b"triangles" | b"polylist" => {
                            if let Some(b) = state.batch.take() {
                                doc.batches.push(b);
                            }
                        }
                        b"diffuse" => state.in_diffuse = false,
                        _ => {}
                    }
                    state.text_target = TextTarget::None;
                }
            }
            Ok(Event::Text(t)) => {
                if skip_depth == 0 {
                    let text = t
                        .unescape()
                        .map_err(|e| format!("text decode error: {e}"))?;
                    handle_text(&text, &mut doc, &mut state);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("XML error: {e}")),
            _ => {}
        }
        buf.clear();
    }

    Ok(doc)
}

fn is_skipped_library(tag: &[u8]) -> bool {
    matches!(
        tag,
        b"library_lights" | b"library_cameras" | b"library_animations"
    )
}

fn handle_open(e: &BytesStart, doc: &mut ColladaDoc, state: &mut ParseState) {
    match e.name().as_ref() {
        b"up_axis" => state.text_target = TextTarget::UpAxis,
        b"unit" => {
            if let Some(meter) = attr_value(e, b"meter").and_then(|v| v.parse().ok()) {
                doc.unit = meter;
            }
        }
        b"source" => state.source_id = attr_value(e, b"id"),
        b"float_array" => {
            state.float_array_id = attr_value(e, b"id");
            state.text_target = TextTarget::FloatArray;
        }
        b"vertices" => state.vertices_id = attr_value(e, b"id"),
        b"input" => handle_input(e, doc, state),
        b"triangles" | b"polylist" => state.batch = Some(TriBatch::default()),
        b"vcount" => state.text_target = TextTarget::VCount,
        b"p" => state.text_target = TextTarget::Primitives,
        b"diffuse" => state.in_diffuse = true,
        b"color" if state.in_diffuse && doc.diffuse.is_none() => {
            state.text_target = TextTarget::DiffuseColor;
        }
        _ => {}
    }
}

/// Self-closing elements carry attributes only; `input` and `unit` are the
/// interesting ones.
fn handle_leaf(e: &BytesStart, doc: &mut ColladaDoc, state: &mut ParseState) {
    match e.name().as_ref() {
        b"unit" => {
            if let Some(meter) = attr_value(e, b"meter").and_then(|v| v.parse().ok()) {
                doc.unit = meter;
            }
        }
        b"input" => handle_input(e, doc, state),
        _ => {}
    }
}

fn handle_input(e: &BytesStart, doc: &mut ColladaDoc, state: &mut ParseState) {
    let semantic = attr_value(e, b"semantic").unwrap_or_default();
    let source = strip_hash(&attr_value(e, b"source").unwrap_or_default());
    if let Some(b) = state.batch.as_mut() {
        let offset = attr_value(e, b"offset")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        b.inputs.push(TriInput {
            semantic,
            source,
            offset,
        });
    } else if let Some(vid) = &state.vertices_id
        && semantic == "POSITION"
    {
        doc.vertices.insert(vid.clone(), source);
    }
}

fn handle_text(text: &str, doc: &mut ColladaDoc, state: &mut ParseState) {
    match state.text_target {
        TextTarget::UpAxis => {
            doc.up_axis = match text.trim() {
                "Z_UP" => UpAxis::Z,
                "X_UP" => UpAxis::X,
                _ => UpAxis::Y,
            };
        }
        TextTarget::FloatArray => {
            let floats = parse_floats(text);
            if let Some(id) = &state.float_array_id {
                doc.sources.insert(id.clone(), floats.clone());
            }
            if let Some(id) = &state.source_id {
                doc.sources.insert(id.clone(), floats);
            }
        }
        TextTarget::VCount => {
            if let Some(b) = state.batch.as_mut() {
                b.vcounts.extend(parse_counts(text));
            }
        }
        TextTarget::Primitives => {
            if let Some(b) = state.batch.as_mut() {
                b.indices.extend(parse_indices(text));
            }
        }
        TextTarget::DiffuseColor => {
            let c = parse_floats(text);
            if c.len() >= 3 {
                doc.diffuse = Some([c[0], c[1], c[2], c.get(3).copied().unwrap_or(1.0)]);
            }
        }
        TextTarget::None => {}
    }
}

fn build_mesh(doc: &ColladaDoc, name: &str) -> MeshData {
    let mut mesh = MeshData::named(name);
    mesh.color = doc.diffuse;
    for batch in &doc.batches {
        emit_batch(doc, batch, &mut mesh);
    }
    mesh
}

fn emit_batch(doc: &ColladaDoc, batch: &TriBatch, mesh: &mut MeshData) {
    let stride = batch.inputs.iter().map(|i| i.offset).max().unwrap_or(0) + 1;
    let Some(vertex_input) = batch.inputs.iter().find(|i| i.semantic == "VERTEX") else {
        return;
    };
    let position_id = doc
        .vertices
        .get(&vertex_input.source)
        .unwrap_or(&vertex_input.source);
    let Some(positions) = doc.sources.get(position_id) else {
        return;
    };
    let normals = batch
        .inputs
        .iter()
        .find(|i| i.semantic == "NORMAL")
        .and_then(|i| doc.sources.get(&i.source).map(|s| (i.offset, s)));

    let tuples: Vec<&[u32]> = batch.indices.chunks_exact(stride).collect();
    let mut emit_corner = |tuple: &[u32]| {
        let pi = tuple[vertex_input.offset] as usize;
        if 3 * pi + 2 >= positions.len() {
            return;
        }
        let index = mesh.vertices.len() as u32;
        mesh.vertices
            .push([positions[3 * pi], positions[3 * pi + 1], positions[3 * pi + 2]]);
        if let Some((offset, source)) = &normals {
            let ni = tuple[*offset] as usize;
            if 3 * ni + 2 < source.len() {
                mesh.normals
                    .push([source[3 * ni], source[3 * ni + 1], source[3 * ni + 2]]);
            }
        }
        mesh.indices.push(index);
    };

    if batch.vcounts.is_empty() {
        for tri in tuples.chunks_exact(3) {
            emit_corner(tri[0]);
            emit_corner(tri[1]);
            emit_corner(tri[2]);
        }
    } else {
        // Polylist: fan-triangulate each polygon.
        let mut cursor = 0usize;
        for &count in &batch.vcounts {
            if cursor + count > tuples.len() {
                break;
            }
            for k in 1..count.saturating_sub(1) {
                emit_corner(tuples[cursor]);
                emit_corner(tuples[cursor + k]);
                emit_corner(tuples[cursor + k + 1]);
            }
            cursor += count;
        }
    }
}

fn apply_conventions(mesh: &mut MeshData, doc: &ColladaDoc) {
    let remap = |v: &mut [f32; 3], scale: f32| match doc.up_axis {
        UpAxis::Y => {
            v[0] *= scale;
            v[1] *= scale;
            v[2] *= scale;
        }
        UpAxis::Z => {
            let (x, y, z) = (v[0], v[1], v[2]);
            *v = [x * scale, z * scale, -y * scale];
        }
        UpAxis::X => {
            let (x, y, z) = (v[0], v[1], v[2]);
            *v = [-y * scale, x * scale, z * scale];
        }
    };
    for v in &mut mesh.vertices {
        remap(v, doc.unit);
    }
    for n in &mut mesh.normals {
        remap(n, 1.0);
    }
}

fn attr_value(e: &BytesStart, name: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name {
            return attr.unescape_value().ok().map(|v| v.into_owned());
        }
    }
    None
}

fn strip_hash(reference: &str) -> String {
    reference.trim_start_matches('#').to_string()
}

fn parse_floats(text: &str) -> Vec<f32> {
    text.split_whitespace()
        .filter_map(|t| t.parse().ok())
        .collect()
}

fn parse_indices(text: &str) -> Vec<u32> {
    text.split_whitespace()
        .filter_map(|t| t.parse().ok())
        .collect()
}

fn parse_counts(text: &str) -> Vec<usize> {
    text.split_whitespace()
        .filter_map(|t| t.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const TRIANGLE_Z_UP: &str = r##"<?xml version="1.0"?>
<COLLADA>
  <asset>
    <unit meter="0.001"/>
    <up_axis>Z_UP</up_axis>
  </asset>
  <library_geometries>
    <geometry id="g">
      <mesh>
        <source id="g-positions">
          <float_array id="g-positions-array" count="9">0 0 0 1000 0 0 0 0 1000</float_array>
        </source>
        <vertices id="g-vertices">
          <input semantic="POSITION" source="#g-positions"/>
        </vertices>
        <triangles count="1">
          <input semantic="VERTEX" source="#g-vertices" offset="0"/>
          <p>0 1 2</p>
        </triangles>
      </mesh>
    </geometry>
  </library_geometries>
</COLLADA>"##;

    #[test]
    fn test_unit_and_up_axis_applied() {
        let mesh = ColladaDecoder
            .decode(TRIANGLE_Z_UP.as_bytes(), "tri.dae")
            .unwrap();
        assert_eq!(mesh.triangle_count(), 1);
        // (1000, 0, 0) mm becomes (1, 0, 0) m.
        assert_relative_eq!(mesh.vertices[1][0], 1.0, epsilon = 1e-6);
        // (0, 0, 1000) mm in Z-up becomes (0, 1, 0) m in Y-up.
        assert_relative_eq!(mesh.vertices[2][1], 1.0, epsilon = 1e-6);
        assert_relative_eq!(mesh.vertices[2][2], 0.0, epsilon = 1e-6);
    }

    const POLYLIST_WITH_LIGHTS: &str = r##"<?xml version="1.0"?>
<COLLADA>
  <library_lights>
    <light id="sun">
      <technique_common><directional><color>5 5 5</color></directional></technique_common>
      <source id="q-positions">
        <float_array id="junk" count="3">9 9 9</float_array>
      </source>
    </light>
  </library_lights>
  <library_effects>
    <effect id="mat-fx">
      <profile_COMMON><technique sid="common"><lambert>
        <diffuse><color>0.1 0.2 0.3 1</color></diffuse>
      </lambert></technique></profile_COMMON>
    </effect>
  </library_effects>
  <library_geometries>
    <geometry id="q">
      <mesh>
        <source id="q-positions">
          <float_array id="q-positions-array" count="12">0 0 0 1 0 0 1 1 0 0 1 0</float_array>
        </source>
        <vertices id="q-vertices">
          <input semantic="POSITION" source="#q-positions"/>
        </vertices>
        <polylist count="1">
          <input semantic="VERTEX" source="#q-vertices" offset="0"/>
          <vcount>4</vcount>
          <p>0 1 2 3</p>
        </polylist>
      </mesh>
    </geometry>
  </library_geometries>
</COLLADA>"##;

    #[test]
    fn test_polylist_fan_and_light_isolation() {
        let mesh = ColladaDecoder
            .decode(POLYLIST_WITH_LIGHTS.as_bytes(), "quad.dae")
            .unwrap();
        // The quad fans into two triangles.
        assert_eq!(mesh.triangle_count(), 2);
        // The bogus source inside the light block must not shadow the
        // real positions.
        assert_relative_eq!(mesh.vertices[1][0], 1.0, epsilon = 1e-6);
        // The light color must not be mistaken for a material.
        let color = mesh.color.unwrap();
        assert_relative_eq!(color[0], 0.1, epsilon = 1e-6);
    }

    #[test]
    fn test_no_geometry_errors() {
        let err = ColladaDecoder
            .decode(b"<COLLADA><asset/></COLLADA>", "empty.dae")
            .unwrap_err();
        assert!(matches!(err, AssetError::Decode { .. }));
    }
}
