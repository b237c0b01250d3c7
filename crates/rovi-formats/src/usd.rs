//! USD import: usda text stages and usdz archives into the unified model
//!
//! Covers the text subset robot exports actually use: a prim tree of
//! Xform/Scope groups, Mesh/Cube/Sphere/Cylinder/Capsule geometry,
//! translate/orient/rotateXYZ/scale transform ops, and display color.
//! Binary usdc layers are detected and rejected with a pointer to the
//! text formats.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Arc;

use glam::Quat;
use rovi_model::{
    GeometryType, JointBuilder, Link, Material, MeshData, Origin, UnifiedRobotModel,
    VisualGeometry,
};
use tracing::{info, warn};

use crate::error::{AdapterError, AdapterResult};

pub(crate) const USDC_MAGIC: &[u8] = b"PXR-USDC";
pub(crate) const USDA_MAGIC: &str = "#usda";
pub(crate) const ZIP_MAGIC: &[u8] = b"PK";

/// Synthesized root link every stage hangs from.
pub const STAGE_ROOT: &str = "world";

const MAX_ARCHIVE_DEPTH: usize = 2;

/// Options for USD conversion.
#[derive(Debug, Clone)]
pub struct UsdOptions {
    /// Color applied when a prim declares no display color.
    pub default_color: [f32; 4],
}

impl Default for UsdOptions {
    fn default() -> Self {
        Self {
            default_color: Material::DEFAULT_COLOR,
        }
    }
}

/// Parse USD bytes (usda text or a usdz archive) into a unified model.
pub fn load_usd(bytes: &[u8], options: &UsdOptions) -> AdapterResult<UnifiedRobotModel> {
    let text = extract_text(bytes, 0)?;
    let stage = parse_usda(&text)?;
    convert_stage(&stage, options)
}

// ============== Container detection ==============

fn extract_text(bytes: &[u8], depth: usize) -> AdapterResult<String> {
    if bytes.starts_with(USDC_MAGIC) {
        return Err(AdapterError::Parse(
            "binary usdc encoding is not supported, export as usda text or usdz".into(),
        ));
    }
    if bytes.starts_with(ZIP_MAGIC) {
        return extract_archive(bytes, depth);
    }
    let text = std::str::from_utf8(bytes).map_err(|_| {
        AdapterError::Parse("USD document is neither usda text nor a usdz archive".into())
    })?;
    Ok(text.to_string())
}

/// Pull the root layer out of a usdz package. The scene layer is the
/// first member with a USD extension, per the packaging convention.
fn extract_archive(bytes: &[u8], depth: usize) -> AdapterResult<String> {
    if depth >= MAX_ARCHIVE_DEPTH {
        return Err(AdapterError::Parse("usdz archives nested too deeply".into()));
    }
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| AdapterError::Parse(format!("unreadable usdz archive: {e}")))?;
    let scene = (0..archive.len())
        .find_map(|i| {
            let file = archive.by_index(i).ok()?;
            let name = file.name().to_string();
            let lower = name.to_ascii_lowercase();
            let is_scene = lower.ends_with(".usda")
                || lower.ends_with(".usdc")
                || lower.ends_with(".usd");
            is_scene.then_some(name)
        })
        .ok_or_else(|| AdapterError::Parse("usdz archive holds no scene layer".into()))?;
    let mut file = archive
        .by_name(&scene)
        .map_err(|e| AdapterError::Parse(e.to_string()))?;
    let mut inner = Vec::new();
    file.read_to_end(&mut inner)
        .map_err(|e| AdapterError::Parse(format!("usdz read failed: {e}")))?;
    drop(file);
    extract_text(&inner, depth + 1)
}

// ============== Text reader ==============

struct Reader<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(text: &'a str, pos: usize) -> Self {
        Self { text, pos }
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn rest_bytes(&self) -> &'a [u8] {
        &self.text.as_bytes()[self.pos..]
    }

    // Callers only slice between ASCII delimiters, so the bounds always
    // land on character boundaries.
    fn slice(&self, start: usize) -> &'a str {
        &self.text[start..self.pos]
    }

    fn line(&self) -> usize {
        1 + self.text.as_bytes()[..self.pos]
            .iter()
            .filter(|&&b| b == b'\n')
            .count()
    }

    fn error(&self, message: &str) -> AdapterError {
        AdapterError::Parse(format!("usda line {}: {message}", self.line()))
    }

    fn skip_trivia(&mut self) {
        loop {
            while matches!(self.peek(), Some(c) if c.is_ascii_whitespace()) {
                self.pos += 1;
            }
            if self.rest_bytes().starts_with(b"//") {
                while !matches!(self.peek(), None | Some(b'\n')) {
                    self.pos += 1;
                }
            } else if self.rest_bytes().starts_with(b"/*") {
                self.pos += 2;
                while !self.rest_bytes().starts_with(b"*/") {
                    if self.peek().is_none() {
                        return;
                    }
                    self.pos += 1;
                }
                self.pos += 2;
            } else {
                return;
            }
        }
    }

    fn eat(&mut self, byte: u8) -> bool {
        self.skip_trivia();
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_bytes(&mut self, expected: &[u8]) -> bool {
        self.skip_trivia();
        if self.rest_bytes().starts_with(expected) {
            self.pos += expected.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, byte: u8) -> AdapterResult<()> {
        if self.eat(byte) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", byte as char)))
        }
    }

    fn ident(&mut self) -> Option<&'a str> {
        self.skip_trivia();
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => self.pos += 1,
            _ => return None,
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || matches!(c, b'_' | b':' | b'.'))
        {
            self.pos += 1;
        }
        Some(self.slice(start))
    }

    fn quoted(&mut self) -> AdapterResult<&'a str> {
        self.skip_trivia();
        let quote = match self.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => return Err(self.error("expected a quoted string")),
        };
        if self.rest_bytes().starts_with(&[quote, quote, quote]) {
            self.pos += 3;
            let start = self.pos;
            while !self.rest_bytes().starts_with(&[quote, quote, quote]) {
                if self.peek().is_none() {
                    return Err(self.error("unterminated string"));
                }
                self.pos += 1;
            }
            let s = self.slice(start);
            self.pos += 3;
            return Ok(s);
        }
        self.pos += 1;
        let start = self.pos;
        loop {
            match self.peek() {
                None | Some(b'\n') => return Err(self.error("unterminated string")),
                Some(b'\\') => self.pos += 2,
                Some(q) if q == quote => break,
                Some(_) => self.pos += 1,
            }
        }
        let s = self.slice(start);
        self.pos += 1;
        Ok(s)
    }

    fn number(&mut self) -> AdapterResult<f64> {
        self.skip_trivia();
        let start = self.pos;
        if matches!(self.peek(), Some(b'+' | b'-')) {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || matches!(c, b'.' | b'e' | b'E'))
        {
            self.pos += 1;
            // Exponent sign rides directly behind its marker.
            if matches!(self.text.as_bytes().get(self.pos - 1), Some(b'e' | b'E'))
                && matches!(self.peek(), Some(b'+' | b'-'))
            {
                self.pos += 1;
            }
        }
        let s = self.slice(start);
        s.parse::<f64>()
            .map_err(|_| self.error(&format!("invalid number '{s}'")))
    }

    /// Skip a bracketed block, honoring nested brackets, quoted strings,
    /// and @asset@ paths inside it.
    fn skip_balanced(&mut self, open: u8, close: u8) -> AdapterResult<()> {
        self.expect(open)?;
        let mut depth = 1usize;
        while depth > 0 {
            self.skip_trivia();
            match self.peek() {
                None => return Err(self.error("unbalanced block")),
                Some(c) if c == open => {
                    self.pos += 1;
                    depth += 1;
                }
                Some(c) if c == close => {
                    self.pos += 1;
                    depth -= 1;
                }
                Some(b'"' | b'\'') => {
                    self.quoted()?;
                }
                Some(b'@') => {
                    self.pos += 1;
                    while !matches!(self.peek(), None | Some(b'@')) {
                        self.pos += 1;
                    }
                    self.pos = (self.pos + 1).min(self.text.len());
                }
                Some(_) => self.pos += 1,
            }
        }
        Ok(())
    }
}

// ============== Stage parsing ==============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpAxis {
    Y,
    Z,
}

#[derive(Debug)]
struct UsdaStage {
    up_axis: UpAxis,
    default_prim: Option<String>,
    prims: Vec<UsdaPrim>,
}

#[derive(Debug)]
struct UsdaPrim {
    type_name: String,
    name: String,
    attrs: HashMap<String, UsdaValue>,
    children: Vec<UsdaPrim>,
}

#[derive(Debug, Clone)]
enum UsdaValue {
    /// Scalars, tuples, and numeric lists, flattened.
    Numbers(Vec<f64>),
    Text(String),
    Texts(Vec<String>),
}

impl UsdaPrim {
    fn numbers(&self, name: &str) -> Option<&[f64]> {
        match self.attrs.get(name)? {
            UsdaValue::Numbers(v) => Some(v),
            _ => None,
        }
    }

    fn scalar(&self, name: &str) -> Option<f64> {
        self.numbers(name).and_then(|v| v.first().copied())
    }

    fn text(&self, name: &str) -> Option<&str> {
        match self.attrs.get(name)? {
            UsdaValue::Text(s) => Some(s),
            _ => None,
        }
    }

    fn vec3(&self, name: &str) -> Option<[f32; 3]> {
        let v = self.numbers(name)?;
        (v.len() >= 3).then(|| [v[0] as f32, v[1] as f32, v[2] as f32])
    }
}

fn parse_usda(text: &str) -> AdapterResult<UsdaStage> {
    let text = text.trim_start_matches('\u{feff}');
    if !text.starts_with(USDA_MAGIC) {
        return Err(AdapterError::Parse("missing #usda header".into()));
    }
    let body_start = text.find('\n').map(|i| i + 1).unwrap_or(text.len());
    let mut reader = Reader::new(text, body_start);

    let mut stage = UsdaStage {
        // The format's fallback when the stage does not say otherwise.
        up_axis: UpAxis::Y,
        default_prim: None,
        prims: Vec::new(),
    };
    reader.skip_trivia();
    if reader.peek() == Some(b'(') {
        parse_stage_metadata(&mut reader, &mut stage)?;
    }
    loop {
        reader.skip_trivia();
        if reader.peek().is_none() {
            return Ok(stage);
        }
        let Some(word) = reader.ident() else {
            return Err(reader.error("expected a prim declaration"));
        };
        if !matches!(word, "def" | "over" | "class") {
            return Err(reader.error(&format!("expected def, found '{word}'")));
        }
        stage.prims.push(parse_prim(&mut reader)?);
    }
}

fn parse_stage_metadata(r: &mut Reader, stage: &mut UsdaStage) -> AdapterResult<()> {
    r.expect(b'(')?;
    loop {
        r.skip_trivia();
        if r.eat(b')') {
            return Ok(());
        }
        let key = r
            .ident()
            .ok_or_else(|| r.error("expected a metadata key"))?;
        r.expect(b'=')?;
        match key {
            "upAxis" => {
                stage.up_axis = match r.quoted()? {
                    "Z" | "z" => UpAxis::Z,
                    _ => UpAxis::Y,
                };
            }
            "defaultPrim" => stage.default_prim = Some(r.quoted()?.to_string()),
            _ => skip_value(r)?,
        }
    }
}

fn skip_value(r: &mut Reader) -> AdapterResult<()> {
    r.skip_trivia();
    match r.peek() {
        Some(b'"' | b'\'') => r.quoted().map(|_| ()),
        Some(b'(') => r.skip_balanced(b'(', b')'),
        Some(b'[') => r.skip_balanced(b'[', b']'),
        Some(b'{') => r.skip_balanced(b'{', b'}'),
        Some(b'<') => parse_path(r).map(|_| ()),
        Some(b'@') => parse_asset(r).map(|_| ()),
        _ => {
            if r.ident().is_some() {
                return Ok(());
            }
            r.number().map(|_| ())
        }
    }
}

/// One `def Type "name" { ... }` block, specifier already consumed.
fn parse_prim(r: &mut Reader) -> AdapterResult<UsdaPrim> {
    r.skip_trivia();
    let type_name = match r.peek() {
        Some(b'"' | b'\'') => String::new(),
        _ => r
            .ident()
            .ok_or_else(|| r.error("expected a prim type or name"))?
            .to_string(),
    };
    let name = r.quoted()?.to_string();
    r.skip_trivia();
    if r.peek() == Some(b'(') {
        r.skip_balanced(b'(', b')')?;
    }
    r.expect(b'{')?;

    let mut prim = UsdaPrim {
        type_name,
        name,
        attrs: HashMap::new(),
        children: Vec::new(),
    };
    loop {
        r.skip_trivia();
        if r.eat(b'}') {
            return Ok(prim);
        }
        let Some(word) = r.ident() else {
            return Err(r.error("expected an attribute or nested prim"));
        };
        if matches!(word, "def" | "over" | "class") {
            prim.children.push(parse_prim(r)?);
        } else if parse_attribute(r, word, &mut prim.attrs)? {
            prim.children.push(parse_prim(r)?);
        }
    }
}

/// Attribute declaration with the leading word already consumed. The
/// qualifier/type words run up to the attribute name; the value lands
/// under whichever identifier sits left of `=`. Returns true when a
/// valueless declaration ran straight into a nested prim specifier,
/// which the caller then parses.
fn parse_attribute(
    r: &mut Reader,
    first: &str,
    attrs: &mut HashMap<String, UsdaValue>,
) -> AdapterResult<bool> {
    let mut name = first;
    loop {
        r.skip_trivia();
        if r.eat_bytes(b"[]") {
            continue;
        }
        if r.eat(b'=') {
            if let Some(value) = parse_value(r)? {
                attrs.insert(name.to_string(), value);
            }
            r.skip_trivia();
            if r.peek() == Some(b'(') {
                r.skip_balanced(b'(', b')')?;
            }
            return Ok(false);
        }
        if r.peek() == Some(b'(') {
            // Declaration carrying only metadata.
            r.skip_balanced(b'(', b')')?;
            return Ok(false);
        }
        match r.ident() {
            Some("def") | Some("over") | Some("class") => return Ok(true),
            Some(word) => name = word,
            None => return Ok(false),
        }
    }
}

fn parse_value(r: &mut Reader) -> AdapterResult<Option<UsdaValue>> {
    r.skip_trivia();
    match r.peek() {
        Some(b'(') => Ok(Some(UsdaValue::Numbers(parse_tuple(r)?))),
        Some(b'[') => parse_list(r),
        Some(b'"' | b'\'') => Ok(Some(UsdaValue::Text(r.quoted()?.to_string()))),
        Some(b'<') => Ok(Some(UsdaValue::Text(parse_path(r)?))),
        Some(b'@') => Ok(Some(UsdaValue::Text(parse_asset(r)?))),
        // Dictionaries and time samples carry nothing the viewer reads.
        Some(b'{') => {
            r.skip_balanced(b'{', b'}')?;
            Ok(None)
        }
        Some(c) if c == b'-' || c == b'+' || c == b'.' || c.is_ascii_digit() => {
            Ok(Some(UsdaValue::Numbers(vec![r.number()?])))
        }
        _ => match r.ident() {
            Some("true") => Ok(Some(UsdaValue::Numbers(vec![1.0]))),
            Some("false") => Ok(Some(UsdaValue::Numbers(vec![0.0]))),
            Some("None") => Ok(None),
            _ => Err(r.error("expected a value")),
        },
    }
}

fn parse_tuple(r: &mut Reader) -> AdapterResult<Vec<f64>> {
    r.expect(b'(')?;
    let mut values = Vec::new();
    loop {
        r.skip_trivia();
        if r.eat(b')') {
            return Ok(values);
        }
        if r.peek() == Some(b'(') {
            // Matrix rows flatten into one buffer.
            values.extend(parse_tuple(r)?);
        } else {
            values.push(r.number()?);
        }
        r.eat(b',');
    }
}

fn parse_list(r: &mut Reader) -> AdapterResult<Option<UsdaValue>> {
    r.expect(b'[')?;
    let mut numbers = Vec::new();
    let mut texts = Vec::new();
    loop {
        r.skip_trivia();
        match r.peek() {
            None => return Err(r.error("unterminated list")),
            Some(b']') => {
                r.pos += 1;
                break;
            }
            Some(b'(') => numbers.extend(parse_tuple(r)?),
            Some(b'"' | b'\'') => texts.push(r.quoted()?.to_string()),
            Some(b'<') => texts.push(parse_path(r)?),
            Some(b'@') => texts.push(parse_asset(r)?),
            _ => numbers.push(r.number()?),
        }
        r.eat(b',');
    }
    if texts.is_empty() {
        Ok(Some(UsdaValue::Numbers(numbers)))
    } else {
        Ok(Some(UsdaValue::Texts(texts)))
    }
}

fn parse_path(r: &mut Reader) -> AdapterResult<String> {
    r.expect(b'<')?;
    let start = r.pos;
    while !matches!(r.peek(), None | Some(b'>')) {
        r.pos += 1;
    }
    let path = r.slice(start).to_string();
    r.expect(b'>')?;
    Ok(path)
}

fn parse_asset(r: &mut Reader) -> AdapterResult<String> {
    r.expect(b'@')?;
    let start = r.pos;
    while !matches!(r.peek(), None | Some(b'@')) {
        r.pos += 1;
    }
    let path = r.slice(start).to_string();
    r.expect(b'@')?;
    Ok(path)
}

// ============== Conversion ==============

fn convert_stage(stage: &UsdaStage, options: &UsdOptions) -> AdapterResult<UnifiedRobotModel> {
    let name = stage
        .default_prim
        .clone()
        .or_else(|| stage.prims.first().map(|p| p.name.clone()))
        .unwrap_or_else(|| "usd_stage".to_string());
    let mut model = UnifiedRobotModel::new(name);
    model
        .add_link(Link::new(STAGE_ROOT))
        .map_err(|e| AdapterError::Conversion(e.to_string()))?;

    let rotate_up = stage.up_axis == UpAxis::Y;
    for prim in &stage.prims {
        convert_prim(prim, STAGE_ROOT, "", rotate_up, &mut model, options)?;
    }

    model.root_link = model.compute_root();
    if let Err(errors) = model.validate() {
        let summary: Vec<String> = errors.iter().map(ToString::to_string).collect();
        return Err(AdapterError::Conversion(summary.join("; ")));
    }
    model.update_world_transforms();
    model
        .metadata
        .insert("format".into(), serde_json::Value::from("usd"));
    model.metadata.insert(
        "up_axis".into(),
        serde_json::Value::from(if rotate_up { "Y" } else { "Z" }),
    );

    info!(
        name = %model.name,
        links = model.link_count(),
        joints = model.joint_count(),
        "converted USD stage"
    );
    Ok(model)
}

fn skipped_prim(type_name: &str) -> bool {
    matches!(type_name, "Material" | "Shader" | "Camera" | "GeomSubset")
        || type_name.ends_with("Light")
}

/// A prim becomes a link welded to its parent; path-derived names keep
/// sibling prims in different branches from colliding.
fn convert_prim(
    prim: &UsdaPrim,
    parent_link: &str,
    parent_path: &str,
    rotate_up: bool,
    model: &mut UnifiedRobotModel,
    options: &UsdOptions,
) -> AdapterResult<()> {
    if skipped_prim(&prim.type_name) {
        return Ok(());
    }
    let path = if parent_path.is_empty() {
        prim.name.clone()
    } else {
        format!("{parent_path}/{}", prim.name)
    };
    let scale = prim.vec3("xformOp:scale").unwrap_or([1.0; 3]);

    let mut link = Link::new(&path);
    if prim.type_name == "Mesh" {
        match mesh_geometry(prim, &path, scale) {
            Some((geometry, mesh)) => link.visuals.push(VisualGeometry {
                name: None,
                origin: Origin::default(),
                geometry,
                material_name: None,
                color: display_color(prim, options.default_color),
                decoded_mesh: Some(mesh),
            }),
            None => warn!(prim = %path, "mesh prim without usable faces, skipping geometry"),
        }
    } else if let Some(geometry) = primitive_geometry(prim, scale) {
        let origin = axis_rotation(prim)
            .map(|q| Origin::from_quat([0.0; 3], q))
            .unwrap_or_default();
        link.visuals.push(VisualGeometry {
            name: None,
            origin,
            geometry,
            material_name: None,
            color: display_color(prim, options.default_color),
            decoded_mesh: None,
        });
    }
    model
        .add_link(link)
        .map_err(|e| AdapterError::Conversion(e.to_string()))?;

    let joint = JointBuilder::new(format!("{path}_fixed"), parent_link, &path)
        .fixed()
        .origin(prim_origin(prim, rotate_up))
        .build();
    model
        .add_joint(joint)
        .map_err(|e| AdapterError::Conversion(e.to_string()))?;

    for child in &prim.children {
        convert_prim(child, &path, &path, false, model, options)?;
    }
    Ok(())
}

fn prim_origin(prim: &UsdaPrim, rotate_up: bool) -> Origin {
    let translate = prim.vec3("xformOp:translate").unwrap_or_default();
    let mut origin = Origin::new(translate, [0.0; 3]);
    if let Some(q) = prim.numbers("xformOp:orient").filter(|v| v.len() >= 4) {
        // usda prints quaternions real part first.
        origin.quat = Some(Quat::from_xyzw(
            q[1] as f32,
            q[2] as f32,
            q[3] as f32,
            q[0] as f32,
        ));
    } else if let Some(r) = prim.vec3("xformOp:rotateXYZ") {
        origin.rpy = r.map(f32::to_radians);
    }
    if rotate_up {
        // Y-up stages tilt upright into the viewer's Z-up world at the
        // root prims.
        let up = Quat::from_rotation_x(std::f32::consts::FRAC_PI_2);
        origin = Origin::from_quat((up * origin.position()).to_array(), up * origin.rotation());
    }
    origin
}

fn display_color(prim: &UsdaPrim, fallback: [f32; 4]) -> [f32; 4] {
    let rgb = prim
        .vec3("primvars:displayColor")
        .or_else(|| prim.vec3("displayColor"));
    let Some(rgb) = rgb else {
        return fallback;
    };
    let alpha = prim
        .scalar("primvars:displayOpacity")
        .map(|a| a as f32)
        .unwrap_or(1.0);
    [rgb[0], rgb[1], rgb[2], alpha]
}

/// Gprim schema fallbacks apply when the attribute is absent: Cube size
/// 2, Sphere/Cylinder radius 1 and height 2, Capsule radius 0.5 and
/// height 1.
fn primitive_geometry(prim: &UsdaPrim, scale: [f32; 3]) -> Option<GeometryType> {
    match prim.type_name.as_str() {
        "Cube" => {
            let s = prim.scalar("size").unwrap_or(2.0) as f32;
            Some(GeometryType::Box {
                size: [s * scale[0], s * scale[1], s * scale[2]],
            })
        }
        "Sphere" => Some(GeometryType::Sphere {
            radius: prim.scalar("radius").unwrap_or(1.0) as f32 * scale[0],
        }),
        "Cylinder" => Some(GeometryType::Cylinder {
            radius: prim.scalar("radius").unwrap_or(1.0) as f32 * scale[0],
            length: prim.scalar("height").unwrap_or(2.0) as f32 * scale[2],
        }),
        "Capsule" => Some(GeometryType::Capsule {
            radius: prim.scalar("radius").unwrap_or(0.5) as f32 * scale[0],
            length: prim.scalar("height").unwrap_or(1.0) as f32 * scale[2],
        }),
        _ => None,
    }
}

/// Viewer cylinders and capsules run along local Z; the axis token picks
/// a different spine.
fn axis_rotation(prim: &UsdaPrim) -> Option<Quat> {
    match prim.text("axis") {
        Some("X") => Some(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2)),
        Some("Y") => Some(Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2)),
        _ => None,
    }
}

fn mesh_geometry(
    prim: &UsdaPrim,
    path: &str,
    scale: [f32; 3],
) -> Option<(GeometryType, Arc<MeshData>)> {
    let points = prim.numbers("points")?;
    let mut mesh = MeshData::named(path);
    mesh.vertices = points
        .chunks_exact(3)
        .map(|c| [c[0] as f32, c[1] as f32, c[2] as f32])
        .collect();
    let indices = prim.numbers("faceVertexIndices").unwrap_or(&[]);
    let counts = prim.numbers("faceVertexCounts").unwrap_or(&[]);
    mesh.indices = fan_triangulate(indices, counts);
    if mesh.is_empty() {
        return None;
    }
    mesh.apply_scale(glam::Vec3::from(scale));
    match prim.numbers("normals") {
        Some(normals) if normals.len() == points.len() => {
            mesh.normals = normals
                .chunks_exact(3)
                .map(|c| [c[0] as f32, c[1] as f32, c[2] as f32])
                .collect();
        }
        // Missing or face-varying normals are rebuilt per vertex.
        _ => mesh.compute_normals(),
    }
    let color = display_color(prim, [0.0; 4]);
    if color != [0.0; 4] {
        mesh.color = Some(color);
    }
    let geometry = GeometryType::Mesh {
        filename: path.to_string(),
        scale: None,
    };
    Some((geometry, Arc::new(mesh)))
}

/// Polygon faces triangulate as fans anchored on each face's first
/// corner. Without counts the index buffer is taken as triangles.
fn fan_triangulate(indices: &[f64], counts: &[f64]) -> Vec<u32> {
    if counts.is_empty() {
        return indices
            .chunks_exact(3)
            .flat_map(|t| t.iter().map(|&i| i as u32))
            .collect();
    }
    let mut out = Vec::new();
    let mut offset = 0usize;
    for &count in counts {
        let count = count as usize;
        if offset + count > indices.len() {
            break;
        }
        let face = &indices[offset..offset + count];
        for k in 1..count.saturating_sub(1) {
            out.push(face[0] as u32);
            out.push(face[k] as u32);
            out.push(face[k + 1] as u32);
        }
        offset += count;
    }
    out
}
