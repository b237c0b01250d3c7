//! Format detection and the single-flight loading facade

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use rovi_assets::{FileBundle, MeshDecoderRegistry, resolver};
use rovi_model::{EventSink, ModelEvent, RenderHandle, UnifiedRobotModel};
use tracing::info;

use crate::error::{AdapterError, AdapterResult};
use crate::mjcf::{self, MjcfOptions};
use crate::urdf::{self, UrdfOptions};
use crate::usd::{self, UsdOptions};
use crate::xacro::{self, XacroOptions};

/// Bytes of content inspected when the extension does not settle the
/// format.
const SNIFF_WINDOW: usize = 4096;

/// The source dialects the viewer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotFormat {
    Urdf,
    Xacro,
    Mjcf,
    Usd,
}

impl RobotFormat {
    /// Identify a document from its filename extension, falling back to
    /// content markers when the extension is missing or shared (`.xml`
    /// carries both URDF and MJCF in the wild).
    pub fn detect(filename: &str, bytes: &[u8]) -> Option<RobotFormat> {
        let lower = filename.to_ascii_lowercase();
        match lower.rsplit_once('.').map(|(_, ext)| ext) {
            Some("urdf") => return Some(RobotFormat::Urdf),
            Some("xacro") => return Some(RobotFormat::Xacro),
            Some("mjcf") => return Some(RobotFormat::Mjcf),
            Some("usd" | "usda" | "usdc" | "usdz") => return Some(RobotFormat::Usd),
            _ => {}
        }
        Self::sniff(bytes)
    }

    fn sniff(bytes: &[u8]) -> Option<RobotFormat> {
        if bytes.starts_with(usd::USDC_MAGIC) || bytes.starts_with(usd::ZIP_MAGIC) {
            return Some(RobotFormat::Usd);
        }
        let head = String::from_utf8_lossy(&bytes[..bytes.len().min(SNIFF_WINDOW)]);
        let head = head.trim_start_matches('\u{feff}').trim_start();
        if head.starts_with(usd::USDA_MAGIC) {
            return Some(RobotFormat::Usd);
        }
        if head.contains("<mujoco") {
            return Some(RobotFormat::Mjcf);
        }
        // Xacro documents keep the <robot> root, so their markers win.
        if head.contains("xmlns:xacro") || head.contains("<xacro:") {
            return Some(RobotFormat::Xacro);
        }
        if head.contains("<robot") {
            return Some(RobotFormat::Urdf);
        }
        None
    }
}

// ============== Single-flight guard ==============

/// Admits one load at a time; a second caller is turned away instead of
/// queued, since a re-entrant load mid-load is always a bug upstream.
#[derive(Default)]
pub struct LoadGuard {
    busy: Mutex<()>,
}

impl LoadGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the loading slot for as long as the permit lives.
    pub fn acquire(&self) -> AdapterResult<LoadPermit<'_>> {
        self.busy
            .try_lock()
            .map(|guard| LoadPermit { _permit: guard })
            .ok_or(AdapterError::LoadInProgress)
    }
}

pub struct LoadPermit<'a> {
    _permit: MutexGuard<'a, ()>,
}

// ============== Loading facade ==============

/// Top-level entry point: detects the format of a bundled document and
/// runs the matching adapter.
pub struct RobotLoader {
    registry: MeshDecoderRegistry,
    guard: LoadGuard,
    sink: Option<Arc<dyn EventSink>>,
}

impl RobotLoader {
    pub fn new(registry: MeshDecoderRegistry) -> Self {
        Self {
            registry,
            guard: LoadGuard::new(),
            sink: None,
        }
    }

    /// Receiver for readiness notifications.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Load the named document from the bundle into a unified model.
    ///
    /// The document's bundle directory becomes the context for relative
    /// references. Rejects re-entrant calls while a load is in flight.
    pub fn load(&self, filename: &str, bundle: &FileBundle) -> AdapterResult<UnifiedRobotModel> {
        let _permit = self.guard.acquire()?;
        let bytes = bundle.get(filename).ok_or_else(|| {
            AdapterError::AssetResolution(format!("document '{filename}' is not in the bundle"))
        })?;
        let format = RobotFormat::detect(filename, bytes)
            .ok_or_else(|| AdapterError::UnknownFormat(filename.to_string()))?;
        let context_dir = resolver::parent_dir(filename).to_string();
        info!(document = %filename, format = ?format, "loading robot description");

        match format {
            RobotFormat::Urdf => {
                let options = UrdfOptions {
                    context_dir,
                    ..UrdfOptions::default()
                };
                urdf::load_urdf(&document_text(bytes, filename)?, bundle, &self.registry, &options)
            }
            RobotFormat::Xacro => {
                let options = XacroOptions {
                    context_dir,
                    ..XacroOptions::default()
                };
                xacro::load_xacro(&document_text(bytes, filename)?, bundle, &self.registry, &options)
            }
            RobotFormat::Mjcf => {
                let options = MjcfOptions {
                    context_dir,
                    ..MjcfOptions::default()
                };
                mjcf::load_mjcf(&document_text(bytes, filename)?, bundle, &self.registry, &options)
            }
            RobotFormat::Usd => usd::load_usd(bytes, &UsdOptions::default()),
        }
    }

    /// Attach the render subtree the embedding built for a model, then
    /// announce the model as ready to draw.
    pub fn attach_render(&self, model: &mut UnifiedRobotModel, handle: RenderHandle) {
        model.render = Some(handle);
        if let Some(sink) = &self.sink {
            sink.emit(ModelEvent::ModelReady {
                model: model.name.clone(),
            });
        }
    }
}

impl Default for RobotLoader {
    fn default() -> Self {
        Self::new(MeshDecoderRegistry::builtin())
    }
}

fn document_text(bytes: &[u8], filename: &str) -> AdapterResult<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| AdapterError::Parse(format!("'{filename}' is not valid UTF-8 text")))
}
