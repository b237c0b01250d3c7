//! Capability seams toward the externally-owned render layer

use std::fmt;
use std::sync::Arc;

/// Operations the core may invoke on a render subtree it does not own.
///
/// The embedding application implements this for its scene-graph library;
/// the core never inspects the subtree, it only re-parents, toggles, and
/// releases it.
pub trait RenderNode: Send + Sync {
    /// Re-parent this subtree under another handle.
    fn attach_to(&self, parent: &RenderHandle);
    fn set_visible(&self, visible: bool);
    /// Release the subtree's resources. Must be idempotent.
    fn dispose(&self);
}

/// Cloneable opaque handle to a render subtree.
#[derive(Clone)]
pub struct RenderHandle(Arc<dyn RenderNode>);

impl RenderHandle {
    pub fn new(node: impl RenderNode + 'static) -> Self {
        Self(Arc::new(node))
    }

    /// Wrap an already-shared node, letting the caller keep its end.
    pub fn from_arc(node: Arc<dyn RenderNode>) -> Self {
        Self(node)
    }

    pub fn attach_to(&self, parent: &RenderHandle) {
        self.0.attach_to(parent);
    }

    pub fn set_visible(&self, visible: bool) {
        self.0.set_visible(visible);
    }

    pub fn dispose(&self) {
        self.0.dispose();
    }
}

impl fmt::Debug for RenderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RenderHandle")
    }
}

/// Enable switch for an externally-owned controller, such as the loaded
/// model's drag-to-pose controls.
pub trait ControlNode: Send + Sync {
    fn set_enabled(&self, enabled: bool);
}

/// Cloneable opaque handle to an external controller.
#[derive(Clone)]
pub struct ControlHandle(Arc<dyn ControlNode>);

impl ControlHandle {
    pub fn new(node: impl ControlNode + 'static) -> Self {
        Self(Arc::new(node))
    }

    /// Wrap an already-shared node, letting the caller keep its end.
    pub fn from_arc(node: Arc<dyn ControlNode>) -> Self {
        Self(node)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.0.set_enabled(enabled);
    }
}

impl fmt::Debug for ControlHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ControlHandle")
    }
}

/// Notifications the core raises toward the embedding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    /// A model's render subtree is attached and ready to draw.
    ModelReady { model: String },
}

/// Receiver for [`ModelEvent`] notifications.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ModelEvent);
}
