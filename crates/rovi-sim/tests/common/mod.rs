//! Test doubles: a deterministic kernel compiled from parsed MJCF

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use glam::{DQuat, DVec3, EulerRot};
use rovi_assets::FileBundle;
use rovi_formats::mjcf::{MjcfBody, MjcfDocument, MjcfGeomKind, MjcfJointKind, parse_mjcf};
use rovi_model::{ControlNode, RenderHandle, RenderNode};
use rovi_sim::{
    GeomKind, JointKind, MemoryFs, ModelView, PhysicsKernel, SimError, SimResult, Simulation,
    StagingFs,
};

pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rovi_sim=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

// ==================== Model double ====================

pub struct MockBody {
    pub name: String,
    /// World pose in the engine frame.
    pub pos: [f64; 3],
    pub quat: [f64; 4],
    pub mass: f64,
    pub inertia: [f64; 3],
    pub ipos: [f64; 3],
}

pub struct MockGeom {
    pub kind: GeomKind,
    pub size: [f64; 3],
    pub pos: [f64; 3],
    pub quat: [f64; 4],
    pub rgba: [f32; 4],
    pub group: i32,
    pub body: usize,
}

pub struct MockJoint {
    pub kind: JointKind,
    pub body: usize,
    pub axis: [f64; 3],
    pub pos: [f64; 3],
}

/// Flattened body/geom/joint arrays in the layout a compiled engine
/// model exposes, built by walking a parsed document.
pub struct MockModel {
    pub timestep: f64,
    pub bodies: Vec<MockBody>,
    pub geoms: Vec<MockGeom>,
    pub joints: Vec<MockJoint>,
}

pub fn model_from_document(document: &MjcfDocument) -> MockModel {
    let mut model = MockModel {
        timestep: document.timestep,
        bodies: vec![MockBody {
            name: "world".into(),
            pos: [0.0; 3],
            quat: [1.0, 0.0, 0.0, 0.0],
            mass: 0.0,
            inertia: [0.0; 3],
            ipos: [0.0; 3],
        }],
        geoms: Vec::new(),
        joints: Vec::new(),
    };
    walk(
        &document.worldbody,
        0,
        DVec3::ZERO,
        DQuat::IDENTITY,
        &mut model,
    );
    model
}

fn walk(body: &MjcfBody, index: usize, world_pos: DVec3, world_rot: DQuat, model: &mut MockModel) {
    for geom in &body.geoms {
        model.geoms.push(MockGeom {
            kind: geom_kind(geom.kind),
            size: geom.size,
            pos: geom.pos,
            quat: geom.quat.unwrap_or([1.0, 0.0, 0.0, 0.0]),
            rgba: geom.rgba.unwrap_or([0.5, 0.5, 0.5, 1.0]),
            group: geom.group,
            body: index,
        });
    }
    for joint in &body.joints {
        model.joints.push(MockJoint {
            kind: joint_kind(joint.kind),
            body: index,
            axis: joint.axis,
            pos: joint.pos,
        });
    }
    for child in &body.children {
        let child_rot = world_rot * orientation(child);
        let child_pos = world_pos + world_rot * DVec3::from_array(child.pos);
        let (mass, inertia, ipos) = match &child.inertial {
            Some(inertial) => (
                inertial.mass,
                inertial
                    .diaginertia
                    .or_else(|| inertial.fullinertia.map(|f| [f[0], f[1], f[2]]))
                    .unwrap_or([0.01; 3]),
                inertial.pos,
            ),
            None => (1.0, [0.01; 3], [0.0; 3]),
        };
        let child_index = model.bodies.len();
        model.bodies.push(MockBody {
            name: child.name.clone(),
            pos: child_pos.to_array(),
            quat: [child_rot.w, child_rot.x, child_rot.y, child_rot.z],
            mass,
            inertia,
            ipos,
        });
        walk(child, child_index, child_pos, child_rot, model);
    }
}

fn orientation(body: &MjcfBody) -> DQuat {
    if let Some(q) = body.quat {
        DQuat::from_xyzw(q[1], q[2], q[3], q[0]).normalize()
    } else if let Some(e) = body.euler {
        DQuat::from_euler(EulerRot::ZYX, e[2], e[1], e[0])
    } else {
        DQuat::IDENTITY
    }
}

fn geom_kind(kind: MjcfGeomKind) -> GeomKind {
    match kind {
        MjcfGeomKind::Plane => GeomKind::Plane,
        MjcfGeomKind::Sphere => GeomKind::Sphere,
        MjcfGeomKind::Capsule => GeomKind::Capsule,
        MjcfGeomKind::Ellipsoid => GeomKind::Ellipsoid,
        MjcfGeomKind::Cylinder => GeomKind::Cylinder,
        MjcfGeomKind::Box => GeomKind::Box,
        MjcfGeomKind::Mesh => GeomKind::Mesh,
    }
}

fn joint_kind(kind: MjcfJointKind) -> JointKind {
    match kind {
        MjcfJointKind::Free => JointKind::Free,
        MjcfJointKind::Ball => JointKind::Ball,
        MjcfJointKind::Slide => JointKind::Slide,
        MjcfJointKind::Hinge => JointKind::Hinge,
    }
}

impl ModelView for MockModel {
    fn nbody(&self) -> usize {
        self.bodies.len()
    }
    fn ngeom(&self) -> usize {
        self.geoms.len()
    }
    fn njnt(&self) -> usize {
        self.joints.len()
    }
    fn timestep(&self) -> f64 {
        self.timestep
    }
    fn geom_kind(&self, geom: usize) -> GeomKind {
        self.geoms[geom].kind
    }
    fn geom_size(&self, geom: usize) -> [f64; 3] {
        self.geoms[geom].size
    }
    fn geom_pos(&self, geom: usize) -> [f64; 3] {
        self.geoms[geom].pos
    }
    fn geom_quat(&self, geom: usize) -> [f64; 4] {
        self.geoms[geom].quat
    }
    fn geom_rgba(&self, geom: usize) -> [f32; 4] {
        self.geoms[geom].rgba
    }
    fn geom_group(&self, geom: usize) -> i32 {
        self.geoms[geom].group
    }
    fn geom_bodyid(&self, geom: usize) -> usize {
        self.geoms[geom].body
    }
    fn geom_dataid(&self, _geom: usize) -> Option<usize> {
        None
    }
    fn body_mass(&self, body: usize) -> f64 {
        self.bodies[body].mass
    }
    fn body_inertia(&self, body: usize) -> [f64; 3] {
        self.bodies[body].inertia
    }
    fn body_ipos(&self, body: usize) -> [f64; 3] {
        self.bodies[body].ipos
    }
    fn body_iquat(&self, _body: usize) -> [f64; 4] {
        [1.0, 0.0, 0.0, 0.0]
    }
    fn body_name(&self, body: usize) -> Option<String> {
        Some(self.bodies[body].name.clone())
    }
    fn jnt_kind(&self, joint: usize) -> JointKind {
        self.joints[joint].kind
    }
    fn jnt_bodyid(&self, joint: usize) -> usize {
        self.joints[joint].body
    }
    fn jnt_axis(&self, joint: usize) -> [f64; 3] {
        self.joints[joint].axis
    }
    fn jnt_pos(&self, joint: usize) -> [f64; 3] {
        self.joints[joint].pos
    }
    fn mesh_vertices(&self, _mesh: usize) -> Vec<[f32; 3]> {
        Vec::new()
    }
    fn mesh_normals(&self, _mesh: usize) -> Vec<[f32; 3]> {
        Vec::new()
    }
    fn mesh_faces(&self, _mesh: usize) -> Vec<u32> {
        Vec::new()
    }
}

// ==================== Simulation double ====================

/// Deterministic stand-in: every step drifts non-world bodies along
/// engine +X by one timestep and counts itself.
pub struct MockSim {
    model: MockModel,
    initial: Vec<([f64; 3], [f64; 4])>,
    poses: Vec<([f64; 3], [f64; 4])>,
    pub step_count: usize,
    pub active_forces: Vec<(usize, [f64; 3], [f64; 3])>,
    pub force_log: Vec<(usize, [f64; 3], [f64; 3])>,
    released: Arc<AtomicUsize>,
}

impl MockSim {
    fn new(model: MockModel, released: Arc<AtomicUsize>) -> Self {
        let initial: Vec<_> = model.bodies.iter().map(|b| (b.pos, b.quat)).collect();
        Self {
            poses: initial.clone(),
            initial,
            model,
            step_count: 0,
            active_forces: Vec::new(),
            force_log: Vec::new(),
            released,
        }
    }
}

impl Simulation for MockSim {
    type Model = MockModel;

    fn model(&self) -> &MockModel {
        &self.model
    }

    fn step(&mut self) {
        self.step_count += 1;
        let dt = self.model.timestep;
        for pose in self.poses.iter_mut().skip(1) {
            pose.0[0] += dt;
        }
    }

    fn reset(&mut self) {
        self.poses = self.initial.clone();
        self.step_count = 0;
        self.active_forces.clear();
    }

    fn clear_forces(&mut self) {
        self.active_forces.clear();
    }

    fn apply_force(&mut self, body: usize, force: [f64; 3], point: [f64; 3]) {
        self.active_forces.push((body, force, point));
        self.force_log.push((body, force, point));
    }

    fn xpos(&self, body: usize) -> [f64; 3] {
        self.poses[body].0
    }

    fn xquat(&self, body: usize) -> [f64; 4] {
        self.poses[body].1
    }

    fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

// ==================== Kernel double ====================

/// Kernel that "compiles" by parsing the staged MJCF document.
pub struct MockKernel {
    pub fs: MemoryFs,
    pub fail_compile: bool,
    pub released: Arc<AtomicUsize>,
}

impl MockKernel {
    pub fn new() -> Self {
        Self {
            fs: MemoryFs::new(),
            fail_compile: false,
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_compile: true,
            ..Self::new()
        }
    }
}

impl PhysicsKernel for MockKernel {
    type Sim = MockSim;

    fn fs(&mut self) -> &mut dyn StagingFs {
        &mut self.fs
    }

    fn compile(&mut self, document_path: &str) -> SimResult<MockSim> {
        if self.fail_compile {
            return Err(SimError::EngineInit("forced failure".into()));
        }
        let bytes = self
            .fs
            .read_file(document_path)
            .ok_or_else(|| SimError::EngineInit(format!("missing document '{document_path}'")))?;
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|_| SimError::Parse("staged document is not UTF-8".into()))?;
        let document =
            parse_mjcf(&text, &FileBundle::new()).map_err(|e| SimError::Parse(e.to_string()))?;
        Ok(MockSim::new(
            model_from_document(&document),
            self.released.clone(),
        ))
    }
}

// ==================== Render doubles ====================

#[derive(Default)]
pub struct RecordingNode {
    pub visible: AtomicBool,
    pub disposed: AtomicUsize,
}

impl RecordingNode {
    pub fn visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    pub fn dispose_count(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl RenderNode for RecordingNode {
    fn attach_to(&self, _parent: &RenderHandle) {}

    fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }

    fn dispose(&self) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingControl {
    pub enabled: AtomicBool,
}

impl RecordingControl {
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl ControlNode for RecordingControl {
    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }
}
