//! Lifecycle bridge between a loaded model and a physics kernel
//!
//! The bridge owns the whole simulation lifecycle: stage the document and
//! its assets, compile, mirror the compiled model into a render scene,
//! step against wall-clock time, and tear everything down again. While a
//! simulation is running the static viewer scene is hidden and its pose
//! controls disabled; pausing or unloading hands the stage back.

use glam::DVec3;
use rovi_assets::FileBundle;
use rovi_model::{ControlHandle, RenderHandle, UnifiedRobotModel};
use tracing::{debug, info, warn};

use crate::convert;
use crate::error::{SimError, SimResult};
use crate::kernel::{ModelView, PhysicsKernel, Simulation};
use crate::scene::{SimScene, VisibilityFlags, build_scene};
use crate::staging::{clear_staging, inject_ground_plane, stage_assets};

/// Longest wall-clock gap the stepper chases before snapping forward.
pub const MAX_CATCHUP_SECONDS: f64 = 0.035;

/// Spring gain from grab displacement to applied force, per kilogram.
pub const DRAG_FORCE_GAIN: f64 = 250.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimPhase {
    Unloaded,
    Paused,
    Simulating,
}

/// An active pointer drag on a simulated body.
#[derive(Debug, Clone, Copy)]
pub struct DragState {
    pub body_index: usize,
    /// Where the force applies, render coordinates.
    pub grab_point: DVec3,
    /// Where the pointer wants the grab point, render coordinates.
    pub target: DVec3,
}

/// Everything one load needs, handed over in a single call.
pub struct LoadRequest<'a> {
    /// Source document text, any ground plane still optional.
    pub text: &'a str,
    /// Name the document was loaded under, staged by basename.
    pub filename: &'a str,
    pub bundle: &'a FileBundle,
    /// Unified model of the same document, consulted for materials.
    pub model: &'a UnifiedRobotModel,
    pub flags: VisibilityFlags,
    /// Static viewer scene, hidden while simulation runs.
    pub static_render: Option<RenderHandle>,
    /// Pose controls on the static scene, disabled while simulation runs.
    pub static_drag: Option<ControlHandle>,
}

#[derive(Debug, Clone, Copy)]
pub struct SimOptions {
    pub max_catchup: f64,
    pub drag_gain: f64,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            max_catchup: MAX_CATCHUP_SECONDS,
            drag_gain: DRAG_FORCE_GAIN,
        }
    }
}

/// State machine driving one kernel through load, run, and unload.
pub struct SimBridge<K: PhysicsKernel> {
    kernel: K,
    options: SimOptions,
    phase: SimPhase,
    sim: Option<K::Sim>,
    scene: Option<SimScene>,
    drag: Option<DragState>,
    /// Simulated time, chasing the wall clock while running.
    sim_time: f64,
    last_tick: Option<f64>,
    static_render: Option<RenderHandle>,
    static_drag: Option<ControlHandle>,
    flags: VisibilityFlags,
}

impl<K: PhysicsKernel> SimBridge<K> {
    pub fn new(kernel: K) -> Self {
        Self::with_options(kernel, SimOptions::default())
    }

    pub fn with_options(kernel: K, options: SimOptions) -> Self {
        Self {
            kernel,
            options,
            phase: SimPhase::Unloaded,
            sim: None,
            scene: None,
            drag: None,
            sim_time: 0.0,
            last_tick: None,
            static_render: None,
            static_drag: None,
            flags: VisibilityFlags::default(),
        }
    }

    // ==================== Lifecycle ====================

    /// Stage, compile, and mirror a document, landing in [`SimPhase::Paused`].
    ///
    /// Staging is rolled back when compilation fails, leaving the bridge
    /// unloaded and ready for another attempt.
    pub fn load(&mut self, request: LoadRequest<'_>) -> SimResult<()> {
        if self.phase != SimPhase::Unloaded {
            return Err(SimError::AlreadyLoaded);
        }

        let (document, injected) = inject_ground_plane(request.text)?;
        if injected {
            debug!("injected a ground plane into the scene");
        }

        let main = match stage_assets(
            self.kernel.fs(),
            request.bundle,
            request.filename,
            &document,
        ) {
            Ok(main) => main,
            Err(err) => {
                clear_staging(self.kernel.fs());
                return Err(err);
            }
        };

        let mut sim = match self.kernel.compile(&main) {
            Ok(sim) => sim,
            Err(err) => {
                clear_staging(self.kernel.fs());
                return Err(err);
            }
        };
        sim.reset();
        if sim.model().timestep() <= 0.0 {
            warn!("compiled model has a non-positive timestep, stepping disabled");
        }

        let mut scene = build_scene(sim.model(), request.model, request.flags);
        sync_poses(&sim, &mut scene);
        info!(
            model = %request.model.name,
            bodies = scene.bodies.len(),
            geoms = scene.geom_count(),
            "simulation compiled"
        );

        self.flags = request.flags;
        self.static_render = request.static_render;
        self.static_drag = request.static_drag;
        self.scene = Some(scene);
        self.sim = Some(sim);
        self.sim_time = 0.0;
        self.last_tick = None;
        self.drag = None;
        self.phase = SimPhase::Paused;
        self.apply_exclusive_visibility();
        Ok(())
    }

    /// Release the simulation and every resource it held. Idempotent.
    pub fn unload(&mut self) {
        if let Some(mut sim) = self.sim.take() {
            sim.release();
        }
        if let Some(scene) = self.scene.take()
            && let Some(handle) = scene.render
        {
            handle.set_visible(false);
            handle.dispose();
        }
        clear_staging(self.kernel.fs());
        if let Some(render) = self.static_render.take() {
            render.set_visible(true);
        }
        if let Some(control) = self.static_drag.take() {
            control.set_enabled(true);
        }
        self.drag = None;
        self.sim_time = 0.0;
        self.last_tick = None;
        self.phase = SimPhase::Unloaded;
    }

    /// Restore the compiled model's initial state without recompiling.
    pub fn reset(&mut self) {
        let Some(sim) = self.sim.as_mut() else {
            return;
        };
        sim.reset();
        self.sim_time = 0.0;
        self.last_tick = None;
        self.drag = None;
        if let Some(scene) = self.scene.as_mut() {
            sync_poses(sim, scene);
        }
    }

    // ==================== Stepping ====================

    /// Advance toward wall-clock time `now` (seconds) and refresh poses.
    ///
    /// While paused this only synchronizes poses. The first frame after
    /// starting, and any frame arriving more than `max_catchup` behind,
    /// realigns simulated time with the clock instead of stepping through
    /// the backlog.
    pub fn advance(&mut self, now: f64) {
        let Some(sim) = self.sim.as_mut() else {
            return;
        };
        if self.phase == SimPhase::Simulating {
            let timestep = sim.model().timestep();
            if timestep > 0.0 {
                if self.last_tick.is_none() || now - self.sim_time > self.options.max_catchup {
                    self.sim_time = now;
                }
                while self.sim_time < now {
                    sim.clear_forces();
                    if let Some(drag) = self.drag {
                        apply_drag_force(sim, drag, self.options.drag_gain);
                    }
                    sim.step();
                    self.sim_time += timestep;
                }
            }
            self.last_tick = Some(now);
        }
        if let Some(scene) = self.scene.as_mut() {
            sync_poses(sim, scene);
        }
    }

    /// Begin stepping. The stage switches to the simulation scene.
    pub fn start(&mut self) {
        if self.sim.is_none() || self.phase == SimPhase::Simulating {
            return;
        }
        self.phase = SimPhase::Simulating;
        self.last_tick = None;
        self.apply_exclusive_visibility();
    }

    /// Stop stepping and hand the stage back to the static scene.
    pub fn pause(&mut self) {
        if self.phase != SimPhase::Simulating {
            return;
        }
        self.phase = SimPhase::Paused;
        self.drag = None;
        self.apply_exclusive_visibility();
    }

    pub fn toggle(&mut self) {
        match self.phase {
            SimPhase::Simulating => self.pause(),
            SimPhase::Paused => self.start(),
            SimPhase::Unloaded => {}
        }
    }

    // ==================== Interaction ====================

    /// Grab a body at a point, render coordinates. Ignored unless running.
    pub fn start_drag(&mut self, body_index: usize, grab_point: DVec3) {
        if self.phase != SimPhase::Simulating {
            return;
        }
        self.drag = Some(DragState {
            body_index,
            grab_point,
            target: grab_point,
        });
    }

    /// Move the drag target; the next steps pull the body toward it.
    pub fn update_drag(&mut self, target: DVec3) {
        if let Some(drag) = self.drag.as_mut() {
            drag.target = target;
        }
    }

    pub fn end_drag(&mut self) {
        self.drag = None;
    }

    // ==================== Render wiring ====================

    /// Attach the embedding's handle for the simulation scene.
    pub fn attach_scene_render(&mut self, handle: RenderHandle) {
        let simulating = self.phase == SimPhase::Simulating;
        if let Some(scene) = self.scene.as_mut() {
            handle.set_visible(simulating);
            scene.render = Some(handle);
        }
    }

    pub fn set_visibility_flags(&mut self, flags: VisibilityFlags) {
        self.flags = flags;
        if let Some(scene) = self.scene.as_mut() {
            scene.apply_flags(flags);
        }
    }

    /// Exactly one of the two scenes owns the stage at a time.
    fn apply_exclusive_visibility(&self) {
        let simulating = self.phase == SimPhase::Simulating;
        if let Some(scene) = &self.scene
            && let Some(handle) = &scene.render
        {
            handle.set_visible(simulating);
        }
        if let Some(render) = &self.static_render {
            render.set_visible(!simulating);
        }
        if let Some(control) = &self.static_drag {
            control.set_enabled(!simulating);
        }
    }

    // ==================== Accessors ====================

    pub fn phase(&self) -> SimPhase {
        self.phase
    }

    pub fn scene(&self) -> Option<&SimScene> {
        self.scene.as_ref()
    }

    pub fn drag(&self) -> Option<DragState> {
        self.drag
    }

    pub fn visibility_flags(&self) -> VisibilityFlags {
        self.flags
    }

    pub fn simulation(&self) -> Option<&K::Sim> {
        self.sim.as_ref()
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn kernel_mut(&mut self) -> &mut K {
        &mut self.kernel
    }
}

/// Spring force from grab displacement, scaled by body mass so heavy and
/// light bodies respond alike.
fn apply_drag_force<S: Simulation>(sim: &mut S, drag: DragState, gain: f64) {
    let mass = sim.model().body_mass(drag.body_index);
    let pull = (drag.target - drag.grab_point) * mass * gain;
    sim.apply_force(
        drag.body_index,
        convert::pos_to_engine(pull),
        convert::pos_to_engine(drag.grab_point),
    );
}

/// Copy engine body poses into the scene, render coordinates.
fn sync_poses<S: Simulation>(sim: &S, scene: &mut SimScene) {
    for body in &mut scene.bodies {
        body.position = convert::pos_to_render(sim.xpos(body.body_index));
        body.rotation = convert::quat_to_render(sim.xquat(body.body_index));
    }
}
