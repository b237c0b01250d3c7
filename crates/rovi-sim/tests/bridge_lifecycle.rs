//! Bridge lifecycle against the mock kernel: load, step, drag, unload

mod common;

use std::sync::Arc;

use common::{MockKernel, RecordingControl, RecordingNode, init_tracing};
use glam::DVec3;
use rovi_assets::{FileBundle, MeshDecoderRegistry};
use rovi_formats::mjcf::{MjcfOptions, load_mjcf};
use rovi_model::{ControlHandle, RenderHandle, UnifiedRobotModel};
use rovi_sim::{
    LoadRequest, MarkerKind, RenderShape, SimBridge, SimError, SimPhase, StagingFs,
    VisibilityFlags,
};

const BALL_SCENE: &str = r#"<mujoco model="ball_scene">
  <option timestep="0.002"/>
  <worldbody>
    <body name="ball" pos="0 0 0.5">
      <joint type="free"/>
      <inertial pos="0 0 0" mass="2" diaginertia="0.01 0.01 0.01"/>
      <geom name="ball_geom" type="sphere" size="0.1" rgba="0.9 0.1 0.1 1"/>
    </body>
  </worldbody>
</mujoco>"#;

// Timestep is a binary fraction so step counts stay exact.
const STEP_SCENE: &str = r#"<mujoco model="step_scene">
  <option timestep="0.0078125"/>
  <worldbody>
    <body name="ball" pos="0 0 0.5">
      <joint type="free"/>
      <inertial pos="0 0 0" mass="2" diaginertia="0.01 0.01 0.01"/>
      <geom name="ball_geom" type="sphere" size="0.1"/>
    </body>
  </worldbody>
</mujoco>"#;

const PENDULUM_SCENE: &str = r#"<mujoco model="pendulum">
  <option timestep="0.002"/>
  <worldbody>
    <geom name="ground" type="plane" size="5 5 0.1"/>
    <body name="arm" pos="0 0 1">
      <joint name="swing" type="hinge" axis="0 1 0" pos="0 0 0.25"/>
      <inertial pos="0 0 -0.1" mass="1.5" diaginertia="0.02 0.02 0.005"/>
      <geom name="arm_visual" type="capsule" size="0.04 0.25"/>
      <geom name="arm_collision" type="capsule" size="0.05 0.25" group="3"/>
    </body>
  </worldbody>
</mujoco>"#;

fn loaded_bridge(text: &str) -> SimBridge<MockKernel> {
    init_tracing();
    let mut bridge = SimBridge::new(MockKernel::new());
    let bundle = FileBundle::new();
    let model = UnifiedRobotModel::new("test_scene");
    bridge
        .load(LoadRequest {
            text,
            filename: "scene.xml",
            bundle: &bundle,
            model: &model,
            flags: VisibilityFlags::default(),
            static_render: None,
            static_drag: None,
        })
        .unwrap();
    bridge
}

#[test]
fn test_load_injects_ground_plane() {
    let bridge = loaded_bridge(BALL_SCENE);
    assert_eq!(bridge.phase(), SimPhase::Paused);

    let scene = bridge.scene().unwrap();
    // The ball sphere plus the injected plane on the world body.
    assert_eq!(scene.geom_count(), 2);
    let world = scene.body(0).unwrap();
    assert!(matches!(
        world.geoms[0].shape,
        RenderShape::Plane { size: [20.0, 20.0] }
    ));
}

#[test]
fn test_existing_plane_is_kept() {
    let bridge = loaded_bridge(PENDULUM_SCENE);
    let scene = bridge.scene().unwrap();
    // Plane, visual capsule, collision capsule; nothing injected.
    assert_eq!(scene.geom_count(), 3);
    assert!(matches!(
        bridge.scene().unwrap().body(0).unwrap().geoms[0].shape,
        RenderShape::Plane { size: [10.0, 10.0] }
    ));
}

#[test]
fn test_initial_poses_synchronized_on_load() {
    let bridge = loaded_bridge(BALL_SCENE);
    let ball = bridge.scene().unwrap().body_by_name("ball").unwrap();
    // Engine (0, 0, 0.5) is render (0, 0.5, 0).
    assert_eq!(ball.position, DVec3::new(0.0, 0.5, 0.0));
}

#[test]
fn test_second_load_rejected_until_unload() {
    let mut bridge = loaded_bridge(BALL_SCENE);
    let bundle = FileBundle::new();
    let model = UnifiedRobotModel::new("again");
    let err = bridge
        .load(LoadRequest {
            text: BALL_SCENE,
            filename: "scene.xml",
            bundle: &bundle,
            model: &model,
            flags: VisibilityFlags::default(),
            static_render: None,
            static_drag: None,
        })
        .unwrap_err();
    assert!(matches!(err, SimError::AlreadyLoaded));

    bridge.unload();
    assert_eq!(bridge.phase(), SimPhase::Unloaded);
    bridge
        .load(LoadRequest {
            text: BALL_SCENE,
            filename: "scene.xml",
            bundle: &bundle,
            model: &model,
            flags: VisibilityFlags::default(),
            static_render: None,
            static_drag: None,
        })
        .unwrap();
}

#[test]
fn test_failed_compile_rolls_back_staging() {
    init_tracing();
    let mut bridge = SimBridge::new(MockKernel::failing());
    let bundle = FileBundle::new();
    let model = UnifiedRobotModel::new("broken");
    let err = bridge
        .load(LoadRequest {
            text: BALL_SCENE,
            filename: "scene.xml",
            bundle: &bundle,
            model: &model,
            flags: VisibilityFlags::default(),
            static_render: None,
            static_drag: None,
        })
        .unwrap_err();
    assert!(matches!(err, SimError::EngineInit(_)));
    assert_eq!(bridge.phase(), SimPhase::Unloaded);
    assert!(!bridge.kernel().fs.is_dir("working"));
    assert_eq!(bridge.kernel().fs.file_count(), 0);
}

#[test]
fn test_bundle_assets_staged_under_guessed_prefixes() {
    init_tracing();
    let mut bridge = SimBridge::new(MockKernel::new());
    let mut bundle = FileBundle::new();
    bundle.insert("pkg/meshes/ball.stl", b"solid".as_slice());
    let model = UnifiedRobotModel::new("ball_scene");
    bridge
        .load(LoadRequest {
            text: BALL_SCENE,
            filename: "models/scene.xml",
            bundle: &bundle,
            model: &model,
            flags: VisibilityFlags::default(),
            static_render: None,
            static_drag: None,
        })
        .unwrap();

    let fs = &bridge.kernel().fs;
    assert!(fs.contains_file("working/pkg/meshes/ball.stl"));
    assert!(fs.contains_file("working/meshes/ball.stl"));
    assert!(fs.contains_file("working/ball.stl"));
    // The staged document carries the injected plane, not the raw text.
    let staged = std::str::from_utf8(fs.read_file("working/scene.xml").unwrap()).unwrap();
    assert!(staged.contains("name=\"ground\""));
}

#[test]
fn test_start_and_pause_swap_the_stage() {
    init_tracing();
    let mut bridge = SimBridge::new(MockKernel::new());
    let static_node = Arc::new(RecordingNode::default());
    let control_node = Arc::new(RecordingControl::default());
    let scene_node = Arc::new(RecordingNode::default());

    let bundle = FileBundle::new();
    let model = UnifiedRobotModel::new("ball_scene");
    bridge
        .load(LoadRequest {
            text: BALL_SCENE,
            filename: "scene.xml",
            bundle: &bundle,
            model: &model,
            flags: VisibilityFlags::default(),
            static_render: Some(RenderHandle::from_arc(static_node.clone())),
            static_drag: Some(ControlHandle::from_arc(control_node.clone())),
        })
        .unwrap();
    bridge.attach_scene_render(RenderHandle::from_arc(scene_node.clone()));

    // Paused: the static scene owns the stage.
    assert!(static_node.visible());
    assert!(control_node.enabled());
    assert!(!scene_node.visible());

    bridge.start();
    assert_eq!(bridge.phase(), SimPhase::Simulating);
    assert!(!static_node.visible());
    assert!(!control_node.enabled());
    assert!(scene_node.visible());

    bridge.toggle();
    assert_eq!(bridge.phase(), SimPhase::Paused);
    assert!(static_node.visible());
    assert!(control_node.enabled());
    assert!(!scene_node.visible());
}

#[test]
fn test_advance_chases_the_wall_clock() {
    let mut bridge = loaded_bridge(STEP_SCENE);
    bridge.start();

    // First frame aligns without stepping.
    bridge.advance(0.0);
    assert_eq!(bridge.simulation().unwrap().step_count, 0);

    // 0.03125 s at a 0.0078125 s timestep is exactly four steps.
    bridge.advance(0.03125);
    assert_eq!(bridge.simulation().unwrap().step_count, 4);

    // The mock drifts one timestep along engine x per step.
    let ball = bridge.scene().unwrap().body_by_name("ball").unwrap();
    assert_eq!(ball.position, DVec3::new(0.03125, 0.5, 0.0));
}

#[test]
fn test_advance_snaps_after_a_long_stall() {
    let mut bridge = loaded_bridge(STEP_SCENE);
    bridge.start();
    bridge.advance(0.0);
    bridge.advance(0.03125);
    assert_eq!(bridge.simulation().unwrap().step_count, 4);

    // A second-long stall exceeds the catch-up window: realign, no burst.
    bridge.advance(1.0);
    assert_eq!(bridge.simulation().unwrap().step_count, 4);

    bridge.advance(1.015625);
    assert_eq!(bridge.simulation().unwrap().step_count, 6);
}

#[test]
fn test_paused_advance_only_synchronizes() {
    let mut bridge = loaded_bridge(STEP_SCENE);
    bridge.advance(5.0);
    assert_eq!(bridge.simulation().unwrap().step_count, 0);
    let ball = bridge.scene().unwrap().body_by_name("ball").unwrap();
    assert_eq!(ball.position, DVec3::new(0.0, 0.5, 0.0));
}

#[test]
fn test_drag_applies_a_mass_scaled_spring() {
    let mut bridge = loaded_bridge(STEP_SCENE);
    bridge.start();
    bridge.advance(0.0);

    bridge.start_drag(1, DVec3::new(0.0, 0.5, 0.0));
    bridge.update_drag(DVec3::new(0.5, 0.5, 0.0));
    bridge.advance(0.0078125);

    let sim = bridge.simulation().unwrap();
    assert_eq!(sim.step_count, 1);
    // Displacement 0.5 along render x, mass 2, gain 250: engine (250, 0, 0)
    // applied at engine (0, 0, 0.5).
    assert_eq!(sim.force_log, vec![(1, [250.0, 0.0, 0.0], [0.0, 0.0, 0.5])]);

    bridge.end_drag();
    bridge.advance(0.015625);
    let sim = bridge.simulation().unwrap();
    assert_eq!(sim.step_count, 2);
    assert_eq!(sim.force_log.len(), 1);
    assert!(sim.active_forces.is_empty());
}

#[test]
fn test_drag_ignored_unless_simulating() {
    let mut bridge = loaded_bridge(BALL_SCENE);
    bridge.start_drag(1, DVec3::ZERO);
    assert!(bridge.drag().is_none());

    bridge.start();
    bridge.start_drag(1, DVec3::ZERO);
    assert!(bridge.drag().is_some());

    // Pausing drops the grab.
    bridge.pause();
    assert!(bridge.drag().is_none());
}

#[test]
fn test_reset_restores_the_initial_state() {
    let mut bridge = loaded_bridge(STEP_SCENE);
    bridge.start();
    bridge.advance(0.0);
    bridge.advance(0.03125);
    let moved = bridge.scene().unwrap().body_by_name("ball").unwrap().position;
    assert!(moved.x > 0.0);

    bridge.reset();
    let ball = bridge.scene().unwrap().body_by_name("ball").unwrap();
    assert_eq!(ball.position, DVec3::new(0.0, 0.5, 0.0));
    assert_eq!(bridge.simulation().unwrap().step_count, 0);

    // Stepping resumes from a fresh clock alignment.
    bridge.advance(2.0);
    assert_eq!(bridge.simulation().unwrap().step_count, 0);
    bridge.advance(2.0078125);
    assert_eq!(bridge.simulation().unwrap().step_count, 1);
}

#[test]
fn test_unload_releases_everything_once() {
    init_tracing();
    let mut bridge = SimBridge::new(MockKernel::new());
    let static_node = Arc::new(RecordingNode::default());
    let control_node = Arc::new(RecordingControl::default());
    let scene_node = Arc::new(RecordingNode::default());
    let bundle = FileBundle::new();
    let model = UnifiedRobotModel::new("ball_scene");
    bridge
        .load(LoadRequest {
            text: BALL_SCENE,
            filename: "scene.xml",
            bundle: &bundle,
            model: &model,
            flags: VisibilityFlags::default(),
            static_render: Some(RenderHandle::from_arc(static_node.clone())),
            static_drag: Some(ControlHandle::from_arc(control_node.clone())),
        })
        .unwrap();
    bridge.attach_scene_render(RenderHandle::from_arc(scene_node.clone()));
    bridge.start();
    let released = bridge.kernel().released.clone();

    bridge.unload();
    assert_eq!(bridge.phase(), SimPhase::Unloaded);
    assert!(bridge.scene().is_none());
    assert!(bridge.simulation().is_none());
    assert_eq!(released.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(scene_node.dispose_count(), 1);
    assert!(!scene_node.visible());
    assert!(static_node.visible());
    assert!(control_node.enabled());
    assert_eq!(bridge.kernel().fs.file_count(), 0);
    assert!(!bridge.kernel().fs.is_dir("working"));

    // A second unload is a quiet no-op.
    bridge.unload();
    assert_eq!(released.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(scene_node.dispose_count(), 1);
}

#[test]
fn test_start_without_a_load_is_ignored() {
    init_tracing();
    let mut bridge = SimBridge::new(MockKernel::new());
    bridge.start();
    bridge.toggle();
    bridge.advance(1.0);
    assert_eq!(bridge.phase(), SimPhase::Unloaded);
}

#[test]
fn test_source_materials_win_over_engine_colors() {
    init_tracing();
    // The unified model was loaded from a red variant of the document;
    // the engine compiles a blue one. The render scene follows the model.
    let blue_scene = BALL_SCENE.replace("0.9 0.1 0.1 1", "0.1 0.2 0.9 1");
    let bundle = FileBundle::new();
    let registry = MeshDecoderRegistry::builtin();
    let source = load_mjcf(BALL_SCENE, &bundle, &registry, &MjcfOptions::default()).unwrap();

    let mut bridge = SimBridge::new(MockKernel::new());
    bridge
        .load(LoadRequest {
            text: &blue_scene,
            filename: "scene.xml",
            bundle: &bundle,
            model: &source,
            flags: VisibilityFlags::default(),
            static_render: None,
            static_drag: None,
        })
        .unwrap();

    let scene = bridge.scene().unwrap();
    let ball = scene.body_by_name("ball").unwrap();
    assert_eq!(ball.geoms[0].color, [0.9, 0.1, 0.1, 1.0]);
}

#[test]
fn test_collision_geoms_hidden_until_toggled() {
    let mut bridge = loaded_bridge(PENDULUM_SCENE);
    {
        let arm = bridge.scene().unwrap().body_by_name("arm").unwrap();
        let collision = arm.geoms.iter().find(|g| g.collision).unwrap();
        assert!(collision.wireframe);
        assert!(!collision.visible);
        let visual = arm.geoms.iter().find(|g| !g.collision).unwrap();
        assert!(visual.visible);
    }

    bridge.set_visibility_flags(VisibilityFlags {
        collision: true,
        ..VisibilityFlags::default()
    });
    let arm = bridge.scene().unwrap().body_by_name("arm").unwrap();
    assert!(arm.geoms.iter().find(|g| g.collision).unwrap().visible);
}

#[test]
fn test_markers_follow_visibility_flags() {
    let mut bridge = loaded_bridge(PENDULUM_SCENE);
    {
        let arm = bridge.scene().unwrap().body_by_name("arm").unwrap();
        // Axis triad, center of mass, inertia box, hinge arrow.
        assert_eq!(arm.markers.len(), 4);
        assert!(arm.markers.iter().all(|m| !m.visible));
        let arrow = arm
            .markers
            .iter()
            .find_map(|m| match m.kind {
                MarkerKind::JointArrow { axis, position } => Some((axis, position)),
                _ => None,
            })
            .unwrap();
        // Engine axis (0, 1, 0) is render (0, 0, -1); the anchor sits a
        // quarter meter up the arm.
        assert_eq!(arrow.0, DVec3::new(0.0, 0.0, -1.0));
        assert_eq!(arrow.1, DVec3::new(0.0, 0.25, 0.0));
    }

    bridge.set_visibility_flags(VisibilityFlags {
        body_axes: true,
        center_of_mass: true,
        inertia_boxes: true,
        joint_arrows: true,
        ..VisibilityFlags::default()
    });
    let arm = bridge.scene().unwrap().body_by_name("arm").unwrap();
    assert!(arm.markers.iter().all(|m| m.visible));
}
