//! Frame-loop tests over the headless device and window

use approx::assert_relative_eq;

use crate::core::config::EngineConfig;
use crate::foundation::collections::ObjectId;
use crate::foundation::math::Vec3;
use crate::physics::{CollisionShape, PhysicsObject};
use crate::render::{BlendModel, Camera, Mesh, MeshKind, WindowManager};
use crate::scene::ComponentKind;
use crate::{Engine, EngineError};

const FRAME: f32 = 1.0 / 60.0;

fn engine() -> Engine {
    Engine::headless(EngineConfig::default()).unwrap()
}

fn object_with_cube(engine: &mut Engine, name: &str) -> ObjectId {
    let mesh = engine.renderer.add_static_mesh_to_renderer(Mesh::cube());
    let object = engine.scene.create_object(name);
    engine.add_mesh_component(object, "mesh", mesh, BlendModel::Opaque).unwrap();
    object
}

#[test]
fn test_frame_without_camera_is_skipped() {
    let mut engine = engine();
    object_with_cube(&mut engine, "cube");

    let stats = engine.tick_frame(FRAME).unwrap();
    assert!(stats.skipped);
    assert_eq!(stats.draw_calls, 0);
}

#[test]
fn test_first_scene_camera_becomes_active_and_draws() {
    let mut engine = engine();
    object_with_cube(&mut engine, "cube");
    let viewer = engine.scene.create_object("viewer");
    let (_, camera) = engine
        .add_camera_component(viewer, "eye", Camera::new((1600, 900)))
        .unwrap();

    // Cameras only go live at the frame boundary
    assert_eq!(engine.cameras.active_camera_id(), None);

    let stats = engine.tick_frame(FRAME).unwrap();
    assert_eq!(engine.cameras.active_camera_id(), Some(camera));
    assert!(!stats.skipped);
    assert_eq!(stats.opaque_instances, 1);
    assert_eq!(engine.last_frame(), stats);
}

#[test]
fn test_camera_component_drives_camera() {
    let mut engine = engine();
    let viewer = engine.scene.create_object("viewer");
    let (_, camera) = engine
        .add_camera_component(viewer, "eye", Camera::new((800, 600)))
        .unwrap();

    engine.scene.set_object_world_position(viewer, Vec3::new(1.0, 2.0, 3.0));
    engine.tick_frame(FRAME).unwrap();

    let camera = engine.cameras.camera(camera).unwrap();
    assert_relative_eq!(camera.position(), Vec3::new(1.0, 2.0, 3.0), epsilon = 1e-5);
    assert_relative_eq!(camera.forward_vector(), Vec3::x(), epsilon = 1e-5);
    assert_relative_eq!(camera.up_vector(), Vec3::z(), epsilon = 1e-5);
}

#[test]
fn test_destroying_parent_unregisters_children_and_spares_siblings() {
    let mut engine = engine();
    let parent = object_with_cube(&mut engine, "parent");
    let first_child = object_with_cube(&mut engine, "first_child");
    let second_child = object_with_cube(&mut engine, "second_child");
    let sibling = object_with_cube(&mut engine, "sibling");

    engine.attach_object(first_child, parent).unwrap();
    engine.attach_object(second_child, parent).unwrap();

    let (_, child_camera) = engine
        .add_camera_component(first_child, "eye", Camera::new((800, 600)))
        .unwrap();
    let collision = engine
        .scene
        .add_component(second_child, "collision", ComponentKind::Collision(CollisionShape::Sphere { radius: 1.0 }))
        .unwrap();
    engine.add_physics_object(PhysicsObject::rigid_body(second_child, collision, 1.0)).unwrap();

    engine.tick_frame(FRAME).unwrap();
    assert_eq!(engine.renderer.mesh_instance_count(), 4);
    assert_eq!(engine.physics.backend().object_count(), 1);

    let destroyed = engine.destroy_object(parent);
    assert_eq!(destroyed.objects.len(), 3);

    assert_eq!(engine.renderer.mesh_instance_count(), 1);
    assert_eq!(engine.renderer.bucket(MeshKind::Static, BlendModel::Opaque).len(), 1);
    assert!(!engine.cameras.does_camera_exist(child_camera));
    assert_eq!(engine.cameras.active_camera_id(), None);
    assert_eq!(engine.physics.object_count(), 0);
    assert_eq!(engine.physics.backend().object_count(), 0);

    assert!(engine.scene.object(sibling).is_some());
    for object in [parent, first_child, second_child] {
        assert!(engine.scene.object(object).is_none());
    }

    // Remaining instance still draws once a camera exists
    let viewer = engine.scene.create_object("viewer");
    engine.add_camera_component(viewer, "eye", Camera::new((800, 600)));
    let stats = engine.tick_frame(FRAME).unwrap();
    assert_eq!(stats.opaque_instances, 1);
    assert_eq!(stats.stale_instances, 0);
}

#[test]
fn test_destroy_component_removes_its_instance_only() {
    let mut engine = engine();
    let mesh = engine.renderer.add_static_mesh_to_renderer(Mesh::cube());
    let object = engine.scene.create_object("pair");
    let (first, _) = engine.add_mesh_component(object, "first", mesh, BlendModel::Opaque).unwrap();
    engine.add_mesh_component(object, "second", mesh, BlendModel::Transparent).unwrap();

    engine.destroy_component(first);

    assert_eq!(engine.renderer.mesh_instance_count(), 1);
    assert!(engine.renderer.bucket(MeshKind::Static, BlendModel::Opaque).is_empty());
    assert_eq!(engine.renderer.bucket(MeshKind::Static, BlendModel::Transparent).len(), 1);
    assert!(engine.scene.object(object).is_some());
}

#[test]
fn test_physics_runs_inside_the_frame() {
    let mut engine = engine();
    let ball = engine.scene.create_object("ball");
    let collision = engine
        .scene
        .add_component(ball, "collision", ComponentKind::Collision(CollisionShape::Sphere { radius: 0.5 }))
        .unwrap();
    engine.scene.set_object_world_position(ball, Vec3::new(0.0, 0.0, 5.0));
    engine.add_physics_object(PhysicsObject::rigid_body(ball, collision, 1.0)).unwrap();

    // Body is created when the object initializes
    assert!(!engine.physics.physics_object(ball).unwrap().is_initialized());
    for _ in 0..20 {
        engine.tick_frame(FRAME).unwrap();
    }

    assert!(engine.physics.physics_object(ball).unwrap().is_initialized());
    assert!(engine.scene.object_world_position(ball).unwrap().z < 5.0);
}

#[test]
fn test_late_physics_object_gets_body_immediately() {
    let mut engine = engine();
    let crate_object = engine.scene.create_object("crate");
    let plain = engine.scene.add_component(crate_object, "plain", ComponentKind::Scene).unwrap();
    let collision = engine
        .scene
        .add_component(crate_object, "collision", ComponentKind::Collision(CollisionShape::cuboid(Vec3::new(1.0, 1.0, 1.0))))
        .unwrap();
    engine.tick_frame(FRAME).unwrap();

    engine.add_physics_object(PhysicsObject::overlapping(crate_object, collision)).unwrap();
    assert_eq!(engine.physics.backend().object_count(), 1);

    let other = engine.scene.create_object("other");
    engine.tick_frame(FRAME).unwrap();
    let result = engine.add_physics_object(PhysicsObject::rigid_body(other, plain, 1.0));
    assert!(matches!(result, Err(EngineError::Physics(_))));
}

#[test]
fn test_headless_window_follows_config() {
    let mut config = EngineConfig::default();
    config.window.title = "Lantern Test".to_string();
    config.window.width = 640;
    config.window.height = 360;

    let engine = Engine::headless(config).unwrap();
    assert_eq!(engine.window().title(), "Lantern Test");
    assert_eq!(engine.window().window_size(), (640, 360));
}

#[test]
fn test_attach_rejects_cycles() {
    let mut engine = engine();
    let parent = engine.scene.create_object("parent");
    let child = engine.scene.create_object("child");
    engine.attach_object(child, parent).unwrap();
    assert!(matches!(engine.attach_object(parent, child), Err(EngineError::Scene(_))));
}

#[test]
fn test_shutdown_frees_device_resources() {
    let mut engine = engine();
    object_with_cube(&mut engine, "cube");
    let viewer = engine.scene.create_object("viewer");
    engine.add_camera_component(viewer, "eye", Camera::new((800, 600)));
    engine.tick_frame(FRAME).unwrap();

    engine.quit();
    assert!(!engine.is_running());
    engine.shutdown();
    assert!(!engine.renderer.is_initialized());
}
