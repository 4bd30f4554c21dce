//! Scene index tests
//!
//! Tests for:
//! - Component uniqueness and sibling links
//! - Type group ordering and membership
//! - Entity removal and orphaned children
//! - Tags, lookups and change events
//! - Camera view matrices after `Scene::update`

use glam::{Mat4, Vec3};
use kiln::scene::{
    Camera, Component, ComponentType, Entity, EntityEvent, Light, Scene, SceneEvent, Transform,
};

// ============================================================================
// Helper
// ============================================================================

const EPSILON: f32 = 1e-5;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Entity Components
// ============================================================================

#[test]
fn entity_holds_one_component_per_type() {
    init_logger();
    let mut e = Entity::new("e");
    assert!(e.add_component(Transform::new()).is_some());
    assert!(e.add_component(Transform::from_position(Vec3::X)).is_none());

    assert_eq!(e.component_count(), 1);
    let kept = e.transform().unwrap();
    assert!((kept.position - Vec3::ZERO).length() < EPSILON);
}

#[test]
fn siblings_point_at_each_other() {
    let mut e = Entity::new("e");
    let tid = e.add_component(Transform::new()).unwrap();
    let lid = e.add_component(Light::default()).unwrap();

    let light = e.component(ComponentType::Light).unwrap();
    assert_eq!(light.sibling(ComponentType::Transform), Some(tid));
    let transform = e.component(ComponentType::Transform).unwrap();
    assert_eq!(transform.sibling(ComponentType::Light), Some(lid));

    let removed = e.remove_component(ComponentType::Light, false).unwrap();
    assert_eq!(removed.entity(), None);
    let transform = e.component(ComponentType::Transform).unwrap();
    assert_eq!(transform.sibling(ComponentType::Light), None);
}

#[test]
fn remove_with_clear_resets_payload() {
    let mut e = Entity::new("e");
    e.add_component(Transform::from_position(Vec3::splat(3.0)));

    let removed = e.remove_component(ComponentType::Transform, true).unwrap();
    let t = removed.as_transform().unwrap();
    assert!((t.position - Vec3::ZERO).length() < EPSILON);
    assert!(e.remove_component(ComponentType::Transform, false).is_none());
}

#[test]
fn entity_events_are_queued() {
    let mut e = Entity::new("e");
    let id = e.add_component(Light::default()).unwrap();
    e.remove_component(ComponentType::Light, false);

    assert_eq!(
        e.drain_events(),
        vec![
            EntityEvent::ComponentAdded { ty: ComponentType::Light, id },
            EntityEvent::ComponentRemoved { ty: ComponentType::Light, id },
        ]
    );
    assert!(e.drain_events().is_empty());
}

// ============================================================================
// Type Groups
// ============================================================================

#[test]
fn transform_group_is_sorted_by_depth() {
    let mut scene = Scene::new("s");
    let mut keys = Vec::new();
    for name in ["c", "b", "a"] {
        let mut e = Entity::new(name);
        e.add_component(Transform::new());
        keys.push(scene.add_entity(e));
    }
    // a -> b -> c, inserted in reverse
    scene.attach(keys[2], keys[1]);
    scene.attach(keys[1], keys[0]);

    let group = scene.group(ComponentType::Transform);
    let depths: Vec<u32> = group.iter().map(|&k| scene.depth_of(k).unwrap()).collect();
    assert_eq!(depths, vec![0, 1, 2]);
    assert_eq!(group[0], keys[2]);
}

#[test]
fn typed_mutation_keeps_groups_consistent() {
    let mut scene = Scene::new("s");
    let mut e = Entity::new("e");
    let tid = e.add_component(Transform::new()).unwrap();
    let key = scene.add_entity(e);

    assert!(scene.light_mut(key).is_none());
    scene.transform_mut(key).unwrap().position = Vec3::X;
    *scene.transform_mut(key).unwrap() = Transform::from_position(Vec3::Y);

    assert_eq!(scene.group(ComponentType::Transform), &[key]);
    assert!(scene.group(ComponentType::Light).is_empty());
    let (owner, component) = scene.find_component_by_id(tid).unwrap();
    assert_eq!(owner, key);
    assert_eq!(component.component_type(), ComponentType::Transform);
    assert!((component.as_transform().unwrap().position - Vec3::Y).length() < EPSILON);
}

#[test]
fn group_order_keeps_first_seen_order_after_transform() {
    let mut scene = Scene::new("s");

    let mut cam = Entity::new("cam");
    cam.add_component(Camera::default());
    scene.add_entity(cam);

    let mut lamp = Entity::new("lamp");
    lamp.add_components([Component::new(Light::default()), Component::new(Transform::new())]);
    scene.add_entity(lamp);

    assert_eq!(
        scene.group_order(),
        &[ComponentType::Transform, ComponentType::Camera, ComponentType::Light]
    );
}

#[test]
fn removed_component_leaves_group() {
    let mut scene = Scene::new("s");
    let mut e = Entity::new("e");
    e.add_component(Light::default());
    let key = scene.add_entity(e);

    assert_eq!(scene.group(ComponentType::Light), &[key]);
    assert!(scene.remove_component(key, ComponentType::Light, false).is_some());
    assert!(scene.group(ComponentType::Light).is_empty());
    assert!(scene.remove_component(key, ComponentType::Light, false).is_none());
}

// ============================================================================
// Entity Removal
// ============================================================================

#[test]
fn remove_entity_orphans_children() {
    let mut scene = Scene::new("s");
    let mut make = |name: &str| {
        let mut e = Entity::new(name);
        e.add_component(Transform::new());
        scene.add_entity(e)
    };
    let root = make("root");
    let mid = make("mid");
    let leaf = make("leaf");
    let leaf2 = make("leaf2");
    scene.attach(root, mid);
    scene.attach(mid, leaf);
    scene.attach(leaf, leaf2);

    let removed = scene.remove_entity(mid).unwrap();
    assert!(removed.transform().is_some());
    assert_eq!(scene.parent_of(mid), None);
    assert!(scene.children_of(mid).is_empty());

    assert!(scene.children_of(root).is_empty());
    assert_eq!(scene.parent_of(leaf), None);
    assert_eq!(scene.depth_of(leaf), Some(0));
    assert_eq!(scene.depth_of(leaf2), Some(1));
    assert_eq!(scene.root_of(leaf2), Some(leaf));
    assert!(!scene.contains(mid));
}

#[test]
fn removing_transform_component_unlinks_hierarchy() {
    let mut scene = Scene::new("s");
    let mut parent = Entity::new("p");
    parent.add_component(Transform::new());
    let mut child = Entity::new("c");
    child.add_component(Transform::new());
    let p = scene.add_entity(parent);
    let c = scene.add_entity(child);
    scene.attach(p, c);

    scene.remove_component(c, ComponentType::Transform, false);
    assert!(scene.children_of(p).is_empty());
}

#[test]
fn destroy_entity_reports_unknown_keys() {
    let mut scene = Scene::new("s");
    let key = scene.add_entity(Entity::new("e"));
    assert!(scene.destroy_entity(key));
    assert!(!scene.destroy_entity(key));
    assert_eq!(scene.entity_count(), 0);
}

// ============================================================================
// Lookup & Events
// ============================================================================

#[test]
fn lookup_by_runtime_ids() {
    let mut scene = Scene::new("s");
    let mut e = Entity::new("e");
    let eid = e.id();
    let lid = e.add_component(Light::default()).unwrap();
    let key = scene.add_entity(e);

    assert_eq!(scene.find_by_id(eid), Some(key));
    let (owner, comp) = scene.find_component_by_id(lid).unwrap();
    assert_eq!(owner, key);
    assert_eq!(comp.component_type(), ComponentType::Light);
}

#[test]
fn tags_through_scene() {
    let mut scene = Scene::new("s");
    let key = scene.add_entity(Entity::new("e"));

    assert!(scene.add_tag(key, "pickup"));
    assert!(!scene.add_tag(key, "pickup"));
    assert_eq!(scene.find_by_tag("pickup"), vec![key]);

    assert!(scene.remove_tag(key, "pickup"));
    assert!(scene.find_by_tag("pickup").is_empty());
}

#[test]
fn scene_events_follow_structure_changes() {
    let mut scene = Scene::new("s");
    let key = scene.add_entity(Entity::new("e"));
    let id = scene.add_component(key, Light::default()).unwrap();
    scene.remove_entity(key);

    assert_eq!(
        scene.drain_events(),
        vec![
            SceneEvent::EntityAdded(key),
            SceneEvent::ComponentAdded { entity: key, ty: ComponentType::Light, id },
            SceneEvent::EntityRemoved(key),
        ]
    );
}

// ============================================================================
// Update
// ============================================================================

#[test]
fn camera_view_is_inverse_world_after_update() {
    let mut scene = Scene::new("s");
    let mut cam = Entity::new("cam");
    cam.add_components([
        Component::new(Transform::from_position(Vec3::new(0.0, 1.0, 10.0))),
        Component::new(Camera::new_perspective(1.0, 1.5, 0.1, 100.0)),
    ]);
    let key = scene.add_entity(cam);

    scene.update();

    let camera = scene.camera(key).unwrap();
    let expected = Mat4::from_translation(Vec3::new(0.0, -1.0, -10.0));
    assert!(camera.view().abs_diff_eq(expected, EPSILON));
    assert!((camera.world_position() - Vec3::new(0.0, 1.0, 10.0)).length() < EPSILON);
}

#[test]
fn camera_under_moving_parent_follows_it() {
    let mut scene = Scene::new("s");
    let mut rig = Entity::new("rig");
    rig.add_component(Transform::from_position(Vec3::X * 4.0));
    let rig = scene.add_entity(rig);

    let mut cam = Entity::new("cam");
    cam.add_components([
        Component::new(Transform::from_position(Vec3::Z)),
        Component::new(Camera::default()),
    ]);
    let cam = scene.add_entity(cam);
    scene.attach(rig, cam);

    scene.update();
    let pos = scene.camera(cam).unwrap().world_position();
    assert!((pos - Vec3::new(4.0, 0.0, 1.0)).length() < EPSILON);
}
