use std::cmp::Ordering;

use glam::Vec3;
use rustc_hash::FxHashMap;
use slotmap::{SecondaryMap, SlotMap};
use smallvec::SmallVec;

use super::EntityKey;
use super::camera::Camera;
use super::component::{Component, ComponentId, ComponentType};
use super::entity::{Entity, EntityId};
use super::events::SceneEvent;
use super::hierarchy::HierarchyLinks;
use super::light::Light;
use super::renderable::{MeshFilter, ParticleSystem, Sprite};
use super::state::{ComponentFactory, EntityState, SceneState};
use super::transform::Transform;
use crate::errors::Result;

/// Per-type list of the entities carrying a component of that type, kept
/// sorted by the type's comparator.
#[derive(Debug, Default, Clone)]
pub(crate) struct ComponentGroup {
    pub(crate) members: Vec<EntityKey>,
}

/// Scene index.
///
/// Owns entities in a `SlotMap` arena and derives from their components a
/// type-indexed, sorted view used for deterministic update and draw
/// traversal:
///
/// - one [`ComponentGroup`] per component type, sorted by the type's
///   comparator (transforms by ascending depth, everything else by
///   component id);
/// - a top-level `group_order` listing the types present in the scene. A
///   type is appended the first time one of its components is indexed and
///   the list is then stable-sorted by [`ComponentType::traversal_rank`],
///   which places the transform group first.
pub struct Scene {
    pub name: String,
    /// Ambient light term bound to every lit material.
    pub ambient: Vec3,

    pub(crate) entities: SlotMap<EntityKey, Entity>,
    entity_list: Vec<EntityKey>,
    entity_ids: FxHashMap<EntityId, EntityKey>,
    entity_json_ids: FxHashMap<u64, EntityKey>,

    pub(crate) groups: [ComponentGroup; ComponentType::COUNT],
    pub(crate) group_order: Vec<ComponentType>,

    component_ids: FxHashMap<ComponentId, (EntityKey, ComponentType)>,
    component_json_ids: FxHashMap<u64, (EntityKey, ComponentType)>,

    /// Hierarchy entry per entity carrying a transform.
    pub(crate) links: SecondaryMap<EntityKey, HierarchyLinks>,

    /// Entities whose transform still lists unresolved persisted children.
    pub(crate) pending_links: Vec<EntityKey>,

    pub(crate) events: Vec<SceneEvent>,
}

macro_rules! scene_typed_component {
    ($($get:ident, $get_mut:ident => $variant:ident;)*) => {
        $(
            #[inline]
            #[must_use]
            pub fn $get(&self, entity: EntityKey) -> Option<&$variant> {
                self.entities.get(entity).and_then(Entity::$get)
            }

            #[inline]
            pub fn $get_mut(&mut self, entity: EntityKey) -> Option<&mut $variant> {
                self.entities.get_mut(entity).and_then(Entity::$get_mut)
            }
        )*
    };
}

impl Scene {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ambient: Vec3::ZERO,
            entities: SlotMap::with_key(),
            entity_list: Vec::new(),
            entity_ids: FxHashMap::default(),
            entity_json_ids: FxHashMap::default(),
            groups: Default::default(),
            group_order: Vec::new(),
            component_ids: FxHashMap::default(),
            component_json_ids: FxHashMap::default(),
            links: SecondaryMap::new(),
            pending_links: Vec::new(),
            events: Vec::new(),
        }
    }

    // ========================================================================
    // Entity Membership
    // ========================================================================

    /// Moves an entity into the scene and indexes all of its components.
    pub fn add_entity(&mut self, mut entity: Entity) -> EntityKey {
        let queued = entity.drain_events();
        if !queued.is_empty() {
            log::trace!("Scene '{}': dropping {} pre-insert entity events", self.name, queued.len());
        }

        let id = entity.id();
        let json_id = entity.json_id();
        let has_pending = entity
            .transform()
            .is_some_and(|t| !t.pending_children().is_empty());

        let key = self.entities.insert(entity);
        self.entity_list.push(key);
        self.entity_ids.insert(id, key);
        if let Some(json_id) = json_id {
            self.entity_json_ids.insert(json_id, key);
        }

        for ty in ComponentType::ALL {
            if self.entities[key].has_component(ty) {
                self.index_component(key, ty);
            }
        }

        if has_pending {
            self.pending_links.push(key);
        }
        self.resolve_pending_links();

        self.events.push(SceneEvent::EntityAdded(key));
        key
    }

    /// Takes an entity out of the scene.
    ///
    /// The entity's transform is unlinked from its parent and its children
    /// become roots of their own subtrees.
    pub fn remove_entity(&mut self, key: EntityKey) -> Option<Entity> {
        if !self.entities.contains_key(key) {
            log::error!("Scene '{}': remove_entity on an entity it does not own", self.name);
            return None;
        }

        self.unlink_transform(key);

        for ty in ComponentType::ALL {
            if self.entities[key].has_component(ty) {
                self.unindex_component(key, ty);
            }
        }

        self.entity_list.retain(|&k| k != key);
        self.pending_links.retain(|&k| k != key);

        let entity = self.entities.remove(key)?;
        self.entity_ids.remove(&entity.id());
        if let Some(json_id) = entity.json_id() {
            self.entity_json_ids.remove(&json_id);
        }

        self.events.push(SceneEvent::EntityRemoved(key));
        Some(entity)
    }

    /// Removes an entity and drops all of its components.
    pub fn destroy_entity(&mut self, key: EntityKey) -> bool {
        match self.remove_entity(key) {
            Some(mut entity) => {
                entity.clear();
                true
            }
            None => false,
        }
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, key: EntityKey) -> bool {
        self.entities.contains_key(key)
    }

    #[inline]
    #[must_use]
    pub fn entity(&self, key: EntityKey) -> Option<&Entity> {
        self.entities.get(key)
    }

    /// Entities in insertion order.
    pub fn entities(&self) -> impl Iterator<Item = (EntityKey, &Entity)> {
        self.entity_list
            .iter()
            .filter_map(|&k| self.entities.get(k).map(|e| (k, e)))
    }

    #[inline]
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entity_list.len()
    }

    // ========================================================================
    // Components
    // ========================================================================

    /// Adds a component to a scene-owned entity and indexes it.
    pub fn add_component(
        &mut self,
        key: EntityKey,
        component: impl Into<Component>,
    ) -> Option<ComponentId> {
        let Some(entity) = self.entities.get_mut(key) else {
            log::error!("Scene '{}': add_component on an entity it does not own", self.name);
            return None;
        };
        let component = component.into();
        let ty = component.component_type();
        let id = entity.add_component(component)?;
        self.forward_entity_events(key);
        self.index_component(key, ty);
        Some(id)
    }

    /// Removes a component from a scene-owned entity. Removing a transform
    /// unlinks it from the hierarchy first.
    pub fn remove_component(
        &mut self,
        key: EntityKey,
        ty: ComponentType,
        clear_data: bool,
    ) -> Option<Component> {
        let Some(entity) = self.entities.get(key) else {
            log::error!("Scene '{}': remove_component on an entity it does not own", self.name);
            return None;
        };
        if !entity.has_component(ty) {
            log::error!(
                "Scene '{}': entity '{}' has no {} component",
                self.name,
                entity.name,
                ty.tag()
            );
            return None;
        }

        if ty == ComponentType::Transform {
            self.unlink_transform(key);
            self.pending_links.retain(|&k| k != key);
        }
        self.unindex_component(key, ty);

        let removed = self.entities.get_mut(key)?.remove_component(ty, clear_data);
        self.forward_entity_events(key);
        removed
    }

    #[must_use]
    pub fn component(&self, key: EntityKey, ty: ComponentType) -> Option<&Component> {
        self.entities.get(key)?.component(ty)
    }

    scene_typed_component! {
        transform, transform_mut => Transform;
        camera, camera_mut => Camera;
        light, light_mut => Light;
        mesh_filter, mesh_filter_mut => MeshFilter;
        sprite, sprite_mut => Sprite;
        particle_system, particle_system_mut => ParticleSystem;
    }

    pub fn add_tag(&mut self, key: EntityKey, tag: impl Into<String>) -> bool {
        self.entities.get_mut(key).is_some_and(|e| e.add_tag(tag))
    }

    pub fn remove_tag(&mut self, key: EntityKey, tag: &str) -> bool {
        self.entities.get_mut(key).is_some_and(|e| e.remove_tag(tag))
    }

    fn forward_entity_events(&mut self, key: EntityKey) {
        if let Some(entity) = self.entities.get_mut(key) {
            self.events.extend(
                entity
                    .drain_events()
                    .into_iter()
                    .map(|ev| SceneEvent::from_entity(key, ev)),
            );
        }
    }

    // ========================================================================
    // Type Index
    // ========================================================================

    fn index_component(&mut self, key: EntityKey, ty: ComponentType) {
        let Some(component) = self.entities.get(key).and_then(|e| e.component(ty)) else {
            return;
        };
        self.component_ids.insert(component.id(), (key, ty));
        if let Some(json_id) = component.json_id() {
            self.component_json_ids.insert(json_id, (key, ty));
        }

        if ty == ComponentType::Transform {
            self.links.insert(key, HierarchyLinks::default());
        }
        self.groups[ty.index()].members.push(key);
        self.sort_group(ty);

        if !self.group_order.contains(&ty) {
            self.group_order.push(ty);
            self.group_order.sort_by_key(|t| t.traversal_rank());
        }
    }

    fn unindex_component(&mut self, key: EntityKey, ty: ComponentType) {
        let Some(component) = self.entities.get(key).and_then(|e| e.component(ty)) else {
            return;
        };
        self.component_ids.remove(&component.id());
        if let Some(json_id) = component.json_id() {
            self.component_json_ids.remove(&json_id);
        }
        if ty == ComponentType::Transform {
            self.links.remove(key);
        }
        self.groups[ty.index()].members.retain(|&k| k != key);
    }

    pub(crate) fn sort_group(&mut self, ty: ComponentType) {
        let entities = &self.entities;
        let links = &self.links;
        let members = &mut self.groups[ty.index()].members;
        members.sort_by(|&a, &b| compare_members(entities, links, ty, a, b));
    }

    /// Types present in the scene, in traversal order.
    #[inline]
    #[must_use]
    pub fn group_order(&self) -> &[ComponentType] {
        &self.group_order
    }

    /// Entities carrying a component of `ty`, in the type's sort order.
    #[inline]
    #[must_use]
    pub fn group(&self, ty: ComponentType) -> &[EntityKey] {
        &self.groups[ty.index()].members
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[must_use]
    pub fn find_by_tag(&self, tag: &str) -> Vec<EntityKey> {
        self.entities()
            .filter(|(_, e)| e.has_tag(tag))
            .map(|(k, _)| k)
            .collect()
    }

    #[must_use]
    pub fn find_by_tag_first(&self, tag: &str) -> Option<EntityKey> {
        self.entities().find(|(_, e)| e.has_tag(tag)).map(|(k, _)| k)
    }

    #[must_use]
    pub fn find_by_id(&self, id: EntityId) -> Option<EntityKey> {
        self.entity_ids.get(&id).copied()
    }

    #[must_use]
    pub fn find_by_json_id(&self, json_id: u64) -> Option<EntityKey> {
        self.entity_json_ids.get(&json_id).copied()
    }

    #[must_use]
    pub fn find_component_by_id(&self, id: ComponentId) -> Option<(EntityKey, &Component)> {
        let &(key, ty) = self.component_ids.get(&id)?;
        self.component(key, ty).map(|c| (key, c))
    }

    #[must_use]
    pub fn find_component_by_json_id(&self, json_id: u64) -> Option<(EntityKey, &Component)> {
        let &(key, ty) = self.component_json_ids.get(&json_id)?;
        self.component(key, ty).map(|c| (key, c))
    }

    // ========================================================================
    // Update
    // ========================================================================

    /// Walks the type groups in traversal order: world matrices first, then
    /// camera view matrices.
    pub fn update(&mut self) {
        let order: SmallVec<[ComponentType; ComponentType::COUNT]> =
            self.group_order.iter().copied().collect();
        for ty in order {
            match ty {
                ComponentType::Transform => self.update_transforms(),
                ComponentType::Camera => self.update_cameras(),
                _ => {}
            }
        }
    }

    fn update_cameras(&mut self) {
        for &key in &self.groups[ComponentType::Camera.index()].members {
            let Some(entity) = self.entities.get_mut(key) else {
                continue;
            };
            let world = entity.transform().map(|t| *t.world_matrix()).unwrap_or_default();
            if let Some(camera) = entity.camera_mut() {
                camera.update_view(&world);
            }
        }
    }

    /// Takes the queued structural notifications.
    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.events)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Captures an entity with its transform children resolved to the
    /// persisted ids of the child transform components. `None` when the
    /// scene does not own `key`.
    #[must_use]
    pub fn entity_state(&self, key: EntityKey) -> Option<Result<EntityState>> {
        let entity = self.entities.get(key)?;
        Some(entity.to_state_with(|t| {
            let mut ids: Vec<u64> = self
                .children_of(key)
                .iter()
                .filter_map(|&child| self.component(child, ComponentType::Transform))
                .map(|c| c.id().raw())
                .collect();
            ids.extend_from_slice(t.pending_children());
            ids
        }))
    }

    pub fn to_state(&self) -> Result<SceneState> {
        Ok(SceneState {
            name: self.name.clone(),
            ambient: self.ambient,
            entities: self
                .entity_list
                .iter()
                .filter_map(|&k| self.entity_state(k))
                .collect::<Result<_>>()?,
        })
    }

    /// Rebuilds a scene. Transform hierarchies are restored as entities are
    /// added, in any order.
    pub fn from_state(state: &SceneState, factory: &ComponentFactory) -> Result<Self> {
        let mut scene = Scene::new(state.name.clone());
        scene.ambient = state.ambient;
        for es in &state.entities {
            let entity = Entity::from_state(es, factory)?;
            scene.add_entity(entity);
        }
        scene.events.clear();
        Ok(scene)
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new("Scene")
    }
}

fn compare_members(
    entities: &SlotMap<EntityKey, Entity>,
    links: &SecondaryMap<EntityKey, HierarchyLinks>,
    ty: ComponentType,
    a: EntityKey,
    b: EntityKey,
) -> Ordering {
    let ca = entities.get(a).and_then(|e| e.component(ty));
    let cb = entities.get(b).and_then(|e| e.component(ty));
    let (Some(ca), Some(cb)) = (ca, cb) else {
        return Ordering::Equal;
    };

    if ty == ComponentType::Transform {
        let da = links.get(a).map_or(0, |l| l.depth);
        let db = links.get(b).map_or(0, |l| l.depth);
        da.cmp(&db).then_with(|| ca.id().cmp(&cb.id()))
    } else {
        ca.id().cmp(&cb.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_order_puts_transforms_first_and_is_stable() {
        let mut scene = Scene::new("order");

        let mut lamp = Entity::new("lamp");
        lamp.add_component(Light::default());
        scene.add_entity(lamp);

        let mut cam = Entity::new("cam");
        cam.add_components([
            Component::new(Camera::default()),
            Component::new(Transform::new()),
        ]);
        scene.add_entity(cam);

        let expected = [ComponentType::Transform, ComponentType::Light, ComponentType::Camera];
        assert_eq!(scene.group_order(), &expected);

        let mut more = Entity::new("more");
        more.add_component(Transform::new());
        more.add_component(Light::default());
        scene.add_entity(more);
        assert_eq!(scene.group_order(), &expected);
    }

    #[test]
    fn remove_entity_unindexes_components() {
        let mut scene = Scene::new("s");
        let mut e = Entity::new("e");
        let tid = e.add_component(Transform::new()).unwrap();
        let key = scene.add_entity(e);

        assert!(scene.find_component_by_id(tid).is_some());
        let e = scene.remove_entity(key).unwrap();
        assert!(scene.find_component_by_id(tid).is_none());
        assert!(scene.group(ComponentType::Transform).is_empty());
        assert_eq!(e.component_count(), 1);
        assert!(scene.remove_entity(key).is_none());
    }

    #[test]
    fn add_component_through_scene_is_indexed() {
        let mut scene = Scene::new("s");
        let key = scene.add_entity(Entity::new("e"));
        scene.drain_events();

        let id = scene.add_component(key, Light::default()).unwrap();
        assert_eq!(scene.group(ComponentType::Light), &[key]);
        assert_eq!(scene.find_component_by_id(id).map(|(k, _)| k), Some(key));
        assert_eq!(
            scene.drain_events(),
            vec![SceneEvent::ComponentAdded {
                entity: key,
                ty: ComponentType::Light,
                id
            }]
        );

        assert!(scene.add_component(key, Light::default()).is_none());
        assert_eq!(scene.group(ComponentType::Light).len(), 1);
    }

    #[test]
    fn find_by_tag() {
        let mut scene = Scene::new("s");
        let mut a = Entity::new("a");
        a.add_tag("enemy");
        let mut b = Entity::new("b");
        b.add_tag("enemy");
        let ka = scene.add_entity(a);
        let kb = scene.add_entity(b);
        scene.add_entity(Entity::new("c"));

        assert_eq!(scene.find_by_tag("enemy"), vec![ka, kb]);
        assert_eq!(scene.find_by_tag_first("enemy"), Some(ka));
        assert_eq!(scene.find_by_tag_first("boss"), None);
    }
}
