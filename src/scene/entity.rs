//! Entity: a named bag of components, one per type, plus string tags.

use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::camera::Camera;
use super::component::{Component, ComponentId, ComponentType};
use super::events::EntityEvent;
use super::light::Light;
use super::renderable::{MeshFilter, ParticleSystem, Sprite};
use super::state::{ComponentFactory, ComponentState, EntityState};
use super::transform::Transform;
use crate::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(1);

impl EntityId {
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A game object.
///
/// Owns at most one component per [`ComponentType`]. Entities live on their
/// own until moved into a [`Scene`](super::Scene) with
/// [`Scene::add_entity`](super::Scene::add_entity); moving by value is what
/// keeps an entity in at most one scene at a time.
#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    json_id: Option<u64>,
    pub name: String,

    tags: Vec<String>,

    slots: [Option<Component>; ComponentType::COUNT],
    by_id: FxHashMap<ComponentId, ComponentType>,
    by_json_id: FxHashMap<u64, ComponentType>,

    events: Vec<EntityEvent>,
}

macro_rules! typed_component {
    ($($ty:ident : $variant:ident => $get:ident, $get_mut:ident, $as:ident, $as_mut:ident;)*) => {
        $(
            #[inline]
            #[must_use]
            pub fn $get(&self) -> Option<&$variant> {
                self.component(ComponentType::$ty).and_then(Component::$as)
            }

            #[inline]
            pub fn $get_mut(&mut self) -> Option<&mut $variant> {
                self.component_mut(ComponentType::$ty).and_then(Component::$as_mut)
            }
        )*
    };
}

impl Entity {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EntityId::next(),
            json_id: None,
            name: name.into(),
            tags: Vec::new(),
            slots: Default::default(),
            by_id: FxHashMap::default(),
            by_json_id: FxHashMap::default(),
            events: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn json_id(&self) -> Option<u64> {
        self.json_id
    }

    // ========================================================================
    // Components
    // ========================================================================

    /// Adds a component and relinks siblings.
    ///
    /// Returns `None` (and logs) when a component of the same type is
    /// already present; the entity is left untouched in that case.
    pub fn add_component(&mut self, component: impl Into<Component>) -> Option<ComponentId> {
        let id = self.insert_component(component.into())?;
        self.relink_siblings();
        Some(id)
    }

    /// Adds several components, relinking siblings once at the end.
    /// Rejected duplicates are logged and skipped.
    pub fn add_components<I>(&mut self, components: I) -> SmallVec<[ComponentId; 4]>
    where
        I: IntoIterator,
        I::Item: Into<Component>,
    {
        let added: SmallVec<[ComponentId; 4]> = components
            .into_iter()
            .filter_map(|c| self.insert_component(c.into()))
            .collect();

        if !added.is_empty() {
            self.relink_siblings();
        }
        added
    }

    /// Adds a default component constructed from its type tag.
    pub fn add_component_by_tag(
        &mut self,
        tag: &str,
        factory: &ComponentFactory,
    ) -> Option<ComponentId> {
        match factory.construct(tag, None) {
            Ok(data) => self.add_component(Component::new(data)),
            Err(err) => {
                log::error!("Entity '{}': add_component_by_tag failed: {err}", self.name);
                None
            }
        }
    }

    fn insert_component(&mut self, mut component: Component) -> Option<ComponentId> {
        let ty = component.component_type();
        if self.slots[ty.index()].is_some() {
            log::error!(
                "Entity '{}' already has a {} component; add ignored",
                self.name,
                ty.tag()
            );
            return None;
        }

        let id = component.id();
        component.entity = Some(self.id);
        self.by_id.insert(id, ty);
        if let Some(json_id) = component.json_id() {
            self.by_json_id.insert(json_id, ty);
        }
        self.slots[ty.index()] = Some(component);
        self.events.push(EntityEvent::ComponentAdded { ty, id });
        Some(id)
    }

    /// Removes the component of type `ty` and returns it.
    ///
    /// With `clear_data` the returned component's payload is reset to its
    /// default. Returns `None` (and logs) when no such component exists.
    pub fn remove_component(&mut self, ty: ComponentType, clear_data: bool) -> Option<Component> {
        let Some(mut component) = self.slots[ty.index()].take() else {
            log::error!(
                "Entity '{}' has no {} component to remove",
                self.name,
                ty.tag()
            );
            return None;
        };

        self.by_id.remove(&component.id());
        if let Some(json_id) = component.json_id() {
            self.by_json_id.remove(&json_id);
        }

        component.entity = None;
        component.siblings.clear();
        if clear_data {
            component.data_mut().reset();
        }

        self.relink_siblings();
        self.events.push(EntityEvent::ComponentRemoved {
            ty,
            id: component.id(),
        });
        Some(component)
    }

    /// Points every component's sibling table at every present component.
    fn relink_siblings(&mut self) {
        let mut ids = [None; ComponentType::COUNT];
        for (slot, id) in self.slots.iter().zip(ids.iter_mut()) {
            *id = slot.as_ref().map(Component::id);
        }

        for component in self.slots.iter_mut().flatten() {
            for ty in ComponentType::ALL {
                component.siblings.set(ty, ids[ty.index()]);
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn component(&self, ty: ComponentType) -> Option<&Component> {
        self.slots[ty.index()].as_ref()
    }

    /// Slot access for the typed accessors; a replaced component must keep
    /// the slot's type.
    #[inline]
    pub(crate) fn component_mut(&mut self, ty: ComponentType) -> Option<&mut Component> {
        self.slots[ty.index()].as_mut()
    }

    #[inline]
    #[must_use]
    pub fn has_component(&self, ty: ComponentType) -> bool {
        self.slots[ty.index()].is_some()
    }

    #[must_use]
    pub fn find_component_by_id(&self, id: ComponentId) -> Option<&Component> {
        self.by_id.get(&id).and_then(|&ty| self.component(ty))
    }

    #[must_use]
    pub fn find_component_by_json_id(&self, json_id: u64) -> Option<&Component> {
        self.by_json_id
            .get(&json_id)
            .and_then(|&ty| self.component(ty))
    }

    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.slots.iter().flatten()
    }

    pub fn component_types(&self) -> impl Iterator<Item = ComponentType> + '_ {
        self.components().map(Component::component_type)
    }

    #[inline]
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.by_id.len()
    }

    typed_component! {
        Transform: Transform => transform, transform_mut, as_transform, as_transform_mut;
        Camera: Camera => camera, camera_mut, as_camera, as_camera_mut;
        Light: Light => light, light_mut, as_light, as_light_mut;
        MeshFilter: MeshFilter => mesh_filter, mesh_filter_mut, as_mesh_filter, as_mesh_filter_mut;
        Sprite: Sprite => sprite, sprite_mut, as_sprite, as_sprite_mut;
        ParticleSystem: ParticleSystem => particle_system, particle_system_mut, as_particle_system, as_particle_system_mut;
    }

    /// Removes every component.
    pub fn clear(&mut self) {
        for ty in ComponentType::ALL {
            if self.has_component(ty) {
                self.remove_component(ty, true);
            }
        }
    }

    // ========================================================================
    // Tags
    // ========================================================================

    /// Adds a tag. Returns `false` if it was already present.
    pub fn add_tag(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        if self.has_tag(&tag) {
            return false;
        }
        self.tags.push(tag);
        true
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t != tag);
        self.tags.len() != before
    }

    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    #[inline]
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Takes the queued component notifications.
    pub fn drain_events(&mut self) -> Vec<EntityEvent> {
        std::mem::take(&mut self.events)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Captures tags and components. Transform children are taken from the
    /// transform's unresolved child ids; use
    /// [`Scene::entity_state`](super::Scene::entity_state) to capture
    /// resolved hierarchy links.
    pub fn to_state(&self) -> Result<EntityState> {
        self.to_state_with(|transform| transform.pending_children().to_vec())
    }

    pub(crate) fn to_state_with(
        &self,
        mut transform_children: impl FnMut(&Transform) -> Vec<u64>,
    ) -> Result<EntityState> {
        Ok(EntityState {
            id: self.id.raw(),
            name: self.name.clone(),
            tags: self.tags.clone(),
            components: self
                .components()
                .map(|c| ComponentState::capture(c, &mut transform_children))
                .collect::<Result<_>>()?,
        })
    }

    /// Rebuilds an entity through the injected factory. Components keep the
    /// ids they were saved under as their persisted ids.
    pub fn from_state(state: &EntityState, factory: &ComponentFactory) -> Result<Self> {
        Self::build_from_state(state, factory, true)
    }

    /// Builds a fresh entity from a template record: no persisted ids are
    /// kept and saved transform children are dropped, the caller links the
    /// copy itself.
    pub(crate) fn from_template(state: &EntityState, factory: &ComponentFactory) -> Result<Self> {
        let mut entity = Self::build_from_state(state, factory, false)?;
        if let Some(t) = entity.transform_mut() {
            t.pending_children.clear();
        }
        Ok(entity)
    }

    fn build_from_state(state: &EntityState, factory: &ComponentFactory, persisted: bool) -> Result<Self> {
        let mut entity = Entity::new(state.name.clone());
        if persisted {
            entity.json_id = Some(state.id);
        }

        let mut components = Vec::with_capacity(state.components.len());
        for cs in &state.components {
            let data = factory.construct(&cs.tag, Some(&cs.data))?;
            let component = Component::new(data);
            components.push(if persisted { component.with_json_id(cs.id) } else { component });
        }
        entity.add_components(components);

        for tag in &state.tags {
            entity.add_tag(tag.clone());
        }
        entity.events.clear();
        Ok(entity)
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::new("Entity")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn duplicate_component_is_rejected() {
        let mut e = Entity::new("player");
        assert!(e.add_component(Transform::new()).is_some());
        let first = e.component(ComponentType::Transform).map(Component::id);

        assert!(e.add_component(Transform::from_position(Vec3::X)).is_none());
        assert_eq!(e.component_count(), 1);
        assert_eq!(e.component(ComponentType::Transform).map(Component::id), first);
        assert_eq!(e.transform().map(|t| t.position), Some(Vec3::ZERO));
    }

    #[test]
    fn siblings_link_both_ways() {
        let mut e = Entity::new("lamp");
        let t = e.add_component(Transform::new());
        let l = e.add_component(Light::default());

        let light = e.component(ComponentType::Light).unwrap();
        assert_eq!(light.sibling(ComponentType::Transform), t);
        let transform = e.component(ComponentType::Transform).unwrap();
        assert_eq!(transform.sibling(ComponentType::Light), l);
        assert_eq!(light.entity(), Some(e.id()));
    }

    #[test]
    fn remove_unlinks_and_notifies() {
        let mut e = Entity::new("lamp");
        let t = e.add_component(Transform::new()).unwrap();
        e.add_component(Light::default());
        e.drain_events();

        let removed = e.remove_component(ComponentType::Transform, false).unwrap();
        assert_eq!(removed.id(), t);
        assert!(removed.entity().is_none());
        assert!(removed.sibling(ComponentType::Light).is_none());
        assert!(e.find_component_by_id(t).is_none());
        assert!(
            e.component(ComponentType::Light)
                .unwrap()
                .sibling(ComponentType::Transform)
                .is_none()
        );
        assert_eq!(
            e.drain_events(),
            vec![EntityEvent::ComponentRemoved {
                ty: ComponentType::Transform,
                id: t
            }]
        );
    }

    #[test]
    fn remove_with_clear_resets_payload() {
        let mut e = Entity::new("e");
        e.add_component(Transform::from_position(Vec3::splat(3.0)));
        let removed = e.remove_component(ComponentType::Transform, true).unwrap();
        assert_eq!(removed.as_transform().unwrap().position, Vec3::ZERO);
        assert!(e.remove_component(ComponentType::Transform, false).is_none());
    }

    #[test]
    fn batch_add_links_once_and_skips_duplicates() {
        let mut e = Entity::new("batch");
        let added = e.add_components([
            Component::new(Transform::new()),
            Component::new(Camera::default()),
            Component::new(Transform::new()),
        ]);
        assert_eq!(added.len(), 2);
        let camera = e.component(ComponentType::Camera).unwrap();
        assert!(camera.sibling(ComponentType::Transform).is_some());
    }

    #[test]
    fn tags_are_a_set() {
        let mut e = Entity::new("e");
        assert!(e.add_tag("enemy"));
        assert!(!e.add_tag("enemy"));
        assert!(e.has_tag("enemy"));
        assert!(e.remove_tag("enemy"));
        assert!(e.tags().is_empty());
    }
}
