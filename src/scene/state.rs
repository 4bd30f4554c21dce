//! Persisted state of transforms, entities and scenes.
//!
//! The serialized format itself belongs to the host; this module defines the
//! state records (serde types) and the [`ComponentFactory`] that turns a
//! persisted type tag back into a component. The factory is passed into
//! `from_state` explicitly instead of living in a global registry.

use glam::{Quat, Vec3};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::camera::Camera;
use super::component::{Component, ComponentData, ComponentType};
use super::light::Light;
use super::renderable::{MeshFilter, ParticleSystem, Sprite};
use super::transform::Transform;
use crate::errors::{KilnError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformState {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    /// Persisted ids of the child transform components.
    #[serde(default)]
    pub children: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentState {
    pub id: u64,
    #[serde(rename = "type")]
    pub tag: String,
    pub data: serde_json::Value,
}

impl ComponentState {
    pub(crate) fn capture(
        component: &Component,
        transform_children: &mut impl FnMut(&Transform) -> Vec<u64>,
    ) -> Result<Self> {
        let data = match component.data() {
            ComponentData::Transform(t) => serde_json::to_value(t.to_state(transform_children(t)))?,
            ComponentData::Camera(c) => serde_json::to_value(c)?,
            ComponentData::Light(l) => serde_json::to_value(l)?,
            ComponentData::MeshFilter(m) => serde_json::to_value(m)?,
            ComponentData::Sprite(s) => serde_json::to_value(s)?,
            ComponentData::ParticleSystem(p) => serde_json::to_value(p)?,
        };

        Ok(Self {
            id: component.id().raw(),
            tag: component.component_type().tag().to_owned(),
            data,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub components: Vec<ComponentState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneState {
    pub name: String,
    pub ambient: Vec3,
    pub entities: Vec<EntityState>,
}

/// Builds a component payload from persisted data, or a default payload
/// when no data is given.
pub type ComponentConstructor = fn(Option<&serde_json::Value>) -> Result<ComponentData>;

/// Type-tag to constructor map used while rebuilding state.
#[derive(Debug, Clone, Default)]
pub struct ComponentFactory {
    constructors: FxHashMap<String, ComponentConstructor>,
}

fn decode<T>(data: Option<&serde_json::Value>) -> Result<ComponentData>
where
    T: Default + for<'de> Deserialize<'de> + Into<ComponentData>,
{
    match data {
        Some(value) => Ok(T::deserialize(value)?.into()),
        None => Ok(T::default().into()),
    }
}

fn construct_transform(data: Option<&serde_json::Value>) -> Result<ComponentData> {
    match data {
        Some(value) => {
            let state = TransformState::deserialize(value)?;
            Ok(Transform::from_state(&state).into())
        }
        None => Ok(Transform::new().into()),
    }
}

impl ComponentFactory {
    /// Factory without any registered kinds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory with constructors for every built-in component kind.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut factory = Self::new();
        factory.register(ComponentType::Transform.tag(), construct_transform);
        factory.register(ComponentType::Camera.tag(), decode::<Camera>);
        factory.register(ComponentType::Light.tag(), decode::<Light>);
        factory.register(ComponentType::MeshFilter.tag(), decode::<MeshFilter>);
        factory.register(ComponentType::Sprite.tag(), decode::<Sprite>);
        factory.register(ComponentType::ParticleSystem.tag(), decode::<ParticleSystem>);
        factory
    }

    /// Registers (or replaces) the constructor for `tag`.
    pub fn register(&mut self, tag: impl Into<String>, constructor: ComponentConstructor) {
        self.constructors.insert(tag.into(), constructor);
    }

    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    pub fn construct(&self, tag: &str, data: Option<&serde_json::Value>) -> Result<ComponentData> {
        let constructor = self
            .constructors
            .get(tag)
            .ok_or_else(|| KilnError::UnknownComponentTag(tag.to_owned()))?;
        constructor(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tag_is_an_error() {
        let factory = ComponentFactory::with_builtin();
        let err = factory.construct("AudioSource", None).unwrap_err();
        assert!(matches!(err, KilnError::UnknownComponentTag(tag) if tag == "AudioSource"));
    }

    #[test]
    fn empty_factory_knows_nothing() {
        let factory = ComponentFactory::new();
        assert!(!factory.contains("Transform"));
        assert!(factory.construct("Transform", None).is_err());
    }

    #[test]
    fn capture_serializes_payload() {
        let light = Component::new(Light::new_point(Vec3::ONE, 3.0, 12.0));
        let state = ComponentState::capture(&light, &mut |_| Vec::new()).unwrap();
        assert_eq!(state.tag, "Light");
        assert_eq!(state.id, light.id().raw());

        let back = ComponentFactory::with_builtin()
            .construct(&state.tag, Some(&state.data))
            .unwrap();
        assert!(matches!(back, ComponentData::Light(ref l) if (l.energy - 3.0).abs() < 1e-6));
    }

    #[test]
    fn transform_state_keeps_children_pending() {
        let state = TransformState {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_x(0.5),
            scale: Vec3::splat(2.0),
            children: vec![41, 42],
        };
        let value = serde_json::to_value(&state).unwrap();
        let data = ComponentFactory::with_builtin()
            .construct("Transform", Some(&value))
            .unwrap();
        let ComponentData::Transform(t) = data else {
            panic!("expected transform");
        };
        assert_eq!(t.position, state.position);
        assert_eq!(t.pending_children(), &[41, 42]);
    }
}
