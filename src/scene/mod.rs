//! Scene Module
//!
//! Entities, their components and the scene index that orders them.
//!
//! - [`Entity`]: owns at most one component per [`ComponentType`] plus tags
//! - [`Transform`]: TRS and cached matrices
//! - [`Scene`]: entity arena, type-indexed component groups, transform
//!   hierarchy links and operations, persistence entry points
//! - [`Prefab`]: a flattened entity subtree that can be instantiated and copied
//!
//! Entities are addressed by [`EntityKey`] once they belong to a scene.
//! Hierarchy links between transforms are stored as entity keys, so a
//! hierarchy only exists inside one scene.

pub mod camera;
pub mod component;
pub mod entity;
pub mod events;
pub mod hierarchy;
pub mod light;
pub mod prefab;
pub mod renderable;
#[allow(clippy::module_inception)]
pub mod scene;
pub mod state;
pub mod transform;

use slotmap::new_key_type;

new_key_type! {
    /// Handle of an entity inside a [`Scene`].
    pub struct EntityKey;
}

pub use camera::{Camera, ProjectionType};
pub use component::{Component, ComponentData, ComponentId, ComponentType, SiblingLinks};
pub use entity::{Entity, EntityId};
pub use events::{EntityEvent, SceneEvent};
pub use light::{Light, LightKind};
pub use prefab::{Prefab, PrefabNode};
pub use renderable::{Emitter, EmitterId, MeshFilter, Particle, ParticleSystem, Sprite};
pub use scene::Scene;
pub use state::{ComponentConstructor, ComponentFactory, ComponentState, EntityState, SceneState, TransformState};
pub use transform::Transform;
