//! Component model.
//!
//! Components form a closed set of kinds, one slot per [`ComponentType`] on
//! each entity. Every component carries a process-unique runtime
//! [`ComponentId`], an optional persisted id (the id it was saved under) and
//! a [`SiblingLinks`] table pointing at the other components of its entity.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::camera::Camera;
use super::entity::EntityId;
use super::light::Light;
use super::renderable::{MeshFilter, ParticleSystem, Sprite};
use super::transform::Transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentType {
    Transform,
    Camera,
    Light,
    MeshFilter,
    Sprite,
    ParticleSystem,
}

impl ComponentType {
    pub const COUNT: usize = 6;

    pub const ALL: [ComponentType; Self::COUNT] = [
        ComponentType::Transform,
        ComponentType::Camera,
        ComponentType::Light,
        ComponentType::MeshFilter,
        ComponentType::Sprite,
        ComponentType::ParticleSystem,
    ];

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Type tag used by persisted state and tag-based construction.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            ComponentType::Transform => "Transform",
            ComponentType::Camera => "Camera",
            ComponentType::Light => "Light",
            ComponentType::MeshFilter => "MeshFilter",
            ComponentType::Sprite => "Sprite",
            ComponentType::ParticleSystem => "ParticleSystem",
        }
    }

    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.tag() == tag)
    }

    /// Component kinds the render loop issues draw calls for.
    #[inline]
    #[must_use]
    pub const fn is_renderable(self) -> bool {
        matches!(
            self,
            ComponentType::MeshFilter | ComponentType::Sprite | ComponentType::ParticleSystem
        )
    }

    /// Ordering rank of the type's group in the scene traversal. Transform
    /// groups rank first so world matrices are current before any consumer
    /// group runs; all other groups share one rank and keep first-seen order.
    #[inline]
    #[must_use]
    pub const fn traversal_rank(self) -> u8 {
        match self {
            ComponentType::Transform => 0,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(u64);

static NEXT_COMPONENT_ID: AtomicU64 = AtomicU64::new(1);

impl ComponentId {
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Per-component table of sibling component ids, indexed by type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SiblingLinks([Option<ComponentId>; ComponentType::COUNT]);

impl SiblingLinks {
    #[inline]
    #[must_use]
    pub fn get(&self, ty: ComponentType) -> Option<ComponentId> {
        self.0[ty.index()]
    }

    #[inline]
    pub(crate) fn set(&mut self, ty: ComponentType, id: Option<ComponentId>) {
        self.0[ty.index()] = id;
    }

    #[inline]
    pub(crate) fn clear(&mut self) {
        self.0 = [None; ComponentType::COUNT];
    }

    pub fn iter(&self) -> impl Iterator<Item = (ComponentType, ComponentId)> + '_ {
        ComponentType::ALL
            .into_iter()
            .filter_map(|ty| self.get(ty).map(|id| (ty, id)))
    }
}

#[derive(Debug)]
pub enum ComponentData {
    Transform(Transform),
    Camera(Camera),
    Light(Light),
    MeshFilter(MeshFilter),
    Sprite(Sprite),
    ParticleSystem(ParticleSystem),
}

impl ComponentData {
    #[must_use]
    pub fn component_type(&self) -> ComponentType {
        match self {
            ComponentData::Transform(_) => ComponentType::Transform,
            ComponentData::Camera(_) => ComponentType::Camera,
            ComponentData::Light(_) => ComponentType::Light,
            ComponentData::MeshFilter(_) => ComponentType::MeshFilter,
            ComponentData::Sprite(_) => ComponentType::Sprite,
            ComponentData::ParticleSystem(_) => ComponentType::ParticleSystem,
        }
    }

    /// Replaces the payload with the default value of the same kind.
    pub fn reset(&mut self) {
        *self = match self.component_type() {
            ComponentType::Transform => ComponentData::Transform(Transform::default()),
            ComponentType::Camera => ComponentData::Camera(Camera::default()),
            ComponentType::Light => ComponentData::Light(Light::default()),
            ComponentType::MeshFilter => ComponentData::MeshFilter(MeshFilter::default()),
            ComponentType::Sprite => ComponentData::Sprite(Sprite::default()),
            ComponentType::ParticleSystem => {
                ComponentData::ParticleSystem(ParticleSystem::default())
            }
        };
    }
}

macro_rules! impl_component_data_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for ComponentData {
                fn from(value: $variant) -> Self {
                    ComponentData::$variant(value)
                }
            }

            impl From<$variant> for Component {
                fn from(value: $variant) -> Self {
                    Component::new(ComponentData::$variant(value))
                }
            }
        )*
    };
}

impl_component_data_from!(Transform, Camera, Light, MeshFilter, Sprite, ParticleSystem);

#[derive(Debug)]
pub struct Component {
    id: ComponentId,
    json_id: Option<u64>,
    pub(crate) entity: Option<EntityId>,
    pub(crate) siblings: SiblingLinks,
    data: ComponentData,
}

macro_rules! component_accessors {
    ($($variant:ident => $get:ident, $get_mut:ident;)*) => {
        $(
            #[inline]
            #[must_use]
            pub fn $get(&self) -> Option<&$variant> {
                match &self.data {
                    ComponentData::$variant(value) => Some(value),
                    _ => None,
                }
            }

            #[inline]
            pub fn $get_mut(&mut self) -> Option<&mut $variant> {
                match &mut self.data {
                    ComponentData::$variant(value) => Some(value),
                    _ => None,
                }
            }
        )*
    };
}

impl Component {
    #[must_use]
    pub fn new(data: impl Into<ComponentData>) -> Self {
        Self {
            id: ComponentId::next(),
            json_id: None,
            entity: None,
            siblings: SiblingLinks::default(),
            data: data.into(),
        }
    }

    /// Marks the component as loaded from state saved under `json_id`.
    #[must_use]
    pub fn with_json_id(mut self, json_id: u64) -> Self {
        self.json_id = Some(json_id);
        self
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn json_id(&self) -> Option<u64> {
        self.json_id
    }

    #[inline]
    #[must_use]
    pub fn component_type(&self) -> ComponentType {
        self.data.component_type()
    }

    /// Owning entity, `None` while unattached.
    #[inline]
    #[must_use]
    pub fn entity(&self) -> Option<EntityId> {
        self.entity
    }

    #[inline]
    #[must_use]
    pub fn siblings(&self) -> &SiblingLinks {
        &self.siblings
    }

    #[inline]
    #[must_use]
    pub fn sibling(&self, ty: ComponentType) -> Option<ComponentId> {
        self.siblings.get(ty)
    }

    #[inline]
    #[must_use]
    pub fn data(&self) -> &ComponentData {
        &self.data
    }

    /// The payload kind must stay the same: the owning entity slot and the
    /// scene's type groups are keyed by it. Public callers go through the
    /// typed `as_*_mut` accessors.
    #[inline]
    pub(crate) fn data_mut(&mut self) -> &mut ComponentData {
        &mut self.data
    }

    component_accessors! {
        Transform => as_transform, as_transform_mut;
        Camera => as_camera, as_camera_mut;
        Light => as_light, as_light_mut;
        MeshFilter => as_mesh_filter, as_mesh_filter_mut;
        Sprite => as_sprite, as_sprite_mut;
        ParticleSystem => as_particle_system, as_particle_system_mut;
    }
}

impl From<ComponentData> for Component {
    fn from(data: ComponentData) -> Self {
        Component::new(data)
    }
}
