//! Observer notifications.
//!
//! Entities and scenes queue structural change events; the host drains them
//! with `drain_events` whenever it wants to react (audio, scripting, editor
//! views).

use super::EntityKey;
use super::component::{ComponentId, ComponentType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityEvent {
    ComponentAdded { ty: ComponentType, id: ComponentId },
    ComponentRemoved { ty: ComponentType, id: ComponentId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneEvent {
    EntityAdded(EntityKey),
    EntityRemoved(EntityKey),
    ComponentAdded {
        entity: EntityKey,
        ty: ComponentType,
        id: ComponentId,
    },
    ComponentRemoved {
        entity: EntityKey,
        ty: ComponentType,
        id: ComponentId,
    },
}

impl SceneEvent {
    pub(crate) fn from_entity(entity: EntityKey, event: EntityEvent) -> Self {
        match event {
            EntityEvent::ComponentAdded { ty, id } => SceneEvent::ComponentAdded { entity, ty, id },
            EntityEvent::ComponentRemoved { ty, id } => {
                SceneEvent::ComponentRemoved { entity, ty, id }
            }
        }
    }
}
