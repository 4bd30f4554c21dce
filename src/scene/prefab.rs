//! Prefabs and scene copies.
//!
//! A [`Prefab`] is a flattened entity subtree captured as state records:
//! `nodes[0]` is the root and every node lists its children by index into
//! `nodes`. It holds no [`EntityKey`]s, so it can be kept as an asset,
//! serialized, and instantiated into any scene any number of times.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use super::EntityKey;
use super::component::ComponentType;
use super::entity::Entity;
use super::scene::Scene;
use super::state::{ComponentFactory, EntityState, SceneState, TransformState};
use crate::errors::{KilnError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefabNode {
    pub entity: EntityState,
    /// Indices into [`Prefab::nodes`].
    #[serde(default)]
    pub children_indices: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prefab {
    pub name: String,
    pub nodes: Vec<PrefabNode>,
}

impl Prefab {
    /// Captures `root` and its transform descendants.
    pub fn from_scene(scene: &Scene, root: EntityKey) -> Result<Self> {
        let Some(root_entity) = scene.entity(root) else {
            return Err(KilnError::MissingEntity(format!("{root:?}")));
        };

        let keys = scene.subtree_of(root);
        let index: FxHashMap<EntityKey, usize> = keys.iter().enumerate().map(|(i, &k)| (k, i)).collect();

        let mut nodes = Vec::with_capacity(keys.len());
        for &key in &keys {
            let Some(entity) = scene.entity(key) else {
                continue;
            };
            nodes.push(PrefabNode {
                entity: entity.to_state_with(|_| Vec::new())?,
                children_indices: scene
                    .children_of(key)
                    .iter()
                    .filter_map(|c| index.get(c).copied())
                    .collect(),
            });
        }

        Ok(Self {
            name: root_entity.name.clone(),
            nodes,
        })
    }

    /// Extracts the subtree rooted at the saved entity `root_id` from a
    /// saved scene. Child references that point outside the saved entities
    /// are dropped with a warning.
    pub fn from_state(state: &SceneState, root_id: u64) -> Result<Self> {
        let Some(root) = state.entities.iter().position(|e| e.id == root_id) else {
            return Err(KilnError::MissingEntity(format!("saved entity {root_id}")));
        };

        // Saved transform component id -> entity record.
        let owners: FxHashMap<u64, usize> = state
            .entities
            .iter()
            .enumerate()
            .flat_map(|(i, e)| {
                e.components
                    .iter()
                    .filter(|c| c.tag == ComponentType::Transform.tag())
                    .map(move |c| (c.id, i))
            })
            .collect();

        let mut order = vec![root];
        let mut child_records = Vec::new();
        let mut visited = FxHashSet::default();
        visited.insert(root);

        let mut queue = VecDeque::from([root]);
        while let Some(record) = queue.pop_front() {
            let mut children = Vec::new();
            for child_id in saved_children(&state.entities[record])? {
                match owners.get(&child_id) {
                    Some(&child) if visited.insert(child) => {
                        order.push(child);
                        queue.push_back(child);
                        children.push(child);
                    }
                    Some(_) => log::warn!("Prefab: saved child {child_id} is already part of the prefab"),
                    None => log::warn!("Prefab: saved child {child_id} is not part of the scene state"),
                }
            }
            child_records.push((record, children));
        }

        let index: FxHashMap<usize, usize> = order.iter().enumerate().map(|(i, &r)| (r, i)).collect();
        let mut children_of: FxHashMap<usize, Vec<usize>> = child_records.into_iter().collect();

        let nodes = order
            .iter()
            .map(|record| PrefabNode {
                entity: state.entities[*record].clone(),
                children_indices: children_of
                    .remove(record)
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|c| index.get(&c).copied())
                    .collect(),
            })
            .collect();

        Ok(Self {
            name: state.entities[root].name.clone(),
            nodes,
        })
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn saved_children(entity: &EntityState) -> Result<Vec<u64>> {
    match entity
        .components
        .iter()
        .find(|c| c.tag == ComponentType::Transform.tag())
    {
        Some(c) => Ok(TransformState::deserialize(&c.data)?.children),
        None => Ok(Vec::new()),
    }
}

impl Scene {
    /// Adds a fresh copy of `prefab` and returns the key of its root.
    ///
    /// Every entity and component gets new runtime ids and no persisted
    /// ids. All entities are built before any is added, so a factory error
    /// leaves the scene untouched.
    pub fn instantiate(&mut self, prefab: &Prefab, factory: &ComponentFactory) -> Result<EntityKey> {
        if prefab.is_empty() {
            return Err(KilnError::MissingEntity(format!("root of empty prefab '{}'", prefab.name)));
        }

        let entities = prefab
            .nodes
            .iter()
            .map(|node| Entity::from_template(&node.entity, factory))
            .collect::<Result<Vec<_>>>()?;
        let keys: Vec<EntityKey> = entities.into_iter().map(|e| self.add_entity(e)).collect();

        for (node, &parent) in prefab.nodes.iter().zip(&keys) {
            for &child in &node.children_indices {
                if let Some(&child) = keys.get(child) {
                    self.attach(parent, child);
                }
            }
        }

        log::debug!("Scene '{}': instantiated prefab '{}' ({} entities)", self.name, prefab.name, keys.len());
        Ok(keys[0])
    }

    /// Copies `key` and its transform descendants. The copy is attached to
    /// the same parent as the original.
    pub fn clone_entity(&mut self, key: EntityKey, factory: &ComponentFactory) -> Result<EntityKey> {
        let prefab = Prefab::from_scene(self, key)?;
        let copy = self.instantiate(&prefab, factory)?;
        if let Some(parent) = self.parent_of(key) {
            self.attach(parent, copy);
        }
        Ok(copy)
    }

    /// Builds an independent scene with the same entities, components and
    /// hierarchy. The copy's persisted ids are this scene's runtime ids, so
    /// [`Scene::find_by_json_id`] maps an original entity id to its copy.
    pub fn duplicate(&self, factory: &ComponentFactory) -> Result<Scene> {
        let state = self.to_state()?;
        let mut copy = Scene::from_state(&state, factory)?;
        copy.name = format!("{}.copy", self.name);
        Ok(copy)
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::scene::Transform;

    fn node(scene: &mut Scene, name: &str, x: f32) -> EntityKey {
        let mut e = Entity::new(name);
        e.add_component(Transform::from_position(Vec3::new(x, 0.0, 0.0)));
        scene.add_entity(e)
    }

    #[test]
    fn capture_orders_root_first() {
        let mut scene = Scene::new("p");
        let a = node(&mut scene, "a", 0.0);
        let b = node(&mut scene, "b", 1.0);
        let c = node(&mut scene, "c", 2.0);
        scene.attach(a, b);
        scene.attach(b, c);

        let prefab = Prefab::from_scene(&scene, b).unwrap();
        assert_eq!(prefab.name, "b");
        assert_eq!(prefab.len(), 2);
        assert_eq!(prefab.nodes[0].children_indices, vec![1]);
        assert!(prefab.nodes[1].children_indices.is_empty());
    }

    #[test]
    fn empty_prefab_is_rejected() {
        let mut scene = Scene::new("p");
        let prefab = Prefab {
            name: "nothing".into(),
            nodes: Vec::new(),
        };
        let err = scene.instantiate(&prefab, &ComponentFactory::with_builtin()).unwrap_err();
        assert!(matches!(err, KilnError::MissingEntity(_)));
        assert_eq!(scene.entity_count(), 0);
    }
}
