//! Transform hierarchy.
//!
//! Parent/child links between transforms are owned by the [`Scene`] in a
//! side table keyed by entity, not by the [`Transform`] components
//! themselves, so mutable access to a transform can never corrupt the tree.
//! A parent owns the ordered `children` list, a child holds a non-owning
//! `parent` key. Every node caches its `depth` and its subtree `root`; both
//! are propagated across the whole subtree on every attach and detach so
//! that `depth(child) == depth(parent) + 1` always holds.

use glam::{Affine3A, Quat, Vec3};

use super::EntityKey;
use super::component::ComponentType;
use super::scene::Scene;
use super::transform::Transform;

/// Below this squared distance [`Scene::follow`] leaves the follower alone.
const FOLLOW_EPSILON: f32 = 1e-6;

/// Hierarchy entry of one transform-carrying entity.
#[derive(Debug, Clone, Default)]
pub(crate) struct HierarchyLinks {
    pub(crate) parent: Option<EntityKey>,
    pub(crate) children: Vec<EntityKey>,
    pub(crate) root: Option<EntityKey>,
    pub(crate) depth: u32,
}

impl Scene {
    fn transform_ref(&self, key: EntityKey) -> Option<&Transform> {
        self.entities.get(key).and_then(|e| e.transform())
    }

    fn transform_entry_mut(&mut self, key: EntityKey) -> Option<&mut Transform> {
        self.entities.get_mut(key).and_then(|e| e.transform_mut())
    }

    // ========================================================================
    // Attach / Detach
    // ========================================================================

    /// Makes `child` a child of `parent`.
    ///
    /// Fails (logs, leaves the tree unchanged, returns `false`) when either
    /// entity has no transform, when `child` is already a child of `parent`,
    /// or when the link would create a cycle.
    pub fn attach(&mut self, parent: EntityKey, child: EntityKey) -> bool {
        if !self.links.contains_key(parent) || !self.links.contains_key(child) {
            log::error!("Scene::attach: both entities need a transform component");
            return false;
        }
        if parent == child {
            log::warn!("Scene::attach: cannot attach a transform to itself");
            return false;
        }
        if self.links[parent].children.contains(&child) {
            log::warn!("Scene::attach: child is already attached to this parent");
            return false;
        }
        if self.is_ancestor(child, parent) {
            log::warn!("Scene::attach: attaching an ancestor below its descendant would create a cycle");
            return false;
        }

        if let Some(old_parent) = self.links[child].parent
            && let Some(p) = self.links.get_mut(old_parent)
        {
            p.children.retain(|&c| c != child);
        }

        self.links[parent].children.push(child);
        self.links[child].parent = Some(parent);

        let (root, parent_depth) = self.walk_to_root(parent);
        self.propagate_links(child, root, parent_depth + 1);
        self.sort_group(ComponentType::Transform);
        true
    }

    /// Attaches every entry of `children` to `parent` in order. Returns how
    /// many links were made; rejected entries are logged by [`Scene::attach`].
    pub fn attach_children(&mut self, parent: EntityKey, children: &[EntityKey]) -> usize {
        children
            .iter()
            .filter(|&&child| self.attach(parent, child))
            .count()
    }

    /// Unlinks `child` from `parent`. The detached subtree becomes its own
    /// hierarchy: its root is `child` and depths restart at 0.
    pub fn detach(&mut self, parent: EntityKey, child: EntityKey) -> bool {
        let is_child = self
            .links
            .get(parent)
            .is_some_and(|p| p.children.contains(&child));
        if !is_child {
            log::warn!("Scene::detach: entity is not a child of the given parent");
            return false;
        }

        self.links[parent].children.retain(|&c| c != child);
        if let Some(c) = self.links.get_mut(child) {
            c.parent = None;
        }

        self.propagate_links(child, child, 0);
        self.sort_group(ComponentType::Transform);
        true
    }

    /// Detaches all children of `parent` and returns them in their former
    /// order. Each becomes the root of its own subtree.
    pub fn detach_children(&mut self, parent: EntityKey) -> Vec<EntityKey> {
        let children = self
            .links
            .get(parent)
            .map(|l| l.children.clone())
            .unwrap_or_default();
        for &child in &children {
            self.detach(parent, child);
        }
        children
    }

    /// Detaches `key` from its parent and all of its children.
    pub(crate) fn unlink_transform(&mut self, key: EntityKey) {
        let Some(links) = self.links.get(key) else {
            return;
        };
        let parent = links.parent;

        if let Some(parent) = parent {
            self.detach(parent, key);
        }
        self.detach_children(key);
    }

    /// Unlinks `key` from the hierarchy and resets its transform to the
    /// identity state. Former children become roots of their own subtrees.
    pub fn clear_transform(&mut self, key: EntityKey) -> bool {
        if !self.links.contains_key(key) {
            return false;
        }
        self.unlink_transform(key);
        self.pending_links.retain(|&k| k != key);
        match self.transform_entry_mut(key) {
            Some(t) => {
                t.clear();
                true
            }
            None => false,
        }
    }

    /// Walks parent links to the top. Returns the root and the depth of
    /// `key` measured along the walk.
    fn walk_to_root(&self, key: EntityKey) -> (EntityKey, u32) {
        let mut current = key;
        let mut depth = 0;
        while let Some(parent) = self.links.get(current).and_then(|l| l.parent) {
            current = parent;
            depth += 1;
        }
        (current, depth)
    }

    /// Returns `true` when `ancestor` lies on the parent chain of `node`
    /// (a node counts as its own ancestor).
    #[must_use]
    pub fn is_ancestor(&self, ancestor: EntityKey, node: EntityKey) -> bool {
        let mut current = Some(node);
        while let Some(k) = current {
            if k == ancestor {
                return true;
            }
            current = self.links.get(k).and_then(|l| l.parent);
        }
        false
    }

    fn propagate_links(&mut self, start: EntityKey, root: EntityKey, depth: u32) {
        let mut stack = vec![(start, depth)];
        while let Some((key, depth)) = stack.pop() {
            let Some(links) = self.links.get_mut(key) else {
                continue;
            };
            links.root = Some(root);
            links.depth = depth;
            stack.extend(links.children.iter().map(|&c| (c, depth + 1)));
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[must_use]
    pub fn parent_of(&self, key: EntityKey) -> Option<EntityKey> {
        self.links.get(key)?.parent
    }

    #[must_use]
    pub fn children_of(&self, key: EntityKey) -> &[EntityKey] {
        self.links.get(key).map_or(&[], |l| l.children.as_slice())
    }

    #[must_use]
    pub fn depth_of(&self, key: EntityKey) -> Option<u32> {
        self.links.get(key).map(|l| l.depth)
    }

    /// Root of the subtree containing `key`; a root is its own root.
    #[must_use]
    pub fn root_of(&self, key: EntityKey) -> Option<EntityKey> {
        self.links.get(key).map(|l| l.root.unwrap_or(key))
    }

    /// `key` followed by all of its descendants, parents before children.
    /// Empty when the scene does not own `key`.
    #[must_use]
    pub fn subtree_of(&self, key: EntityKey) -> Vec<EntityKey> {
        if !self.entities.contains_key(key) {
            return Vec::new();
        }
        let mut out = vec![key];
        let mut i = 0;
        while i < out.len() {
            out.extend_from_slice(self.children_of(out[i]));
            i += 1;
        }
        out
    }

    // ========================================================================
    // Relative Motion
    // ========================================================================

    /// Translates `key` by `delta` expressed in `relative_to`'s orientation.
    pub fn translate_relative_to(&mut self, key: EntityKey, delta: Vec3, relative_to: EntityKey) -> bool {
        let Some(orientation) = self.transform_ref(relative_to).map(|t| t.rotation) else {
            log::error!("Scene::translate_relative_to: reference entity has no transform");
            return false;
        };
        self.translate_with(key, delta, Some(orientation))
    }

    /// Rotates `key` by euler `delta` expressed in `relative_to`'s orientation.
    pub fn rotate_relative_to(&mut self, key: EntityKey, delta: Vec3, relative_to: EntityKey) -> bool {
        let Some(orientation) = self.transform_ref(relative_to).map(|t| t.rotation) else {
            log::error!("Scene::rotate_relative_to: reference entity has no transform");
            return false;
        };
        match self.transform_entry_mut(key) {
            Some(t) => {
                t.rotate(delta, Some(orientation));
                true
            }
            None => false,
        }
    }

    /// Moves `key` a `speed` fraction of the way towards `target`'s world
    /// position, measured from its own world position. Uses the world
    /// matrices of the last update and does nothing once the two nearly
    /// coincide.
    pub fn follow(&mut self, key: EntityKey, target: EntityKey, speed: f32) -> bool {
        let Some(goal) = self.transform_ref(target).map(Transform::world_position) else {
            log::error!("Scene::follow: target entity has no transform");
            return false;
        };
        let Some(t) = self.transform_entry_mut(key) else {
            return false;
        };
        let delta = goal - t.world_position();
        if delta.length_squared() > FOLLOW_EPSILON {
            t.position += delta * speed;
        }
        true
    }

    fn translate_with(&mut self, key: EntityKey, delta: Vec3, orientation: Option<Quat>) -> bool {
        match self.transform_entry_mut(key) {
            Some(t) => {
                t.translate(delta, orientation);
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // World Matrix Pass
    // ========================================================================

    /// Updates local and world matrices of every transform. The transform
    /// group is sorted by ascending depth, so each parent is updated before
    /// its children.
    pub fn update_transforms(&mut self) {
        for i in 0..self.groups[ComponentType::Transform.index()].members.len() {
            let key = self.groups[ComponentType::Transform.index()].members[i];
            let parent_world: Option<Affine3A> = self
                .parent_of(key)
                .and_then(|p| self.transform_ref(p))
                .map(|p| p.world_matrix);
            if let Some(t) = self.transform_entry_mut(key) {
                t.update_local_and_world(parent_world.as_ref());
            }
        }
    }

    /// Updates the world matrices of `key` and its descendants only.
    pub fn update_subtree(&mut self, key: EntityKey) {
        let parent_world: Option<Affine3A> = self
            .parent_of(key)
            .and_then(|p| self.transform_ref(p))
            .map(|p| p.world_matrix);

        let mut stack = vec![(key, parent_world)];
        while let Some((node, parent_world)) = stack.pop() {
            let Some(t) = self.transform_entry_mut(node) else {
                continue;
            };
            t.update_local_and_world(parent_world.as_ref());
            let world = t.world_matrix;
            stack.extend(self.children_of(node).iter().map(|&c| (c, Some(world))));
        }
    }

    // ========================================================================
    // Deferred Persistence Links
    // ========================================================================

    /// Attaches persisted children whose entities are now present. Entries
    /// that still cannot be resolved stay pending.
    pub(crate) fn resolve_pending_links(&mut self) {
        let waiting = std::mem::take(&mut self.pending_links);
        for parent in waiting {
            let pending: Vec<u64> = self
                .transform_ref(parent)
                .map(|t| t.pending_children.clone())
                .unwrap_or_default();

            let mut unresolved = Vec::new();
            for json_id in pending {
                let child = self
                    .find_component_by_json_id(json_id)
                    .filter(|(_, c)| c.component_type() == ComponentType::Transform)
                    .map(|(k, _)| k);
                match child {
                    Some(child) if self.attach(parent, child) => {}
                    Some(_) => log::warn!("Scene: persisted child {json_id} could not be attached"),
                    None => unresolved.push(json_id),
                }
            }

            let still_pending = !unresolved.is_empty();
            if let Some(t) = self.transform_entry_mut(parent) {
                t.pending_children = unresolved;
            }
            if still_pending {
                self.pending_links.push(parent);
            }
        }
    }
}
