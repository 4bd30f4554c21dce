use glam::{Affine3A, EulerRot, Mat3, Mat4, Quat, Vec3};

use super::state::TransformState;

/// Spatial component of an entity.
///
/// Holds the local TRS properties, the cached local/world matrices and the
/// view-dependent matrices (model-view, normal matrix) the renderer uploads.
/// Parent/child links are not part of the component: the owning
/// [`Scene`](super::Scene) keeps them and exposes them through
/// [`Scene::attach`](super::Scene::attach), [`Scene::parent_of`](super::Scene::parent_of)
/// and friends.
#[derive(Debug, Clone)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,

    pub(crate) local_matrix: Affine3A,
    pub(crate) world_matrix: Affine3A,

    pub(crate) model_view: Mat4,
    pub(crate) normal_matrix: Mat3,
    view_stale: bool,
    last_view: Option<Mat4>,

    /// Persisted child ids waiting for their entities to join the scene.
    pub(crate) pending_children: Vec<u64>,
}

impl Transform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,

            local_matrix: Affine3A::IDENTITY,
            world_matrix: Affine3A::IDENTITY,

            model_view: Mat4::IDENTITY,
            normal_matrix: Mat3::IDENTITY,
            view_stale: true,
            last_view: None,

            pending_children: Vec::new(),
        }
    }

    #[must_use]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::new()
        }
    }

    #[must_use]
    pub fn from_trs(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            position,
            rotation,
            scale,
            ..Self::new()
        }
    }

    // ========================================================================
    // Local Operations
    // ========================================================================

    /// Moves by `delta`. When `relative_to` is given, `delta` is expressed in
    /// the space of that orientation and rotated into parent space first.
    pub fn translate(&mut self, delta: Vec3, relative_to: Option<Quat>) {
        let delta = match relative_to {
            Some(orientation) => orientation * delta,
            None => delta,
        };
        self.position += delta;
    }

    /// Rotates by the XYZ euler angles in `delta` (radians), optionally
    /// expressed relative to another orientation.
    pub fn rotate(&mut self, delta: Vec3, relative_to: Option<Quat>) {
        let delta = match relative_to {
            Some(orientation) => orientation * delta,
            None => delta,
        };
        let step = Quat::from_euler(EulerRot::XYZ, delta.x, delta.y, delta.z);
        self.rotation = (self.rotation * step).normalize();
    }

    /// Sets the planar rotation used by 2D content (rotation about +Z).
    pub fn set_rotation_2d(&mut self, angle: f32) {
        self.rotation = Quat::from_rotation_z(angle);
    }

    /// Planar rotation angle about +Z.
    #[must_use]
    pub fn rotation_2d(&self) -> f32 {
        let (_, _, z) = self.rotation.to_euler(EulerRot::XYZ);
        z
    }

    pub fn set_rotation_euler(&mut self, x: f32, y: f32, z: f32) {
        self.rotation = Quat::from_euler(EulerRot::XYZ, x, y, z);
    }

    /// Orients -Z towards `target`. `target` and `up` are in parent space.
    /// Leaves the rotation untouched when `up` is parallel to the view
    /// direction.
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let forward = (target - self.position).normalize_or_zero();
        if forward.cross(up).length_squared() < 1e-4 {
            return;
        }

        let right = forward.cross(up).normalize();
        let new_up = right.cross(forward).normalize();

        let rot_mat = Mat3::from_cols(right, new_up, -forward);
        self.rotation = Quat::from_mat3(&rot_mat);
    }

    // ========================================================================
    // Matrix Updates
    // ========================================================================

    /// Recomposes the local matrix and derives the world matrix from the
    /// parent's world matrix. Marks the view-dependent matrices stale.
    pub fn update_local_and_world(&mut self, parent_world: Option<&Affine3A>) {
        self.local_matrix =
            Affine3A::from_scale_rotation_translation(self.scale, self.rotation, self.position);

        self.world_matrix = match parent_world {
            Some(parent) => *parent * self.local_matrix,
            None => self.local_matrix,
        };

        self.view_stale = true;
    }

    /// Recomputes the model-view and normal matrices when the world matrix
    /// changed since the last refresh or `view` differs from the view used
    /// then. Returns `true` when a recomputation happened.
    pub fn refresh_view_dependent(&mut self, view: &Mat4) -> bool {
        if !self.view_stale && self.last_view.as_ref() == Some(view) {
            return false;
        }

        self.model_view = *view * Mat4::from(self.world_matrix);
        self.normal_matrix = Mat3::from_mat4(self.model_view).inverse().transpose();
        self.last_view = Some(*view);
        self.view_stale = false;
        true
    }

    // ========================================================================
    // Getters
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn local_matrix(&self) -> &Affine3A {
        &self.local_matrix
    }

    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        &self.world_matrix
    }

    #[inline]
    #[must_use]
    pub fn world_matrix_as_mat4(&self) -> Mat4 {
        Mat4::from(self.world_matrix)
    }

    #[inline]
    #[must_use]
    pub fn world_position(&self) -> Vec3 {
        self.world_matrix.translation.into()
    }

    #[inline]
    #[must_use]
    pub fn model_view(&self) -> &Mat4 {
        &self.model_view
    }

    #[inline]
    #[must_use]
    pub fn normal_matrix(&self) -> &Mat3 {
        &self.normal_matrix
    }

    #[inline]
    #[must_use]
    pub fn is_view_stale(&self) -> bool {
        self.view_stale
    }

    /// Maps a point from this transform's space into world space using the
    /// world matrix of the last update.
    #[inline]
    #[must_use]
    pub fn to_world(&self, point: Vec3) -> Vec3 {
        self.world_matrix.transform_point3(point)
    }

    /// Maps a world-space point into this transform's space.
    #[must_use]
    pub fn to_local(&self, point: Vec3) -> Vec3 {
        self.world_matrix.inverse().transform_point3(point)
    }

    /// Persisted child ids not yet resolved against a scene.
    #[inline]
    #[must_use]
    pub fn pending_children(&self) -> &[u64] {
        &self.pending_children
    }

    /// Resets TRS and matrices to the identity state. Hierarchy membership is
    /// untouched; [`Scene::clear_transform`](super::Scene::clear_transform)
    /// also unlinks the entity.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Captures TRS plus the given persisted child ids.
    #[must_use]
    pub fn to_state(&self, children: Vec<u64>) -> TransformState {
        TransformState {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
            children,
        }
    }

    /// Rebuilds a transform from state. Child ids stay pending until the
    /// owning entity joins a scene where they can be resolved.
    #[must_use]
    pub fn from_state(state: &TransformState) -> Self {
        Self {
            position: state.position,
            rotation: state.rotation,
            scale: state.scale,
            pending_children: state.children.clone(),
            ..Self::new()
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn translate_relative_to_orientation() {
        let mut t = Transform::new();
        let facing_left = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        t.translate(Vec3::new(0.0, 0.0, -1.0), Some(facing_left));

        assert!((t.position - Vec3::new(-1.0, 0.0, 0.0)).length() < EPSILON);
    }

    #[test]
    fn refresh_skips_when_clean_and_view_unchanged() {
        let mut t = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
        t.update_local_and_world(None);

        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
        assert!(t.refresh_view_dependent(&view));
        assert!(!t.refresh_view_dependent(&view));

        let moved = Mat4::from_translation(Vec3::new(0.0, 1.0, -5.0));
        assert!(t.refresh_view_dependent(&moved));
        assert!(t.model_view().abs_diff_eq(moved * t.world_matrix_as_mat4(), EPSILON));
    }

    #[test]
    fn rotation_2d_roundtrip() {
        let mut t = Transform::new();
        t.set_rotation_2d(0.75);
        assert!((t.rotation_2d() - 0.75).abs() < EPSILON);
    }

    #[test]
    fn to_local_inverts_to_world() {
        let mut t = Transform::from_trs(
            Vec3::new(1.0, -2.0, 3.0),
            Quat::from_rotation_z(0.4),
            Vec3::new(2.0, 1.0, 0.5),
        );
        t.update_local_and_world(None);

        let p = Vec3::new(0.5, 0.25, -1.0);
        let world = t.to_world(p);
        assert!((world - t.world_matrix().transform_point3(p)).length() < EPSILON);
        assert!((t.to_local(world) - p).length() < 1e-4);
    }

    #[test]
    fn look_at_degenerate_up_is_ignored() {
        let mut t = Transform::new();
        t.look_at(Vec3::new(0.0, 10.0, 0.0), Vec3::Y);
        assert_eq!(t.rotation, Quat::IDENTITY);
    }
}
