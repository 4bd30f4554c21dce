use glam::{Affine3A, Mat4, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProjectionType {
    #[default]
    Perspective,
    Orthographic,
}

/// Camera component.
///
/// The view matrix is the inverse of the owning entity's world matrix and is
/// refreshed by [`Scene::update`](super::Scene::update). The projection is
/// recomputed lazily after any parameter change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    pub projection_type: ProjectionType,
    /// Vertical field of view in radians.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    /// Half-height of the orthographic view volume.
    pub ortho_size: f32,
    /// Clear colour applied when this camera renders.
    pub background: Vec3,

    #[serde(skip)]
    projection: Mat4,
    #[serde(skip)]
    view: Mat4,
    #[serde(skip)]
    world_position: Vec3,
    #[serde(skip, default = "projection_dirty")]
    needs_update: bool,
}

fn projection_dirty() -> bool {
    true
}

impl Camera {
    #[must_use]
    pub fn new_perspective(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut cam = Self {
            projection_type: ProjectionType::Perspective,
            fov,
            aspect,
            near,
            far,
            ortho_size: 1.0,
            background: Vec3::ZERO,
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            world_position: Vec3::ZERO,
            needs_update: true,
        };
        cam.update_projection();
        cam
    }

    #[must_use]
    pub fn new_orthographic(ortho_size: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut cam = Self::new_perspective(std::f32::consts::FRAC_PI_4, aspect, near, far);
        cam.projection_type = ProjectionType::Orthographic;
        cam.ortho_size = ortho_size;
        cam.update_projection();
        cam
    }

    /// Adapts the aspect ratio to a viewport and recomputes the projection.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
        self.update_projection();
    }

    pub fn set_fov(&mut self, fov: f32) {
        self.fov = fov;
        self.needs_update = true;
    }

    pub fn set_ortho_size(&mut self, size: f32) {
        self.ortho_size = size;
        self.needs_update = true;
    }

    pub fn update_projection(&mut self) {
        self.projection = match self.projection_type {
            ProjectionType::Perspective => {
                Mat4::perspective_rh_gl(self.fov, self.aspect, self.near, self.far)
            }
            ProjectionType::Orthographic => {
                let h = self.ortho_size;
                let w = h * self.aspect;
                Mat4::orthographic_rh_gl(-w, w, -h, h, self.near, self.far)
            }
        };
        self.needs_update = false;
    }

    /// Derives the view matrix from the camera entity's world matrix.
    pub fn update_view(&mut self, world: &Affine3A) {
        if self.needs_update {
            self.update_projection();
        }
        self.view = Mat4::from(world.inverse());
        self.world_position = world.translation.into();
    }

    #[inline]
    #[must_use]
    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }

    #[inline]
    #[must_use]
    pub fn view(&self) -> &Mat4 {
        &self.view
    }

    #[inline]
    #[must_use]
    pub fn world_position(&self) -> Vec3 {
        self.world_position
    }

    #[inline]
    #[must_use]
    pub fn is_orthographic(&self) -> bool {
        self.projection_type == ProjectionType::Orthographic
    }

    #[inline]
    #[must_use]
    pub fn needs_update(&self) -> bool {
        self.needs_update
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new_perspective(std::f32::consts::FRAC_PI_4, 1.0, 0.1, 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_viewport_updates_aspect() {
        let mut cam = Camera::default();
        cam.set_viewport(800, 400);
        assert!((cam.aspect - 2.0).abs() < 1e-6);
        assert!(!cam.needs_update());
    }

    #[test]
    fn view_is_inverse_world() {
        let mut cam = Camera::default();
        let world = Affine3A::from_translation(Vec3::new(0.0, 0.0, 10.0));
        cam.update_view(&world);
        let p = cam.view().transform_point3(Vec3::new(0.0, 0.0, 10.0));
        assert!(p.length() < 1e-5);
        assert_eq!(cam.world_position(), Vec3::new(0.0, 0.0, 10.0));
    }
}
