use glam::Vec3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LightKind {
    #[default]
    Point,
    Directional,
    Spot,
    Hemi,
}

/// Light component. Position comes from the owning entity's transform;
/// directional, spot and hemi lights point from that position towards
/// `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub kind: LightKind,
    pub color: Vec3,
    pub energy: f32,
    /// Attenuation range for point and spot lights, 0 for infinite.
    pub distance: f32,
    /// Spot cone angle in radians.
    pub angle: f32,
    pub exponent: f32,
    pub target: Vec3,

    pub visible: bool,
    pub cast_shadow: bool,
    /// Contributes to shadow maps only, never to lighting.
    pub only_shadow: bool,
}

impl Light {
    fn with_kind(kind: LightKind, color: Vec3, energy: f32) -> Self {
        Self {
            kind,
            color,
            energy,
            distance: 0.0,
            angle: std::f32::consts::FRAC_PI_3,
            exponent: 10.0,
            target: Vec3::ZERO,
            visible: true,
            cast_shadow: false,
            only_shadow: false,
        }
    }

    #[must_use]
    pub fn new_point(color: Vec3, energy: f32, distance: f32) -> Self {
        Self {
            distance,
            ..Self::with_kind(LightKind::Point, color, energy)
        }
    }

    #[must_use]
    pub fn new_directional(color: Vec3, energy: f32) -> Self {
        Self::with_kind(LightKind::Directional, color, energy)
    }

    #[must_use]
    pub fn new_spot(color: Vec3, energy: f32, distance: f32, angle: f32, exponent: f32) -> Self {
        Self {
            distance,
            angle,
            exponent,
            ..Self::with_kind(LightKind::Spot, color, energy)
        }
    }

    #[must_use]
    pub fn new_hemi(color: Vec3, energy: f32) -> Self {
        Self::with_kind(LightKind::Hemi, color, energy)
    }

    /// Colour premultiplied by energy, as uploaded to the shader.
    #[inline]
    #[must_use]
    pub fn radiance(&self) -> Vec3 {
        self.color * self.energy
    }

    #[inline]
    #[must_use]
    pub fn angle_cos(&self) -> f32 {
        self.angle.cos()
    }
}

impl Default for Light {
    fn default() -> Self {
        Self::new_point(Vec3::ONE, 1.0, 0.0)
    }
}
