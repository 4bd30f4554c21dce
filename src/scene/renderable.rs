//! Renderable components: meshes, sprites and particle systems.

use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::assets::{MaterialHandle, MeshHandle};

/// Draws a mesh asset with a material asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MeshFilter {
    pub mesh: MeshHandle,
    pub material: MaterialHandle,
}

impl MeshFilter {
    #[must_use]
    pub fn new(mesh: MeshHandle, material: MaterialHandle) -> Self {
        Self { mesh, material }
    }
}

/// Textured quad. `x`, `y`, `w`, `h` select a region of the material's
/// `diffuseMap` in texels; `width`/`height` give the quad size in world units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sprite {
    pub material: MaterialHandle,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub width: f32,
    pub height: f32,
}

impl Sprite {
    #[must_use]
    pub fn new(material: MaterialHandle, w: f32, h: f32) -> Self {
        Self {
            material,
            x: 0.0,
            y: 0.0,
            w,
            h,
            width: 1.0,
            height: 1.0,
        }
    }
}

impl Default for Sprite {
    fn default() -> Self {
        Self::new(MaterialHandle::default(), 1.0, 1.0)
    }
}

/// Runtime identity of an emitter, keys its GPU buffer set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EmitterId(u64);

static NEXT_EMITTER_ID: AtomicU64 = AtomicU64::new(1);

impl EmitterId {
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_EMITTER_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Particle {
    pub position: Vec3,
    pub angle: f32,
    pub size: f32,
    pub alpha: f32,
    pub color: Vec3,
}

/// A set of point particles sharing one material. Particle state is written
/// by the host simulation; the renderer streams it every frame.
#[derive(Debug, Serialize, Deserialize)]
pub struct Emitter {
    #[serde(skip, default = "EmitterId::next")]
    id: EmitterId,
    pub material: MaterialHandle,
    /// Particles are expressed in world space rather than relative to the
    /// owning transform.
    pub world_space: bool,
    /// Draw back-to-front by view depth.
    pub sort: bool,
    #[serde(skip)]
    pub particles: Vec<Particle>,
}

impl Emitter {
    #[must_use]
    pub fn new(material: MaterialHandle) -> Self {
        Self {
            id: EmitterId::next(),
            material,
            world_space: false,
            sort: false,
            particles: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> EmitterId {
        self.id
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ParticleSystem {
    pub emitters: Vec<Emitter>,
}

impl ParticleSystem {
    #[must_use]
    pub fn with_emitter(emitter: Emitter) -> Self {
        Self {
            emitters: vec![emitter],
        }
    }
}
