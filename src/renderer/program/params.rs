//! Program permutation parameters and cache key.

use xxhash_rust::xxh3::Xxh3;

use crate::renderer::backend::{Capabilities, Precision};
use crate::renderer::lights::LightCounts;
use crate::resources::{Material, Mesh, Shader, ShaderDefines, Streams};

/// What kind of geometry feeds the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GeometryKind {
    #[default]
    Mesh,
    Sprite,
    Emitter,
}

/// Everything besides the shader source that selects a program variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ProgramParameters {
    pub geometry: GeometryKind,
    /// Attribute streams the geometry provides.
    pub streams: Streams,
    /// `None` for unlit shaders.
    pub lights: Option<LightCounts>,
    pub vertex_lit: bool,
    pub specular: bool,
    pub shadows: bool,
    pub fog: bool,
    pub normal_map: bool,
    pub bump_map: bool,
    /// Bone matrix count, 0 without skinning.
    pub bones: u32,
    pub standard_derivatives: bool,
    pub precision: Precision,
}

impl ProgramParameters {
    fn base(shader: &Shader, material: &Material, lights: &LightCounts, caps: &Capabilities, precision: Precision) -> Self {
        Self {
            geometry: GeometryKind::Mesh,
            streams: Streams::empty(),
            lights: shader.lights.then_some(*lights),
            vertex_lit: shader.lights && shader.vertex_lit,
            specular: shader.lights && shader.specular,
            shadows: shader.shadows,
            fog: shader.fog,
            normal_map: material.has_uniform("normalMap"),
            bump_map: material.has_uniform("bumpMap"),
            bones: 0,
            standard_derivatives: caps.standard_derivatives && shader.standard_derivatives,
            precision,
        }
    }

    #[must_use]
    pub fn for_mesh(
        shader: &Shader,
        material: &Material,
        mesh: &Mesh,
        lights: &LightCounts,
        caps: &Capabilities,
        precision: Precision,
    ) -> Self {
        let mut params = Self::base(shader, material, lights, caps, precision);
        params.streams = mesh.present_streams() - Streams::INDEX;
        if mesh.uses_bones() {
            params.bones = mesh.bone_count() as u32;
        } else {
            params.streams -= Streams::BONE_INDEX | Streams::BONE_WEIGHT;
        }
        params
    }

    /// Sprites always draw the shared quad, which has positions and uvs.
    #[must_use]
    pub fn for_sprite(
        shader: &Shader,
        material: &Material,
        lights: &LightCounts,
        caps: &Capabilities,
        precision: Precision,
    ) -> Self {
        let mut params = Self::base(shader, material, lights, caps, precision);
        params.geometry = GeometryKind::Sprite;
        params.streams = Streams::POSITION | Streams::UV;
        params
    }

    /// Emitters stream positions plus the packed particle data.
    #[must_use]
    pub fn for_emitter(
        shader: &Shader,
        material: &Material,
        lights: &LightCounts,
        caps: &Capabilities,
        precision: Precision,
    ) -> Self {
        let mut params = Self::base(shader, material, lights, caps, precision);
        params.geometry = GeometryKind::Emitter;
        params.streams = Streams::POSITION;
        params
    }

    #[inline]
    #[must_use]
    pub fn has(&self, stream: Streams) -> bool {
        self.streams.contains(stream)
    }

    /// `#define` set emitted into both stages.
    #[must_use]
    pub fn defines(&self) -> ShaderDefines {
        let mut defines = ShaderDefines::with_capacity(16);

        defines.set_flag("USE_LIGHTS", self.lights.is_some());
        defines.set_flag("USE_VERTEX_LIGHTING", self.vertex_lit);
        defines.set_flag("USE_SPECULAR", self.specular);
        defines.set_flag("USE_SHADOWS", self.shadows);
        defines.set_flag("USE_FOG", self.fog);
        defines.set_flag("USE_SKINNING", self.bones > 0);
        defines.set_flag("USE_NORMAL_MAP", self.normal_map);
        defines.set_flag("USE_BUMP_MAP", self.bump_map);
        defines.set_flag("USE_STANDARD_DERIVATIVES", self.standard_derivatives);
        defines.set_flag("IS_SPRITE", self.geometry == GeometryKind::Sprite);
        defines.set_flag("IS_EMITTER", self.geometry == GeometryKind::Emitter);

        defines.set_flag("HAS_NORMAL", self.has(Streams::NORMAL));
        defines.set_flag("HAS_TANGENT", self.has(Streams::TANGENT));
        defines.set_flag("HAS_COLOR", self.has(Streams::COLOR));
        defines.set_flag("HAS_UV", self.has(Streams::UV));
        defines.set_flag("HAS_UV2", self.has(Streams::UV2));

        if let Some(lights) = &self.lights {
            defines.set_count("MAX_DIR_LIGHTS", lights.max_directional);
            defines.set_count("MAX_POINT_LIGHTS", lights.max_point);
            defines.set_count("MAX_SPOT_LIGHTS", lights.max_spot);
            defines.set_count("MAX_HEMI_LIGHTS", lights.max_hemi);
        }
        if self.shadows {
            let shadows = self.lights.map_or(0, |l| l.max_shadows);
            defines.set_count("MAX_SHADOWS", shadows);
        }
        if self.bones > 0 {
            defines.set_count("MAX_BONES", self.bones);
        }

        defines
    }

    /// Cache key over the user sources and the serialized parameters.
    #[must_use]
    pub fn key(&self, shader: &Shader) -> ProgramKey {
        let mut hasher = Xxh3::new();
        hasher.update(shader.vertex.as_bytes());
        hasher.update(&[0]);
        hasher.update(shader.fragment.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.defines().serialize().as_bytes());
        hasher.update(self.precision.glsl().as_bytes());
        hasher.update(&self.streams.bits().to_le_bytes());
        ProgramKey(hasher.digest128())
    }
}

/// 128-bit hash identifying one compiled program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramKey(pub u128);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::ShaderHandle;

    fn unlit() -> Shader {
        Shader::new("unlit", "void main() {}", "void main() {}")
    }

    #[test]
    fn unlit_key_ignores_light_counts() {
        let shader = unlit();
        let material = Material::new("m", ShaderHandle::default());
        let caps = Capabilities::default();
        let none = LightCounts::default();
        let some = LightCounts {
            max_point: 3,
            ..LightCounts::default()
        };

        let a = ProgramParameters::for_sprite(&shader, &material, &none, &caps, Precision::High);
        let b = ProgramParameters::for_sprite(&shader, &material, &some, &caps, Precision::High);
        assert_eq!(a.key(&shader), b.key(&shader));
    }

    #[test]
    fn lit_key_tracks_light_counts() {
        let shader = unlit().lit(true);
        let material = Material::new("m", ShaderHandle::default());
        let caps = Capabilities::default();
        let one = LightCounts {
            max_point: 1,
            ..LightCounts::default()
        };
        let two = LightCounts {
            max_point: 2,
            ..LightCounts::default()
        };

        let a = ProgramParameters::for_sprite(&shader, &material, &one, &caps, Precision::High);
        let b = ProgramParameters::for_sprite(&shader, &material, &two, &caps, Precision::High);
        assert_ne!(a.key(&shader), b.key(&shader));
        assert_eq!(a.defines().get("MAX_POINT_LIGHTS"), Some("1"));
    }

    #[test]
    fn derivatives_need_backend_support() {
        let mut shader = unlit();
        shader.standard_derivatives = true;
        let material = Material::new("m", ShaderHandle::default());
        let caps = Capabilities {
            standard_derivatives: false,
            ..Capabilities::default()
        };
        let params = ProgramParameters::for_emitter(&shader, &material, &LightCounts::default(), &caps, Precision::High);
        assert!(!params.standard_derivatives);
        assert!(params.defines().contains("IS_EMITTER"));
    }

    #[test]
    fn mesh_streams_exclude_index_and_unposed_bones() {
        let shader = unlit();
        let material = Material::new("m", ShaderHandle::default());
        let mut mesh = Mesh::quad("q");
        mesh.set_bone_indices(vec![0; 4]);
        let params = ProgramParameters::for_mesh(
            &shader,
            &material,
            &mesh,
            &LightCounts::default(),
            &Capabilities::default(),
            Precision::Medium,
        );
        assert!(!params.has(Streams::INDEX));
        assert!(!params.has(Streams::BONE_INDEX));
        assert_eq!(params.bones, 0);
        assert!(params.has(Streams::NORMAL));
    }
}
