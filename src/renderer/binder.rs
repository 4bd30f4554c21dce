//! Per-draw binding of vertex streams and uniforms.
//!
//! Everything here works on a [`CompiledProgram`] that is already current on
//! the backend. Uniform writes go through the program's per-location value
//! cache; `force` is set when the program was just switched so that every
//! declared value is written again.

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use slotmap::SlotMap;
use smallvec::SmallVec;

use super::backend::{AttributeLocation, BufferTarget, Capabilities, GraphicsBackend, VertexFormat, Viewport};
use super::buffers::{EmitterBuffers, GpuBuffer, GpuBufferSet};
use super::program::CompiledProgram;
use super::state::{GeometryBinding, RenderStateCache};
use super::textures::TextureCache;
use crate::assets::TextureHandle;
use crate::errors::{KilnError, Result};
use crate::resources::{Material, Texture, UniformData, UniformValue};
use crate::scene::{Camera, Light, LightKind, Sprite};
use crate::utils::WarnOnce;

/// Camera matrices captured once per frame.
#[derive(Debug, Clone, Copy)]
pub struct CameraView {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
    pub orthographic: bool,
    pub ortho_size: f32,
}

impl CameraView {
    #[must_use]
    pub fn from_camera(camera: &Camera) -> Self {
        Self {
            view: *camera.view(),
            projection: *camera.projection(),
            position: camera.world_position(),
            orthographic: camera.is_orthographic(),
            ortho_size: camera.ortho_size,
        }
    }
}

/// A light with the world position of its entity.
#[derive(Debug, Clone)]
pub struct LightSample {
    pub light: Light,
    pub position: Vec3,
}

/// Frame-constant inputs shared by every draw.
#[derive(Debug, Clone)]
pub struct FrameContext {
    pub camera: CameraView,
    pub lights: Vec<LightSample>,
    pub ambient: Vec3,
    pub viewport: Viewport,
}

/// Per-object matrices.
#[derive(Debug, Clone, Copy)]
pub struct ObjectMatrices {
    pub model: Mat4,
    pub model_view: Mat4,
    pub normal: Mat3,
}

type StreamBinding = (&'static str, Option<GpuBuffer>, VertexFormat);

#[must_use]
pub(crate) fn mesh_streams(set: &GpuBufferSet) -> [StreamBinding; 8] {
    [
        ("position", set.position, VertexFormat::Float32x3),
        ("normal", set.normal, VertexFormat::Float32x3),
        ("tangent", set.tangent, VertexFormat::Float32x4),
        ("color", set.color, VertexFormat::Float32x3),
        ("uv", set.uv, VertexFormat::Float32x2),
        ("uv2", set.uv2, VertexFormat::Float32x2),
        ("boneIndex", set.bone_index, VertexFormat::Uint16),
        ("boneWeight", set.bone_weight, VertexFormat::Float32),
    ]
}

#[must_use]
pub(crate) fn emitter_streams(buffers: &EmitterBuffers) -> [StreamBinding; 3] {
    [
        ("position", buffers.position, VertexFormat::Float32x3),
        ("data", buffers.data, VertexFormat::Float32x3),
        ("particleColor", buffers.color, VertexFormat::Float32x3),
    ]
}

/// Wires the streams the program consumes and binds `index`. Does nothing
/// when `binding` is already the wired one.
pub(crate) fn bind_geometry<B: GraphicsBackend>(
    backend: &mut B,
    state: &mut RenderStateCache,
    program: &CompiledProgram,
    binding: GeometryBinding,
    streams: &[StreamBinding],
    index: Option<GpuBuffer>,
) {
    if !state.bind_geometry(binding) {
        return;
    }

    let mut enabled: SmallVec<[AttributeLocation; 8]> = SmallVec::new();
    for &(name, buffer, format) in streams {
        let (Some(location), Some(buffer)) = (program.attribute(name), buffer) else {
            continue;
        };
        backend.attribute_pointer(location, buffer.raw, format);
        enabled.push(location);
    }
    state.apply_attributes(backend, &enabled);

    if let Some(index) = index {
        backend.bind_buffer(BufferTarget::Index, index.raw);
    }
}

pub(crate) fn bind_object<B: GraphicsBackend>(
    backend: &mut B,
    program: &mut CompiledProgram,
    frame: &FrameContext,
    object: &ObjectMatrices,
    force: bool,
) {
    let camera = &frame.camera;
    program.write_uniform(backend, "modelMatrix", 0, UniformData::Mat4(object.model), force);
    program.write_uniform(backend, "modelViewMatrix", 0, UniformData::Mat4(object.model_view), force);
    program.write_uniform(backend, "projectionMatrix", 0, UniformData::Mat4(camera.projection), force);
    program.write_uniform(backend, "viewMatrix", 0, UniformData::Mat4(camera.view), force);
    program.write_uniform(backend, "normalMatrix", 0, UniformData::Mat3(object.normal), force);
    program.write_uniform(backend, "cameraPosition", 0, UniformData::Vec3(camera.position), force);
    program.write_uniform(backend, "ambient", 0, UniformData::Vec3(frame.ambient), force);
}

/// Point size scale: the smaller viewport side, divided by the view height
/// for orthographic cameras, doubled otherwise.
#[must_use]
pub fn particle_size_ratio(camera: &CameraView, viewport: Viewport) -> f32 {
    let ratio = viewport.width.min(viewport.height) as f32;
    if camera.orthographic {
        ratio / (camera.ortho_size * 2.0)
    } else {
        ratio * 2.0
    }
}

pub(crate) fn bind_emitter<B: GraphicsBackend>(
    backend: &mut B,
    program: &mut CompiledProgram,
    frame: &FrameContext,
    force: bool,
) {
    let ratio = particle_size_ratio(&frame.camera, frame.viewport);
    let attenuation = if frame.camera.orthographic { 0.0 } else { 1.0 };
    program.write_uniform(backend, "particleSizeRatio", 0, UniformData::Float(ratio), force);
    program.write_uniform(backend, "particleAttenuation", 0, UniformData::Float(attenuation), force);
}

/// Binds sprite size and the crop rectangle, normalised by the diffuse map
/// dimensions.
pub(crate) fn bind_sprite<B: GraphicsBackend>(
    backend: &mut B,
    program: &mut CompiledProgram,
    sprite: &Sprite,
    material: &Material,
    textures: &SlotMap<TextureHandle, Texture>,
    force: bool,
) -> Result<()> {
    let texture = material
        .uniform("diffuseMap")
        .and_then(UniformValue::as_texture)
        .and_then(|handle| textures.get(handle))
        .ok_or_else(|| KilnError::SpriteWithoutDiffuseMap(material.name.clone()))?;

    let (iw, ih) = (texture.inv_width(), texture.inv_height());
    let crop = Vec4::new(sprite.x * iw, sprite.y * ih, sprite.w * iw, sprite.h * ih);
    program.write_uniform(backend, "size", 0, UniformData::Vec2(Vec2::new(sprite.width, sprite.height)), force);
    program.write_uniform(backend, "crop", 0, UniformData::Vec4(crop), force);
    Ok(())
}

pub(crate) fn bind_bones<B: GraphicsBackend>(
    backend: &mut B,
    program: &mut CompiledProgram,
    bones: &[Mat4],
    force: bool,
) {
    let capacity = program.uniform("bone").map_or(0, |u| u.decl().len());
    for (i, matrix) in bones.iter().take(capacity as usize).enumerate() {
        program.write_uniform(backend, "bone", i as u32, UniformData::Mat4(*matrix), force);
    }
}

/// Fills the light arrays the program declares. Invisible and shadow-only
/// lights are skipped; slots left over are zeroed so that stale lights from
/// an earlier frame stop contributing.
pub(crate) fn bind_lights<B: GraphicsBackend>(
    backend: &mut B,
    program: &mut CompiledProgram,
    lights: &[LightSample],
    force: bool,
) {
    for kind in [LightKind::Point, LightKind::Directional, LightKind::Spot, LightKind::Hemi] {
        let Some(capacity) = program.light_capacity(kind) else {
            continue;
        };

        let mut slot = 0u32;
        for sample in lights {
            if slot >= capacity {
                break;
            }
            let light = &sample.light;
            if light.kind != kind || !light.visible || light.only_shadow {
                continue;
            }
            if write_light(backend, program, sample, slot, force) {
                slot += 1;
            }
        }

        let color = light_color_uniform(kind);
        for unused in slot..capacity {
            program.write_uniform(backend, color, unused, UniformData::Vec3(Vec3::ZERO), force);
        }
    }
}

const fn light_color_uniform(kind: LightKind) -> &'static str {
    match kind {
        LightKind::Point => "pointLightColor",
        LightKind::Directional => "directionalLightColor",
        LightKind::Spot => "spotLightColor",
        LightKind::Hemi => "hemiLightColor",
    }
}

fn write_light<B: GraphicsBackend>(
    backend: &mut B,
    program: &mut CompiledProgram,
    sample: &LightSample,
    i: u32,
    force: bool,
) -> bool {
    let light = &sample.light;
    let color = UniformData::Vec3(light.radiance());
    let direction = (sample.position - light.target).normalize_or_zero();

    match light.kind {
        LightKind::Point => {
            program.write_uniform(backend, "pointLightColor", i, color, force);
            program.write_uniform(backend, "pointLightPosition", i, UniformData::Vec3(sample.position), force);
            program.write_uniform(backend, "pointLightDistance", i, UniformData::Float(light.distance), force);
        }
        LightKind::Directional => {
            if direction == Vec3::ZERO {
                return false;
            }
            program.write_uniform(backend, "directionalLightColor", i, color, force);
            program.write_uniform(backend, "directionalLightDirection", i, UniformData::Vec3(direction), force);
        }
        LightKind::Spot => {
            if direction == Vec3::ZERO {
                return false;
            }
            program.write_uniform(backend, "spotLightColor", i, color, force);
            program.write_uniform(backend, "spotLightPosition", i, UniformData::Vec3(sample.position), force);
            program.write_uniform(backend, "spotLightDirection", i, UniformData::Vec3(direction), force);
            program.write_uniform(backend, "spotLightDistance", i, UniformData::Float(light.distance), force);
            program.write_uniform(backend, "spotLightAngleCos", i, UniformData::Float(light.angle_cos()), force);
            program.write_uniform(backend, "spotLightExponent", i, UniformData::Float(light.exponent), force);
        }
        LightKind::Hemi => {
            program.write_uniform(backend, "hemiLightColor", i, color, force);
            program.write_uniform(backend, "hemiLightDirection", i, UniformData::Vec3(direction), force);
        }
    }
    true
}

/// Texture inputs of a material bind.
pub(crate) struct TextureBindings<'a> {
    pub cache: &'a mut TextureCache,
    pub assets: &'a mut SlotMap<TextureHandle, Texture>,
    pub caps: &'a Capabilities,
}

/// Binds every custom uniform the program declares from `material`.
///
/// Samplers take the next free texture unit; one the material leaves unset
/// gets the white placeholder. Any other declared uniform the material lacks
/// fails the draw. A value whose kind does not match the declared type is
/// not written and is reported once per material and uniform.
pub(crate) fn bind_material<B: GraphicsBackend>(
    backend: &mut B,
    program: &mut CompiledProgram,
    material: &Material,
    state: &mut RenderStateCache,
    textures: TextureBindings<'_>,
    warnings: &mut WarnOnce,
    force: bool,
) -> Result<()> {
    let names = program.shared_custom_uniforms();
    for name in names.iter() {
        let Some(decl) = program.uniform(name).map(|u| u.decl().clone()) else {
            continue;
        };

        if decl.ty.is_sampler() {
            let Some(unit) = state.allocate_texture_unit(warnings) else {
                continue;
            };
            let requested = material.uniform(name).and_then(UniformValue::as_texture);
            let raw = match requested.and_then(|h| textures.assets.get_mut(h).map(|t| (h, t))) {
                Some((handle, texture)) => {
                    textures
                        .cache
                        .ensure_uploaded(backend, handle, texture, textures.caps, warnings)?
                }
                None => textures.cache.placeholder(backend)?,
            };
            backend.bind_texture(unit, raw);
            program.write_sampler(backend, name, unit, force);
            continue;
        }

        let value = material.uniform(name).ok_or_else(|| KilnError::MissingUniform {
            material: material.name.clone(),
            uniform: name.clone(),
        })?;
        if let Some(first) = value.element(0)
            && !decl.ty.accepts(&first)
        {
            warnings.warn(&format!("uniform-type:{}:{name}", material.name), || {
                format!(
                    "Material '{}' supplies a {} for uniform '{name}' declared as {:?}; value not written",
                    material.name,
                    first.glsl_name(),
                    decl.ty
                )
            });
            continue;
        }
        for i in 0..decl.len() {
            if let Some(data) = value.element(i as usize) {
                program.write_uniform(backend, name, i, data, force);
            }
        }
    }
    Ok(())
}
