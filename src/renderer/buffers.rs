//! Buffer Cache
//!
//! Owns the GPU buffers of every mesh, of the shared sprite quad and of each
//! particle emitter. Mesh streams are uploaded only when their dirty flag is
//! set (or their buffer does not exist yet), so editing one stream never
//! touches the buffers of the others.

use glam::{Mat4, Vec2, Vec3};
use rustc_hash::FxHashMap;
use slotmap::SecondaryMap;

use super::backend::{BufferTarget, BufferUsage, GraphicsBackend, RawBuffer};
use crate::assets::MeshHandle;
use crate::errors::{KilnError, Result};
use crate::resources::{Mesh, Streams};
use crate::scene::{Emitter, EmitterId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuBuffer {
    pub raw: RawBuffer,
    /// Element count (vertices or indices).
    pub len: u32,
}

/// GPU side of one mesh.
#[derive(Debug, Clone)]
pub struct GpuBufferSet {
    usage: BufferUsage,
    pub position: Option<GpuBuffer>,
    pub normal: Option<GpuBuffer>,
    pub tangent: Option<GpuBuffer>,
    pub color: Option<GpuBuffer>,
    pub uv: Option<GpuBuffer>,
    pub uv2: Option<GpuBuffer>,
    pub bone_index: Option<GpuBuffer>,
    pub bone_weight: Option<GpuBuffer>,
    pub index: Option<GpuBuffer>,
    /// Edge list derived from `index` for wireframe drawing.
    pub line_index: Option<GpuBuffer>,
    pub vertex_count: u32,
    /// Bumped whenever a buffer handle is created or deleted, and whenever
    /// the index streams are uploaded: an upload leaves the element target
    /// bound to `line_index`, so the next draw must bind again.
    pub revision: u32,
}

impl GpuBufferSet {
    fn new(usage: BufferUsage) -> Self {
        Self {
            usage,
            position: None,
            normal: None,
            tangent: None,
            color: None,
            uv: None,
            uv2: None,
            bone_index: None,
            bone_weight: None,
            index: None,
            line_index: None,
            vertex_count: 0,
            revision: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    #[must_use]
    pub fn stream(&self, stream: Streams) -> Option<GpuBuffer> {
        match stream {
            Streams::POSITION => self.position,
            Streams::NORMAL => self.normal,
            Streams::TANGENT => self.tangent,
            Streams::COLOR => self.color,
            Streams::UV => self.uv,
            Streams::UV2 => self.uv2,
            Streams::BONE_INDEX => self.bone_index,
            Streams::BONE_WEIGHT => self.bone_weight,
            Streams::INDEX => self.index,
            _ => None,
        }
    }

    fn buffers(&self) -> impl Iterator<Item = GpuBuffer> + '_ {
        [
            self.position,
            self.normal,
            self.tangent,
            self.color,
            self.uv,
            self.uv2,
            self.bone_index,
            self.bone_weight,
            self.index,
            self.line_index,
        ]
        .into_iter()
        .flatten()
    }

    fn delete<B: GraphicsBackend>(&self, backend: &mut B) {
        for buffer in self.buffers() {
            backend.delete_buffer(buffer.raw);
        }
    }
}

/// Per-frame particle streams of one emitter.
#[derive(Debug, Default)]
pub struct EmitterBuffers {
    pub position: Option<GpuBuffer>,
    /// `(angle, size, alpha)` per particle.
    pub data: Option<GpuBuffer>,
    pub color: Option<GpuBuffer>,
    pub count: u32,
    pub revision: u32,
}

impl EmitterBuffers {
    fn delete<B: GraphicsBackend>(&self, backend: &mut B) {
        for buffer in [self.position, self.data, self.color].into_iter().flatten() {
            backend.delete_buffer(buffer.raw);
        }
    }
}

/// Splits every triangle `(a, b, c)` into the edges `(a, b)`, `(a, c)` and
/// `(b, c)`. A trailing partial triangle is ignored.
#[must_use]
pub fn wireframe_indices(indices: &[u16]) -> Vec<u16> {
    let mut lines = Vec::with_capacity(indices.len() * 2);
    for tri in indices.chunks_exact(3) {
        let (a, b, c) = (tri[0], tri[1], tri[2]);
        lines.extend_from_slice(&[a, b, a, c, b, c]);
    }
    lines
}

/// Uploads one stream into `slot`. Returns whether a buffer handle was
/// created or deleted.
fn upload_stream<B: GraphicsBackend>(
    backend: &mut B,
    slot: &mut Option<GpuBuffer>,
    target: BufferTarget,
    bytes: &[u8],
    len: usize,
    usage: BufferUsage,
    dirty: bool,
) -> Result<bool> {
    if len == 0 {
        if dirty && let Some(old) = slot.take() {
            backend.delete_buffer(old.raw);
            return Ok(true);
        }
        return Ok(false);
    }
    if !dirty && slot.is_some() {
        return Ok(false);
    }

    let (raw, created) = match slot {
        Some(existing) => (existing.raw, false),
        None => (backend.create_buffer()?, true),
    };
    backend.upload_buffer(raw, target, bytes, usage);
    *slot = Some(GpuBuffer { raw, len: len as u32 });
    Ok(created)
}

#[derive(Debug, Default)]
pub struct BufferCache {
    meshes: SecondaryMap<MeshHandle, GpuBufferSet>,
    emitters: FxHashMap<EmitterId, EmitterBuffers>,
    sprite_quad: Option<GpuBufferSet>,

    scratch_order: Vec<u32>,
    scratch_position: Vec<f32>,
    scratch_data: Vec<f32>,
    scratch_color: Vec<f32>,
}

impl BufferCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploads the dirty streams of `mesh` and clears their flags. The usage
    /// hint is fixed when the set is first created.
    pub fn ensure_uploaded<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        handle: MeshHandle,
        mesh: &mut Mesh,
    ) -> Result<&GpuBufferSet> {
        let usage = if mesh.dynamic {
            BufferUsage::Dynamic
        } else {
            BufferUsage::Static
        };
        let set = self
            .meshes
            .entry(handle)
            .ok_or_else(|| KilnError::MissingAsset(format!("mesh '{}'", mesh.name)))?
            .or_insert_with(|| {
                log::debug!("Creating GPU buffer set for mesh '{}'", mesh.name);
                GpuBufferSet::new(usage)
            });

        let dirty = mesh.dirty();
        let usage = set.usage;
        let mut changed = false;

        macro_rules! vertex_stream {
            ($slot:ident, $getter:ident, $flag:ident) => {
                changed |= upload_stream(
                    backend,
                    &mut set.$slot,
                    BufferTarget::Vertex,
                    bytemuck::cast_slice(mesh.$getter()),
                    mesh.$getter().len(),
                    usage,
                    dirty.contains(Streams::$flag),
                )?;
            };
        }

        vertex_stream!(position, positions, POSITION);
        vertex_stream!(normal, normals, NORMAL);
        vertex_stream!(tangent, tangents, TANGENT);
        vertex_stream!(color, colors, COLOR);
        vertex_stream!(uv, uvs, UV);
        vertex_stream!(uv2, uv2s, UV2);
        vertex_stream!(bone_index, bone_indices, BONE_INDEX);
        vertex_stream!(bone_weight, bone_weights, BONE_WEIGHT);

        let index_dirty = dirty.contains(Streams::INDEX) || (set.index.is_none() && !mesh.indices().is_empty());
        if index_dirty {
            let indices = mesh.indices();
            changed |= upload_stream(
                backend,
                &mut set.index,
                BufferTarget::Index,
                bytemuck::cast_slice(indices),
                indices.len(),
                usage,
                true,
            )?;
            let lines = wireframe_indices(indices);
            changed |= upload_stream(
                backend,
                &mut set.line_index,
                BufferTarget::Index,
                bytemuck::cast_slice(&lines),
                lines.len(),
                usage,
                true,
            )?;
            changed = true;
        }

        set.vertex_count = mesh.vertex_count() as u32;
        if changed {
            set.revision = set.revision.wrapping_add(1);
        }
        mesh.clear_dirty(Streams::all());
        Ok(set)
    }

    /// Shared unit quad drawn as a 4-vertex strip by every sprite.
    pub fn sprite_quad<B: GraphicsBackend>(&mut self, backend: &mut B) -> Result<&GpuBufferSet> {
        if self.sprite_quad.is_none() {
            let positions = [
                Vec3::new(-0.5, -0.5, 0.0),
                Vec3::new(0.5, -0.5, 0.0),
                Vec3::new(-0.5, 0.5, 0.0),
                Vec3::new(0.5, 0.5, 0.0),
            ];
            let uvs = [
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(0.0, 1.0),
                Vec2::new(1.0, 1.0),
            ];

            let mut set = GpuBufferSet::new(BufferUsage::Static);
            upload_stream(
                backend,
                &mut set.position,
                BufferTarget::Vertex,
                bytemuck::cast_slice(&positions),
                positions.len(),
                BufferUsage::Static,
                true,
            )?;
            upload_stream(
                backend,
                &mut set.uv,
                BufferTarget::Vertex,
                bytemuck::cast_slice(&uvs),
                uvs.len(),
                BufferUsage::Static,
                true,
            )?;
            set.vertex_count = 4;
            self.sprite_quad = Some(set);
        }

        self.sprite_quad
            .as_ref()
            .ok_or_else(|| KilnError::BufferCreation("sprite quad".into()))
    }

    /// Repacks and streams the particles of `emitter`. With `sort` set and a
    /// `model_view` supplied, particles are ordered back to front.
    pub fn upload_emitter<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        emitter: &Emitter,
        model_view: Option<&Mat4>,
    ) -> Result<&EmitterBuffers> {
        let particles = &emitter.particles;

        self.scratch_order.clear();
        self.scratch_order.extend(0..particles.len() as u32);
        if emitter.sort
            && let Some(mv) = model_view
        {
            let depth = |i: u32| mv.transform_point3(particles[i as usize].position).z;
            self.scratch_order.sort_by(|&a, &b| depth(a).total_cmp(&depth(b)));
        }

        self.scratch_position.clear();
        self.scratch_data.clear();
        self.scratch_color.clear();
        for &i in &self.scratch_order {
            let p = &particles[i as usize];
            self.scratch_position.extend_from_slice(&p.position.to_array());
            self.scratch_data.extend_from_slice(&[p.angle, p.size, p.alpha]);
            self.scratch_color.extend_from_slice(&p.color.to_array());
        }

        let buffers = self.emitters.entry(emitter.id()).or_default();
        let count = particles.len();
        let mut changed = false;
        for (slot, data) in [
            (&mut buffers.position, &self.scratch_position),
            (&mut buffers.data, &self.scratch_data),
            (&mut buffers.color, &self.scratch_color),
        ] {
            changed |= upload_stream(
                backend,
                slot,
                BufferTarget::Vertex,
                bytemuck::cast_slice(data),
                count,
                BufferUsage::Dynamic,
                true,
            )?;
        }

        buffers.count = count as u32;
        if changed {
            buffers.revision = buffers.revision.wrapping_add(1);
        }
        Ok(buffers)
    }

    #[must_use]
    pub fn mesh_buffers(&self, handle: MeshHandle) -> Option<&GpuBufferSet> {
        self.meshes.get(handle)
    }

    #[must_use]
    pub fn emitter_buffers(&self, id: EmitterId) -> Option<&EmitterBuffers> {
        self.emitters.get(&id)
    }

    /// Deletes the buffers of one mesh. Returns whether it had any.
    pub fn forget_mesh<B: GraphicsBackend>(&mut self, backend: &mut B, handle: MeshHandle) -> bool {
        match self.meshes.remove(handle) {
            Some(set) => {
                set.delete(backend);
                true
            }
            None => false,
        }
    }

    pub fn forget_emitter<B: GraphicsBackend>(&mut self, backend: &mut B, id: EmitterId) -> bool {
        match self.emitters.remove(&id) {
            Some(buffers) => {
                buffers.delete(backend);
                true
            }
            None => false,
        }
    }

    /// Drops every handle without backend calls (context loss).
    pub fn invalidate(&mut self) {
        self.meshes.clear();
        self.emitters.clear();
        self.sprite_quad = None;
    }

    pub fn destroy_all<B: GraphicsBackend>(&mut self, backend: &mut B) {
        for (_, set) in self.meshes.drain() {
            set.delete(backend);
        }
        for (_, buffers) in self.emitters.drain() {
            buffers.delete(backend);
        }
        if let Some(quad) = self.sprite_quad.take() {
            quad.delete(backend);
        }
    }

    /// Number of live buffer objects owned by the cache.
    #[must_use]
    pub fn buffer_count(&self) -> usize {
        let meshes: usize = self.meshes.values().map(|s| s.buffers().count()).sum();
        let emitters: usize = self
            .emitters
            .values()
            .map(|b| [b.position, b.data, b.color].iter().flatten().count())
            .sum();
        let quad = self.sprite_quad.as_ref().map_or(0, |q| q.buffers().count());
        meshes + emitters + quad
    }
}
