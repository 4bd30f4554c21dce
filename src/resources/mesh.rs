use bitflags::bitflags;
use glam::{Mat4, Vec2, Vec3, Vec4};

bitflags! {
    /// Vertex/index streams of a mesh. Used both as per-stream dirty flags
    /// and as the "stream present" mask of a program permutation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Streams: u16 {
        const POSITION    = 1 << 0;
        const NORMAL      = 1 << 1;
        const TANGENT     = 1 << 2;
        const COLOR       = 1 << 3;
        const UV          = 1 << 4;
        const UV2         = 1 << 5;
        const BONE_INDEX  = 1 << 6;
        const BONE_WEIGHT = 1 << 7;
        const INDEX       = 1 << 8;
    }
}

/// CPU-side geometry.
///
/// Every setter marks its stream dirty; the renderer's buffer cache uploads
/// dirty streams only and clears their flags.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub name: String,

    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    tangents: Vec<Vec4>,
    colors: Vec<Vec3>,
    uvs: Vec<Vec2>,
    uv2s: Vec<Vec2>,
    bone_indices: Vec<u16>,
    bone_weights: Vec<f32>,
    indices: Vec<u16>,

    /// Streaming usage hint. Read once when the GPU buffers are first created.
    pub dynamic: bool,
    dirty: Streams,

    /// Skinning pose, one matrix per bone, written by the host animation.
    pub bone_matrices: Vec<Mat4>,
}

macro_rules! stream_accessors {
    ($($field:ident: $ty:ty => $set:ident, $flag:ident;)*) => {
        $(
            #[inline]
            #[must_use]
            pub fn $field(&self) -> &[$ty] {
                &self.$field
            }

            pub fn $set(&mut self, data: Vec<$ty>) {
                self.$field = data;
                self.dirty |= Streams::$flag;
            }
        )*
    };
}

impl Mesh {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            positions: Vec::new(),
            normals: Vec::new(),
            tangents: Vec::new(),
            colors: Vec::new(),
            uvs: Vec::new(),
            uv2s: Vec::new(),
            bone_indices: Vec::new(),
            bone_weights: Vec::new(),
            indices: Vec::new(),
            dynamic: false,
            dirty: Streams::all(),
            bone_matrices: Vec::new(),
        }
    }

    stream_accessors! {
        positions: Vec3 => set_positions, POSITION;
        normals: Vec3 => set_normals, NORMAL;
        tangents: Vec4 => set_tangents, TANGENT;
        colors: Vec3 => set_colors, COLOR;
        uvs: Vec2 => set_uvs, UV;
        uv2s: Vec2 => set_uv2s, UV2;
        bone_indices: u16 => set_bone_indices, BONE_INDEX;
        bone_weights: f32 => set_bone_weights, BONE_WEIGHT;
        indices: u16 => set_indices, INDEX;
    }

    /// In-place edit of the positions; marks the stream dirty.
    pub fn positions_mut(&mut self) -> &mut Vec<Vec3> {
        self.dirty |= Streams::POSITION;
        &mut self.positions
    }

    /// In-place edit of the colours; marks the stream dirty.
    pub fn colors_mut(&mut self) -> &mut Vec<Vec3> {
        self.dirty |= Streams::COLOR;
        &mut self.colors
    }

    pub fn mark_dirty(&mut self, streams: Streams) {
        self.dirty |= streams;
    }

    #[inline]
    #[must_use]
    pub fn dirty(&self) -> Streams {
        self.dirty
    }

    #[inline]
    pub(crate) fn clear_dirty(&mut self, streams: Streams) {
        self.dirty.remove(streams);
    }

    /// Streams holding at least one element.
    #[must_use]
    pub fn present_streams(&self) -> Streams {
        let mut present = Streams::empty();
        present.set(Streams::POSITION, !self.positions.is_empty());
        present.set(Streams::NORMAL, !self.normals.is_empty());
        present.set(Streams::TANGENT, !self.tangents.is_empty());
        present.set(Streams::COLOR, !self.colors.is_empty());
        present.set(Streams::UV, !self.uvs.is_empty());
        present.set(Streams::UV2, !self.uv2s.is_empty());
        present.set(Streams::BONE_INDEX, !self.bone_indices.is_empty());
        present.set(Streams::BONE_WEIGHT, !self.bone_weights.is_empty());
        present.set(Streams::INDEX, !self.indices.is_empty());
        present
    }

    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    #[must_use]
    pub fn bone_count(&self) -> usize {
        self.bone_matrices.len()
    }

    /// Skinning is active when the mesh carries both a pose and bone indices.
    #[must_use]
    pub fn uses_bones(&self) -> bool {
        !self.bone_matrices.is_empty() && !self.bone_indices.is_empty()
    }

    /// Axis-aligned unit quad in the XY plane, two triangles.
    #[must_use]
    pub fn quad(name: impl Into<String>) -> Self {
        let mut mesh = Self::new(name);
        mesh.set_positions(vec![
            Vec3::new(-0.5, -0.5, 0.0),
            Vec3::new(0.5, -0.5, 0.0),
            Vec3::new(0.5, 0.5, 0.0),
            Vec3::new(-0.5, 0.5, 0.0),
        ]);
        mesh.set_normals(vec![Vec3::Z; 4]);
        mesh.set_uvs(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ]);
        mesh.set_indices(vec![0, 1, 2, 0, 2, 3]);
        mesh
    }
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new("Mesh")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_mark_their_stream_only() {
        let mut mesh = Mesh::quad("q");
        mesh.clear_dirty(Streams::all());
        mesh.set_colors(vec![Vec3::ONE; 4]);
        assert_eq!(mesh.dirty(), Streams::COLOR);
    }

    #[test]
    fn present_streams_follow_data() {
        let mesh = Mesh::quad("q");
        let present = mesh.present_streams();
        assert!(present.contains(Streams::POSITION | Streams::NORMAL | Streams::UV | Streams::INDEX));
        assert!(!present.intersects(Streams::TANGENT | Streams::COLOR | Streams::BONE_INDEX));
    }
}
