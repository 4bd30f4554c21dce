//! Asset storage.
//!
//! Meshes, materials, shaders and textures live in typed `SlotMap`s and are
//! referenced from components by handle. Loading and decoding asset files is
//! the host's job; this module only stores the results.

use slotmap::{SlotMap, new_key_type};

use crate::resources::{Material, Mesh, Shader, Texture};

new_key_type! {
    pub struct MeshHandle;
    pub struct MaterialHandle;
    pub struct ShaderHandle;
    pub struct TextureHandle;
}

/// Owner of every CPU-side asset the renderer reads.
#[derive(Debug, Default)]
pub struct Assets {
    pub meshes: SlotMap<MeshHandle, Mesh>,
    pub materials: SlotMap<MaterialHandle, Material>,
    pub shaders: SlotMap<ShaderHandle, Shader>,
    pub textures: SlotMap<TextureHandle, Texture>,
}

impl Assets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshHandle {
        self.meshes.insert(mesh)
    }

    pub fn add_material(&mut self, material: Material) -> MaterialHandle {
        self.materials.insert(material)
    }

    pub fn add_shader(&mut self, shader: Shader) -> ShaderHandle {
        self.shaders.insert(shader)
    }

    pub fn add_texture(&mut self, texture: Texture) -> TextureHandle {
        self.textures.insert(texture)
    }

    #[inline]
    #[must_use]
    pub fn mesh(&self, handle: MeshHandle) -> Option<&Mesh> {
        self.meshes.get(handle)
    }

    #[inline]
    pub fn mesh_mut(&mut self, handle: MeshHandle) -> Option<&mut Mesh> {
        self.meshes.get_mut(handle)
    }

    #[inline]
    #[must_use]
    pub fn material(&self, handle: MaterialHandle) -> Option<&Material> {
        self.materials.get(handle)
    }

    #[inline]
    pub fn material_mut(&mut self, handle: MaterialHandle) -> Option<&mut Material> {
        self.materials.get_mut(handle)
    }

    #[inline]
    #[must_use]
    pub fn texture(&self, handle: TextureHandle) -> Option<&Texture> {
        self.textures.get(handle)
    }

    #[inline]
    pub fn texture_mut(&mut self, handle: TextureHandle) -> Option<&mut Texture> {
        self.textures.get_mut(handle)
    }
}
