//! Graphics backend contract.
//!
//! The renderer never talks to a driver directly. Everything it needs from
//! the GPU goes through [`GraphicsBackend`]: a capability query, resource
//! creation/destruction, draw submission and fixed-function state. Creation
//! calls return [`Result`] so failures surface with the backend's
//! diagnostic instead of a null handle.

use bitflags::bitflags;
use glam::Vec4;

use crate::errors::Result;
use crate::resources::{Blending, TextureFilter, TextureWrap, UniformData};

// ============================================================================
// Handles
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawBuffer(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawTexture(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawProgram(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniformLocation(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeLocation(pub u32);

// ============================================================================
// Capabilities
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Precision {
    #[default]
    High,
    Medium,
    Low,
}

impl Precision {
    #[must_use]
    pub const fn glsl(self) -> &'static str {
        match self {
            Precision::High => "highp",
            Precision::Medium => "mediump",
            Precision::Low => "lowp",
        }
    }
}

/// Limits and optional features reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capabilities {
    pub max_texture_units: u32,
    pub max_vertex_attributes: u32,
    pub max_texture_size: u32,
    /// Highest float precision supported in fragment shaders.
    pub precision: Precision,
    /// Maximum anisotropy, 0 when anisotropic filtering is unavailable.
    pub max_anisotropy: f32,
    pub standard_derivatives: bool,
    pub compressed_textures: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            max_texture_units: 16,
            max_vertex_attributes: 16,
            max_texture_size: 4096,
            precision: Precision::High,
            max_anisotropy: 0.0,
            standard_derivatives: true,
            compressed_textures: false,
        }
    }
}

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Vertex,
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Triangles,
    TriangleStrip,
    Lines,
    LineStrip,
    Points,
}

/// Element layout of a vertex attribute stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Uint16,
}

impl VertexFormat {
    #[must_use]
    pub const fn components(self) -> u32 {
        match self {
            VertexFormat::Float32 | VertexFormat::Uint16 => 1,
            VertexFormat::Float32x2 => 2,
            VertexFormat::Float32x3 => 3,
            VertexFormat::Float32x4 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullFace {
    None,
    Front,
    Back,
    FrontBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthFunc {
    Less,
    LessEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontFace {
    CounterClockwise,
    Clockwise,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u8 {
        const COLOR   = 1 << 0;
        const DEPTH   = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// Pixel data and sampling state for one texture upload.
#[derive(Debug, Clone, Copy)]
pub struct TextureUpload<'a> {
    pub width: u32,
    pub height: u32,
    pub rgba: &'a [u8],
    pub filter: TextureFilter,
    pub wrap: TextureWrap,
    pub mipmaps: bool,
    pub anisotropy: f32,
}

// ============================================================================
// Trait
// ============================================================================

pub trait GraphicsBackend {
    /// Queried at renderer construction and after every context restore.
    fn capabilities(&self) -> Capabilities;

    // --- Buffers ------------------------------------------------------------
    fn create_buffer(&mut self) -> Result<RawBuffer>;
    fn upload_buffer(&mut self, buffer: RawBuffer, target: BufferTarget, data: &[u8], usage: BufferUsage);
    fn delete_buffer(&mut self, buffer: RawBuffer);

    // --- Textures -----------------------------------------------------------
    fn create_texture(&mut self) -> Result<RawTexture>;
    fn upload_texture(&mut self, texture: RawTexture, upload: &TextureUpload<'_>);
    fn delete_texture(&mut self, texture: RawTexture);

    // --- Programs -----------------------------------------------------------
    /// Compiles both stages and links them.
    fn create_program(&mut self, vertex: &str, fragment: &str) -> Result<RawProgram>;
    fn delete_program(&mut self, program: RawProgram);
    /// `name` may address an array element (`pointLightColor[2]`).
    fn uniform_location(&mut self, program: RawProgram, name: &str) -> Option<UniformLocation>;
    fn attribute_location(&mut self, program: RawProgram, name: &str) -> Option<AttributeLocation>;

    // --- Draw submission ----------------------------------------------------
    fn use_program(&mut self, program: RawProgram);
    fn bind_buffer(&mut self, target: BufferTarget, buffer: RawBuffer);
    fn enable_attribute(&mut self, location: AttributeLocation);
    fn disable_attribute(&mut self, location: AttributeLocation);
    /// Binds `buffer` and points `location` at it.
    fn attribute_pointer(&mut self, location: AttributeLocation, buffer: RawBuffer, format: VertexFormat);
    fn bind_texture(&mut self, unit: u32, texture: RawTexture);
    fn set_uniform(&mut self, location: UniformLocation, value: &UniformData);
    fn set_sampler(&mut self, location: UniformLocation, unit: u32);
    fn draw_arrays(&mut self, primitive: Primitive, first: u32, count: u32);
    /// Draws with the bound `u16` index buffer.
    fn draw_elements(&mut self, primitive: Primitive, count: u32);

    // --- Fixed-function state -----------------------------------------------
    fn set_cull_face(&mut self, cull: CullFace);
    fn set_blending(&mut self, blending: Blending);
    fn set_depth_test(&mut self, enabled: bool);
    fn set_depth_write(&mut self, enabled: bool);
    fn set_depth_func(&mut self, func: DepthFunc);
    fn set_front_face(&mut self, face: FrontFace);
    fn set_line_width(&mut self, width: f32);
    fn set_clear_color(&mut self, color: Vec4);
    fn set_viewport(&mut self, viewport: Viewport);
    fn clear(&mut self, flags: ClearFlags);
}
