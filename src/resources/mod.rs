//! Resources Module
//!
//! CPU-side asset types consumed by the renderer:
//!
//! - [`Mesh`]: vertex/index streams with per-stream dirty flags
//! - [`Material`]: shader reference, uniform values, fixed-function hints
//! - [`Shader`]: GLSL template and feature toggles
//! - [`Texture`]: RGBA8 image and sampling parameters
//! - [`ShaderDefines`]: interned `#define` set of a program permutation

pub mod material;
pub mod mesh;
pub mod shader;
pub mod shader_defines;
pub mod texture;
pub mod uniforms;

pub use material::{Blending, Material, Side};
pub use mesh::{Mesh, Streams};
pub use shader::Shader;
pub use shader_defines::ShaderDefines;
pub use texture::{Texture, TextureFilter, TextureWrap};
pub use uniforms::{UniformData, UniformValue};
