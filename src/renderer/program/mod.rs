//! Shader programs: permutation parameters, source generation, declaration
//! scanning and the ref-counted program cache.

pub mod cache;
pub mod generator;
pub mod layout;
pub mod params;

pub use cache::{CompiledProgram, ProgramCache, ProgramId, ProgramUniform, SYSTEM_UNIFORMS};
pub use generator::{GeneratedSource, ShaderGenerator};
pub use layout::{GlslType, ProgramLayout, UniformDecl};
pub use params::{GeometryKind, ProgramKey, ProgramParameters};

use crate::assets::ShaderHandle;

/// A material's reference into the program cache.
///
/// The shader handle and parameters it was resolved with act as a cheap
/// first-level key: while they match the current draw and the generation is
/// current, the program is reused without hashing any source text.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramBinding {
    pub(crate) id: ProgramId,
    pub(crate) shader: ShaderHandle,
    pub(crate) params: ProgramParameters,
    pub(crate) generation: u32,
}

impl ProgramBinding {
    #[inline]
    #[must_use]
    pub fn id(&self) -> ProgramId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn parameters(&self) -> &ProgramParameters {
        &self.params
    }

    /// Whether this binding was resolved for `shader` under `params`.
    #[inline]
    #[must_use]
    pub fn matches(&self, shader: ShaderHandle, params: &ProgramParameters) -> bool {
        self.shader == shader && &self.params == params
    }
}
