use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::uniforms::UniformValue;
use crate::assets::ShaderHandle;
use crate::renderer::program::ProgramBinding;

/// Fixed-function blend modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Blending {
    None,
    #[default]
    Default,
    Additive,
    Subtractive,
    Multiply,
}

/// Which faces a material draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Side {
    #[default]
    Front,
    Back,
    Both,
}

/// Shader template plus per-material uniform values and fixed-function
/// hints.
///
/// The compiled program is resolved lazily by the renderer and cached on
/// the material until [`Material::mark_needs_update`] is called or the
/// permutation parameters computed for a draw change.
#[derive(Debug)]
pub struct Material {
    pub name: String,
    pub shader: ShaderHandle,
    uniforms: FxHashMap<String, UniformValue>,

    pub blending: Blending,
    pub side: Side,
    pub wireframe: bool,
    pub line_width: f32,

    needs_update: bool,
    pub(crate) program: Option<ProgramBinding>,
}

impl Material {
    #[must_use]
    pub fn new(name: impl Into<String>, shader: ShaderHandle) -> Self {
        Self {
            name: name.into(),
            shader,
            uniforms: FxHashMap::default(),
            blending: Blending::Default,
            side: Side::Front,
            wireframe: false,
            line_width: 1.0,
            needs_update: true,
            program: None,
        }
    }

    /// Builder-style uniform assignment.
    #[must_use]
    pub fn with_uniform(mut self, name: impl Into<String>, value: impl Into<UniformValue>) -> Self {
        self.set_uniform(name, value);
        self
    }

    /// Sets a uniform value. Adding or removing `normalMap`/`bumpMap`
    /// changes the permutation and flags the material for a rebuild.
    pub fn set_uniform(&mut self, name: impl Into<String>, value: impl Into<UniformValue>) {
        let name = name.into();
        if is_permutation_uniform(&name) && !self.uniforms.contains_key(&name) {
            self.needs_update = true;
        }
        self.uniforms.insert(name, value.into());
    }

    pub fn remove_uniform(&mut self, name: &str) -> Option<UniformValue> {
        let removed = self.uniforms.remove(name);
        if removed.is_some() && is_permutation_uniform(name) {
            self.needs_update = true;
        }
        removed
    }

    #[inline]
    #[must_use]
    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.get(name)
    }

    #[inline]
    #[must_use]
    pub fn has_uniform(&self, name: &str) -> bool {
        self.uniforms.contains_key(name)
    }

    pub fn uniforms(&self) -> impl Iterator<Item = (&str, &UniformValue)> {
        self.uniforms.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Forces the program to be re-resolved on the next draw.
    pub fn mark_needs_update(&mut self) {
        self.needs_update = true;
    }

    #[inline]
    #[must_use]
    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    #[inline]
    pub(crate) fn clear_needs_update(&mut self) {
        self.needs_update = false;
    }

    /// Whether the renderer currently holds a program reference for this
    /// material.
    #[inline]
    #[must_use]
    pub fn has_program(&self) -> bool {
        self.program.is_some()
    }
}

fn is_permutation_uniform(name: &str) -> bool {
    matches!(name, "normalMap" | "bumpMap")
}
