//! Shader Permutation Cache
//!
//! Compiled programs are stored in a `SlotMap` and deduplicated by
//! [`ProgramKey`]. A hit bumps the reference count of the existing program;
//! a miss generates the final sources, links them and registers the result
//! with a count of one.
//!
//! Releasing never destroys anything. A program whose count reached zero
//! stays resolvable until [`ProgramCache::reap`] runs.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use super::generator::ShaderGenerator;
use super::layout::{ProgramLayout, UniformDecl};
use super::params::{ProgramKey, ProgramParameters};
use super::ProgramBinding;
use crate::assets::ShaderHandle;
use crate::errors::Result;
use crate::renderer::backend::{AttributeLocation, GraphicsBackend, RawProgram, UniformLocation};
use crate::resources::{Shader, UniformData};
use crate::scene::LightKind;
use crate::utils::interner;

new_key_type! {
    pub struct ProgramId;
}

/// Uniforms the renderer binds itself. Everything else a program declares
/// must come from the material.
pub const SYSTEM_UNIFORMS: &[&str] = &[
    "modelMatrix",
    "modelViewMatrix",
    "projectionMatrix",
    "viewMatrix",
    "normalMatrix",
    "cameraPosition",
    "ambient",
    "bone",
    "size",
    "crop",
    "particleSizeRatio",
    "particleAttenuation",
    "pointLightColor",
    "pointLightPosition",
    "pointLightDistance",
    "directionalLightColor",
    "directionalLightDirection",
    "spotLightColor",
    "spotLightPosition",
    "spotLightDirection",
    "spotLightDistance",
    "spotLightAngleCos",
    "spotLightExponent",
    "hemiLightColor",
    "hemiLightDirection",
];

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct UniformSlot {
    location: Option<UniformLocation>,
    last: Option<UniformData>,
}

/// A declared uniform with one location per array element.
#[derive(Debug, Clone)]
pub struct ProgramUniform {
    decl: UniformDecl,
    slots: SmallVec<[UniformSlot; 1]>,
}

impl ProgramUniform {
    #[must_use]
    pub fn decl(&self) -> &UniformDecl {
        &self.decl
    }

    /// Whether any element survived linking.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.slots.iter().any(|s| s.location.is_some())
    }

    #[must_use]
    pub fn location(&self, index: u32) -> Option<UniformLocation> {
        self.slots.get(index as usize).and_then(|s| s.location)
    }
}

/// A linked program plus its resolved declarations.
#[derive(Debug)]
pub struct CompiledProgram {
    raw: RawProgram,
    key: ProgramKey,
    parameters: ProgramParameters,
    uniforms: FxHashMap<String, ProgramUniform>,
    attributes: FxHashMap<String, AttributeLocation>,
    custom_uniforms: Arc<[String]>,
    ref_count: u32,
}

impl CompiledProgram {
    fn link<B: GraphicsBackend>(
        backend: &mut B,
        raw: RawProgram,
        key: ProgramKey,
        parameters: ProgramParameters,
        layout: &ProgramLayout,
    ) -> Self {
        let mut uniforms = FxHashMap::default();
        let mut custom_uniforms = Vec::new();

        for decl in layout.uniforms() {
            let slots = (0..decl.len())
                .map(|i| UniformSlot {
                    location: backend.uniform_location(raw, &decl.element_name(i)),
                    last: None,
                })
                .collect();
            let uniform = ProgramUniform {
                decl: decl.clone(),
                slots,
            };
            if !uniform.is_active() {
                continue;
            }
            if !SYSTEM_UNIFORMS.contains(&decl.name.as_str()) {
                custom_uniforms.push(decl.name.clone());
            }
            uniforms.insert(decl.name.clone(), uniform);
        }

        let attributes = layout
            .attributes()
            .iter()
            .filter_map(|a| backend.attribute_location(raw, &a.name).map(|loc| (a.name.clone(), loc)))
            .collect();

        Self {
            raw,
            key,
            parameters,
            uniforms,
            attributes,
            custom_uniforms: custom_uniforms.into(),
            ref_count: 1,
        }
    }

    #[inline]
    #[must_use]
    pub fn raw(&self) -> RawProgram {
        self.raw
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> ProgramKey {
        self.key
    }

    #[inline]
    #[must_use]
    pub fn parameters(&self) -> &ProgramParameters {
        &self.parameters
    }

    #[inline]
    #[must_use]
    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    #[inline]
    #[must_use]
    pub fn declares(&self, name: &str) -> bool {
        self.uniforms.contains_key(name)
    }

    #[must_use]
    pub fn uniform(&self, name: &str) -> Option<&ProgramUniform> {
        self.uniforms.get(name)
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<AttributeLocation> {
        self.attributes.get(name).copied()
    }

    /// Declared uniforms the material has to supply.
    #[must_use]
    pub fn custom_uniforms(&self) -> &[String] {
        &self.custom_uniforms
    }

    pub(crate) fn shared_custom_uniforms(&self) -> Arc<[String]> {
        Arc::clone(&self.custom_uniforms)
    }

    /// `Some(capacity)` when the program declares the light arrays of
    /// `kind`, `None` when it does not.
    #[must_use]
    pub fn light_capacity(&self, kind: LightKind) -> Option<u32> {
        let color = match kind {
            LightKind::Point => "pointLightColor",
            LightKind::Directional => "directionalLightColor",
            LightKind::Spot => "spotLightColor",
            LightKind::Hemi => "hemiLightColor",
        };
        let declared = self.uniforms.get(color)?.decl.len();
        let allocated = self.parameters.lights.map_or(0, |l| l.capacity(kind));
        Some(declared.min(allocated))
    }

    /// Writes element `index` of `name`. Skipped when the program does not
    /// declare it, or when `value` equals the last write and `force` is off.
    /// Returns whether a backend call was issued.
    pub(crate) fn write_uniform<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        name: &str,
        index: u32,
        value: UniformData,
        force: bool,
    ) -> bool {
        let Some(slot) = self
            .uniforms
            .get_mut(name)
            .and_then(|u| u.slots.get_mut(index as usize))
        else {
            return false;
        };
        let Some(location) = slot.location else {
            return false;
        };
        if !force && slot.last == Some(value) {
            return false;
        }
        backend.set_uniform(location, &value);
        slot.last = Some(value);
        true
    }

    pub(crate) fn write_sampler<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        name: &str,
        unit: u32,
        force: bool,
    ) -> bool {
        let Some(slot) = self.uniforms.get_mut(name).and_then(|u| u.slots.first_mut()) else {
            return false;
        };
        let Some(location) = slot.location else {
            return false;
        };
        let value = UniformData::Int(unit as i32);
        if !force && slot.last == Some(value) {
            return false;
        }
        backend.set_sampler(location, unit);
        slot.last = Some(value);
        true
    }
}

pub struct ProgramCache {
    programs: SlotMap<ProgramId, CompiledProgram>,
    lookup: FxHashMap<ProgramKey, ProgramId>,
    generator: ShaderGenerator,
    /// Bumped on context loss; bindings from older generations are stale.
    generation: u32,
}

impl ProgramCache {
    pub fn new() -> Result<Self> {
        interner::preload_permutation_defines();
        Ok(Self {
            programs: SlotMap::with_key(),
            lookup: FxHashMap::default(),
            generator: ShaderGenerator::new()?,
            generation: 0,
        })
    }

    /// Returns the program for `shader` under `params`, compiling it on a
    /// miss. Every successful call adds one reference.
    pub fn get_or_build<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        shader: &Shader,
        params: &ProgramParameters,
    ) -> Result<ProgramId> {
        let key = params.key(shader);

        if let Some(&id) = self.lookup.get(&key)
            && let Some(program) = self.programs.get_mut(id)
        {
            program.ref_count += 1;
            log::trace!("Program cache hit for '{}' (refs: {})", shader.name, program.ref_count);
            return Ok(id);
        }

        let source = self.generator.generate(shader, params)?;
        let raw = backend.create_program(&source.vertex, &source.fragment)?;
        let layout = ProgramLayout::parse(&source.vertex, &source.fragment);
        let program = CompiledProgram::link(backend, raw, key, params.clone(), &layout);

        log::debug!(
            "Compiled program for shader '{}' ({} uniforms, {} attributes)",
            shader.name,
            program.uniforms.len(),
            program.attributes.len()
        );

        let id = self.programs.insert(program);
        self.lookup.insert(key, id);
        Ok(id)
    }

    #[must_use]
    pub fn binding(&self, id: ProgramId, shader: ShaderHandle, params: ProgramParameters) -> ProgramBinding {
        ProgramBinding {
            id,
            shader,
            params,
            generation: self.generation,
        }
    }

    /// Drops one reference. The program stays usable until reaped.
    pub fn release(&mut self, id: ProgramId) -> bool {
        match self.programs.get_mut(id) {
            Some(program) if program.ref_count > 0 => {
                program.ref_count -= 1;
                true
            }
            _ => false,
        }
    }

    /// Destroys every program with no references. Returns how many went.
    pub fn reap<B: GraphicsBackend>(&mut self, backend: &mut B) -> usize {
        let dead: SmallVec<[ProgramId; 8]> = self
            .programs
            .iter()
            .filter(|(_, p)| p.ref_count == 0)
            .map(|(id, _)| id)
            .collect();

        for &id in &dead {
            if let Some(program) = self.programs.remove(id) {
                self.lookup.remove(&program.key);
                backend.delete_program(program.raw);
            }
        }

        if !dead.is_empty() {
            log::debug!("Reaped {} unreferenced programs", dead.len());
        }
        dead.len()
    }

    /// Forgets every program without touching the backend (its handles died
    /// with the context).
    pub fn invalidate(&mut self) {
        self.programs.clear();
        self.lookup.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    /// Deletes every program regardless of references.
    pub fn destroy_all<B: GraphicsBackend>(&mut self, backend: &mut B) {
        for (_, program) in self.programs.drain() {
            backend.delete_program(program.raw);
        }
        self.lookup.clear();
    }

    #[inline]
    #[must_use]
    pub fn get(&self, id: ProgramId) -> Option<&CompiledProgram> {
        self.programs.get(id)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: ProgramId) -> Option<&mut CompiledProgram> {
        self.programs.get_mut(id)
    }

    #[must_use]
    pub fn ref_count(&self, id: ProgramId) -> Option<u32> {
        self.programs.get(id).map(|p| p.ref_count)
    }

    #[must_use]
    pub fn find(&self, key: ProgramKey) -> Option<ProgramId> {
        self.lookup.get(&key).copied()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// A binding is current when it was issued in this generation and its
    /// program still exists.
    #[must_use]
    pub fn is_current(&self, binding: &ProgramBinding) -> bool {
        binding.generation == self.generation && self.programs.contains_key(binding.id)
    }
}
