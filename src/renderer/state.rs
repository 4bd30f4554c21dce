//! Render State Cache
//!
//! Remembers the last fixed-function state handed to the backend and only
//! issues a call when the requested value differs. `None` means "unknown",
//! so the first set after construction or [`RenderStateCache::invalidate`]
//! always reaches the backend.

use glam::Vec4;

use super::backend::{AttributeLocation, CullFace, GraphicsBackend, RawProgram, Viewport};
use crate::assets::MeshHandle;
use crate::resources::Blending;
use crate::scene::EmitterId;
use crate::utils::WarnOnce;

/// Where the currently wired vertex buffers come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometrySource {
    Mesh(MeshHandle),
    SpriteQuad,
    Emitter(EmitterId),
}

/// Identity of a complete attribute binding. Attribute locations are per
/// program and buffer handles change when streams appear or vanish, so both
/// are part of the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryBinding {
    pub source: GeometrySource,
    pub program: RawProgram,
    pub revision: u32,
    pub wireframe: bool,
}

macro_rules! cached_setter {
    ($(#[$meta:meta])* $name:ident, $field:ident: $ty:ty => $call:ident) => {
        $(#[$meta])*
        pub fn $name<B: GraphicsBackend>(&mut self, backend: &mut B, value: $ty) -> bool {
            if self.$field == Some(value) {
                return false;
            }
            backend.$call(value);
            self.$field = Some(value);
            true
        }
    };
}

#[derive(Debug)]
pub struct RenderStateCache {
    cull_face: Option<CullFace>,
    blending: Option<Blending>,
    depth_test: Option<bool>,
    depth_write: Option<bool>,
    line_width: Option<f32>,
    clear_color: Option<Vec4>,
    viewport: Option<Viewport>,

    program: Option<RawProgram>,
    geometry: Option<GeometryBinding>,
    enabled_attributes: u64,

    next_texture_unit: u32,
    max_texture_units: u32,
}

impl RenderStateCache {
    #[must_use]
    pub fn new(max_texture_units: u32) -> Self {
        Self {
            cull_face: None,
            blending: None,
            depth_test: None,
            depth_write: None,
            line_width: None,
            clear_color: None,
            viewport: None,
            program: None,
            geometry: None,
            enabled_attributes: 0,
            next_texture_unit: 0,
            max_texture_units,
        }
    }

    cached_setter!(set_cull_face, cull_face: CullFace => set_cull_face);
    cached_setter!(set_blending, blending: Blending => set_blending);
    cached_setter!(set_depth_test, depth_test: bool => set_depth_test);
    cached_setter!(set_depth_write, depth_write: bool => set_depth_write);
    cached_setter!(set_line_width, line_width: f32 => set_line_width);
    cached_setter!(set_clear_color, clear_color: Vec4 => set_clear_color);
    cached_setter!(set_viewport, viewport: Viewport => set_viewport);
    cached_setter!(
        /// Returns `true` when the program actually switched; callers use
        /// that to force their uniform writes.
        use_program, program: RawProgram => use_program
    );

    /// Records `binding` as wired. Returns `false` when it already was, in
    /// which case the caller skips all attribute setup.
    pub fn bind_geometry(&mut self, binding: GeometryBinding) -> bool {
        if self.geometry == Some(binding) {
            return false;
        }
        self.geometry = Some(binding);
        true
    }

    /// Enables exactly the attribute locations in `wanted`.
    pub fn apply_attributes<B: GraphicsBackend>(&mut self, backend: &mut B, wanted: &[AttributeLocation]) {
        let mask = wanted
            .iter()
            .filter(|loc| loc.0 < 64)
            .fold(0u64, |mask, loc| mask | (1 << loc.0));

        let to_enable = mask & !self.enabled_attributes;
        let to_disable = self.enabled_attributes & !mask;
        for bit in 0..64 {
            if to_enable & (1 << bit) != 0 {
                backend.enable_attribute(AttributeLocation(bit));
            }
            if to_disable & (1 << bit) != 0 {
                backend.disable_attribute(AttributeLocation(bit));
            }
        }
        self.enabled_attributes = mask;
    }

    /// Hands out the next texture unit of the current draw, or `None` once
    /// the backend limit is reached (reported once).
    pub fn allocate_texture_unit(&mut self, warnings: &mut WarnOnce) -> Option<u32> {
        let unit = self.next_texture_unit;
        if unit >= self.max_texture_units {
            let max = self.max_texture_units;
            warnings.warn("texture-units", || {
                format!("Draw needs more than {max} texture units; extra textures are not bound")
            });
            return None;
        }
        self.next_texture_unit += 1;
        Some(unit)
    }

    #[inline]
    pub fn reset_texture_units(&mut self) {
        self.next_texture_unit = 0;
    }

    pub fn set_max_texture_units(&mut self, max: u32) {
        self.max_texture_units = max;
    }

    /// Forgets every cached value (context loss).
    pub fn invalidate(&mut self) {
        *self = Self::new(self.max_texture_units);
    }

    /// Drops the geometry identity so the next draw rebinds attributes.
    pub fn forget_geometry(&mut self) {
        self.geometry = None;
    }

    #[must_use]
    pub fn cull_face(&self) -> Option<CullFace> {
        self.cull_face
    }

    #[must_use]
    pub fn blending(&self) -> Option<Blending> {
        self.blending
    }

    #[must_use]
    pub fn line_width(&self) -> Option<f32> {
        self.line_width
    }

    #[must_use]
    pub fn clear_color(&self) -> Option<Vec4> {
        self.clear_color
    }

    #[must_use]
    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    #[must_use]
    pub fn program(&self) -> Option<RawProgram> {
        self.program
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::headless::{BackendCall, HeadlessBackend};

    #[test]
    fn repeated_value_issues_one_call() {
        let mut backend = HeadlessBackend::default();
        let mut state = RenderStateCache::new(8);

        assert!(state.set_cull_face(&mut backend, CullFace::Back));
        assert!(!state.set_cull_face(&mut backend, CullFace::Back));
        assert!(state.set_cull_face(&mut backend, CullFace::None));
        assert_eq!(backend.count(|c| matches!(c, BackendCall::SetCullFace(_))), 2);
    }

    #[test]
    fn invalidate_forgets_values() {
        let mut backend = HeadlessBackend::default();
        let mut state = RenderStateCache::new(8);
        state.set_blending(&mut backend, Blending::Additive);
        state.invalidate();
        assert!(state.set_blending(&mut backend, Blending::Additive));
    }

    #[test]
    fn attributes_diff_against_enabled_set() {
        let mut backend = HeadlessBackend::default();
        let mut state = RenderStateCache::new(8);

        state.apply_attributes(&mut backend, &[AttributeLocation(0), AttributeLocation(1)]);
        backend.clear_calls();
        state.apply_attributes(&mut backend, &[AttributeLocation(1), AttributeLocation(2)]);

        assert_eq!(
            backend.calls(),
            &[
                BackendCall::DisableAttribute(AttributeLocation(0)),
                BackendCall::EnableAttribute(AttributeLocation(2)),
            ]
        );
    }

    #[test]
    fn texture_units_are_capped_and_reported_once() {
        let mut state = RenderStateCache::new(2);
        let mut warnings = WarnOnce::new();

        assert_eq!(state.allocate_texture_unit(&mut warnings), Some(0));
        assert_eq!(state.allocate_texture_unit(&mut warnings), Some(1));
        assert_eq!(state.allocate_texture_unit(&mut warnings), None);
        assert_eq!(state.allocate_texture_unit(&mut warnings), None);
        assert_eq!(warnings.len(), 1);

        state.reset_texture_units();
        assert_eq!(state.allocate_texture_unit(&mut warnings), Some(0));
    }
}
