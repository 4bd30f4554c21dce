//! Call-recording backend with no GPU behind it.
//!
//! Every trait call is appended to a log so tests can assert on exactly what
//! the renderer issued. Uniform and attribute locations are answered from
//! the declarations the linked sources keep after preprocessing, which
//! mirrors how a driver optimizes out undeclared names.

use glam::Vec4;
use rustc_hash::{FxHashMap, FxHashSet};

use super::backend::{
    AttributeLocation, BufferTarget, BufferUsage, Capabilities, ClearFlags, CullFace, DepthFunc, FrontFace,
    GraphicsBackend, Primitive, RawBuffer, RawProgram, RawTexture, TextureUpload, UniformLocation, VertexFormat,
    Viewport,
};
use super::program::layout::ProgramLayout;
use crate::errors::{KilnError, Result};
use crate::resources::{Blending, UniformData};

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    CreateBuffer(RawBuffer),
    UploadBuffer {
        buffer: RawBuffer,
        target: BufferTarget,
        bytes: usize,
        usage: BufferUsage,
    },
    DeleteBuffer(RawBuffer),
    CreateTexture(RawTexture),
    UploadTexture {
        texture: RawTexture,
        width: u32,
        height: u32,
    },
    DeleteTexture(RawTexture),
    CreateProgram(RawProgram),
    DeleteProgram(RawProgram),
    UseProgram(RawProgram),
    BindBuffer {
        target: BufferTarget,
        buffer: RawBuffer,
    },
    EnableAttribute(AttributeLocation),
    DisableAttribute(AttributeLocation),
    AttributePointer {
        location: AttributeLocation,
        buffer: RawBuffer,
        format: VertexFormat,
    },
    BindTexture {
        unit: u32,
        texture: RawTexture,
    },
    SetUniform {
        location: UniformLocation,
        value: UniformData,
    },
    SetSampler {
        location: UniformLocation,
        unit: u32,
    },
    DrawArrays {
        primitive: Primitive,
        first: u32,
        count: u32,
    },
    DrawElements {
        primitive: Primitive,
        count: u32,
    },
    SetCullFace(CullFace),
    SetBlending(Blending),
    SetDepthTest(bool),
    SetDepthWrite(bool),
    SetDepthFunc(DepthFunc),
    SetFrontFace(FrontFace),
    SetLineWidth(f32),
    SetClearColor(Vec4),
    SetViewport(Viewport),
    Clear(ClearFlags),
}

impl BackendCall {
    /// Fixed-function state changes (cull, blend, depth, line width, clear
    /// colour, viewport).
    #[must_use]
    pub fn is_state_change(&self) -> bool {
        matches!(
            self,
            BackendCall::SetCullFace(_)
                | BackendCall::SetBlending(_)
                | BackendCall::SetDepthTest(_)
                | BackendCall::SetDepthWrite(_)
                | BackendCall::SetDepthFunc(_)
                | BackendCall::SetFrontFace(_)
                | BackendCall::SetLineWidth(_)
                | BackendCall::SetClearColor(_)
                | BackendCall::SetViewport(_)
        )
    }

    #[must_use]
    pub fn is_draw(&self) -> bool {
        matches!(self, BackendCall::DrawArrays { .. } | BackendCall::DrawElements { .. })
    }
}

struct LinkedProgram {
    vertex: String,
    fragment: String,
    layout: ProgramLayout,
}

/// In-memory [`GraphicsBackend`] that records calls.
pub struct HeadlessBackend {
    capabilities: Capabilities,
    next_handle: u32,
    calls: Vec<BackendCall>,

    programs: FxHashMap<RawProgram, LinkedProgram>,
    uniform_locations: FxHashMap<(RawProgram, String), UniformLocation>,
    attribute_locations: FxHashMap<(RawProgram, String), AttributeLocation>,
    live_buffers: FxHashSet<RawBuffer>,
    live_textures: FxHashSet<RawTexture>,

    /// Next `create_program` fails with this info log.
    pub fail_next_link: Option<String>,
    /// While set, every `create_buffer` fails.
    pub fail_buffers: bool,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new(Capabilities::default())
    }
}

impl HeadlessBackend {
    #[must_use]
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            next_handle: 1,
            calls: Vec::new(),
            programs: FxHashMap::default(),
            uniform_locations: FxHashMap::default(),
            attribute_locations: FxHashMap::default(),
            live_buffers: FxHashSet::default(),
            live_textures: FxHashSet::default(),
            fail_next_link: None,
            fail_buffers: false,
        }
    }

    /// Replaces the capabilities reported from now on (takes effect on the
    /// renderer's next query, e.g. after a context restore).
    pub fn set_capabilities(&mut self, capabilities: Capabilities) {
        self.capabilities = capabilities;
    }

    #[must_use]
    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls.iter().filter(|c| predicate(c)).count()
    }

    #[must_use]
    pub fn state_changes(&self) -> usize {
        self.count(BackendCall::is_state_change)
    }

    #[must_use]
    pub fn draw_calls(&self) -> usize {
        self.count(BackendCall::is_draw)
    }

    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.live_buffers.len()
    }

    #[must_use]
    pub fn live_textures(&self) -> usize {
        self.live_textures.len()
    }

    #[must_use]
    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    #[must_use]
    pub fn is_buffer_live(&self, buffer: RawBuffer) -> bool {
        self.live_buffers.contains(&buffer)
    }

    /// Final `(vertex, fragment)` sources of a linked program.
    #[must_use]
    pub fn program_source(&self, program: RawProgram) -> Option<(&str, &str)> {
        self.programs
            .get(&program)
            .map(|p| (p.vertex.as_str(), p.fragment.as_str()))
    }

    /// Name a location was resolved from, if any.
    #[must_use]
    pub fn uniform_name(&self, location: UniformLocation) -> Option<&str> {
        self.uniform_locations
            .iter()
            .find(|(_, l)| **l == location)
            .map(|((_, name), _)| name.as_str())
    }

    /// Values most recently written to the uniform named `name`, across all
    /// programs, in call order.
    #[must_use]
    pub fn uniform_writes(&self, name: &str) -> Vec<UniformData> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::SetUniform { location, value } if self.uniform_name(*location) == Some(name) => {
                    Some(*value)
                }
                _ => None,
            })
            .collect()
    }

    fn next(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

/// Splits `name[3]` into `("name", Some(3))`.
fn split_element(name: &str) -> (&str, Option<u32>) {
    match name.split_once('[') {
        Some((base, rest)) => (base, rest.trim_end_matches(']').parse().ok()),
        None => (name, None),
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn create_buffer(&mut self) -> Result<RawBuffer> {
        if self.fail_buffers {
            return Err(KilnError::BufferCreation("headless backend: out of memory".into()));
        }
        let buffer = RawBuffer(self.next());
        self.live_buffers.insert(buffer);
        self.calls.push(BackendCall::CreateBuffer(buffer));
        Ok(buffer)
    }

    fn upload_buffer(&mut self, buffer: RawBuffer, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        self.calls.push(BackendCall::UploadBuffer {
            buffer,
            target,
            bytes: data.len(),
            usage,
        });
    }

    fn delete_buffer(&mut self, buffer: RawBuffer) {
        self.live_buffers.remove(&buffer);
        self.calls.push(BackendCall::DeleteBuffer(buffer));
    }

    fn create_texture(&mut self) -> Result<RawTexture> {
        let texture = RawTexture(self.next());
        self.live_textures.insert(texture);
        self.calls.push(BackendCall::CreateTexture(texture));
        Ok(texture)
    }

    fn upload_texture(&mut self, texture: RawTexture, upload: &TextureUpload<'_>) {
        self.calls.push(BackendCall::UploadTexture {
            texture,
            width: upload.width,
            height: upload.height,
        });
    }

    fn delete_texture(&mut self, texture: RawTexture) {
        self.live_textures.remove(&texture);
        self.calls.push(BackendCall::DeleteTexture(texture));
    }

    fn create_program(&mut self, vertex: &str, fragment: &str) -> Result<RawProgram> {
        if let Some(log) = self.fail_next_link.take() {
            return Err(KilnError::ProgramLink { log });
        }
        for (stage, source) in [("vertex", vertex), ("fragment", fragment)] {
            if !source.contains("void main") {
                return Err(KilnError::ProgramLink {
                    log: format!("{stage} shader has no entry point"),
                });
            }
        }

        let program = RawProgram(self.next());
        self.programs.insert(
            program,
            LinkedProgram {
                vertex: vertex.to_string(),
                fragment: fragment.to_string(),
                layout: ProgramLayout::parse(vertex, fragment),
            },
        );
        self.calls.push(BackendCall::CreateProgram(program));
        Ok(program)
    }

    fn delete_program(&mut self, program: RawProgram) {
        self.programs.remove(&program);
        self.uniform_locations.retain(|(p, _), _| *p != program);
        self.attribute_locations.retain(|(p, _), _| *p != program);
        self.calls.push(BackendCall::DeleteProgram(program));
    }

    fn uniform_location(&mut self, program: RawProgram, name: &str) -> Option<UniformLocation> {
        let key = (program, name.to_string());
        if let Some(location) = self.uniform_locations.get(&key) {
            return Some(*location);
        }

        let linked = self.programs.get(&program)?;
        let (base, index) = split_element(name);
        let decl = linked.layout.uniform(base)?;
        let valid = match index {
            Some(i) => i < decl.len(),
            None => true,
        };
        if !valid {
            return None;
        }

        let location = UniformLocation(self.next());
        self.uniform_locations.insert(key, location);
        Some(location)
    }

    fn attribute_location(&mut self, program: RawProgram, name: &str) -> Option<AttributeLocation> {
        let key = (program, name.to_string());
        if let Some(location) = self.attribute_locations.get(&key) {
            return Some(*location);
        }

        let linked = self.programs.get(&program)?;
        let index = linked.layout.attributes().iter().position(|a| a.name == name)?;
        let location = AttributeLocation(index as u32);
        self.attribute_locations.insert(key, location);
        Some(location)
    }

    fn use_program(&mut self, program: RawProgram) {
        self.calls.push(BackendCall::UseProgram(program));
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: RawBuffer) {
        self.calls.push(BackendCall::BindBuffer { target, buffer });
    }

    fn enable_attribute(&mut self, location: AttributeLocation) {
        self.calls.push(BackendCall::EnableAttribute(location));
    }

    fn disable_attribute(&mut self, location: AttributeLocation) {
        self.calls.push(BackendCall::DisableAttribute(location));
    }

    fn attribute_pointer(&mut self, location: AttributeLocation, buffer: RawBuffer, format: VertexFormat) {
        self.calls.push(BackendCall::AttributePointer {
            location,
            buffer,
            format,
        });
    }

    fn bind_texture(&mut self, unit: u32, texture: RawTexture) {
        self.calls.push(BackendCall::BindTexture { unit, texture });
    }

    fn set_uniform(&mut self, location: UniformLocation, value: &UniformData) {
        self.calls.push(BackendCall::SetUniform {
            location,
            value: *value,
        });
    }

    fn set_sampler(&mut self, location: UniformLocation, unit: u32) {
        self.calls.push(BackendCall::SetSampler { location, unit });
    }

    fn draw_arrays(&mut self, primitive: Primitive, first: u32, count: u32) {
        self.calls.push(BackendCall::DrawArrays {
            primitive,
            first,
            count,
        });
    }

    fn draw_elements(&mut self, primitive: Primitive, count: u32) {
        self.calls.push(BackendCall::DrawElements { primitive, count });
    }

    fn set_cull_face(&mut self, cull: CullFace) {
        self.calls.push(BackendCall::SetCullFace(cull));
    }

    fn set_blending(&mut self, blending: Blending) {
        self.calls.push(BackendCall::SetBlending(blending));
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.calls.push(BackendCall::SetDepthTest(enabled));
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.calls.push(BackendCall::SetDepthWrite(enabled));
    }

    fn set_depth_func(&mut self, func: DepthFunc) {
        self.calls.push(BackendCall::SetDepthFunc(func));
    }

    fn set_front_face(&mut self, face: FrontFace) {
        self.calls.push(BackendCall::SetFrontFace(face));
    }

    fn set_line_width(&mut self, width: f32) {
        self.calls.push(BackendCall::SetLineWidth(width));
    }

    fn set_clear_color(&mut self, color: Vec4) {
        self.calls.push(BackendCall::SetClearColor(color));
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.calls.push(BackendCall::SetViewport(viewport));
    }

    fn clear(&mut self, flags: ClearFlags) {
        self.calls.push(BackendCall::Clear(flags));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locations_follow_declarations() {
        let mut backend = HeadlessBackend::default();
        let vs = "attribute vec3 position;\nuniform mat4 bone[2];\nvoid main() {}";
        let fs = "uniform vec3 tint;\nvoid main() {}";
        let program = backend.create_program(vs, fs).unwrap();

        assert!(backend.uniform_location(program, "tint").is_some());
        assert!(backend.uniform_location(program, "bone[1]").is_some());
        assert!(backend.uniform_location(program, "bone[2]").is_none());
        assert!(backend.uniform_location(program, "missing").is_none());
        assert_eq!(
            backend.uniform_location(program, "tint"),
            backend.uniform_location(program, "tint")
        );
        assert!(backend.attribute_location(program, "position").is_some());
    }

    #[test]
    fn injected_link_failure() {
        let mut backend = HeadlessBackend::default();
        backend.fail_next_link = Some("boom".into());
        let err = backend.create_program("void main() {}", "void main() {}").unwrap_err();
        assert!(matches!(err, KilnError::ProgramLink { log } if log == "boom"));
        assert!(backend.create_program("void main() {}", "void main() {}").is_ok());
    }
}
