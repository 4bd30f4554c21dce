//! Forward Renderer
//!
//! Draws a [`Scene`] through a [`GraphicsBackend`], one draw call per
//! renderable component, with no cross-material batching.
//!
//! # Frame
//!
//! ```text
//! host: scene.update()
//!   └─ pre_render(camera)   clear colour diff, camera hook, auto clear
//!   └─ render(camera)       per renderable group, per component:
//!        ├─ refresh view-dependent matrices
//!        ├─ upload dirty streams                (BufferCache)
//!        ├─ resolve the program permutation     (ProgramCache)
//!        ├─ bind program, geometry and uniforms (RenderStateCache, binder)
//!        └─ draw
//! ```
//!
//! A failing component (missing asset, material without a required uniform,
//! backend creation failure) is skipped and reported in the [`FrameReport`];
//! the rest of the frame still draws.
//!
//! # Context loss
//!
//! [`Renderer::on_context_lost`] drops every cached backend handle without
//! touching the backend and suspends drawing. After
//! [`Renderer::on_context_restored`] programs, buffers and textures are
//! rebuilt lazily by the next draws that need them.

pub mod backend;
pub mod binder;
pub mod buffers;
pub mod headless;
pub mod lights;
pub mod program;
pub mod settings;
pub mod state;
pub mod textures;

use glam::{Mat3, Mat4, Vec3, Vec4};
use smallvec::SmallVec;

pub use backend::{
    AttributeLocation, BufferTarget, BufferUsage, Capabilities, ClearFlags, CullFace, DepthFunc, FrontFace,
    GraphicsBackend, Precision, Primitive, RawBuffer, RawProgram, RawTexture, TextureUpload, UniformLocation,
    VertexFormat, Viewport,
};
pub use binder::{CameraView, FrameContext, LightSample, ObjectMatrices};
pub use buffers::{BufferCache, EmitterBuffers, GpuBuffer, GpuBufferSet};
pub use headless::{BackendCall, HeadlessBackend};
pub use lights::{LightAllocator, LightCounts};
pub use program::{CompiledProgram, ProgramBinding, ProgramCache, ProgramId, ProgramParameters};
pub use settings::RendererSettings;
pub use state::{GeometryBinding, GeometrySource, RenderStateCache};
pub use textures::TextureCache;

use self::binder::TextureBindings;
use crate::assets::{Assets, MeshHandle, ShaderHandle};
use crate::errors::{KilnError, Result};
use crate::resources::{Blending, Material, Shader, Side};
use crate::scene::{ComponentType, EmitterId, EntityKey, Scene, Transform};
use crate::utils::WarnOnce;

/// Outcome of one [`Renderer::render`] call.
#[derive(Debug, Default)]
pub struct FrameReport {
    pub draw_calls: u32,
    /// Components that were not drawn, with the reason.
    pub skipped: Vec<(EntityKey, KilnError)>,
}

impl FrameReport {
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

pub struct Renderer<B: GraphicsBackend> {
    backend: B,
    settings: RendererSettings,
    capabilities: Capabilities,
    context_lost: bool,

    state: RenderStateCache,
    programs: ProgramCache,
    buffers: BufferCache,
    textures: TextureCache,
    warnings: WarnOnce,

    viewport: Viewport,
    /// Camera used by the previous `pre_render`.
    last_camera: Option<EntityKey>,
    /// Camera whose projection follows `resize`.
    resize_target: Option<EntityKey>,
}

fn cull_for_side(side: Side) -> CullFace {
    match side {
        Side::Front => CullFace::Back,
        Side::Back => CullFace::Front,
        Side::Both => CullFace::None,
    }
}

/// Refreshes the view-dependent matrices of `key`'s transform and returns
/// the per-object matrices, or `None` when the entity has no transform.
fn object_matrices(scene: &mut Scene, key: EntityKey, view: &Mat4) -> Option<ObjectMatrices> {
    let transform = scene.transform_mut(key)?;
    transform.refresh_view_dependent(view);
    Some(ObjectMatrices {
        model: transform.world_matrix_as_mat4(),
        model_view: *transform.model_view(),
        normal: *transform.normal_matrix(),
    })
}

fn collect_lights(scene: &Scene) -> Vec<LightSample> {
    scene
        .group(ComponentType::Light)
        .iter()
        .filter_map(|&key| {
            let light = scene.light(key)?;
            let position = scene.transform(key).map_or(Vec3::ZERO, Transform::world_position);
            Some(LightSample {
                light: light.clone(),
                position,
            })
        })
        .collect()
}

/// Returns the program `material` should draw with under `params`, reusing
/// its cached binding when nothing changed.
fn resolve_program<B: GraphicsBackend>(
    programs: &mut ProgramCache,
    backend: &mut B,
    material: &mut Material,
    shader_handle: ShaderHandle,
    shader: &Shader,
    params: ProgramParameters,
) -> Result<ProgramId> {
    if !material.needs_update()
        && let Some(binding) = &material.program
        && binding.matches(shader_handle, &params)
        && programs.is_current(binding)
    {
        return Ok(binding.id());
    }

    if let Some(old) = material.program.take()
        && programs.is_current(&old)
    {
        programs.release(old.id());
    }

    let id = programs.get_or_build(backend, shader, &params)?;
    material.program = Some(programs.binding(id, shader_handle, params));
    material.clear_needs_update();
    Ok(id)
}

impl<B: GraphicsBackend> Renderer<B> {
    pub fn new(backend: B, settings: RendererSettings) -> Result<Self> {
        let capabilities = backend.capabilities();
        let mut renderer = Self {
            backend,
            settings,
            capabilities,
            context_lost: false,
            state: RenderStateCache::new(capabilities.max_texture_units),
            programs: ProgramCache::new()?,
            buffers: BufferCache::new(),
            textures: TextureCache::new(),
            warnings: WarnOnce::new(),
            viewport: Viewport::default(),
            last_camera: None,
            resize_target: None,
        };
        renderer.apply_default_state();

        log::info!(
            "Renderer ready: {} texture units, max texture {}px, {:?} precision",
            capabilities.max_texture_units,
            capabilities.max_texture_size,
            renderer.settings.effective_precision(capabilities.precision)
        );
        Ok(renderer)
    }

    fn apply_default_state(&mut self) {
        let Self {
            backend, state, settings, ..
        } = self;

        backend.set_depth_func(DepthFunc::LessEqual);
        backend.set_front_face(FrontFace::CounterClockwise);
        state.set_depth_test(backend, true);
        state.set_depth_write(backend, true);
        state.set_cull_face(backend, CullFace::Back);
        state.set_blending(backend, Blending::Default);
        state.set_line_width(backend, settings.default_line_width);
        state.set_clear_color(backend, Vec4::new(0.0, 0.0, 0.0, settings.clear_alpha));
        if self.viewport.width > 0 && self.viewport.height > 0 {
            state.set_viewport(backend, self.viewport);
        }
    }

    // ========================================================================
    // Frame
    // ========================================================================

    /// Updates the viewport and the projection of the hooked camera.
    pub fn resize(&mut self, scene: &mut Scene, width: u32, height: u32) {
        self.viewport = Viewport::new(width, height);
        if let Some(key) = self.resize_target
            && let Some(camera) = scene.camera_mut(key)
        {
            camera.set_viewport(width, height);
        }
        if !self.context_lost {
            self.state.set_viewport(&mut self.backend, self.viewport);
        }
        log::debug!("Viewport resized to {width}x{height}");
    }

    /// Prepares the frame for `camera`. Returns `false` when nothing will
    /// draw (context lost, or `camera` carries no camera component).
    pub fn pre_render(&mut self, scene: &mut Scene, camera: EntityKey) -> bool {
        if self.context_lost {
            return false;
        }
        let Some(cam) = scene.camera_mut(camera) else {
            log::error!("pre_render: entity {camera:?} has no camera component");
            return false;
        };

        if self.last_camera != Some(camera) {
            if self.viewport.width > 0 && self.viewport.height > 0 {
                cam.set_viewport(self.viewport.width, self.viewport.height);
            }
            self.last_camera = Some(camera);
            self.resize_target = Some(camera);
            log::debug!("Camera {camera:?} bound to viewport");
        }

        let clear = cam.background.extend(self.settings.clear_alpha);
        self.state.set_clear_color(&mut self.backend, clear);
        if self.viewport.width > 0 && self.viewport.height > 0 {
            self.state.set_viewport(&mut self.backend, self.viewport);
        }

        let flags = self.settings.clear_flags();
        if !flags.is_empty() {
            self.backend.clear(flags);
        }
        true
    }

    /// Draws every renderable component of `scene` as seen from `camera`.
    ///
    /// The host runs [`Scene::update`] beforehand; this only refreshes the
    /// view-dependent matrices of the drawn transforms.
    pub fn render(&mut self, scene: &mut Scene, assets: &mut Assets, camera: EntityKey) -> FrameReport {
        let mut report = FrameReport::default();
        if self.context_lost {
            log::trace!("Context lost, skipping frame");
            return report;
        }
        let Some(cam) = scene.camera(camera) else {
            log::error!("render: entity {camera:?} has no camera component");
            return report;
        };

        let frame = FrameContext {
            camera: CameraView::from_camera(cam),
            lights: collect_lights(scene),
            ambient: scene.ambient,
            viewport: self.viewport,
        };
        let counts = LightAllocator::allocate(frame.lights.iter().map(|s| &s.light));

        let saved_cull = self.state.cull_face();
        let saved_blending = self.state.blending();
        let saved_line_width = self.state.line_width();

        let order: SmallVec<[ComponentType; ComponentType::COUNT]> = scene
            .group_order()
            .iter()
            .copied()
            .filter(|ty| {
                matches!(
                    ty,
                    ComponentType::MeshFilter | ComponentType::Sprite | ComponentType::ParticleSystem
                )
            })
            .collect();

        for ty in order {
            let members = scene.group(ty).to_vec();
            for key in members {
                let drawn = match ty {
                    ComponentType::MeshFilter => self.draw_mesh(scene, assets, key, &frame, &counts),
                    ComponentType::Sprite => self.draw_sprite(scene, assets, key, &frame, &counts),
                    ComponentType::ParticleSystem => self.draw_particles(scene, assets, key, &frame, &counts),
                    _ => Ok(0),
                };
                match drawn {
                    Ok(n) => report.draw_calls += n,
                    Err(err) => {
                        log::error!("Skipping {} of entity {key:?}: {err}", ty.tag());
                        report.skipped.push((key, err));
                    }
                }
            }
        }

        if let Some(cull) = saved_cull {
            self.state.set_cull_face(&mut self.backend, cull);
        }
        if let Some(blending) = saved_blending {
            self.state.set_blending(&mut self.backend, blending);
        }
        if let Some(width) = saved_line_width {
            self.state.set_line_width(&mut self.backend, width);
        }

        report
    }

    fn precision(&self) -> Precision {
        self.settings.effective_precision(self.capabilities.precision)
    }

    fn apply_material_state(&mut self, material: &Material) {
        let Self { backend, state, .. } = self;
        state.set_cull_face(backend, cull_for_side(material.side));
        state.set_blending(backend, material.blending);
        if material.wireframe {
            state.set_line_width(backend, material.line_width);
        }
    }

    fn draw_mesh(
        &mut self,
        scene: &mut Scene,
        assets: &mut Assets,
        key: EntityKey,
        frame: &FrameContext,
        counts: &LightCounts,
    ) -> Result<u32> {
        let Some(filter) = scene.mesh_filter(key).copied() else {
            return Ok(0);
        };
        let Some(object) = object_matrices(scene, key, &frame.camera.view) else {
            log::trace!("Entity {key:?} has a mesh but no transform");
            return Ok(0);
        };
        let precision = self.precision();

        let mesh = assets
            .meshes
            .get_mut(filter.mesh)
            .ok_or_else(|| KilnError::MissingAsset(format!("mesh {:?}", filter.mesh)))?;
        let material = assets
            .materials
            .get_mut(filter.material)
            .ok_or_else(|| KilnError::MissingAsset(format!("material {:?}", filter.material)))?;
        let shader_handle = material.shader;
        let shader = assets
            .shaders
            .get(shader_handle)
            .ok_or_else(|| KilnError::MissingAsset(format!("shader of material '{}'", material.name)))?;

        let Self {
            backend,
            state,
            programs,
            buffers,
            textures,
            warnings,
            capabilities,
            ..
        } = self;

        let set = buffers.ensure_uploaded(backend, filter.mesh, mesh)?;
        if set.vertex_count == 0 {
            return Ok(0);
        }
        let streams = binder::mesh_streams(set);
        let (index, lines, vertex_count, revision) = (set.index, set.line_index, set.vertex_count, set.revision);
        let mesh = &*mesh;

        let params = ProgramParameters::for_mesh(shader, material, mesh, counts, capabilities, precision);
        let skinned = params.bones > 0;
        let id = resolve_program(programs, backend, material, shader_handle, shader, params)?;
        let program = programs
            .get_mut(id)
            .ok_or_else(|| KilnError::MissingAsset(format!("program of material '{}'", material.name)))?;

        let force = state.use_program(backend, program.raw());
        let wireframe = material.wireframe;
        binder::bind_geometry(
            backend,
            state,
            program,
            GeometryBinding {
                source: GeometrySource::Mesh(filter.mesh),
                program: program.raw(),
                revision,
                wireframe,
            },
            &streams,
            if wireframe { lines } else { index },
        );
        binder::bind_object(backend, program, frame, &object, force);
        binder::bind_lights(backend, program, &frame.lights, force);
        if skinned {
            binder::bind_bones(backend, program, &mesh.bone_matrices, force);
        }
        let bound = binder::bind_material(
            backend,
            program,
            material,
            state,
            TextureBindings {
                cache: textures,
                assets: &mut assets.textures,
                caps: capabilities,
            },
            warnings,
            force,
        );
        state.reset_texture_units();
        bound?;

        let material = &*material;
        self.apply_material_state(material);
        let backend = &mut self.backend;
        match (wireframe, index, lines) {
            (true, _, Some(lines)) => backend.draw_elements(Primitive::Lines, lines.len),
            (true, _, None) => backend.draw_arrays(Primitive::Lines, 0, vertex_count),
            (false, Some(index), _) => backend.draw_elements(Primitive::Triangles, index.len),
            (false, None, _) => backend.draw_arrays(Primitive::Triangles, 0, vertex_count),
        }
        Ok(1)
    }

    fn draw_sprite(
        &mut self,
        scene: &mut Scene,
        assets: &mut Assets,
        key: EntityKey,
        frame: &FrameContext,
        counts: &LightCounts,
    ) -> Result<u32> {
        let Some(sprite) = scene.sprite(key).cloned() else {
            return Ok(0);
        };
        let Some(object) = object_matrices(scene, key, &frame.camera.view) else {
            log::trace!("Entity {key:?} has a sprite but no transform");
            return Ok(0);
        };
        let precision = self.precision();

        let material = assets
            .materials
            .get_mut(sprite.material)
            .ok_or_else(|| KilnError::MissingAsset(format!("material {:?}", sprite.material)))?;
        let shader_handle = material.shader;
        let shader = assets
            .shaders
            .get(shader_handle)
            .ok_or_else(|| KilnError::MissingAsset(format!("shader of material '{}'", material.name)))?;

        let Self {
            backend,
            state,
            programs,
            buffers,
            textures,
            warnings,
            capabilities,
            ..
        } = self;

        let params = ProgramParameters::for_sprite(shader, material, counts, capabilities, precision);
        let id = resolve_program(programs, backend, material, shader_handle, shader, params)?;
        let program = programs
            .get_mut(id)
            .ok_or_else(|| KilnError::MissingAsset(format!("program of material '{}'", material.name)))?;

        let quad = buffers.sprite_quad(backend)?;
        let streams = [
            ("position", quad.position, VertexFormat::Float32x3),
            ("uv", quad.uv, VertexFormat::Float32x2),
        ];

        let force = state.use_program(backend, program.raw());
        let wireframe = material.wireframe;
        binder::bind_geometry(
            backend,
            state,
            program,
            GeometryBinding {
                source: GeometrySource::SpriteQuad,
                program: program.raw(),
                revision: 0,
                wireframe,
            },
            &streams,
            None,
        );
        binder::bind_object(backend, program, frame, &object, force);
        binder::bind_sprite(backend, program, &sprite, material, &assets.textures, force)?;
        binder::bind_lights(backend, program, &frame.lights, force);
        let bound = binder::bind_material(
            backend,
            program,
            material,
            state,
            TextureBindings {
                cache: textures,
                assets: &mut assets.textures,
                caps: capabilities,
            },
            warnings,
            force,
        );
        state.reset_texture_units();
        bound?;

        let material = &*material;
        self.apply_material_state(material);
        let primitive = if wireframe {
            Primitive::LineStrip
        } else {
            Primitive::TriangleStrip
        };
        self.backend.draw_arrays(primitive, 0, 4);
        Ok(1)
    }

    fn draw_particles(
        &mut self,
        scene: &mut Scene,
        assets: &mut Assets,
        key: EntityKey,
        frame: &FrameContext,
        counts: &LightCounts,
    ) -> Result<u32> {
        let Some(local) = object_matrices(scene, key, &frame.camera.view) else {
            log::trace!("Entity {key:?} has particles but no transform");
            return Ok(0);
        };
        let Some(system) = scene.particle_system(key) else {
            return Ok(0);
        };
        let precision = self.precision();
        let mut draws = 0;

        for emitter in &system.emitters {
            if emitter.particles.is_empty() {
                continue;
            }
            let object = if emitter.world_space {
                ObjectMatrices {
                    model: Mat4::IDENTITY,
                    model_view: frame.camera.view,
                    normal: Mat3::IDENTITY,
                }
            } else {
                local
            };

            let material = assets
                .materials
                .get_mut(emitter.material)
                .ok_or_else(|| KilnError::MissingAsset(format!("material {:?}", emitter.material)))?;
            let shader_handle = material.shader;
            let shader = assets
                .shaders
                .get(shader_handle)
                .ok_or_else(|| KilnError::MissingAsset(format!("shader of material '{}'", material.name)))?;

            let Self {
                backend,
                state,
                programs,
                buffers,
                textures,
                warnings,
                capabilities,
                ..
            } = self;

            let params = ProgramParameters::for_emitter(shader, material, counts, capabilities, precision);
            let id = resolve_program(programs, backend, material, shader_handle, shader, params)?;
            let program = programs
                .get_mut(id)
                .ok_or_else(|| KilnError::MissingAsset(format!("program of material '{}'", material.name)))?;

            let sort_view = emitter.sort.then_some(object.model_view);
            let uploaded = buffers.upload_emitter(backend, emitter, sort_view.as_ref())?;
            let streams = binder::emitter_streams(uploaded);
            let (count, revision) = (uploaded.count, uploaded.revision);

            let force = state.use_program(backend, program.raw());
            binder::bind_geometry(
                backend,
                state,
                program,
                GeometryBinding {
                    source: GeometrySource::Emitter(emitter.id()),
                    program: program.raw(),
                    revision,
                    wireframe: false,
                },
                &streams,
                None,
            );
            binder::bind_object(backend, program, frame, &object, force);
            binder::bind_emitter(backend, program, frame, force);
            binder::bind_lights(backend, program, &frame.lights, force);
            let bound = binder::bind_material(
                backend,
                program,
                material,
                state,
                TextureBindings {
                    cache: textures,
                    assets: &mut assets.textures,
                    caps: capabilities,
                },
                warnings,
                force,
            );
            state.reset_texture_units();
            bound?;

            let material = &*material;
            self.apply_material_state(material);
            self.backend.draw_arrays(Primitive::Points, 0, count);
            draws += 1;
        }
        Ok(draws)
    }

    // ========================================================================
    // Context Lifecycle
    // ========================================================================

    /// Drops every backend handle without issuing calls and stops drawing
    /// until [`Renderer::on_context_restored`].
    pub fn on_context_lost(&mut self) {
        self.context_lost = true;
        self.programs.invalidate();
        self.buffers.invalidate();
        self.textures.invalidate();
        self.state.invalidate();
        self.last_camera = None;
        log::warn!("Graphics context lost; cached GPU resources invalidated");
    }

    pub fn on_context_restored(&mut self) {
        self.capabilities = self.backend.capabilities();
        self.state.set_max_texture_units(self.capabilities.max_texture_units);
        self.context_lost = false;
        self.apply_default_state();
        log::info!("Graphics context restored");
    }

    #[inline]
    #[must_use]
    pub fn is_context_lost(&self) -> bool {
        self.context_lost
    }

    // ========================================================================
    // Resource Lifecycle
    // ========================================================================

    /// Deletes the GPU buffers of a mesh. Returns whether it had any.
    pub fn forget_mesh(&mut self, handle: MeshHandle) -> bool {
        self.state.forget_geometry();
        self.buffers.forget_mesh(&mut self.backend, handle)
    }

    pub fn forget_emitter(&mut self, id: EmitterId) -> bool {
        self.state.forget_geometry();
        self.buffers.forget_emitter(&mut self.backend, id)
    }

    /// Drops `material`'s program reference. The program itself survives
    /// until [`Renderer::reap_programs`].
    pub fn release_material(&mut self, material: &mut Material) -> bool {
        match material.program.take() {
            Some(binding) if self.programs.is_current(&binding) => self.programs.release(binding.id()),
            _ => false,
        }
    }

    /// Destroys programs no material references any more.
    pub fn reap_programs(&mut self) -> usize {
        self.programs.reap(&mut self.backend)
    }

    /// Releases every material's program, reaps, then deletes all buffers
    /// and textures.
    pub fn teardown(&mut self, assets: &mut Assets) {
        for material in assets.materials.values_mut() {
            self.release_material(material);
        }
        let reaped = self.reap_programs();
        if !self.programs.is_empty() {
            log::warn!(
                "{} programs still referenced at teardown; destroying them",
                self.programs.len()
            );
            self.programs.destroy_all(&mut self.backend);
        }
        self.buffers.destroy_all(&mut self.backend);
        self.textures.destroy_all(&mut self.backend);
        self.state.invalidate();
        self.last_camera = None;
        self.resize_target = None;
        log::info!("Renderer torn down ({reaped} programs reaped)");
    }

    // ========================================================================
    // Getters
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    #[inline]
    #[must_use]
    pub fn programs(&self) -> &ProgramCache {
        &self.programs
    }

    #[inline]
    #[must_use]
    pub fn buffers(&self) -> &BufferCache {
        &self.buffers
    }

    #[inline]
    #[must_use]
    pub fn textures(&self) -> &TextureCache {
        &self.textures
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> &RenderStateCache {
        &self.state
    }

    #[inline]
    #[must_use]
    pub fn warnings(&self) -> &WarnOnce {
        &self.warnings
    }

    #[inline]
    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }
}
