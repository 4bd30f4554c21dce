//! Renderer frame tests against the recording backend
//!
//! Tests for:
//! - Draw calls per renderable kind (meshes, sprites, particles)
//! - State and program deduplication across frames
//! - Per-component failures (missing uniform, sprite without diffuse map)
//! - Light binding and program permutations
//! - Context loss, restore and teardown

use anyhow::Result;
use glam::{Mat4, Vec2, Vec3, Vec4};
use kiln::renderer::{BackendCall, BufferTarget, Capabilities, CullFace, Primitive, RawBuffer, VertexFormat};
use kiln::resources::{Streams, UniformData};
use kiln::scene::Particle;
use kiln::{
    Assets, Camera, Emitter, Entity, EntityKey, HeadlessBackend, KilnError, Light, Material, MaterialHandle, Mesh,
    MeshFilter, ParticleSystem, Renderer, RendererSettings, Scene, Shader, Side, Sprite, Texture, Transform,
};

// ============================================================================
// Fixture
// ============================================================================

const EPSILON: f32 = 1e-5;

const VS: &str = "void main() {\n    gl_Position = projectionMatrix * mvPosition;\n}\n";
const FS_TINT: &str = "uniform vec3 tint;\nvoid main() {\n    gl_FragColor = vec4(tint, 1.0);\n}\n";
const FS_SPRITE: &str =
    "uniform sampler2D diffuseMap;\nvoid main() {\n    gl_FragColor = texture2D(diffuseMap, vUv);\n}\n";
const FS_TWO_MAPS: &str = "uniform sampler2D diffuseMap;\nuniform sampler2D detailMap;\nvoid main() {\n    gl_FragColor = texture2D(diffuseMap, vec2(0.0)) * texture2D(detailMap, vec2(0.0));\n}\n";

struct Fixture {
    scene: Scene,
    assets: Assets,
    renderer: Renderer<HeadlessBackend>,
    camera: EntityKey,
}

impl Fixture {
    fn new() -> Result<Self> {
        Self::with_capabilities(Capabilities::default())
    }

    fn with_capabilities(caps: Capabilities) -> Result<Self> {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut scene = Scene::new("test");
        let mut cam = Entity::new("camera");
        cam.add_component(Transform::from_position(Vec3::new(0.0, 0.0, 10.0)));
        cam.add_component(Camera::default());
        let camera = scene.add_entity(cam);

        let mut renderer = Renderer::new(HeadlessBackend::new(caps), RendererSettings::default())?;
        renderer.resize(&mut scene, 800, 600);

        Ok(Self {
            scene,
            assets: Assets::new(),
            renderer,
            camera,
        })
    }

    fn tint_material(&mut self, name: &str) -> MaterialHandle {
        let shader = self.assets.add_shader(Shader::new("tint", VS, FS_TINT));
        self.assets
            .add_material(Material::new(name, shader).with_uniform("tint", Vec3::new(1.0, 0.0, 0.0)))
    }

    fn add_mesh(&mut self, material: MaterialHandle, position: Vec3) -> EntityKey {
        let mesh = self.assets.add_mesh(Mesh::quad("quad"));
        let mut e = Entity::new("mesh");
        e.add_component(Transform::from_position(position));
        e.add_component(MeshFilter::new(mesh, material));
        self.scene.add_entity(e)
    }

    fn frame(&mut self) -> kiln::FrameReport {
        self.scene.update();
        assert!(self.renderer.pre_render(&mut self.scene, self.camera));
        self.renderer.render(&mut self.scene, &mut self.assets, self.camera)
    }

    fn backend(&self) -> &HeadlessBackend {
        self.renderer.backend()
    }

    fn clear_calls(&mut self) {
        self.renderer.backend_mut().clear_calls();
    }

    fn count(&self, predicate: impl Fn(&BackendCall) -> bool) -> usize {
        self.backend().count(predicate)
    }
}

fn is_create_program(call: &BackendCall) -> bool {
    matches!(call, BackendCall::CreateProgram(_))
}

fn is_create_buffer(call: &BackendCall) -> bool {
    matches!(call, BackendCall::CreateBuffer(_))
}

fn is_upload_buffer(call: &BackendCall) -> bool {
    matches!(call, BackendCall::UploadBuffer { .. })
}

/// Element buffer bound at each indexed draw. Uploads bind their buffer, so
/// they move the binding like an explicit bind does.
fn element_buffer_at_draws(calls: &[BackendCall]) -> Vec<Option<RawBuffer>> {
    let mut bound = None;
    let mut at_draws = Vec::new();
    for call in calls {
        match call {
            BackendCall::BindBuffer {
                target: BufferTarget::Index,
                buffer,
            }
            | BackendCall::UploadBuffer {
                target: BufferTarget::Index,
                buffer,
                ..
            } => bound = Some(*buffer),
            BackendCall::DrawElements { .. } => at_draws.push(bound),
            _ => {}
        }
    }
    at_draws
}

// ============================================================================
// Meshes
// ============================================================================

#[test]
fn meshes_sharing_a_material_share_one_program() -> Result<()> {
    let mut fx = Fixture::new()?;
    let material = fx.tint_material("red");
    fx.add_mesh(material, Vec3::ZERO);
    fx.add_mesh(material, Vec3::X);

    let report = fx.frame();

    assert!(report.is_clean());
    assert_eq!(report.draw_calls, 2);
    assert_eq!(fx.backend().draw_calls(), 2);
    assert_eq!(fx.count(is_create_program), 1);
    assert_eq!(
        fx.count(|c| matches!(c, BackendCall::DrawElements { primitive: Primitive::Triangles, count: 6 })),
        2
    );
    Ok(())
}

#[test]
fn second_frame_skips_redundant_work() -> Result<()> {
    let mut fx = Fixture::new()?;
    let material = fx.tint_material("red");
    fx.add_mesh(material, Vec3::ZERO);
    fx.frame();

    fx.clear_calls();
    let report = fx.frame();

    assert_eq!(report.draw_calls, 1);
    assert_eq!(fx.backend().state_changes(), 0);
    assert_eq!(fx.count(is_create_program), 0);
    assert_eq!(fx.count(is_create_buffer), 0);
    assert_eq!(fx.count(is_upload_buffer), 0);
    assert_eq!(fx.count(|c| matches!(c, BackendCall::UseProgram(_))), 0);
    assert_eq!(fx.count(|c| matches!(c, BackendCall::AttributePointer { .. })), 0);
    // Nothing moved, so no uniform changed either.
    assert_eq!(fx.count(|c| matches!(c, BackendCall::SetUniform { .. })), 0);
    Ok(())
}

#[test]
fn edited_positions_reupload_one_stream() -> Result<()> {
    let mut fx = Fixture::new()?;
    let material = fx.tint_material("red");
    let key = fx.add_mesh(material, Vec3::ZERO);
    fx.frame();

    let handle = fx.scene.mesh_filter(key).unwrap().mesh;
    fx.assets.mesh_mut(handle).unwrap().positions_mut()[0].z = 1.0;
    fx.clear_calls();
    fx.frame();

    assert_eq!(fx.count(is_upload_buffer), 1);
    assert_eq!(fx.count(is_create_buffer), 0);
    Ok(())
}

#[test]
fn wireframe_mesh_draws_edge_lines() -> Result<()> {
    let mut fx = Fixture::new()?;
    let material = fx.tint_material("wire");
    fx.assets.material_mut(material).unwrap().wireframe = true;
    fx.add_mesh(material, Vec3::ZERO);

    fx.frame();

    assert_eq!(
        fx.count(|c| matches!(c, BackendCall::DrawElements { primitive: Primitive::Lines, count: 12 })),
        1
    );
    Ok(())
}

#[test]
fn index_reupload_rebinds_triangle_indices() -> Result<()> {
    let mut fx = Fixture::new()?;
    let material = fx.tint_material("red");
    let key = fx.add_mesh(material, Vec3::ZERO);
    let mesh = fx.scene.mesh_filter(key).unwrap().mesh;
    fx.frame();

    fx.assets.mesh_mut(mesh).unwrap().mark_dirty(Streams::INDEX);
    fx.clear_calls();
    fx.frame();

    let calls = fx.backend().calls();
    let triangle_indices = calls
        .iter()
        .find_map(|c| match c {
            BackendCall::UploadBuffer {
                target: BufferTarget::Index,
                buffer,
                ..
            } => Some(*buffer),
            _ => None,
        })
        .expect("index stream re-uploaded");
    assert_eq!(
        fx.count(|c| matches!(c, BackendCall::UploadBuffer { target: BufferTarget::Index, .. })),
        2
    );
    assert_eq!(element_buffer_at_draws(calls), vec![Some(triangle_indices)]);
    Ok(())
}

#[test]
fn mistyped_uniform_is_not_written_and_warned_once() -> Result<()> {
    let mut fx = Fixture::new()?;
    let shader = fx.assets.add_shader(Shader::new("tint", VS, FS_TINT));
    let wrong = fx
        .assets
        .add_material(Material::new("wrong", shader).with_uniform("tint", 0.5_f32));
    fx.add_mesh(wrong, Vec3::ZERO);

    let report = fx.frame();
    fx.frame();

    assert_eq!(report.draw_calls, 1);
    assert!(fx.backend().uniform_writes("tint").is_empty());
    assert!(fx.renderer.warnings().was_reported("uniform-type:wrong:tint"));
    Ok(())
}

#[test]
fn missing_uniform_skips_only_that_component() -> Result<()> {
    let mut fx = Fixture::new()?;
    let good = fx.tint_material("good");
    let shader = fx.assets.add_shader(Shader::new("tint", VS, FS_TINT));
    let bad = fx.assets.add_material(Material::new("bad", shader));
    fx.add_mesh(good, Vec3::ZERO);
    let bad_key = fx.add_mesh(bad, Vec3::X);

    let report = fx.frame();

    assert_eq!(report.draw_calls, 1);
    assert_eq!(report.skipped.len(), 1);
    let (key, err) = &report.skipped[0];
    assert_eq!(*key, bad_key);
    assert!(matches!(err, KilnError::MissingUniform { uniform, .. } if uniform == "tint"));
    Ok(())
}

#[test]
fn link_failure_is_reported_per_component() -> Result<()> {
    let mut fx = Fixture::new()?;
    let material = fx.tint_material("red");
    fx.add_mesh(material, Vec3::ZERO);
    fx.renderer.backend_mut().fail_next_link = Some("syntax error".into());

    let report = fx.frame();
    assert_eq!(report.draw_calls, 0);
    assert!(matches!(report.skipped[0].1, KilnError::ProgramLink { .. }));

    // The next frame retries and succeeds.
    let report = fx.frame();
    assert!(report.is_clean());
    assert_eq!(report.draw_calls, 1);
    Ok(())
}

#[test]
fn material_side_state_is_restored_after_the_pass() -> Result<()> {
    let mut fx = Fixture::new()?;
    let material = fx.tint_material("both");
    fx.assets.material_mut(material).unwrap().side = Side::Both;
    fx.add_mesh(material, Vec3::ZERO);

    fx.frame();

    assert_eq!(fx.count(|c| matches!(c, BackendCall::SetCullFace(CullFace::None))), 1);
    assert_eq!(fx.renderer.state().cull_face(), Some(CullFace::Back));
    Ok(())
}

#[test]
fn skinned_mesh_binds_bone_palette() -> Result<()> {
    let mut fx = Fixture::new()?;
    let material = fx.tint_material("skin");

    let mut mesh = Mesh::quad("skinned");
    mesh.set_bone_indices(vec![0, 0, 1, 1]);
    mesh.set_bone_weights(vec![1.0; 4]);
    mesh.bone_matrices = vec![Mat4::IDENTITY, Mat4::from_translation(Vec3::Y)];
    let mesh = fx.assets.add_mesh(mesh);
    let mut e = Entity::new("skinned");
    e.add_component(Transform::new());
    e.add_component(MeshFilter::new(mesh, material));
    fx.scene.add_entity(e);

    let report = fx.frame();

    assert!(report.is_clean());
    assert_eq!(
        fx.backend().uniform_writes("bone[1]"),
        vec![UniformData::Mat4(Mat4::from_translation(Vec3::Y))]
    );
    assert_eq!(
        fx.count(|c| matches!(c, BackendCall::AttributePointer { format: VertexFormat::Uint16, .. })),
        1
    );
    Ok(())
}

// ============================================================================
// Sprites
// ============================================================================

#[test]
fn sprite_crop_is_normalised_by_texture_size() -> Result<()> {
    let mut fx = Fixture::new()?;
    let texture = fx.assets.add_texture(Texture::new_rgba8("atlas", 64, 32, vec![]));
    let shader = fx.assets.add_shader(Shader::new("sprite", VS, FS_SPRITE));
    let material = fx
        .assets
        .add_material(Material::new("sprite", shader).with_uniform("diffuseMap", texture));

    let mut sprite = Sprite::new(material, 32.0, 16.0);
    sprite.x = 16.0;
    sprite.y = 8.0;
    sprite.width = 2.0;
    let mut e = Entity::new("sprite");
    e.add_component(Transform::new());
    e.add_component(sprite);
    fx.scene.add_entity(e);

    let report = fx.frame();

    assert!(report.is_clean());
    assert_eq!(
        fx.count(|c| matches!(c, BackendCall::DrawArrays { primitive: Primitive::TriangleStrip, count: 4, .. })),
        1
    );
    let crop = fx.backend().uniform_writes("crop");
    assert_eq!(crop.len(), 1);
    let UniformData::Vec4(crop) = crop[0] else {
        panic!("crop should be a vec4");
    };
    assert!(crop.abs_diff_eq(Vec4::new(0.25, 0.25, 0.5, 0.5), EPSILON));

    let size = fx.backend().uniform_writes("size");
    assert_eq!(size, vec![UniformData::Vec2(Vec2::new(2.0, 1.0))]);
    assert_eq!(fx.backend().live_textures(), 1);
    Ok(())
}

#[test]
fn sprite_without_diffuse_map_is_skipped() -> Result<()> {
    let mut fx = Fixture::new()?;
    let shader = fx.assets.add_shader(Shader::new("sprite", VS, FS_TINT));
    let material = fx
        .assets
        .add_material(Material::new("plain", shader).with_uniform("tint", Vec3::ONE));
    let mut e = Entity::new("sprite");
    e.add_component(Transform::new());
    e.add_component(Sprite::new(material, 1.0, 1.0));
    fx.scene.add_entity(e);

    let report = fx.frame();

    assert_eq!(report.draw_calls, 0);
    assert!(matches!(report.skipped[0].1, KilnError::SpriteWithoutDiffuseMap(ref name) if name == "plain"));
    Ok(())
}

// ============================================================================
// Particles
// ============================================================================

#[test]
fn emitter_draws_points_with_size_ratio() -> Result<()> {
    let mut fx = Fixture::new()?;
    let material = fx.tint_material("spark");

    let mut emitter = Emitter::new(material);
    emitter.particles = (0..3)
        .map(|i| Particle {
            position: Vec3::new(i as f32, 0.0, 0.0),
            size: 1.0,
            alpha: 1.0,
            color: Vec3::ONE,
            ..Particle::default()
        })
        .collect();
    let idle = Emitter::new(material);

    let mut e = Entity::new("sparks");
    e.add_component(Transform::new());
    e.add_component(ParticleSystem {
        emitters: vec![emitter, idle],
    });
    fx.scene.add_entity(e);

    let report = fx.frame();

    assert_eq!(report.draw_calls, 1);
    assert_eq!(
        fx.count(|c| matches!(c, BackendCall::DrawArrays { primitive: Primitive::Points, count: 3, .. })),
        1
    );
    assert_eq!(fx.backend().uniform_writes("particleSizeRatio"), vec![UniformData::Float(1200.0)]);
    assert_eq!(fx.backend().uniform_writes("particleAttenuation"), vec![UniformData::Float(1.0)]);
    Ok(())
}

// ============================================================================
// Lights
// ============================================================================

fn add_point_light(fx: &mut Fixture, position: Vec3) -> EntityKey {
    let mut e = Entity::new("lamp");
    e.add_component(Transform::from_position(position));
    e.add_component(Light::new_point(Vec3::new(1.0, 0.5, 0.25), 2.0, 10.0));
    fx.scene.add_entity(e)
}

fn lit_material(fx: &mut Fixture) -> MaterialHandle {
    let shader = fx.assets.add_shader(Shader::new("lit", VS, FS_TINT).lit(false));
    fx.assets
        .add_material(Material::new("lit", shader).with_uniform("tint", Vec3::ONE))
}

#[test]
fn point_light_is_bound_to_lit_programs() -> Result<()> {
    let mut fx = Fixture::new()?;
    let material = lit_material(&mut fx);
    fx.add_mesh(material, Vec3::ZERO);
    add_point_light(&mut fx, Vec3::new(1.0, 2.0, 3.0));

    let report = fx.frame();

    assert!(report.is_clean());
    assert_eq!(
        fx.backend().uniform_writes("pointLightColor[0]"),
        vec![UniformData::Vec3(Vec3::new(2.0, 1.0, 0.5))]
    );
    assert_eq!(
        fx.backend().uniform_writes("pointLightPosition[0]"),
        vec![UniformData::Vec3(Vec3::new(1.0, 2.0, 3.0))]
    );
    Ok(())
}

#[test]
fn new_light_selects_a_new_permutation() -> Result<()> {
    let mut fx = Fixture::new()?;
    let material = lit_material(&mut fx);
    fx.add_mesh(material, Vec3::ZERO);
    add_point_light(&mut fx, Vec3::X);
    fx.frame();

    add_point_light(&mut fx, Vec3::Y);
    fx.clear_calls();
    let report = fx.frame();

    assert!(report.is_clean());
    assert_eq!(fx.count(is_create_program), 1);
    assert_eq!(fx.renderer.programs().len(), 2);
    assert_eq!(fx.renderer.reap_programs(), 1);
    assert_eq!(fx.backend().live_programs(), 1);
    Ok(())
}

#[test]
fn hidden_light_frees_its_slot() -> Result<()> {
    let mut fx = Fixture::new()?;
    let material = lit_material(&mut fx);
    fx.add_mesh(material, Vec3::ZERO);
    let hidden = add_point_light(&mut fx, Vec3::X);
    fx.scene.light_mut(hidden).unwrap().visible = false;
    add_point_light(&mut fx, Vec3::Z);

    fx.frame();

    // One visible light: a single slot, filled by the visible one.
    assert_eq!(
        fx.backend().uniform_writes("pointLightPosition[0]"),
        vec![UniformData::Vec3(Vec3::Z)]
    );
    assert!(fx.backend().uniform_writes("pointLightPosition[1]").is_empty());
    Ok(())
}

// ============================================================================
// Textures
// ============================================================================

#[test]
fn texture_unit_overflow_is_reported_once() -> Result<()> {
    let caps = Capabilities {
        max_texture_units: 1,
        ..Capabilities::default()
    };
    let mut fx = Fixture::with_capabilities(caps)?;
    let shader = fx.assets.add_shader(Shader::new("two", VS, FS_TWO_MAPS));
    let material = fx.assets.add_material(Material::new("two", shader));
    fx.add_mesh(material, Vec3::ZERO);
    fx.add_mesh(material, Vec3::X);

    let report = fx.frame();
    fx.frame();

    assert_eq!(report.draw_calls, 2);
    assert!(fx.renderer.warnings().was_reported("texture-units"));
    assert_eq!(fx.renderer.warnings().len(), 1);
    // Unset samplers fall back to the shared placeholder.
    assert_eq!(fx.backend().live_textures(), 1);
    Ok(())
}

// ============================================================================
// Context & Lifecycle
// ============================================================================

#[test]
fn context_loss_suspends_and_restore_rebuilds() -> Result<()> {
    let mut fx = Fixture::new()?;
    let material = fx.tint_material("red");
    fx.add_mesh(material, Vec3::ZERO);
    fx.frame();

    fx.clear_calls();
    fx.renderer.on_context_lost();
    assert!(fx.renderer.is_context_lost());
    assert!(!fx.renderer.pre_render(&mut fx.scene, fx.camera));
    let report = fx.renderer.render(&mut fx.scene, &mut fx.assets, fx.camera);
    assert_eq!(report.draw_calls, 0);
    assert!(fx.backend().calls().is_empty());

    fx.renderer.on_context_restored();
    let report = fx.frame();

    assert!(report.is_clean());
    assert_eq!(report.draw_calls, 1);
    assert_eq!(fx.count(is_create_program), 1);
    assert!(fx.count(is_create_buffer) > 0);
    assert_eq!(fx.renderer.programs().len(), 1);
    Ok(())
}

#[test]
fn teardown_leaves_no_live_resources() -> Result<()> {
    let mut fx = Fixture::new()?;
    let material = fx.tint_material("red");
    fx.add_mesh(material, Vec3::ZERO);
    let texture = fx.assets.add_texture(Texture::solid("white", [255; 4]));
    let shader = fx.assets.add_shader(Shader::new("sprite", VS, FS_SPRITE));
    let sprite_material = fx
        .assets
        .add_material(Material::new("sprite", shader).with_uniform("diffuseMap", texture));
    let mut e = Entity::new("sprite");
    e.add_component(Transform::new());
    e.add_component(Sprite::new(sprite_material, 1.0, 1.0));
    fx.scene.add_entity(e);

    let report = fx.frame();
    assert_eq!(report.draw_calls, 2);
    assert!(fx.backend().live_programs() > 0);

    fx.renderer.teardown(&mut fx.assets);

    assert_eq!(fx.backend().live_programs(), 0);
    assert_eq!(fx.backend().live_buffers(), 0);
    assert_eq!(fx.backend().live_textures(), 0);
    assert!(fx.renderer.programs().is_empty());
    assert!(!fx.assets.material(material).unwrap().has_program());
    Ok(())
}

#[test]
fn released_materials_keep_shared_program_until_last_reference() -> Result<()> {
    let mut fx = Fixture::new()?;
    let a = fx.tint_material("a");
    let b = fx.tint_material("b");
    fx.add_mesh(a, Vec3::ZERO);
    fx.add_mesh(b, Vec3::X);
    fx.frame();
    assert_eq!(fx.backend().live_programs(), 1);

    let Fixture { renderer, assets, .. } = &mut fx;
    assert!(renderer.release_material(assets.material_mut(a).unwrap()));
    assert_eq!(renderer.reap_programs(), 0);
    assert!(renderer.release_material(assets.material_mut(b).unwrap()));
    assert!(!renderer.release_material(assets.material_mut(b).unwrap()));
    assert_eq!(renderer.reap_programs(), 1);
    assert_eq!(renderer.backend().live_programs(), 0);
    Ok(())
}
