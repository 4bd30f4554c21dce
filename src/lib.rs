#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::too_many_lines)]

//! Kiln: a component scene graph with a forward renderer over an abstract
//! graphics backend.
//!
//! - [`scene`]: entities, components, transform hierarchy, persistence
//! - [`assets`]: handle-addressed meshes, materials, shaders and textures
//! - [`renderer`]: program permutations, GPU caches and the draw loop
//!
//! ```rust,ignore
//! use kiln::{Assets, Renderer, RendererSettings, Scene, HeadlessBackend};
//!
//! let mut scene = Scene::new("main");
//! let mut assets = Assets::new();
//! let mut renderer = Renderer::new(HeadlessBackend::default(), RendererSettings::default())?;
//!
//! renderer.resize(&mut scene, 1280, 720);
//! scene.update();
//! if renderer.pre_render(&mut scene, camera) {
//!     let report = renderer.render(&mut scene, &mut assets, camera);
//! }
//! ```

pub mod assets;
pub mod errors;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod utils;

pub use assets::{Assets, MaterialHandle, MeshHandle, ShaderHandle, TextureHandle};
pub use errors::{KilnError, Result};
pub use renderer::{Capabilities, FrameReport, GraphicsBackend, HeadlessBackend, Renderer, RendererSettings};
pub use resources::{Blending, Material, Mesh, Shader, Side, Texture, UniformValue};
pub use scene::{
    Camera, Component, ComponentFactory, ComponentType, Emitter, Entity, EntityKey, Light, LightKind, MeshFilter,
    ParticleSystem, Prefab, Scene, Sprite, Transform,
};
