//! Shader Source Generator
//!
//! Turns a user [`Shader`] plus [`ProgramParameters`] into the final
//! vertex/fragment sources handed to the backend.
//!
//! Each stage is assembled as
//!
//! ```text
//! prelude (precision, #defines, system declarations)
//! user header (everything before `void main`)
//! header chunks
//! void main(void) {
//!     prepended chunks
//!     user main body
//!     appended chunks
//! }
//! user tail (anything after main)
//! ```
//!
//! Preludes and chunks are minijinja templates using `{$ $}` block
//! delimiters, so GLSL braces never collide with template syntax.

use minijinja::syntax::SyntaxConfig;
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

use super::params::{GeometryKind, ProgramParameters};
use crate::errors::{KilnError, Result};
use crate::resources::{Shader, Streams};

const CHUNKS: &[(&str, &str)] = &[
    ("defines", include_str!("chunks/defines.glsl")),
    ("vertex_prelude", include_str!("chunks/vertex_prelude.glsl")),
    ("fragment_prelude", include_str!("chunks/fragment_prelude.glsl")),
    ("lights", include_str!("chunks/lights.glsl")),
    ("lighting", include_str!("chunks/lighting.glsl")),
    ("per_pixel_varying_header", include_str!("chunks/per_pixel_varying_header.glsl")),
    ("per_pixel_varying_main", include_str!("chunks/per_pixel_varying_main.glsl")),
    ("object_setup", include_str!("chunks/object_setup.glsl")),
    ("world_position", include_str!("chunks/world_position.glsl")),
    ("transformed_normal", include_str!("chunks/transformed_normal.glsl")),
    ("mv_position", include_str!("chunks/mv_position.glsl")),
    ("bone_header", include_str!("chunks/bone_header.glsl")),
    ("bone_main", include_str!("chunks/bone_main.glsl")),
    ("bone_normal", include_str!("chunks/bone_normal.glsl")),
    ("sprite_header", include_str!("chunks/sprite_header.glsl")),
    ("sprite_fragment_header", include_str!("chunks/sprite_fragment_header.glsl")),
    ("sprite_vertex_after", include_str!("chunks/sprite_vertex_after.glsl")),
    ("particle_header_vertex", include_str!("chunks/particle_header_vertex.glsl")),
    ("particle_header", include_str!("chunks/particle_header.glsl")),
    ("particle_vertex", include_str!("chunks/particle_vertex.glsl")),
    ("particle_vertex_size", include_str!("chunks/particle_vertex_size.glsl")),
    ("perturb_normal2_arb", include_str!("chunks/perturb_normal2_arb.glsl")),
    ("dhdxy_fwd", include_str!("chunks/dhdxy_fwd.glsl")),
    ("perturb_normal_arb", include_str!("chunks/perturb_normal_arb.glsl")),
];

#[derive(Serialize)]
struct DefineEntry {
    name: &'static str,
    value: &'static str,
}

/// Values visible to every template.
#[derive(Serialize)]
struct TemplateContext {
    precision: &'static str,
    defines: Vec<DefineEntry>,
    positions: bool,
    normals: bool,
    tangents: bool,
    uvs: bool,
    uv2s: bool,
    colors: bool,
    emitter: bool,
    bones: bool,
    standard_derivatives: bool,
    vertex_lit: bool,
    specular: bool,
}

impl TemplateContext {
    fn new(params: &ProgramParameters) -> Self {
        Self {
            precision: params.precision.glsl(),
            defines: params
                .defines()
                .to_map()
                .into_iter()
                .map(|(name, value)| DefineEntry { name, value })
                .collect(),
            positions: params.has(Streams::POSITION),
            normals: params.has(Streams::NORMAL),
            tangents: params.has(Streams::TANGENT),
            uvs: params.has(Streams::UV),
            uv2s: params.has(Streams::UV2),
            colors: params.has(Streams::COLOR),
            emitter: params.geometry == GeometryKind::Emitter,
            bones: params.bones > 0,
            standard_derivatives: params.standard_derivatives,
            vertex_lit: params.vertex_lit,
            specular: params.specular && !params.vertex_lit,
        }
    }
}

/// Final sources of one program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSource {
    pub vertex: String,
    pub fragment: String,
}

/// One shader stage split around its `main` function.
struct Stage {
    header: String,
    prepended: Vec<String>,
    body: String,
    appended: String,
    tail: String,
}

impl Stage {
    fn split(prelude: String, source: &str, stage: &'static str) -> Result<Self> {
        let (user_header, body, tail) = split_main(source).ok_or(KilnError::ShaderSource { stage })?;
        let mut header = prelude;
        header.push_str(user_header);
        Ok(Self {
            header,
            prepended: Vec::new(),
            body: body.to_string(),
            appended: String::new(),
            tail: tail.to_string(),
        })
    }

    fn add_header(&mut self, chunk: &str) {
        if !self.header.ends_with('\n') {
            self.header.push('\n');
        }
        self.header.push_str(chunk);
    }

    /// Later calls end up earlier in `main`.
    fn prepend(&mut self, chunk: String) {
        self.prepended.push(chunk);
    }

    fn append(&mut self, chunk: &str) {
        self.appended.push('\n');
        self.appended.push_str(chunk);
    }

    fn assemble(self) -> String {
        let mut out = self.header;
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("void main(void) {\n");
        for chunk in self.prepended.iter().rev() {
            out.push_str(chunk);
            if !chunk.ends_with('\n') {
                out.push('\n');
            }
        }
        out.push_str(&self.body);
        out.push_str(&self.appended);
        out.push_str("\n}");
        out.push_str(&self.tail);
        out
    }
}

/// Splits `source` into `(before main, main body, after main)`.
fn split_main(source: &str) -> Option<(&str, &str, &str)> {
    let start = find_main(source)?;
    let open = start + source[start..].find('{')?;

    let mut depth = 0usize;
    for (offset, ch) in source[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let close = open + offset;
                    return Some((&source[..start], &source[open + 1..close], &source[close + 1..]));
                }
            }
            _ => {}
        }
    }
    None
}

/// Byte offset of the `void` that starts `void main (`.
fn find_main(source: &str) -> Option<usize> {
    source.match_indices("void").map(|(i, _)| i).find(|&i| {
        let before_ok = source[..i]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric() && c != '_');
        let after = &source[i + 4..];
        before_ok
            && after.starts_with(char::is_whitespace)
            && after
                .trim_start()
                .strip_prefix("main")
                .is_some_and(|rest| rest.trim_start().starts_with('('))
    })
}

pub struct ShaderGenerator {
    env: Environment<'static>,
}

impl ShaderGenerator {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();

        let syntax = SyntaxConfig::builder()
            .block_delimiters("{$", "$}")
            .variable_delimiters("{{", "}}")
            .line_statement_prefix("$$")
            .build()?;

        env.set_syntax(syntax);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_undefined_behavior(UndefinedBehavior::SemiStrict);

        for &(name, source) in CHUNKS {
            env.add_template(name, source)?;
        }

        Ok(Self { env })
    }

    fn render(&self, name: &str, ctx: &TemplateContext) -> Result<String> {
        Ok(self.env.get_template(name)?.render(ctx)?)
    }

    pub fn generate(&self, shader: &Shader, params: &ProgramParameters) -> Result<GeneratedSource> {
        let ctx = TemplateContext::new(params);
        let mut vs = Stage::split(self.render("vertex_prelude", &ctx)?, &shader.vertex, "vertex")?;
        let mut fs = Stage::split(self.render("fragment_prelude", &ctx)?, &shader.fragment, "fragment")?;

        match params.geometry {
            GeometryKind::Sprite => {
                vs.add_header(&self.render("sprite_header", &ctx)?);
                vs.append(&self.render("sprite_vertex_after", &ctx)?);
                fs.add_header(&self.render("sprite_fragment_header", &ctx)?);
            }
            GeometryKind::Emitter => {
                vs.add_header(&self.render("particle_header_vertex", &ctx)?);
                vs.add_header(&self.render("particle_header", &ctx)?);
                fs.add_header(&self.render("particle_header", &ctx)?);
                vs.prepend(self.render("particle_vertex_size", &ctx)?);
                vs.prepend(self.render("particle_vertex", &ctx)?);
            }
            GeometryKind::Mesh => {}
        }

        if params.standard_derivatives {
            if params.normal_map {
                fs.add_header(&self.render("perturb_normal2_arb", &ctx)?);
            }
            if params.bump_map {
                fs.add_header(&self.render("dhdxy_fwd", &ctx)?);
                fs.add_header(&self.render("perturb_normal_arb", &ctx)?);
            }
        }

        if params.has(Streams::POSITION) {
            if params.lights.is_some() {
                let lights = self.render("lights", &ctx)?;
                let lighting = self.render("lighting", &ctx)?;
                if params.vertex_lit {
                    vs.add_header(&lights);
                    vs.add_header(&lighting);
                } else {
                    let varyings = self.render("per_pixel_varying_header", &ctx)?;
                    vs.add_header(&varyings);
                    vs.prepend(self.render("per_pixel_varying_main", &ctx)?);
                    fs.add_header(&lights);
                    fs.add_header(&varyings);
                    fs.add_header(&lighting);
                }
                vs.prepend(self.render("mv_position", &ctx)?);
                vs.prepend(self.render("transformed_normal", &ctx)?);
                vs.prepend(self.render("world_position", &ctx)?);
            } else {
                vs.prepend(self.render("mv_position", &ctx)?);
            }

            if params.bones > 0 {
                vs.add_header(&self.render("bone_header", &ctx)?);
                if params.has(Streams::NORMAL) {
                    vs.prepend(self.render("bone_normal", &ctx)?);
                }
                vs.prepend(self.render("bone_main", &ctx)?);
            }

            vs.prepend(self.render("object_setup", &ctx)?);
        }

        Ok(GeneratedSource {
            vertex: vs.assemble(),
            fragment: fs.assemble(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::ShaderHandle;
    use crate::renderer::backend::{Capabilities, Precision};
    use crate::renderer::lights::LightCounts;
    use crate::resources::{Material, Mesh};

    const VS: &str = "varying vec2 vUv;\nvoid main() {\n    vUv = uv;\n    gl_Position = projectionMatrix * mvPosition;\n}\n";
    const FS: &str = "uniform vec3 tint;\nvoid main() {\n    if (true) { gl_FragColor = vec4(tint, 1.0); }\n}\n";

    fn mesh_params(shader: &Shader, lights: LightCounts) -> ProgramParameters {
        let material = Material::new("m", ShaderHandle::default());
        ProgramParameters::for_mesh(
            shader,
            &material,
            &Mesh::quad("q"),
            &lights,
            &Capabilities::default(),
            Precision::High,
        )
    }

    #[test]
    fn nested_braces_survive_splitting() {
        let (header, body, tail) = split_main(FS).unwrap();
        assert_eq!(header, "uniform vec3 tint;\n");
        assert!(body.contains("gl_FragColor"));
        assert!(body.trim_end().ends_with('}'));
        assert_eq!(tail, "\n");
    }

    #[test]
    fn missing_main_is_an_error() {
        let generator = ShaderGenerator::new().unwrap();
        let shader = Shader::new("bad", "void notmain() {}", FS);
        let err = generator
            .generate(&shader, &mesh_params(&shader, LightCounts::default()))
            .unwrap_err();
        assert!(matches!(err, KilnError::ShaderSource { stage: "vertex" }));
    }

    #[test]
    fn unlit_mesh_gets_prelude_and_mv_position() {
        let generator = ShaderGenerator::new().unwrap();
        let shader = Shader::new("unlit", VS, FS);
        let out = generator
            .generate(&shader, &mesh_params(&shader, LightCounts::default()))
            .unwrap();

        assert!(out.vertex.starts_with("precision highp float;"));
        assert!(out.vertex.contains("attribute vec3 position;"));
        assert!(out.vertex.contains("attribute vec2 uv;"));
        assert!(!out.vertex.contains("attribute vec3 color;"));
        assert!(out.vertex.contains("void main(void) {"));

        let setup = out.vertex.find("vec3 objectPosition").unwrap();
        let mv = out.vertex.find("vec4 mvPosition").unwrap();
        let user = out.vertex.find("vUv = uv;").unwrap();
        assert!(setup < mv && mv < user);
        assert!(!out.vertex.contains("worldPosition"));
        assert!(!out.fragment.contains("#define USE_LIGHTS"));
    }

    #[test]
    fn per_pixel_lights_splice_both_stages() {
        let generator = ShaderGenerator::new().unwrap();
        let shader = Shader::new("lit", VS, FS).lit(true);
        let counts = LightCounts {
            max_point: 2,
            max_directional: 1,
            ..LightCounts::default()
        };
        let out = generator.generate(&shader, &mesh_params(&shader, counts)).unwrap();

        assert!(out.fragment.contains("#define MAX_POINT_LIGHTS 2"));
        assert!(out.fragment.contains("uniform vec3 pointLightColor[MAX_POINT_LIGHTS];"));
        assert!(out.fragment.contains("vec3 pixelLighting(vec3 surfaceNormal, vec3 specularColor, float shininess)"));
        assert!(out.vertex.contains("varying vec3 vWorldPosition;"));

        let world = out.vertex.find("vec4 worldPosition").unwrap();
        let normal = out.vertex.find("vec3 worldNormal").unwrap();
        let mv = out.vertex.find("vec4 mvPosition").unwrap();
        let varyings = out.vertex.find("vWorldPosition = worldPosition.xyz;").unwrap();
        assert!(world < normal && normal < mv && mv < varyings);
    }

    #[test]
    fn vertex_lit_keeps_lighting_in_vertex_stage() {
        let generator = ShaderGenerator::new().unwrap();
        let shader = Shader::new("gouraud", VS, FS).vertex_lit();
        let counts = LightCounts {
            max_hemi: 1,
            ..LightCounts::default()
        };
        let out = generator.generate(&shader, &mesh_params(&shader, counts)).unwrap();
        assert!(out.vertex.contains("vec3 vertexLighting("));
        assert!(!out.fragment.contains("pixelLighting"));
    }

    #[test]
    fn emitter_chunks_follow_mv_position() {
        let generator = ShaderGenerator::new().unwrap();
        let shader = Shader::new("particles", VS, FS);
        let material = Material::new("m", ShaderHandle::default());
        let params = ProgramParameters::for_emitter(
            &shader,
            &material,
            &LightCounts::default(),
            &Capabilities::default(),
            Precision::Medium,
        );
        let out = generator.generate(&shader, &params).unwrap();

        assert!(out.vertex.starts_with("precision mediump float;"));
        assert!(out.vertex.contains("attribute vec3 data;"));
        assert!(out.fragment.contains("varying float vParticleAlpha;"));
        let mv = out.vertex.find("vec4 mvPosition").unwrap();
        let size = out.vertex.find("gl_PointSize").unwrap();
        assert!(mv < size);
    }
}
