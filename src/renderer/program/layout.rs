//! GLSL declaration scanner.
//!
//! Extracts the `uniform` and `attribute` declarations a pair of shader
//! stages actually keeps after preprocessing. Conditional blocks
//! (`#ifdef`, `#ifndef`, `#if`, `#elif`, `#else`) are evaluated against the
//! `#define`s seen so far, and array lengths given by a define name are
//! resolved to their integer value.

use rustc_hash::FxHashMap;

use crate::resources::UniformData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlslType {
    Float,
    Int,
    Bool,
    Vec2,
    Vec3,
    Vec4,
    IVec2,
    IVec3,
    IVec4,
    Mat2,
    Mat3,
    Mat4,
    Sampler2D,
    SamplerCube,
}

impl GlslType {
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "float" => GlslType::Float,
            "int" => GlslType::Int,
            "bool" => GlslType::Bool,
            "vec2" => GlslType::Vec2,
            "vec3" => GlslType::Vec3,
            "vec4" => GlslType::Vec4,
            "ivec2" => GlslType::IVec2,
            "ivec3" => GlslType::IVec3,
            "ivec4" => GlslType::IVec4,
            "mat2" => GlslType::Mat2,
            "mat3" => GlslType::Mat3,
            "mat4" => GlslType::Mat4,
            "sampler2D" => GlslType::Sampler2D,
            "samplerCube" => GlslType::SamplerCube,
            _ => return None,
        })
    }

    #[inline]
    #[must_use]
    pub const fn is_sampler(self) -> bool {
        matches!(self, GlslType::Sampler2D | GlslType::SamplerCube)
    }

    /// Whether a value of `data`'s kind can be written to a uniform of this
    /// type. `bool` uniforms take integers.
    #[must_use]
    pub const fn accepts(self, data: &UniformData) -> bool {
        matches!(
            (self, data),
            (GlslType::Float, UniformData::Float(_))
                | (GlslType::Int | GlslType::Bool, UniformData::Int(_))
                | (GlslType::Vec2, UniformData::Vec2(_))
                | (GlslType::Vec3, UniformData::Vec3(_))
                | (GlslType::Vec4, UniformData::Vec4(_))
                | (GlslType::Mat3, UniformData::Mat3(_))
                | (GlslType::Mat4, UniformData::Mat4(_))
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: String,
    pub ty: GlslType,
    /// `Some(n)` for `uniform T name[n]`.
    pub array_len: Option<u32>,
}

impl UniformDecl {
    /// Number of addressable elements (1 for non-arrays).
    #[inline]
    #[must_use]
    pub fn len(&self) -> u32 {
        self.array_len.unwrap_or(1)
    }

    #[inline]
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.array_len.is_some()
    }

    /// Location name of element `index`.
    #[must_use]
    pub fn element_name(&self, index: u32) -> String {
        if self.is_array() {
            format!("{}[{index}]", self.name)
        } else {
            self.name.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDecl {
    pub name: String,
    pub ty: GlslType,
}

/// Declarations kept by a vertex/fragment pair.
#[derive(Debug, Clone, Default)]
pub struct ProgramLayout {
    uniforms: Vec<UniformDecl>,
    attributes: Vec<AttributeDecl>,
}

impl ProgramLayout {
    #[must_use]
    pub fn parse(vertex: &str, fragment: &str) -> Self {
        let mut layout = Self::default();
        layout.scan(vertex, true);
        layout.scan(fragment, false);
        layout
    }

    #[must_use]
    pub fn uniforms(&self) -> &[UniformDecl] {
        &self.uniforms
    }

    #[must_use]
    pub fn attributes(&self) -> &[AttributeDecl] {
        &self.attributes
    }

    #[must_use]
    pub fn uniform(&self, name: &str) -> Option<&UniformDecl> {
        self.uniforms.iter().find(|u| u.name == name)
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeDecl> {
        self.attributes.iter().find(|a| a.name == name)
    }

    #[must_use]
    pub fn declares_uniform(&self, name: &str) -> bool {
        self.uniform(name).is_some()
    }

    fn scan(&mut self, source: &str, vertex_stage: bool) {
        let (text, defines) = preprocess(source);

        for statement in text.split(';') {
            // Only the text after the last brace can be a declaration.
            let statement = statement.rsplit(['{', '}']).next().unwrap_or_default();
            let mut tokens = statement.split_whitespace();

            let storage = match tokens.next() {
                Some("uniform") => Storage::Uniform,
                Some("attribute") if vertex_stage => Storage::Attribute,
                _ => continue,
            };

            let mut ty_token = tokens.next();
            while matches!(ty_token, Some("lowp" | "mediump" | "highp")) {
                ty_token = tokens.next();
            }
            let Some(ty) = ty_token.and_then(GlslType::parse) else {
                continue;
            };

            let names: String = tokens.collect();
            for declarator in names.split(',').filter(|d| !d.is_empty()) {
                let (name, array_len) = match declarator.split_once('[') {
                    Some((name, rest)) => {
                        let len_token = rest.trim_end_matches(']');
                        (name, resolve_int(len_token, &defines).map(|v| v.max(0) as u32))
                    }
                    None => (declarator, None),
                };

                match storage {
                    Storage::Uniform => {
                        if !self.declares_uniform(name) {
                            self.uniforms.push(UniformDecl {
                                name: name.to_string(),
                                ty,
                                array_len,
                            });
                        }
                    }
                    Storage::Attribute => {
                        if self.attribute(name).is_none() {
                            self.attributes.push(AttributeDecl {
                                name: name.to_string(),
                                ty,
                            });
                        }
                    }
                }
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Storage {
    Uniform,
    Attribute,
}

// ============================================================================
// Preprocessor
// ============================================================================

struct Branch {
    parent_active: bool,
    taken: bool,
    active: bool,
}

/// Returns the active source lines (directives removed) and the define
/// table built along the way.
fn preprocess(source: &str) -> (String, FxHashMap<String, String>) {
    let stripped = strip_comments(source);
    let mut defines: FxHashMap<String, String> = FxHashMap::default();
    let mut stack: Vec<Branch> = Vec::new();
    let mut out = String::with_capacity(stripped.len());

    for line in stripped.lines() {
        let active = stack.last().is_none_or(|b| b.active);
        let trimmed = line.trim();

        let Some(directive) = trimmed.strip_prefix('#') else {
            if active {
                out.push_str(line);
                out.push('\n');
            }
            continue;
        };

        let directive = directive.trim_start();
        let (word, rest) = directive
            .split_once(char::is_whitespace)
            .map_or((directive, ""), |(w, r)| (w, r.trim()));

        match word {
            "define" if active => {
                let (name, value) = rest
                    .split_once(char::is_whitespace)
                    .map_or((rest, ""), |(n, v)| (n, v.trim()));
                defines.insert(name.to_string(), value.to_string());
            }
            "undef" if active => {
                defines.remove(rest);
            }
            "ifdef" | "ifndef" | "if" => {
                let condition = match word {
                    "ifdef" => defines.contains_key(rest),
                    "ifndef" => !defines.contains_key(rest),
                    _ => eval_condition(rest, &defines),
                };
                let on = active && condition;
                stack.push(Branch {
                    parent_active: active,
                    taken: on,
                    active: on,
                });
            }
            "elif" => {
                if let Some(branch) = stack.last_mut() {
                    let on = branch.parent_active && !branch.taken && eval_condition(rest, &defines);
                    branch.active = on;
                    branch.taken |= on;
                }
            }
            "else" => {
                if let Some(branch) = stack.last_mut() {
                    branch.active = branch.parent_active && !branch.taken;
                    branch.taken = true;
                }
            }
            "endif" => {
                stack.pop();
            }
            _ => {}
        }
    }

    (out, defines)
}

fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '/' {
            match chars.peek() {
                Some('/') => {
                    for n in chars.by_ref() {
                        if n == '\n' {
                            out.push('\n');
                            break;
                        }
                    }
                    continue;
                }
                Some('*') => {
                    chars.next();
                    let mut prev = '\0';
                    for n in chars.by_ref() {
                        if n == '\n' {
                            out.push('\n');
                        }
                        if prev == '*' && n == '/' {
                            break;
                        }
                        prev = n;
                    }
                    continue;
                }
                _ => {}
            }
        }
        out.push(c);
    }
    out
}

/// Evaluates `||` / `&&` chains of `defined(X)`, `!term`, `A op B` and `A`.
fn eval_condition(expr: &str, defines: &FxHashMap<String, String>) -> bool {
    expr.split("||").any(|alt| alt.split("&&").all(|term| eval_term(term.trim(), defines)))
}

fn eval_term(term: &str, defines: &FxHashMap<String, String>) -> bool {
    if let Some(inner) = term.strip_prefix('!') {
        return !eval_term(inner.trim(), defines);
    }
    if let Some(rest) = term.strip_prefix("defined") {
        let name = rest.trim().trim_start_matches('(').trim_end_matches(')').trim();
        return defines.contains_key(name);
    }

    for op in [">=", "<=", "==", "!=", ">", "<"] {
        if let Some((lhs, rhs)) = term.split_once(op) {
            let l = resolve_int(lhs.trim(), defines).unwrap_or(0);
            let r = resolve_int(rhs.trim(), defines).unwrap_or(0);
            return match op {
                ">=" => l >= r,
                "<=" => l <= r,
                "==" => l == r,
                "!=" => l != r,
                ">" => l > r,
                _ => l < r,
            };
        }
    }

    resolve_int(term, defines).unwrap_or(0) != 0
}

fn resolve_int(token: &str, defines: &FxHashMap<String, String>) -> Option<i64> {
    let mut current = token.trim();
    for _ in 0..8 {
        if let Ok(v) = current.parse::<i64>() {
            return Some(v);
        }
        current = defines.get(current)?.as_str().trim();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrays_sized_by_defines() {
        let vs = "#define MAX_POINT_LIGHTS 3\n\
                  uniform vec3 pointLightColor[MAX_POINT_LIGHTS];\n\
                  attribute vec3 position;\n\
                  void main() { gl_Position = vec4(position, 1.0); }";
        let layout = ProgramLayout::parse(vs, "void main() {}");
        let decl = layout.uniform("pointLightColor").unwrap();
        assert_eq!(decl.array_len, Some(3));
        assert_eq!(decl.element_name(2), "pointLightColor[2]");
        assert!(layout.attribute("position").is_some());
    }

    #[test]
    fn inactive_blocks_are_skipped() {
        let fs = "#define MAX_SPOT_LIGHTS 0\n\
                  #if MAX_SPOT_LIGHTS > 0\n\
                  uniform vec3 spotLightColor[MAX_SPOT_LIGHTS];\n\
                  #else\n\
                  uniform float noSpots;\n\
                  #endif\n\
                  #ifdef USE_FOG\n\
                  uniform vec3 fogColor;\n\
                  #endif\n\
                  void main() {}";
        let layout = ProgramLayout::parse("void main() {}", fs);
        assert!(!layout.declares_uniform("spotLightColor"));
        assert!(!layout.declares_uniform("fogColor"));
        assert!(layout.declares_uniform("noSpots"));
    }

    #[test]
    fn comments_and_qualifiers() {
        let fs = "// uniform float ghost;\n\
                  /* uniform vec4 hidden; */\n\
                  uniform lowp sampler2D diffuseMap, normalMap;\n\
                  void main() {}";
        let layout = ProgramLayout::parse("void main() {}", fs);
        assert!(!layout.declares_uniform("ghost"));
        assert!(!layout.declares_uniform("hidden"));
        assert!(layout.uniform("diffuseMap").unwrap().ty.is_sampler());
        assert!(layout.declares_uniform("normalMap"));
    }

    #[test]
    fn shared_uniform_declared_once() {
        let src = "uniform mat4 viewMatrix;\nvoid main() {}";
        let layout = ProgramLayout::parse(src, src);
        assert_eq!(layout.uniforms().len(), 1);
    }
}
