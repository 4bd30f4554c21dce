/// User shader template.
///
/// `vertex` and `fragment` hold GLSL with a `void main` entry point; the
/// renderer prepends precision/defines/declarations and splices the engine
/// chunks selected by the feature toggles around the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shader {
    pub name: String,
    pub vertex: String,
    pub fragment: String,

    pub lights: bool,
    pub vertex_lit: bool,
    pub specular: bool,
    pub shadows: bool,
    pub fog: bool,
    /// Request the standard-derivatives extension (used by normal and bump
    /// perturbation).
    pub standard_derivatives: bool,
}

impl Shader {
    #[must_use]
    pub fn new(name: impl Into<String>, vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vertex: vertex.into(),
            fragment: fragment.into(),
            lights: false,
            vertex_lit: false,
            specular: false,
            shadows: false,
            fog: false,
            standard_derivatives: false,
        }
    }

    /// Per-pixel lit template with optional specular term.
    #[must_use]
    pub fn lit(mut self, specular: bool) -> Self {
        self.lights = true;
        self.vertex_lit = false;
        self.specular = specular;
        self
    }

    /// Gouraud (per-vertex) lit template.
    #[must_use]
    pub fn vertex_lit(mut self) -> Self {
        self.lights = true;
        self.vertex_lit = true;
        self
    }
}
