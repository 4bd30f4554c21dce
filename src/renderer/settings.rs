//! Renderer Settings
//!
//! Frame-level behaviour of the [`Renderer`](super::Renderer) that the host
//! chooses once at construction. Limits such as texture units or maximum
//! texture size are not configured here; they come from the backend's
//! [`Capabilities`](super::backend::Capabilities).
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use kiln::renderer::{Renderer, RendererSettings, HeadlessBackend};
//!
//! // Defaults: clear colour, depth and stencil before every frame.
//! let renderer = Renderer::new(HeadlessBackend::default(), RendererSettings::default())?;
//!
//! // Accumulating overlay pass that keeps the previous colour buffer.
//! let overlay = RendererSettings {
//!     auto_clear_color: false,
//!     ..Default::default()
//! };
//! ```

use super::backend::{ClearFlags, Precision};

/// Global renderer configuration.
///
/// # Fields
///
/// | Field                | Description                                  | Default |
/// |----------------------|----------------------------------------------|---------|
/// | `auto_clear`         | Clear at the start of `pre_render`           | `true`  |
/// | `auto_clear_color`   | Include the colour buffer in the clear       | `true`  |
/// | `auto_clear_depth`   | Include the depth buffer in the clear        | `true`  |
/// | `auto_clear_stencil` | Include the stencil buffer in the clear      | `true`  |
/// | `precision`          | Shader precision override                    | `None`  |
/// | `clear_alpha`        | Alpha of the clear colour                    | `1.0`   |
/// | `default_line_width` | Line width restored after each pass          | `1.0`   |
#[derive(Debug, Clone, PartialEq)]
pub struct RendererSettings {
    // === Clearing ===
    pub auto_clear: bool,
    pub auto_clear_color: bool,
    pub auto_clear_depth: bool,
    pub auto_clear_stencil: bool,

    // === Shaders ===
    /// Float precision emitted into every program. `None` uses the best
    /// precision the backend reports.
    pub precision: Option<Precision>,

    // === Defaults ===
    /// The camera background supplies RGB; this supplies alpha.
    pub clear_alpha: f32,
    pub default_line_width: f32,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            auto_clear: true,
            auto_clear_color: true,
            auto_clear_depth: true,
            auto_clear_stencil: true,
            precision: None,
            clear_alpha: 1.0,
            default_line_width: 1.0,
        }
    }
}

impl RendererSettings {
    /// Buffers cleared by `pre_render`, empty when auto clear is off.
    #[must_use]
    pub fn clear_flags(&self) -> ClearFlags {
        if !self.auto_clear {
            return ClearFlags::empty();
        }
        let mut flags = ClearFlags::empty();
        flags.set(ClearFlags::COLOR, self.auto_clear_color);
        flags.set(ClearFlags::DEPTH, self.auto_clear_depth);
        flags.set(ClearFlags::STENCIL, self.auto_clear_stencil);
        flags
    }

    /// Precision to compile with, given what the backend supports.
    #[must_use]
    pub fn effective_precision(&self, supported: Precision) -> Precision {
        self.precision.unwrap_or(supported)
    }
}
