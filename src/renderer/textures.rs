//! GPU texture cache.
//!
//! Uploads happen lazily on first bind and again whenever the CPU texture is
//! flagged `needs_update`. Images larger than the backend limit are
//! downsampled before upload.

use std::borrow::Cow;

use slotmap::SecondaryMap;

use super::backend::{Capabilities, GraphicsBackend, RawTexture, TextureUpload};
use crate::assets::TextureHandle;
use crate::errors::Result;
use crate::resources::{Texture, TextureFilter, TextureWrap};
use crate::utils::WarnOnce;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuTexture {
    pub raw: RawTexture,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Default)]
pub struct TextureCache {
    textures: SecondaryMap<TextureHandle, GpuTexture>,
    /// 1x1 white texture bound to samplers the material leaves empty.
    placeholder: Option<RawTexture>,
}

impl TextureCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure_uploaded<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        handle: TextureHandle,
        texture: &mut Texture,
        caps: &Capabilities,
        warnings: &mut WarnOnce,
    ) -> Result<RawTexture> {
        let existing = self.textures.get(handle).copied();
        if let Some(gpu) = existing
            && !texture.needs_update()
        {
            return Ok(gpu.raw);
        }

        let raw = match existing {
            Some(gpu) => gpu.raw,
            None => backend.create_texture()?,
        };

        let max = caps.max_texture_size;
        let (width, height, pixels) = if texture.width() > max || texture.height() > max {
            warnings.warn(&format!("texture-size:{}", texture.name), || {
                format!(
                    "Texture '{}' is {}x{}, larger than the maximum {max}; downsampling",
                    texture.name,
                    texture.width(),
                    texture.height()
                )
            });
            let (w, h, data) = texture.downsampled(max);
            (w, h, Cow::Owned(data))
        } else {
            (texture.width(), texture.height(), Cow::Borrowed(texture.data()))
        };

        let anisotropy = if caps.max_anisotropy > 0.0 {
            texture.anisotropy.clamp(1.0, caps.max_anisotropy)
        } else {
            0.0
        };

        backend.upload_texture(
            raw,
            &TextureUpload {
                width,
                height,
                rgba: &pixels,
                filter: texture.filter,
                wrap: texture.wrap,
                mipmaps: texture.generate_mipmap && width.is_power_of_two() && height.is_power_of_two(),
                anisotropy,
            },
        );

        self.textures.insert(handle, GpuTexture { raw, width, height });
        texture.clear_needs_update();
        log::trace!("Uploaded texture '{}' ({width}x{height})", texture.name);
        Ok(raw)
    }

    pub fn placeholder<B: GraphicsBackend>(&mut self, backend: &mut B) -> Result<RawTexture> {
        if let Some(raw) = self.placeholder {
            return Ok(raw);
        }
        let raw = backend.create_texture()?;
        backend.upload_texture(
            raw,
            &TextureUpload {
                width: 1,
                height: 1,
                rgba: &[255, 255, 255, 255],
                filter: TextureFilter::Nearest,
                wrap: TextureWrap::Clamp,
                mipmaps: false,
                anisotropy: 0.0,
            },
        );
        self.placeholder = Some(raw);
        Ok(raw)
    }

    #[must_use]
    pub fn get(&self, handle: TextureHandle) -> Option<&GpuTexture> {
        self.textures.get(handle)
    }

    pub fn forget<B: GraphicsBackend>(&mut self, backend: &mut B, handle: TextureHandle) {
        if let Some(gpu) = self.textures.remove(handle) {
            backend.delete_texture(gpu.raw);
        }
    }

    /// Drops every handle without backend calls.
    pub fn invalidate(&mut self) {
        self.textures.clear();
        self.placeholder = None;
    }

    pub fn destroy_all<B: GraphicsBackend>(&mut self, backend: &mut B) {
        for (_, gpu) in self.textures.drain() {
            backend.delete_texture(gpu.raw);
        }
        if let Some(raw) = self.placeholder.take() {
            backend.delete_texture(raw);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}
