#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFilter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureWrap {
    #[default]
    Repeat,
    Clamp,
    MirrorRepeat,
}

/// RGBA8 image plus sampling parameters.
#[derive(Debug, Clone)]
pub struct Texture {
    pub name: String,
    width: u32,
    height: u32,
    data: Vec<u8>,

    pub filter: TextureFilter,
    pub wrap: TextureWrap,
    pub generate_mipmap: bool,
    /// Requested anisotropy, clamped to the backend maximum at upload.
    pub anisotropy: f32,

    needs_update: bool,
}

impl Texture {
    /// `data` must hold `width * height * 4` bytes; shorter data is padded
    /// with transparent black.
    #[must_use]
    pub fn new_rgba8(name: impl Into<String>, width: u32, height: u32, mut data: Vec<u8>) -> Self {
        data.resize(width as usize * height as usize * 4, 0);
        Self {
            name: name.into(),
            width,
            height,
            data,
            filter: TextureFilter::Linear,
            wrap: TextureWrap::Repeat,
            generate_mipmap: true,
            anisotropy: 1.0,
            needs_update: true,
        }
    }

    /// 1x1 texture of a single colour.
    #[must_use]
    pub fn solid(name: impl Into<String>, rgba: [u8; 4]) -> Self {
        let mut tex = Self::new_rgba8(name, 1, 1, rgba.to_vec());
        tex.filter = TextureFilter::Nearest;
        tex.generate_mipmap = false;
        tex
    }

    pub fn set_data(&mut self, width: u32, height: u32, mut data: Vec<u8>) {
        data.resize(width as usize * height as usize * 4, 0);
        self.width = width;
        self.height = height;
        self.data = data;
        self.needs_update = true;
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    #[must_use]
    pub fn inv_width(&self) -> f32 {
        1.0 / self.width.max(1) as f32
    }

    #[inline]
    #[must_use]
    pub fn inv_height(&self) -> f32 {
        1.0 / self.height.max(1) as f32
    }

    #[must_use]
    pub fn is_power_of_two(&self) -> bool {
        self.width.is_power_of_two() && self.height.is_power_of_two()
    }

    pub fn mark_needs_update(&mut self) {
        self.needs_update = true;
    }

    #[inline]
    #[must_use]
    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    #[inline]
    pub(crate) fn clear_needs_update(&mut self) {
        self.needs_update = false;
    }

    /// Nearest-neighbour copy scaled so neither side exceeds `max_size`,
    /// preserving aspect ratio. Returns `(width, height, pixels)`.
    #[must_use]
    pub fn downsampled(&self, max_size: u32) -> (u32, u32, Vec<u8>) {
        let max_size = max_size.max(1);
        if self.width <= max_size && self.height <= max_size {
            return (self.width, self.height, self.data.clone());
        }

        let scale = max_size as f32 / self.width.max(self.height) as f32;
        let w = ((self.width as f32 * scale).floor() as u32).clamp(1, max_size);
        let h = ((self.height as f32 * scale).floor() as u32).clamp(1, max_size);

        let mut out = Vec::with_capacity(w as usize * h as usize * 4);
        for y in 0..h {
            let sy = (u64::from(y) * u64::from(self.height) / u64::from(h)) as usize;
            for x in 0..w {
                let sx = (u64::from(x) * u64::from(self.width) / u64::from(w)) as usize;
                let offset = (sy * self.width as usize + sx) * 4;
                out.extend_from_slice(&self.data[offset..offset + 4]);
            }
        }
        (w, h, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downsample_respects_max_and_aspect() {
        let tex = Texture::new_rgba8("big", 64, 32, vec![255; 64 * 32 * 4]);
        let (w, h, data) = tex.downsampled(16);
        assert_eq!((w, h), (16, 8));
        assert_eq!(data.len(), 16 * 8 * 4);
    }

    #[test]
    fn small_texture_is_untouched() {
        let tex = Texture::solid("white", [255, 255, 255, 255]);
        let (w, h, data) = tex.downsampled(2048);
        assert_eq!((w, h), (1, 1));
        assert_eq!(data, vec![255, 255, 255, 255]);
    }
}
