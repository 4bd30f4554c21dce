//! Light Allocator
//!
//! Tallies visible lights per type. The counts size the light uniform arrays
//! of every lit program permutation, so a change in the visible light set
//! produces a different permutation key.

use crate::scene::{Light, LightKind};

/// Per-type light capacity of a program permutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LightCounts {
    pub max_point: u32,
    pub max_directional: u32,
    pub max_spot: u32,
    pub max_hemi: u32,
    pub max_shadows: u32,
}

impl LightCounts {
    #[inline]
    #[must_use]
    pub fn total(&self) -> u32 {
        self.max_point + self.max_directional + self.max_spot + self.max_hemi
    }

    /// Capacity for lights of `kind`.
    #[inline]
    #[must_use]
    pub fn capacity(&self, kind: LightKind) -> u32 {
        match kind {
            LightKind::Point => self.max_point,
            LightKind::Directional => self.max_directional,
            LightKind::Spot => self.max_spot,
            LightKind::Hemi => self.max_hemi,
        }
    }
}

pub struct LightAllocator;

impl LightAllocator {
    /// Invisible lights contribute nothing. Shadow-only point, directional
    /// and spot lights are left out of the light counts; visible
    /// shadow-casting directional and spot lights count toward
    /// `max_shadows`.
    pub fn allocate<'a>(lights: impl IntoIterator<Item = &'a Light>) -> LightCounts {
        let mut counts = LightCounts::default();

        for light in lights {
            if !light.visible {
                continue;
            }

            if light.cast_shadow && matches!(light.kind, LightKind::Directional | LightKind::Spot) {
                counts.max_shadows += 1;
            }

            match light.kind {
                LightKind::Hemi => counts.max_hemi += 1,
                _ if light.only_shadow => {}
                LightKind::Point => counts.max_point += 1,
                LightKind::Directional => counts.max_directional += 1,
                LightKind::Spot => counts.max_spot += 1,
            }
        }

        counts
    }
}
