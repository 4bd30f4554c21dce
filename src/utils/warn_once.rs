//! Once-per-cause diagnostics.
//!
//! Resource-limit conditions (texture unit overflow, oversized textures)
//! repeat every frame. [`WarnOnce`] remembers which causes were already
//! reported so each one reaches the log a single time.

use rustc_hash::FxHashSet;

#[derive(Debug, Default)]
pub struct WarnOnce {
    seen: FxHashSet<String>,
}

impl WarnOnce {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs `message` at warn level unless `cause` was already reported.
    /// Returns `true` when the message was emitted.
    pub fn warn(&mut self, cause: &str, message: impl FnOnce() -> String) -> bool {
        if self.seen.contains(cause) {
            return false;
        }
        self.seen.insert(cause.to_owned());
        log::warn!("{}", message());
        true
    }

    #[inline]
    #[must_use]
    pub fn was_reported(&self, cause: &str) -> bool {
        self.seen.contains(cause)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_cause_is_reported_once() {
        let mut once = WarnOnce::new();
        assert!(once.warn("texture-units", || "too many textures".into()));
        assert!(!once.warn("texture-units", || "too many textures".into()));
        assert!(once.warn("texture-size:4", || "texture too large".into()));
        assert_eq!(once.len(), 2);
    }
}
