//! Global String Interner
//!
//! Converts strings into compact integer [`Symbol`]s so shader define names
//! and values compare and hash as integers.

use std::sync::LazyLock;

use lasso::{Spur, ThreadedRodeo};

static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::new);

/// Compact identifier for an interned string.
pub type Symbol = Spur;

/// Interns `s`, returning the existing symbol when already present.
#[inline]
pub fn intern(s: &str) -> Symbol {
    INTERNER.get_or_intern(s)
}

/// Looks up the symbol of an already interned string without allocating.
#[inline]
pub fn get(s: &str) -> Option<Symbol> {
    INTERNER.get(s)
}

/// Resolves a symbol back into its string.
#[inline]
pub fn resolve(sym: Symbol) -> &'static str {
    INTERNER.resolve(&sym)
}

/// Pre-interns the define names every program permutation uses, keeping the
/// first frame's key building off the interner's write path.
pub fn preload_permutation_defines() {
    let common = [
        "USE_LIGHTS",
        "USE_VERTEX_LIGHTING",
        "USE_SPECULAR",
        "USE_SHADOWS",
        "USE_FOG",
        "USE_SKINNING",
        "USE_NORMAL_MAP",
        "USE_BUMP_MAP",
        "USE_STANDARD_DERIVATIVES",
        "IS_SPRITE",
        "IS_EMITTER",
        "HAS_NORMAL",
        "HAS_TANGENT",
        "HAS_COLOR",
        "HAS_UV",
        "HAS_UV2",
        "MAX_DIR_LIGHTS",
        "MAX_POINT_LIGHTS",
        "MAX_SPOT_LIGHTS",
        "MAX_HEMI_LIGHTS",
        "MAX_SHADOWS",
        "MAX_BONES",
        "0",
        "1",
    ];

    for name in common {
        intern(name);
    }
}
