//! Utility Module
//!
//! - [`interner`]: String interning for shader define names and values
//! - [`WarnOnce`]: Once-per-cause warning registry for resource-limit diagnostics
//!
//! # String Interning
//!
//! ```rust,ignore
//! use kiln::utils::interner;
//!
//! let sym1 = interner::intern("USE_LIGHTS");
//! let sym2 = interner::intern("USE_LIGHTS");
//! assert_eq!(sym1, sym2); // O(1) comparison
//! ```

pub mod interner;
pub mod warn_once;

pub use interner::Symbol;
pub use warn_once::WarnOnce;
