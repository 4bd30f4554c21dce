//! Permutation `#define` set
//!
//! Names and values are interned [`Symbol`]s kept sorted by name symbol, so
//! two sets built in different orders compare equal. The textual form used
//! for program keys and the prelude is always ordered by name string.

use std::collections::BTreeMap;

use crate::utils::interner::{self, Symbol};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ShaderDefines {
    entries: Vec<(Symbol, Symbol)>,
}

impl ShaderDefines {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    fn slot(&self, name: Symbol) -> Result<usize, usize> {
        self.entries.binary_search_by_key(&name, |&(n, _)| n)
    }

    /// Sets `name`, replacing any previous value.
    pub fn set(&mut self, name: &str, value: &str) {
        let (name, value) = (interner::intern(name), interner::intern(value));
        match self.slot(name) {
            Ok(i) => self.entries[i].1 = value,
            Err(i) => self.entries.insert(i, (name, value)),
        }
    }

    /// Feature switch: present as `1` when `on`, absent otherwise.
    pub fn set_flag(&mut self, name: &str, on: bool) {
        if on {
            self.set(name, "1");
        }
    }

    pub fn set_count(&mut self, name: &str, count: u32) {
        self.set(name, &count.to_string());
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'static str> {
        let sym = interner::get(name)?;
        let i = self.slot(sym).ok()?;
        Some(interner::resolve(self.entries[i].1))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        interner::get(name).is_some_and(|sym| self.slot(sym).is_ok())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Name-ordered view for template rendering.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<&'static str, &'static str> {
        self.entries
            .iter()
            .map(|&(n, v)| (interner::resolve(n), interner::resolve(v)))
            .collect()
    }

    /// `NAME=VALUE;` pairs in name order, the parameter part of a program key.
    #[must_use]
    pub fn serialize(&self) -> String {
        self.to_map().into_iter().fold(String::new(), |mut out, (n, v)| {
            out.push_str(n);
            out.push('=');
            out.push_str(v);
            out.push(';');
            out
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_and_counts() {
        let mut defines = ShaderDefines::new();
        defines.set_flag("USE_FOG", false);
        defines.set_flag("IS_SPRITE", true);
        defines.set_count("MAX_POINT_LIGHTS", 3);

        assert!(!defines.contains("USE_FOG"));
        assert!(defines.contains("IS_SPRITE"));
        assert_eq!(defines.get("MAX_POINT_LIGHTS"), Some("3"));
        assert_eq!(defines.len(), 2);
    }

    #[test]
    fn build_order_is_irrelevant() {
        let mut a = ShaderDefines::new();
        a.set("B", "2");
        a.set("A", "1");

        let mut b = ShaderDefines::new();
        b.set("A", "1");
        b.set("B", "2");

        assert_eq!(a, b);
        assert_eq!(a.serialize(), "A=1;B=2;");
    }

    #[test]
    fn set_replaces_value() {
        let mut defines = ShaderDefines::new();
        defines.set("MAX_BONES", "4");
        defines.set("MAX_BONES", "8");
        assert_eq!(defines.get("MAX_BONES"), Some("8"));
        assert_eq!(defines.len(), 1);
    }
}
