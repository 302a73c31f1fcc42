//! Exemption registry
//!
//! Two independent prefix sets:
//! - load exemptions: names handed straight to the host runtime, never
//!   patched and never materialized by the loader
//! - transform exemptions: names materialized by the loader from their raw,
//!   unpatched bytes
//!
//! Both sets only grow. The built-in load exemptions cover the runtime's
//! standard library, the logging and common-utility namespaces, and the
//! loader's own namespace, and are installed by [`Exemptions::new`].

use parking_lot::RwLock;

/// Namespace the loader itself lives in
pub const LOADER_NAMESPACE: &str = "raya.loader.";

/// Load exemptions present in every [`Exemptions`]
pub const BUILTIN_LOAD_EXEMPTIONS: &[&str] = &[
    "std.",
    "core.",
    "raya.log.",
    "raya.common.",
    LOADER_NAMESPACE,
];

/// Append-only set of name prefixes
#[derive(Debug, Default)]
pub struct PrefixSet {
    prefixes: RwLock<Vec<String>>,
}

impl PrefixSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a prefix. Returns `false` if it was already present.
    pub fn add(&self, prefix: impl Into<String>) -> bool {
        let prefix = prefix.into();
        let mut prefixes = self.prefixes.write();
        if prefixes.contains(&prefix) {
            return false;
        }
        prefixes.push(prefix);
        true
    }

    /// Check if `name` starts with any prefix in the set
    pub fn matches(&self, name: &str) -> bool {
        self.prefixes
            .read()
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
    }

    /// Snapshot of the prefixes, in insertion order
    pub fn to_vec(&self) -> Vec<String> {
        self.prefixes.read().clone()
    }

    pub fn len(&self) -> usize {
        self.prefixes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.read().is_empty()
    }
}

/// Load and transform exemptions of one loader
#[derive(Debug)]
pub struct Exemptions {
    load: PrefixSet,
    transform: PrefixSet,
}

impl Exemptions {
    /// Create the registry with the built-in load exemptions installed
    pub fn new() -> Self {
        let load = PrefixSet::new();
        for prefix in BUILTIN_LOAD_EXEMPTIONS {
            load.add(*prefix);
        }
        Self {
            load,
            transform: PrefixSet::new(),
        }
    }

    pub fn add_load_exemption(&self, prefix: impl Into<String>) -> bool {
        self.load.add(prefix)
    }

    pub fn add_transform_exemption(&self, prefix: impl Into<String>) -> bool {
        self.transform.add(prefix)
    }

    pub fn is_load_exempt(&self, name: &str) -> bool {
        self.load.matches(name)
    }

    pub fn is_transform_exempt(&self, name: &str) -> bool {
        self.transform.matches(name)
    }

    pub fn load_exemptions(&self) -> Vec<String> {
        self.load.to_vec()
    }

    pub fn transform_exemptions(&self) -> Vec<String> {
        self.transform.to_vec()
    }
}

impl Default for Exemptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_installed() {
        let exemptions = Exemptions::new();
        assert!(exemptions.is_load_exempt("std.io.File"));
        assert!(exemptions.is_load_exempt("core.String"));
        assert!(exemptions.is_load_exempt("raya.log.Logger"));
        assert!(exemptions.is_load_exempt("raya.common.Strings"));
        assert!(exemptions.is_load_exempt("raya.loader.TransformingLoader"));
        assert!(!exemptions.is_load_exempt("app.Main"));
        assert_eq!(exemptions.load_exemptions().len(), BUILTIN_LOAD_EXEMPTIONS.len());
    }

    #[test]
    fn test_prefix_matching_is_case_sensitive() {
        let exemptions = Exemptions::new();
        exemptions.add_load_exemption("vendor.");
        assert!(exemptions.is_load_exempt("vendor.Native"));
        assert!(!exemptions.is_load_exempt("Vendor.Native"));
        assert!(!exemptions.is_load_exempt("vendo"));
    }

    #[test]
    fn test_sets_are_independent() {
        let exemptions = Exemptions::new();
        exemptions.add_transform_exemption("app.generated.");

        assert!(exemptions.is_transform_exempt("app.generated.Table"));
        assert!(!exemptions.is_load_exempt("app.generated.Table"));
        assert!(!exemptions.is_transform_exempt("std.io.File"));
    }

    #[test]
    fn test_duplicate_prefix_ignored() {
        let set = PrefixSet::new();
        assert!(set.add("a."));
        assert!(!set.add("a."));
        assert_eq!(set.to_vec(), vec!["a.".to_string()]);
    }
}
