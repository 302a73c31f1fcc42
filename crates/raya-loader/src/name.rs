//! Unit name helpers
//!
//! Unit names are dotted identifiers (`app.widgets.Button`). On disk and
//! inside unit archives a unit lives at its resource path
//! (`app/widgets/Button.ryb`).

/// File extension of compiled units
pub const UNIT_EXTENSION: &str = "ryb";

/// Map a dotted unit name to its resource path.
pub fn resource_path(name: &str) -> String {
    let mut path = name.replace('.', "/");
    path.push('.');
    path.push_str(UNIT_EXTENSION);
    path
}

/// The namespace of a unit: everything before the last dot.
///
/// Returns `None` for names in the root namespace.
pub fn namespace_of(name: &str) -> Option<&str> {
    name.rsplit_once('.').map(|(namespace, _)| namespace)
}
