//! Name and alias validation shared by every mutation.

use crate::types::{RegistryError, Result};

/// Checks that `name` is usable as an org id, metric/field name or alias.
///
/// Comparison elsewhere is exact and case-sensitive, so names with
/// surrounding whitespace or control characters are rejected outright rather
/// than normalized.
pub fn validate_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RegistryError::invalid(format!("{what} must not be empty")));
    }
    if name.trim() != name {
        return Err(RegistryError::invalid(format!(
            "{what} '{name}' has leading or trailing whitespace"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(RegistryError::invalid(format!(
            "{what} '{}' contains control characters",
            name.escape_debug()
        )));
    }
    Ok(())
}

/// Validates every entry and rejects duplicates within the list itself.
pub fn validate_distinct(what: &str, names: &[String]) -> Result<()> {
    for (idx, name) in names.iter().enumerate() {
        validate_name(what, name)?;
        if names[..idx].contains(name) {
            return Err(RegistryError::invalid(format!("duplicate {what} '{name}'")));
        }
    }
    Ok(())
}
