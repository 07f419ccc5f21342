//! Normalisation of human-facing business codes (SKUs, warehouse codes).

use wms_core::DomainError;

/// Trim and upper-case a code, rejecting empty, over-long or exotic values.
///
/// Allowed characters: ASCII letters, digits, `-` and `_`.
pub fn normalize_code(field: &str, raw: &str, max_len: usize) -> Result<String, DomainError> {
    let code = raw.trim().to_ascii_uppercase();
    if code.is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    if code.len() > max_len {
        return Err(DomainError::validation(format!(
            "{field} cannot exceed {max_len} characters"
        )));
    }
    if let Some(bad) = code
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(DomainError::validation(format!(
            "{field} contains invalid character {bad:?}"
        )));
    }
    Ok(code)
}
