//! Registration-time validation.

use crate::error::{Error, Result};

/// Maximum tool-name length.
pub const MAX_TOOL_NAME_LEN: usize = 128;

/// Validate a tool name at registration time.
///
/// Names are 1–128 characters drawn from `[A-Za-z0-9_.-]`. Anything else is
/// rejected here, before the tool ever appears in a catalog.
pub fn validate_tool_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_params("tool name must not be empty"));
    }
    if name.len() > MAX_TOOL_NAME_LEN {
        return Err(Error::invalid_params(format!(
            "tool name exceeds {MAX_TOOL_NAME_LEN} characters: {} given",
            name.len()
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(Error::invalid_params(format!(
            "tool name contains invalid character {bad:?}: allowed set is [A-Za-z0-9_.-]"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_the_allowed_alphabet() {
        for name in ["echo", "get_weather", "ns.tool-v2", "A1_b2.c3-d4"] {
            assert!(validate_tool_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_out_of_range_names() {
        assert!(validate_tool_name("").is_err());
        assert!(validate_tool_name(&"x".repeat(129)).is_err());
        assert!(validate_tool_name("has space").is_err());
        assert!(validate_tool_name("emoji🙂").is_err());
        assert!(validate_tool_name("slash/name").is_err());
    }

    #[test]
    fn boundary_length_is_accepted() {
        assert!(validate_tool_name(&"x".repeat(128)).is_ok());
    }
}
