//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest identity accepted from the identity provider.
pub const MAX_PLAYER_ID_LENGTH: usize = 64;

/// Validates that a player identity is 1 to 64 characters from `[A-Za-z0-9_-]`.
///
/// Identities end up as keys inside stored lobby documents, which is why dots
/// and dollar signs are refused.
pub fn validate_player_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > MAX_PLAYER_ID_LENGTH {
        let mut err = ValidationError::new("player_id_length");
        err.message = Some(
            format!(
                "Player ID must be 1 to {MAX_PLAYER_ID_LENGTH} characters (got {})",
                id.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        let mut err = ValidationError::new("player_id_format");
        err.message =
            Some("Player ID may only contain letters, digits, '_' and '-'".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_player_id_valid() {
        assert!(validate_player_id("alice").is_ok());
        assert!(validate_player_id("uid_42-B").is_ok());
        assert!(validate_player_id(&"x".repeat(64)).is_ok());
    }

    #[test]
    fn test_validate_player_id_invalid_length() {
        assert!(validate_player_id("").is_err());
        assert!(validate_player_id(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_player_id_invalid_format() {
        assert!(validate_player_id("a.b").is_err()); // document path separator
        assert!(validate_player_id("$set").is_err());
        assert!(validate_player_id("with space").is_err());
        assert!(validate_player_id("émile").is_err());
    }
}
