//! Common error types for Argus components.

use thiserror::Error;

/// Common errors across Argus components
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgusError {
    /// Configuration error (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input/request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not allowed in the current phase
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The viewing window was already used this round
    #[error("Challenge already viewed this round")]
    AlreadyViewed,

    /// The current kind has no viewing window
    #[error("Challenge kind has no viewing window")]
    NotViewable,

    /// Glyph entry shorter than the code length
    #[error("Answer must be exactly {0} digits")]
    IncompleteAnswer(usize),

    /// A scratch session is already armed
    #[error("Scratch session already armed")]
    ScratchArmed,

    /// Unknown session id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Session actor has stopped
    #[error("Session closed")]
    SessionClosed,

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ArgusError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config(_) => 500,
            Self::InvalidInput(_) => 400,
            Self::IncompleteAnswer(_) => 400,
            Self::InvalidState(_) => 409,
            Self::AlreadyViewed => 409,
            Self::NotViewable => 409,
            Self::ScratchArmed => 409,
            Self::SessionNotFound(_) => 404,
            Self::SessionClosed => 410,
            Self::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_conflicts_map_to_409() {
        assert_eq!(ArgusError::AlreadyViewed.status_code(), 409);
        assert_eq!(ArgusError::ScratchArmed.status_code(), 409);
        assert_eq!(ArgusError::IncompleteAnswer(4).status_code(), 400);
        assert_eq!(
            ArgusError::IncompleteAnswer(4).to_string(),
            "Answer must be exactly 4 digits"
        );
    }

    #[test]
    fn test_server_side_errors_are_5xx() {
        assert_eq!(ArgusError::Config("tick_ms must be non-zero".into()).status_code(), 500);
        assert_eq!(ArgusError::Internal("png".into()).status_code(), 500);
        assert_eq!(ArgusError::SessionClosed.status_code(), 410);
    }
}
