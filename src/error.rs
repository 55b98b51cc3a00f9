/// Failure taxonomy for connect, authentication, and message delivery.
///
/// Everything here ends up in a user-visible notice; raw transport errors are
/// wrapped with operation context before they reach the display layer.
use thiserror::Error;

// ── Authentication ────────────────────────────────────────────────────────────

/// Classified authentication failures from the Entra ID token endpoints.
///
/// Each class carries the service's own description and maps to a remediation
/// hint shown alongside the failure notice.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("authentication failed: user interaction required ({0})")]
    InteractionRequired(String),
    #[error("authentication failed: admin consent required ({0})")]
    ConsentRequired(String),
    #[error("authentication failed: invalid client configuration ({0})")]
    InvalidClient(String),
    #[error("authentication failed: client not authorized ({0})")]
    UnauthorizedClient(String),
    #[error("authentication failed: {0}")]
    Unknown(String),
}

impl AuthError {
    /// Map an OAuth error code (plus its description) onto a class.
    pub fn classify(code: &str, description: &str) -> Self {
        let detail = if description.trim().is_empty() {
            code.to_string()
        } else {
            description.to_string()
        };
        match code {
            "interaction_required" => Self::InteractionRequired(detail),
            "consent_required" => Self::ConsentRequired(detail),
            "invalid_client" => Self::InvalidClient(detail),
            "unauthorized_client" => Self::UnauthorizedClient(detail),
            _ => Self::Unknown(detail),
        }
    }

    /// One-line remediation hint for the user-facing notice.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::InteractionRequired(_) => {
                "Complete the sign-in prompt, then connect again."
            }
            Self::ConsentRequired(_) => {
                "An administrator must grant consent for the application."
            }
            Self::InvalidClient(_) => {
                "Check that the Client ID matches your app registration."
            }
            Self::UnauthorizedClient(_) => {
                "Check the app registration settings and API permissions."
            }
            Self::Unknown(_) => "Open the troubleshooting guide for setup steps.",
        }
    }

    /// Short class name recorded in telemetry.
    pub fn class(&self) -> &'static str {
        match self {
            Self::InteractionRequired(_) => "interaction_required",
            Self::ConsentRequired(_) => "consent_required",
            Self::InvalidClient(_) => "invalid_client",
            Self::UnauthorizedClient(_) => "unauthorized_client",
            Self::Unknown(_) => "unknown",
        }
    }
}

// ── Session operations ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ChatError {
    /// Configuration incomplete — raised before any network call.
    #[error("missing configuration: {0}")]
    Validation(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("failed to start conversation: {0}")]
    SessionInit(String),
    #[error("failed to send message: {0}")]
    Send(String),
}

impl ChatError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Remediation hint, present for authentication failures.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Auth(e) => Some(e.hint()),
            _ => None,
        }
    }

    /// Short class label recorded in telemetry.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Auth(e) => e.class(),
            Self::SessionInit(_) => "session_init",
            Self::Send(_) => "send",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_map_to_their_class() {
        let cases = [
            ("interaction_required", "interaction_required"),
            ("consent_required", "consent_required"),
            ("invalid_client", "invalid_client"),
            ("unauthorized_client", "unauthorized_client"),
        ];
        for (code, class) in cases {
            assert_eq!(AuthError::classify(code, "detail").class(), class);
        }
    }

    #[test]
    fn unknown_code_preserves_description() {
        let err = AuthError::classify("server_error", "AADSTS90002: tenant not found");
        assert_eq!(err.class(), "unknown");
        assert!(err.to_string().contains("AADSTS90002"));
    }

    #[test]
    fn empty_description_falls_back_to_code() {
        let err = AuthError::classify("invalid_client", "");
        assert!(err.to_string().contains("invalid_client"));
    }

    #[test]
    fn only_auth_errors_carry_hints() {
        let auth = ChatError::Auth(AuthError::classify("consent_required", "x"));
        assert!(auth.is_auth());
        assert!(auth.hint().is_some());

        let send = ChatError::Send("boom".to_string());
        assert!(!send.is_auth());
        assert!(send.hint().is_none());
        assert_eq!(send.class(), "send");
    }
}
