use patron_core::PatronError;
use thiserror::Error;

/// Result type for sign-in operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Error type for sign-in operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Validation or storage failure.
    #[error(transparent)]
    Core(#[from] PatronError),

    #[error("Sign-up is disabled for new users")]
    SignUpDisabled,

    #[error("Account linking is disabled")]
    LinkingDisabled,

    /// A provider account references a user that no longer exists.
    #[error("Account {provider}:{provider_account_id} has no user")]
    OrphanedAccount {
        provider: String,
        provider_account_id: String,
    },
}

impl AuthError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Core(err) if err.is_validation())
    }

    /// Returns an HTTP status code appropriate for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Core(err) => err.status_code(),
            Self::SignUpDisabled | Self::LinkingDisabled => 403,
            Self::OrphanedAccount { .. } => 500,
        }
    }
}
