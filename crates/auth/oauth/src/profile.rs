//! Identity-provider profiles.

use serde::{Deserialize, Serialize};

/// User information returned by an identity provider after it has
/// authenticated the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderProfile {
    /// Provider name (e.g., "google", "github").
    pub provider: String,
    /// Provider's user ID.
    pub id: String,
    /// User's email.
    pub email: Option<String>,
    /// Whether the provider verified the email.
    #[serde(default)]
    pub email_verified: bool,
    /// User's display name.
    pub name: Option<String>,
    /// User's profile picture URL.
    pub picture: Option<String>,
}

impl ProviderProfile {
    pub fn new(provider: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn email(mut self, email: impl Into<String>, verified: bool) -> Self {
        self.email = Some(email.into());
        self.email_verified = verified;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn picture(mut self, url: impl Into<String>) -> Self {
        self.picture = Some(url.into());
        self
    }

    /// The email, trimmed and lowercased; `None` when blank.
    pub fn normalized_email(&self) -> Option<String> {
        self.email
            .as_deref()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_email() {
        let profile = ProviderProfile::new("google", "1").email("  Ada@Example.COM ", true);
        assert_eq!(profile.normalized_email().as_deref(), Some("ada@example.com"));

        let blank = ProviderProfile::new("google", "1").email("   ", false);
        assert_eq!(blank.normalized_email(), None);
        assert_eq!(ProviderProfile::new("github", "2").normalized_email(), None);
    }

    #[test]
    fn test_deserialize_without_verification_flag() {
        let profile: ProviderProfile = serde_json::from_str(
            r#"{"provider":"github","id":"42","email":"a@b.org","name":null,"picture":null}"#,
        )
        .unwrap();
        assert!(!profile.email_verified);
        assert_eq!(profile.id, "42");
    }
}
