//! Account lookup, linking and user creation on provider sign-in.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use patron_core::{Account, PatronError, Session, StorageAdapter, User};

use crate::error::{AuthError, AuthResult};
use crate::profile::ProviderProfile;

/// Sign-in policy.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Lifetime of sessions created on sign-in.
    pub session_ttl: chrono::Duration,
    /// Whether to create users on first sign-in.
    pub auto_create_user: bool,
    /// Whether a new provider may attach to an existing user by email.
    pub allow_linking: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            session_ttl: chrono::Duration::days(7),
            auto_create_user: true,
            allow_linking: true,
        }
    }
}

/// Result of a successful sign-in.
#[derive(Debug, Clone, Serialize)]
pub struct SignIn {
    pub user: User,
    pub session: Session,
    /// True when this sign-in created the user.
    pub is_new_user: bool,
}

/// Resolves provider profiles to users.
#[derive(Clone)]
pub struct IdentityService {
    storage: Arc<dyn StorageAdapter>,
    config: IdentityConfig,
}

impl IdentityService {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self::with_config(storage, IdentityConfig::default())
    }

    pub fn with_config(storage: Arc<dyn StorageAdapter>, config: IdentityConfig) -> Self {
        Self { storage, config }
    }

    /// Signs in with a provider profile.
    ///
    /// 1. An account for `(provider, id)` resolves to its user.
    /// 2. Otherwise a user with the same email gets the account linked.
    /// 3. Otherwise a user and account are created.
    ///
    /// A new session is created in every case.
    pub async fn sign_in(&self, profile: &ProviderProfile) -> AuthResult<SignIn> {
        let email = profile
            .normalized_email()
            .ok_or_else(|| PatronError::missing("email"))?;

        let (user, is_new_user) = match self
            .storage
            .get_account(&profile.provider, &profile.id)
            .await?
        {
            Some(account) => (self.account_user(&account).await?, false),
            None => self.link_or_create(profile, &email).await?,
        };

        let session = self
            .storage
            .create_session(&Session::with_expiration(
                user.id.clone(),
                self.config.session_ttl,
            ))
            .await?;

        tracing::info!(
            user_id = %user.id,
            provider = %profile.provider,
            is_new_user,
            "Signed in"
        );

        Ok(SignIn {
            user,
            session,
            is_new_user,
        })
    }

    async fn account_user(&self, account: &Account) -> AuthResult<User> {
        self.storage
            .get_user_by_id(&account.user_id)
            .await?
            .ok_or_else(|| AuthError::OrphanedAccount {
                provider: account.provider.clone(),
                provider_account_id: account.provider_account_id.clone(),
            })
    }

    async fn link_or_create(
        &self,
        profile: &ProviderProfile,
        email: &str,
    ) -> AuthResult<(User, bool)> {
        if let Some(user) = self.storage.get_user_by_email(email).await? {
            return Ok((self.link(user, profile).await?, false));
        }

        if !self.config.auto_create_user {
            return Err(AuthError::SignUpDisabled);
        }

        let mut user = User::new(uuid::Uuid::new_v4().to_string(), email.to_string());
        user.name = profile.name.clone();
        user.image = profile.picture.clone();
        user.email_verified = profile.email_verified;

        let user = match self.storage.create_user(&user).await {
            Ok(user) => user,
            // Lost a race with a concurrent sign-in for the same email.
            Err(PatronError::DuplicateEntry { .. }) => {
                let existing = self
                    .storage
                    .get_user_by_email(email)
                    .await?
                    .ok_or_else(|| PatronError::internal("user vanished after duplicate insert"))?;
                return Ok((self.link(existing, profile).await?, false));
            }
            Err(err) => return Err(err.into()),
        };

        self.create_account(&user, profile).await?;
        tracing::info!(user_id = %user.id, provider = %profile.provider, "Created user");
        Ok((user, true))
    }

    /// Links `profile` to an existing user, filling in what the user lacks.
    async fn link(&self, mut user: User, profile: &ProviderProfile) -> AuthResult<User> {
        if !self.config.allow_linking {
            return Err(AuthError::LinkingDisabled);
        }

        self.create_account(&user, profile).await?;

        let mut changed = false;
        if profile.email_verified && !user.email_verified {
            user.email_verified = true;
            changed = true;
        }
        if user.name.is_none() && profile.name.is_some() {
            user.name = profile.name.clone();
            changed = true;
        }
        if user.image.is_none() && profile.picture.is_some() {
            user.image = profile.picture.clone();
            changed = true;
        }
        if changed {
            user.updated_at = Utc::now();
            user = self.storage.update_user(&user).await?;
        }

        tracing::info!(user_id = %user.id, provider = %profile.provider, "Linked account");
        Ok(user)
    }

    async fn create_account(&self, user: &User, profile: &ProviderProfile) -> AuthResult<Account> {
        let account = Account::new(
            user.id.clone(),
            profile.provider.clone(),
            profile.id.clone(),
        );
        Ok(self.storage.create_account(&account).await?)
    }
}
