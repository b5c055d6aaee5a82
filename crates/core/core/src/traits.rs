//! Core traits for Patron.
//!
//! Persistence backends implement [`StorageAdapter`]; everything else in
//! the workspace talks to storage only through it.

use async_trait::async_trait;

use crate::error::PatronResult;
use crate::types::{Account, Donation, Donor, DonorUpdate, NewDonation, Session, User};

/// Trait for storage adapters (database backends).
///
/// Adapters implement this trait to provide persistence for users,
/// sessions, linked accounts, donors and donations. `upsert_donor` must be
/// atomic with respect to concurrent upserts for the same email.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    // ==================== User Operations ====================

    /// Creates a new user.
    async fn create_user(&self, user: &User) -> PatronResult<User>;

    /// Gets a user by ID.
    async fn get_user_by_id(&self, id: &str) -> PatronResult<Option<User>>;

    /// Gets a user by email.
    async fn get_user_by_email(&self, email: &str) -> PatronResult<Option<User>>;

    /// Updates an existing user.
    async fn update_user(&self, user: &User) -> PatronResult<User>;

    // ==================== Session Operations ====================

    /// Creates a new session.
    async fn create_session(&self, session: &Session) -> PatronResult<Session>;

    /// Gets a session by token.
    async fn get_session_by_token(&self, token: &str) -> PatronResult<Option<Session>>;

    /// Deletes a session by ID.
    async fn delete_session(&self, id: &str) -> PatronResult<()>;

    // ==================== Account Operations ====================

    /// Creates a new account (provider link).
    async fn create_account(&self, account: &Account) -> PatronResult<Account>;

    /// Gets an account by provider and provider account ID.
    async fn get_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> PatronResult<Option<Account>>;

    /// Gets all accounts for a user.
    async fn get_accounts_by_user_id(&self, user_id: &str) -> PatronResult<Vec<Account>>;

    // ==================== Donor Operations ====================

    /// Finds a donor by email.
    async fn find_donor_by_email(&self, email: &str) -> PatronResult<Option<Donor>>;

    /// Applies `update` to the donor with `email`, creating it if absent.
    async fn upsert_donor(&self, email: &str, update: &DonorUpdate) -> PatronResult<Donor>;

    // ==================== Donation Operations ====================

    /// Records a donation unconditionally.
    async fn create_donation(&self, donation: NewDonation) -> PatronResult<Donation>;

    /// Lists donations for a donor, oldest first.
    async fn list_donations_by_email(&self, email: &str) -> PatronResult<Vec<Donation>>;
}
