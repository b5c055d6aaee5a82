//! # Patron Memory Adapter
//!
//! An in-memory storage adapter for Patron, primarily intended
//! for testing and development purposes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use patron_adapter_memory::MemoryAdapter;
//!
//! let adapter = Arc::new(MemoryAdapter::new());
//! let identity = IdentityService::new(adapter.clone());
//! ```

use async_trait::async_trait;
use patron_core::error::{PatronError, PatronResult};
use patron_core::traits::StorageAdapter;
use patron_core::types::{Account, Donation, Donor, DonorUpdate, NewDonation, Session, User};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// In-memory storage for a single entity type.
type Store<T> = Arc<RwLock<HashMap<String, T>>>;

/// In-memory storage adapter for Patron.
///
/// This adapter stores all data in memory and is suitable for
/// testing and development. Data is lost when the process exits.
#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter {
    users: Store<User>,
    sessions: Store<Session>,
    accounts: Store<Account>,
    /// Keyed by email.
    donors: Store<Donor>,
    donations: Arc<RwLock<Vec<Donation>>>,
    /// Donor and donation writes attempted, successful or not.
    writes: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
    fail_donations: Arc<AtomicBool>,
}

impl MemoryAdapter {
    /// Creates a new in-memory adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all stored data.
    pub async fn clear(&self) {
        self.users.write().await.clear();
        self.sessions.write().await.clear();
        self.accounts.write().await.clear();
        self.donors.write().await.clear();
        self.donations.write().await.clear();
        self.writes.store(0, Ordering::SeqCst);
    }

    /// Makes every donor/donation write fail with a database error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes only donation inserts fail; donor upserts still succeed.
    pub fn set_fail_donations(&self, fail: bool) {
        self.fail_donations.store(fail, Ordering::SeqCst);
    }

    /// Number of donor/donation writes attempted so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Returns the number of users stored.
    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }

    /// Returns the number of donations stored.
    pub async fn donation_count(&self) -> usize {
        self.donations.read().await.len()
    }

    fn begin_write(&self) -> PatronResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PatronError::database("write rejected by memory adapter"));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    // ==================== User Operations ====================

    async fn create_user(&self, user: &User) -> PatronResult<User> {
        let mut users = self.users.write().await;

        if users.values().any(|u| u.email == user.email) {
            return Err(PatronError::duplicate("user", "email", &user.email));
        }

        users.insert(user.id.clone(), user.clone());
        Ok(user.clone())
    }

    async fn get_user_by_id(&self, id: &str) -> PatronResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.get(id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> PatronResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn update_user(&self, user: &User) -> PatronResult<User> {
        let mut users = self.users.write().await;

        if !users.contains_key(&user.id) {
            return Err(PatronError::not_found("user", "id", &user.id));
        }

        users.insert(user.id.clone(), user.clone());
        Ok(user.clone())
    }

    // ==================== Session Operations ====================

    async fn create_session(&self, session: &Session) -> PatronResult<Session> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.clone(), session.clone());
        Ok(session.clone())
    }

    async fn get_session_by_token(&self, token: &str) -> PatronResult<Option<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.values().find(|s| s.token == token).cloned())
    }

    async fn delete_session(&self, id: &str) -> PatronResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id);
        Ok(())
    }

    // ==================== Account Operations ====================

    async fn create_account(&self, account: &Account) -> PatronResult<Account> {
        let mut accounts = self.accounts.write().await;

        if accounts.values().any(|a| {
            a.provider == account.provider && a.provider_account_id == account.provider_account_id
        }) {
            return Err(PatronError::duplicate(
                "account",
                "provider_account_id",
                &account.provider_account_id,
            ));
        }

        accounts.insert(account.id.clone(), account.clone());
        Ok(account.clone())
    }

    async fn get_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> PatronResult<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .find(|a| a.provider == provider && a.provider_account_id == provider_account_id)
            .cloned())
    }

    async fn get_accounts_by_user_id(&self, user_id: &str) -> PatronResult<Vec<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    // ==================== Donor Operations ====================

    async fn find_donor_by_email(&self, email: &str) -> PatronResult<Option<Donor>> {
        let donors = self.donors.read().await;
        Ok(donors.get(email).cloned())
    }

    async fn upsert_donor(&self, email: &str, update: &DonorUpdate) -> PatronResult<Donor> {
        self.begin_write()?;

        // Held across find and write so concurrent upserts serialize.
        let mut donors = self.donors.write().await;
        let donor = match donors.get_mut(email) {
            Some(existing) => {
                existing.apply(update);
                existing.clone()
            }
            None => {
                let donor = Donor::from_update(email, update);
                donors.insert(email.to_string(), donor.clone());
                donor
            }
        };
        Ok(donor)
    }

    // ==================== Donation Operations ====================

    async fn create_donation(&self, donation: NewDonation) -> PatronResult<Donation> {
        self.begin_write()?;
        if self.fail_donations.load(Ordering::SeqCst) {
            return Err(PatronError::database("donation insert rejected by memory adapter"));
        }

        let donation = Donation::from_new(donation);
        self.donations.write().await.push(donation.clone());
        Ok(donation)
    }

    async fn list_donations_by_email(&self, email: &str) -> PatronResult<Vec<Donation>> {
        let donations = self.donations.read().await;
        Ok(donations
            .iter()
            .filter(|d| d.donor_email == email)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patron_core::types::DonationFrequency;

    fn new_donation(email: &str, amount_cents: i64) -> NewDonation {
        NewDonation {
            donor_email: email.to_string(),
            amount_cents,
            currency: "usd".to_string(),
            is_recurring: false,
            frequency: DonationFrequency::OneTime,
            event_id: "evt_test".to_string(),
            payment_intent_id: None,
            invoice_id: None,
            subscription_id: None,
            receipt_url: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let adapter = MemoryAdapter::new();
        let user = User::new("test_id".to_string(), "test@example.com".to_string());

        let created = adapter.create_user(&user).await.unwrap();
        assert_eq!(created.id, "test_id");

        let fetched = adapter.get_user_by_id("test_id").await.unwrap();
        assert!(fetched.is_some());
        assert_eq!(fetched.unwrap().email, "test@example.com");
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let adapter = MemoryAdapter::new();
        let user1 = User::new("id1".to_string(), "test@example.com".to_string());
        let user2 = User::new("id2".to_string(), "test@example.com".to_string());

        adapter.create_user(&user1).await.unwrap();
        let result = adapter.create_user(&user2).await;

        assert!(matches!(result, Err(PatronError::DuplicateEntry { .. })));
    }

    #[tokio::test]
    async fn test_session_operations() {
        let adapter = MemoryAdapter::new();
        let session = Session::new("user_123".to_string());

        let created = adapter.create_session(&session).await.unwrap();
        let fetched = adapter.get_session_by_token(&created.token).await.unwrap();
        assert_eq!(fetched.unwrap().user_id, "user_123");

        adapter.delete_session(&created.id).await.unwrap();
        assert!(adapter.get_session_by_token(&created.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_account_rejected() {
        let adapter = MemoryAdapter::new();
        let first = Account::new("u1".to_string(), "google".to_string(), "g-1".to_string());
        let second = Account::new("u2".to_string(), "google".to_string(), "g-1".to_string());

        adapter.create_account(&first).await.unwrap();
        assert!(adapter.create_account(&second).await.is_err());

        let linked = adapter.get_account("google", "g-1").await.unwrap().unwrap();
        assert_eq!(linked.user_id, "u1");
    }

    #[tokio::test]
    async fn test_upsert_donor_creates_then_updates() {
        let adapter = MemoryAdapter::new();
        let update = DonorUpdate {
            amount_cents: 2000,
            ..Default::default()
        };

        let created = adapter.upsert_donor("d@example.com", &update).await.unwrap();
        let updated = adapter.upsert_donor("d@example.com", &update).await.unwrap();

        assert_eq!(created.id, updated.id);
        assert_eq!(updated.lifetime_total_cents, 4000);
        assert_eq!(adapter.write_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_are_not_lost() {
        let adapter = MemoryAdapter::new();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let adapter = adapter.clone();
            handles.push(tokio::spawn(async move {
                adapter
                    .upsert_donor(
                        "d@example.com",
                        &DonorUpdate {
                            amount_cents: 100,
                            ..Default::default()
                        },
                    )
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let donor = adapter.find_donor_by_email("d@example.com").await.unwrap().unwrap();
        assert_eq!(donor.lifetime_total_cents, 1600);
    }

    #[tokio::test]
    async fn test_donations_listed_per_email() {
        let adapter = MemoryAdapter::new();
        adapter.create_donation(new_donation("a@example.com", 100)).await.unwrap();
        adapter.create_donation(new_donation("b@example.com", 200)).await.unwrap();
        adapter.create_donation(new_donation("a@example.com", 300)).await.unwrap();

        let donations = adapter.list_donations_by_email("a@example.com").await.unwrap();
        assert_eq!(donations.len(), 2);
        assert_eq!(donations[1].amount_cents, 300);
        assert_eq!(adapter.donation_count().await, 3);
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let adapter = MemoryAdapter::new();
        adapter.set_fail_writes(true);

        let result = adapter
            .upsert_donor("d@example.com", &DonorUpdate::default())
            .await;
        assert!(matches!(result, Err(PatronError::DatabaseError { .. })));
        assert!(adapter.create_donation(new_donation("d@example.com", 1)).await.is_err());
        assert_eq!(adapter.write_count(), 2);
        assert_eq!(adapter.donation_count().await, 0);
    }

    #[tokio::test]
    async fn test_failing_donations_only() {
        let adapter = MemoryAdapter::new();
        adapter.set_fail_donations(true);

        let donor = adapter
            .upsert_donor(
                "e@example.com",
                &DonorUpdate {
                    amount_cents: 700,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(donor.lifetime_total_cents, 700);
        assert!(adapter.create_donation(new_donation("e@example.com", 700)).await.is_err());
        assert_eq!(adapter.donation_count().await, 0);
    }
}
