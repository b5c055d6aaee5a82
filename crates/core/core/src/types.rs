//! Core data types for Patron.
//!
//! Identity records (`User`, `Account`, `Session`) come from provider
//! sign-in; donation records (`Donor`, `Donation`) come from payment
//! webhooks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a signed-in user.
///
/// # Example
///
/// ```rust
/// use patron_core::User;
///
/// let user = User::new("user_123".to_string(), "user@example.com".to_string());
/// assert!(!user.email_verified);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// Unique identifier for the user
    pub id: String,

    /// User's email address
    pub email: String,

    /// Whether the provider vouched for the email address
    #[serde(default)]
    pub email_verified: bool,

    /// Optional display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Optional profile image URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Timestamp when the user was created
    pub created_at: DateTime<Utc>,

    /// Timestamp when the user was last updated
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Creates a new user with the given ID and email.
    pub fn new(id: String, email: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            email,
            email_verified: false,
            name: None,
            image: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for User {
    fn default() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), String::new())
    }
}

/// Represents an active session for a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    /// Unique identifier for the session
    pub id: String,

    /// The ID of the user this session belongs to
    pub user_id: String,

    /// The session token (used for authentication)
    pub token: String,

    /// When the session expires
    pub expires_at: DateTime<Utc>,

    /// Timestamp when the session was created
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Creates a new session for the given user, expiring in 7 days.
    pub fn new(user_id: String) -> Self {
        Self::with_expiration(user_id, chrono::Duration::days(7))
    }

    /// Creates a new session with a custom expiration duration.
    pub fn with_expiration(user_id: String, duration: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            token: uuid::Uuid::new_v4().simple().to_string(),
            expires_at: now + duration,
            created_at: now,
        }
    }

    /// Checks if the session has expired.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// An identity-provider account linked to a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    /// Unique identifier for the account
    pub id: String,

    /// The ID of the user this account belongs to
    pub user_id: String,

    /// The provider name (e.g., "google", "github")
    pub provider: String,

    /// The provider's account ID
    pub provider_account_id: String,

    /// Timestamp when the account was created
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Creates a new account for the given user and provider.
    pub fn new(user_id: String, provider: String, provider_account_id: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            provider,
            provider_account_id,
            created_at: Utc::now(),
        }
    }
}

/// How often a donor gives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DonationFrequency {
    #[default]
    OneTime,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    /// A recurring donation that has been cancelled.
    Cancelled,
}

impl DonationFrequency {
    /// Maps a processor billing interval (`day`, `week`, `month`, `year`).
    pub fn from_interval(interval: &str) -> Option<Self> {
        match interval {
            "day" => Some(Self::Daily),
            "week" => Some(Self::Weekly),
            "month" => Some(Self::Monthly),
            "year" => Some(Self::Yearly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneTime => "one_time",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_recurring(&self) -> bool {
        matches!(self, Self::Daily | Self::Weekly | Self::Monthly | Self::Yearly)
    }
}

impl fmt::Display for DonationFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A donor, keyed by email.
///
/// `lifetime_total_cents` only ever grows; see [`Donor::apply`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Donor {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Payment processor customer ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    /// Sum of every recorded donation, in minor currency units.
    pub lifetime_total_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_donation_at: Option<DateTime<Utc>>,
    pub frequency: DonationFrequency,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Donor {
    /// Builds a fresh donor from the first update seen for `email`.
    pub fn from_update(email: impl Into<String>, update: &DonorUpdate) -> Self {
        let now = Utc::now();
        let mut donor = Self {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.into(),
            name: None,
            customer_id: None,
            subscription_id: None,
            lifetime_total_cents: 0,
            last_donation_at: None,
            frequency: DonationFrequency::OneTime,
            created_at: now,
            updated_at: now,
        };
        donor.apply(update);
        donor
    }

    /// Merges an update into this donor.
    ///
    /// Negative amounts are ignored so the lifetime total never decreases.
    pub fn apply(&mut self, update: &DonorUpdate) {
        if let Some(name) = &update.name {
            self.name = Some(name.clone());
        }
        if let Some(customer_id) = &update.customer_id {
            self.customer_id = Some(customer_id.clone());
        }
        if let Some(subscription_id) = &update.subscription_id {
            self.subscription_id = Some(subscription_id.clone());
        }
        self.lifetime_total_cents = self
            .lifetime_total_cents
            .saturating_add(update.amount_cents.max(0));
        if let Some(at) = update.donated_at {
            self.last_donation_at = Some(at);
        }
        if let Some(frequency) = update.frequency {
            self.frequency = frequency;
        }
        self.updated_at = Utc::now();
    }

    /// Lifetime total in major currency units.
    pub fn lifetime_total(&self) -> f64 {
        self.lifetime_total_cents as f64 / 100.0
    }
}

/// Changes to apply to a donor on upsert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DonorUpdate {
    pub name: Option<String>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    /// Amount to add to the lifetime total, in minor units.
    pub amount_cents: i64,
    pub donated_at: Option<DateTime<Utc>>,
    pub frequency: Option<DonationFrequency>,
}

/// A donation to be recorded; one per payment event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDonation {
    pub donor_email: String,
    pub amount_cents: i64,
    pub currency: String,
    pub is_recurring: bool,
    pub frequency: DonationFrequency,
    /// The webhook event that produced this donation.
    pub event_id: String,
    pub payment_intent_id: Option<String>,
    pub invoice_id: Option<String>,
    pub subscription_id: Option<String>,
    pub receipt_url: Option<String>,
}

/// A persisted donation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donation {
    pub id: String,
    pub donor_email: String,
    pub amount_cents: i64,
    pub currency: String,
    pub is_recurring: bool,
    pub frequency: DonationFrequency,
    pub event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Donation {
    /// Stamps a new donation with an ID and creation time.
    pub fn from_new(new: NewDonation) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            donor_email: new.donor_email,
            amount_cents: new.amount_cents,
            currency: new.currency,
            is_recurring: new.is_recurring,
            frequency: new.frequency,
            event_id: new.event_id,
            payment_intent_id: new.payment_intent_id,
            invoice_id: new.invoice_id,
            subscription_id: new.subscription_id,
            receipt_url: new.receipt_url,
            created_at: Utc::now(),
        }
    }

    /// Amount in major currency units.
    pub fn amount(&self) -> f64 {
        self.amount_cents as f64 / 100.0
    }
}
