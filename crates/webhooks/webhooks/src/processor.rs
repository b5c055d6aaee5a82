//! Payment processor objects and the lookup seam used for enrichment.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors from processor API lookups.
#[derive(Debug, Clone, Error)]
pub enum ProcessorError {
    /// The object does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The API answered with an error status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The request never got an answer.
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Request timed out")]
    Timeout,

    /// The response body did not decode.
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Accepts either an object ID or an expanded object carrying an `id`.
fn expandable_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Expandable {
        Id(String),
        Object { id: String },
    }

    Ok(Option::<Expandable>::deserialize(deserializer)?.map(|value| match value {
        Expandable::Id(id) | Expandable::Object { id } => id,
    }))
}

/// A completed (or in-flight) payment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub amount_received: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default, deserialize_with = "expandable_id")]
    pub customer: Option<String>,
    #[serde(default)]
    pub receipt_email: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default, deserialize_with = "expandable_id")]
    pub latest_charge: Option<String>,
    /// Set when the payment belongs to a subscription invoice.
    #[serde(default, deserialize_with = "expandable_id")]
    pub invoice: Option<String>,
}

impl PaymentIntent {
    /// The amount actually collected, falling back to the requested amount.
    pub fn collected(&self) -> i64 {
        if self.amount_received > 0 {
            self.amount_received
        } else {
            self.amount
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub amount_due: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default, deserialize_with = "expandable_id")]
    pub customer: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default, deserialize_with = "expandable_id")]
    pub subscription: Option<String>,
    #[serde(default, deserialize_with = "expandable_id")]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub hosted_invoice_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    #[serde(default, deserialize_with = "expandable_id")]
    pub customer: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub items: SubscriptionItems,
}

impl Subscription {
    /// Billing interval of the first price (`day`, `week`, `month`, `year`).
    pub fn interval(&self) -> Option<&str> {
        self.items
            .data
            .first()
            .and_then(|item| item.price.recurring.as_ref())
            .map(|recurring| recurring.interval.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionItem {
    #[serde(default)]
    pub price: Price,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Price {
    #[serde(default)]
    pub unit_amount: Option<i64>,
    #[serde(default)]
    pub recurring: Option<Recurring>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recurring {
    pub interval: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    #[serde(default)]
    pub receipt_url: Option<String>,
    #[serde(default)]
    pub billing_details: BillingDetails,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillingDetails {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}

/// Read access to the payment processor's objects.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn retrieve_charge(&self, id: &str) -> Result<Charge, ProcessorError>;

    async fn retrieve_customer(&self, id: &str) -> Result<Customer, ProcessorError>;

    async fn retrieve_subscription(&self, id: &str) -> Result<Subscription, ProcessorError>;

    /// Last email source for invoices that carry neither `customer_email`
    /// nor a customer with one.
    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, ProcessorError>;
}

/// In-memory processor for tests and local runs.
#[derive(Clone, Default)]
pub struct InMemoryProcessor {
    charges: Arc<RwLock<HashMap<String, Charge>>>,
    customers: Arc<RwLock<HashMap<String, Customer>>>,
    subscriptions: Arc<RwLock<HashMap<String, Subscription>>>,
    payment_intents: Arc<RwLock<HashMap<String, PaymentIntent>>>,
    calls: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_charge(&self, charge: Charge) {
        self.charges.write().await.insert(charge.id.clone(), charge);
    }

    pub async fn insert_customer(&self, customer: Customer) {
        self.customers
            .write()
            .await
            .insert(customer.id.clone(), customer);
    }

    pub async fn insert_subscription(&self, subscription: Subscription) {
        self.subscriptions
            .write()
            .await
            .insert(subscription.id.clone(), subscription);
    }

    pub async fn insert_payment_intent(&self, intent: PaymentIntent) {
        self.payment_intents
            .write()
            .await
            .insert(intent.id.clone(), intent);
    }

    /// Makes every lookup fail with an HTTP error until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of lookups made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn begin_call(&self) -> Result<(), ProcessorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProcessorError::Http("processor unavailable".to_string()));
        }
        Ok(())
    }
}

async fn lookup<T: Clone>(
    map: &RwLock<HashMap<String, T>>,
    id: &str,
) -> Result<T, ProcessorError> {
    map.read()
        .await
        .get(id)
        .cloned()
        .ok_or_else(|| ProcessorError::NotFound(id.to_string()))
}

#[async_trait]
impl PaymentProcessor for InMemoryProcessor {
    async fn retrieve_charge(&self, id: &str) -> Result<Charge, ProcessorError> {
        self.begin_call()?;
        lookup(&self.charges, id).await
    }

    async fn retrieve_customer(&self, id: &str) -> Result<Customer, ProcessorError> {
        self.begin_call()?;
        lookup(&self.customers, id).await
    }

    async fn retrieve_subscription(&self, id: &str) -> Result<Subscription, ProcessorError> {
        self.begin_call()?;
        lookup(&self.subscriptions, id).await
    }

    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, ProcessorError> {
        self.begin_call()?;
        lookup(&self.payment_intents, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_interval() {
        let subscription: Subscription = serde_json::from_value(serde_json::json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "active",
            "items": {"data": [{"price": {"unit_amount": 1000, "recurring": {"interval": "month"}}}]}
        }))
        .unwrap();

        assert_eq!(subscription.interval(), Some("month"));
        assert_eq!(subscription.customer.as_deref(), Some("cus_1"));
    }

    #[test]
    fn test_expanded_customer_object() {
        let intent: PaymentIntent = serde_json::from_value(serde_json::json!({
            "id": "pi_1",
            "amount": 2500,
            "currency": "usd",
            "customer": {"id": "cus_9", "email": "x@example.com"},
            "latest_charge": null
        }))
        .unwrap();

        assert_eq!(intent.customer.as_deref(), Some("cus_9"));
        assert_eq!(intent.latest_charge, None);
        assert_eq!(intent.collected(), 2500);
    }

    #[tokio::test]
    async fn test_in_memory_lookup() {
        let processor = InMemoryProcessor::new();
        processor
            .insert_customer(Customer {
                id: "cus_1".into(),
                email: Some("donor@example.com".into()),
                ..Default::default()
            })
            .await;

        let customer = processor.retrieve_customer("cus_1").await.unwrap();
        assert_eq!(customer.email.as_deref(), Some("donor@example.com"));

        let missing = processor.retrieve_charge("ch_missing").await;
        assert!(matches!(missing, Err(ProcessorError::NotFound(id)) if id == "ch_missing"));
        assert_eq!(processor.calls(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_processor() {
        let processor = InMemoryProcessor::new();
        processor.set_unavailable(true);
        assert!(matches!(
            processor.retrieve_subscription("sub_1").await,
            Err(ProcessorError::Http(_))
        ));
    }
}
