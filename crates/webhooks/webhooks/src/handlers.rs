//! Per-event handlers: extract, enrich, persist, notify.

use chrono::Utc;
use std::sync::Arc;

use patron_core::{DonationFrequency, DonorUpdate, NewDonation, StorageAdapter};
use patron_mailer::{MailDispatcher, Notification, SiteContext};

use crate::error::HandlerError;
use crate::event::{EventKind, ProcessorEvent};
use crate::outcome::{NotificationStatus, WebhookOutcome};
use crate::processor::{
    Charge, Customer, Invoice, PaymentIntent, PaymentProcessor, ProcessorError, Subscription,
};

/// The collaborators every handler needs.
#[derive(Clone)]
pub struct EventHandlers {
    storage: Arc<dyn StorageAdapter>,
    processor: Arc<dyn PaymentProcessor>,
    mailer: MailDispatcher,
    site: SiteContext,
}

/// Who a payment event is about.
#[derive(Debug, Default)]
struct DonorContact {
    email: Option<String>,
    name: Option<String>,
}

impl EventHandlers {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        processor: Arc<dyn PaymentProcessor>,
        mailer: MailDispatcher,
        site: SiteContext,
    ) -> Self {
        Self {
            storage,
            processor,
            mailer,
            site,
        }
    }

    pub fn mailer(&self) -> &MailDispatcher {
        &self.mailer
    }

    /// Runs the handler for `event`'s kind.
    pub async fn handle(&self, event: &ProcessorEvent) -> Result<WebhookOutcome, HandlerError> {
        match event.kind() {
            EventKind::PaymentIntentSucceeded => self.payment_intent_succeeded(event).await,
            EventKind::InvoicePaymentSucceeded => self.invoice_payment_succeeded(event).await,
            EventKind::InvoicePaymentFailed => self.invoice_payment_failed(event).await,
            EventKind::SubscriptionUpdated => self.subscription_updated(event).await,
            EventKind::SubscriptionDeleted => self.subscription_deleted(event).await,
            EventKind::Unknown(event_type) => Ok(WebhookOutcome::Ignored { event_type }),
        }
    }

    /// One-time donation.
    async fn payment_intent_succeeded(
        &self,
        event: &ProcessorEvent,
    ) -> Result<WebhookOutcome, HandlerError> {
        let kind = EventKind::PaymentIntentSucceeded;
        let intent: PaymentIntent = decode(event)?;

        if let Some(invoice_id) = &intent.invoice {
            return Ok(WebhookOutcome::Skipped {
                kind: kind.to_string(),
                reason: format!("payment belongs to invoice {invoice_id}"),
            });
        }

        let amount_cents = intent.collected();
        if amount_cents <= 0 {
            return Err(HandlerError::Validation(format!(
                "payment intent {} has no amount",
                intent.id
            )));
        }

        let charge = self.best_effort_charge(intent.latest_charge.as_deref()).await;
        let contact = self.payment_intent_contact(&intent, charge.as_ref()).await?;
        let email = contact.email.ok_or_else(|| {
            HandlerError::Validation(format!("payment intent {} has no donor email", intent.id))
        })?;
        let receipt_url = charge.and_then(|c| c.receipt_url);

        self.storage
            .upsert_donor(
                &email,
                &DonorUpdate {
                    name: contact.name.clone(),
                    customer_id: intent.customer.clone(),
                    amount_cents,
                    donated_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;

        let donation = self
            .storage
            .create_donation(NewDonation {
                donor_email: email.clone(),
                amount_cents,
                currency: intent.currency.clone(),
                is_recurring: false,
                frequency: DonationFrequency::OneTime,
                event_id: event.id.clone(),
                payment_intent_id: Some(intent.id.clone()),
                invoice_id: None,
                subscription_id: None,
                receipt_url: receipt_url.clone(),
            })
            .await
            .map_err(HandlerError::DonationNotRecorded)?;

        tracing::info!(
            event_id = %event.id,
            donation_id = %donation.id,
            donor = %email,
            amount_cents,
            "Recorded one-time donation"
        );

        let notification = self
            .notify(
                &email,
                Notification::DonationReceipt {
                    name: contact.name,
                    amount_cents,
                    currency: intent.currency,
                    receipt_url,
                },
            )
            .await;

        Ok(WebhookOutcome::Handled {
            kind: kind.to_string(),
            notification,
        })
    }

    /// Recurring donation paid through a subscription invoice.
    async fn invoice_payment_succeeded(
        &self,
        event: &ProcessorEvent,
    ) -> Result<WebhookOutcome, HandlerError> {
        let kind = EventKind::InvoicePaymentSucceeded;
        let invoice: Invoice = decode(event)?;

        if invoice.amount_paid <= 0 {
            return Err(HandlerError::Validation(format!(
                "invoice {} has no paid amount",
                invoice.id
            )));
        }

        let contact = self.invoice_contact(&invoice).await?;
        let email = contact.email.ok_or_else(|| {
            HandlerError::Validation(format!("invoice {} has no donor email", invoice.id))
        })?;

        // A one-off invoice leaves the donor's frequency alone.
        let frequency = match &invoice.subscription {
            Some(subscription_id) => Some(self.invoice_frequency(subscription_id).await),
            None => None,
        };
        let donation_frequency = frequency.unwrap_or(DonationFrequency::OneTime);

        let donor = self
            .storage
            .upsert_donor(
                &email,
                &DonorUpdate {
                    name: contact.name.clone(),
                    customer_id: invoice.customer.clone(),
                    subscription_id: invoice.subscription.clone(),
                    amount_cents: invoice.amount_paid,
                    donated_at: Some(Utc::now()),
                    frequency,
                },
            )
            .await?;

        let donation = self
            .storage
            .create_donation(NewDonation {
                donor_email: email.clone(),
                amount_cents: invoice.amount_paid,
                currency: invoice.currency.clone(),
                is_recurring: invoice.subscription.is_some(),
                frequency: donation_frequency,
                event_id: event.id.clone(),
                payment_intent_id: invoice.payment_intent.clone(),
                invoice_id: Some(invoice.id.clone()),
                subscription_id: invoice.subscription.clone(),
                receipt_url: invoice.hosted_invoice_url.clone(),
            })
            .await
            .map_err(HandlerError::DonationNotRecorded)?;

        tracing::info!(
            event_id = %event.id,
            donation_id = %donation.id,
            donor = %email,
            amount_cents = invoice.amount_paid,
            lifetime_total_cents = donor.lifetime_total_cents,
            frequency = %donation_frequency,
            "Recorded recurring donation"
        );

        let notification = self
            .notify(
                &email,
                Notification::RecurringReceipt {
                    name: contact.name,
                    amount_cents: invoice.amount_paid,
                    currency: invoice.currency,
                    frequency: donation_frequency,
                    lifetime_total_cents: donor.lifetime_total_cents,
                    receipt_url: invoice.hosted_invoice_url,
                },
            )
            .await;

        Ok(WebhookOutcome::Handled {
            kind: kind.to_string(),
            notification,
        })
    }

    /// A recurring charge failed; tell the donor, record nothing.
    async fn invoice_payment_failed(
        &self,
        event: &ProcessorEvent,
    ) -> Result<WebhookOutcome, HandlerError> {
        let kind = EventKind::InvoicePaymentFailed;
        let invoice: Invoice = decode(event)?;

        let contact = self.invoice_contact(&invoice).await?;
        let email = contact.email.ok_or_else(|| {
            HandlerError::Validation(format!("invoice {} has no donor email", invoice.id))
        })?;

        tracing::warn!(
            event_id = %event.id,
            invoice_id = %invoice.id,
            donor = %email,
            amount_due = invoice.amount_due,
            "Recurring payment failed"
        );

        let notification = self
            .notify(
                &email,
                Notification::PaymentFailed {
                    name: contact.name,
                    amount_cents: invoice.amount_due,
                    currency: invoice.currency,
                },
            )
            .await;

        Ok(WebhookOutcome::Handled {
            kind: kind.to_string(),
            notification,
        })
    }

    /// Plan or status change; only the donor's frequency moves.
    async fn subscription_updated(
        &self,
        event: &ProcessorEvent,
    ) -> Result<WebhookOutcome, HandlerError> {
        let kind = EventKind::SubscriptionUpdated;
        let subscription: Subscription = decode(event)?;

        let Some(email) = self.subscription_email(&subscription).await? else {
            return Err(HandlerError::Validation(format!(
                "subscription {} has no donor email",
                subscription.id
            )));
        };

        if self.storage.find_donor_by_email(&email).await?.is_none() {
            return Ok(WebhookOutcome::Skipped {
                kind: kind.to_string(),
                reason: format!("no donor on record for subscription {}", subscription.id),
            });
        }

        let frequency = subscription_frequency(&subscription);
        self.storage
            .upsert_donor(
                &email,
                &DonorUpdate {
                    subscription_id: Some(subscription.id.clone()),
                    frequency: Some(frequency),
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!(
            event_id = %event.id,
            subscription_id = %subscription.id,
            status = %subscription.status,
            frequency = %frequency,
            "Updated donor frequency"
        );

        Ok(WebhookOutcome::Handled {
            kind: kind.to_string(),
            notification: NotificationStatus::NotRequired,
        })
    }

    /// Subscription ended; mark the donor cancelled and say goodbye.
    async fn subscription_deleted(
        &self,
        event: &ProcessorEvent,
    ) -> Result<WebhookOutcome, HandlerError> {
        let kind = EventKind::SubscriptionDeleted;
        let subscription: Subscription = decode(event)?;

        let Some(email) = self.subscription_email(&subscription).await? else {
            return Err(HandlerError::Validation(format!(
                "subscription {} has no donor email",
                subscription.id
            )));
        };

        if self.storage.find_donor_by_email(&email).await?.is_none() {
            return Ok(WebhookOutcome::Skipped {
                kind: kind.to_string(),
                reason: format!("no donor on record for subscription {}", subscription.id),
            });
        }

        let donor = self
            .storage
            .upsert_donor(
                &email,
                &DonorUpdate {
                    frequency: Some(DonationFrequency::Cancelled),
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!(
            event_id = %event.id,
            subscription_id = %subscription.id,
            donor = %email,
            "Recurring donation cancelled"
        );

        let notification = self
            .notify(&email, Notification::SubscriptionCancelled { name: donor.name })
            .await;

        Ok(WebhookOutcome::Handled {
            kind: kind.to_string(),
            notification,
        })
    }

    // ==================== Enrichment ====================

    /// Email from `receipt_email`, metadata, the customer, then the charge.
    async fn payment_intent_contact(
        &self,
        intent: &PaymentIntent,
        charge: Option<&Charge>,
    ) -> Result<DonorContact, HandlerError> {
        let mut contact = DonorContact {
            email: donor_email(intent.receipt_email.as_deref())
                .or_else(|| donor_email(intent.metadata.get("email").map(String::as_str))),
            name: non_empty(intent.metadata.get("name").map(String::as_str)),
        };

        if contact.email.is_none() {
            if let Some(customer) = self.resolve_customer(intent.customer.as_deref()).await? {
                contact.fill(donor_email(customer.email.as_deref()), customer.name.as_deref());
            }
        } else if contact.name.is_none() {
            // Only the name is missing, so the lookup is best-effort.
            match self.resolve_customer(intent.customer.as_deref()).await {
                Ok(Some(customer)) => contact.fill(None, customer.name.as_deref()),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        payment_intent_id = %intent.id,
                        error = %err,
                        "Customer lookup failed, continuing without a name"
                    );
                }
            }
        }

        if let Some(charge) = charge {
            contact.fill(
                donor_email(charge.billing_details.email.as_deref()),
                charge.billing_details.name.as_deref(),
            );
        }

        Ok(contact)
    }

    /// Email from `customer_email`, the customer record, then the invoice's
    /// payment intent.
    async fn invoice_contact(&self, invoice: &Invoice) -> Result<DonorContact, HandlerError> {
        let mut contact = DonorContact {
            email: donor_email(invoice.customer_email.as_deref()),
            name: non_empty(invoice.customer_name.as_deref()),
        };

        if contact.email.is_none() {
            if let Some(customer) = self.resolve_customer(invoice.customer.as_deref()).await? {
                contact.fill(donor_email(customer.email.as_deref()), customer.name.as_deref());
            }
        }

        if contact.email.is_none() {
            let intent = self
                .resolve_payment_intent(invoice.payment_intent.as_deref())
                .await?;
            if let Some(intent) = intent {
                contact.fill(donor_email(intent.receipt_email.as_deref()), None);
            }
        }

        Ok(contact)
    }

    async fn subscription_email(
        &self,
        subscription: &Subscription,
    ) -> Result<Option<String>, HandlerError> {
        Ok(self
            .resolve_customer(subscription.customer.as_deref())
            .await?
            .and_then(|customer| donor_email(customer.email.as_deref())))
    }

    /// A missing or deleted customer is simply absent; other failures propagate.
    async fn resolve_customer(&self, id: Option<&str>) -> Result<Option<Customer>, HandlerError> {
        let Some(id) = id else {
            return Ok(None);
        };

        match self.processor.retrieve_customer(id).await {
            Ok(customer) if customer.deleted => Ok(None),
            Ok(customer) => Ok(Some(customer)),
            Err(ProcessorError::NotFound(_)) => {
                tracing::warn!(customer_id = %id, "Customer not found");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn resolve_payment_intent(
        &self,
        id: Option<&str>,
    ) -> Result<Option<PaymentIntent>, HandlerError> {
        let Some(id) = id else {
            return Ok(None);
        };

        match self.processor.retrieve_payment_intent(id).await {
            Ok(intent) => Ok(Some(intent)),
            Err(ProcessorError::NotFound(_)) => {
                tracing::warn!(payment_intent_id = %id, "Payment intent not found");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// The charge only contributes a receipt URL and fallback contact.
    async fn best_effort_charge(&self, id: Option<&str>) -> Option<Charge> {
        let id = id?;
        match self.processor.retrieve_charge(id).await {
            Ok(charge) => Some(charge),
            Err(err) => {
                tracing::warn!(charge_id = %id, error = %err, "Charge lookup failed");
                None
            }
        }
    }

    /// The invoice is already paid, so an unreachable subscription falls back to monthly.
    async fn invoice_frequency(&self, subscription_id: &str) -> DonationFrequency {
        match self.processor.retrieve_subscription(subscription_id).await {
            Ok(subscription) => subscription_frequency(&subscription),
            Err(err) => {
                tracing::warn!(
                    subscription_id = %subscription_id,
                    error = %err,
                    "Subscription lookup failed, assuming monthly"
                );
                DonationFrequency::Monthly
            }
        }
    }

    // ==================== Notification ====================

    async fn notify(&self, email: &str, notification: Notification) -> NotificationStatus {
        let message_type = notification.message_type();
        let message = notification.to_message(email, &self.site);

        match self.mailer.send(&message, message_type).await {
            Ok(report) => NotificationStatus::Sent {
                attempts: report.attempts,
            },
            Err(err) => {
                tracing::warn!(to = %email, error = %err, "Donor notification not delivered");
                NotificationStatus::Failed {
                    error: err.to_string(),
                }
            }
        }
    }
}

impl DonorContact {
    /// Fills whichever of email and name is still missing.
    fn fill(&mut self, email: Option<String>, name: Option<&str>) {
        if self.email.is_none() {
            self.email = email;
        }
        if self.name.is_none() {
            self.name = non_empty(name);
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(event: &ProcessorEvent) -> Result<T, HandlerError> {
    event.object().map_err(|e| {
        HandlerError::Validation(format!("{} object did not decode: {}", event.event_type, e))
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Donor records are keyed by the trimmed, lowercased address.
fn donor_email(value: Option<&str>) -> Option<String> {
    non_empty(value).map(|email| email.to_lowercase())
}

/// Cancelled-like statuses win over the billing interval.
fn subscription_frequency(subscription: &Subscription) -> DonationFrequency {
    if matches!(
        subscription.status.as_str(),
        "canceled" | "incomplete_expired"
    ) {
        return DonationFrequency::Cancelled;
    }

    match subscription.interval() {
        Some(interval) => DonationFrequency::from_interval(interval).unwrap_or_else(|| {
            tracing::warn!(interval, "Unrecognized billing interval, assuming monthly");
            DonationFrequency::Monthly
        }),
        None => DonationFrequency::Monthly,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{Price, Recurring, SubscriptionItem, SubscriptionItems};

    fn subscription(status: &str, interval: Option<&str>) -> Subscription {
        Subscription {
            id: "sub_1".into(),
            customer: Some("cus_1".into()),
            status: status.into(),
            items: SubscriptionItems {
                data: vec![SubscriptionItem {
                    price: Price {
                        unit_amount: Some(1000),
                        recurring: interval.map(|i| Recurring { interval: i.into() }),
                    },
                }],
            },
        }
    }

    #[test]
    fn test_subscription_frequency() {
        assert_eq!(
            subscription_frequency(&subscription("active", Some("year"))),
            DonationFrequency::Yearly
        );
        assert_eq!(
            subscription_frequency(&subscription("active", Some("week"))),
            DonationFrequency::Weekly
        );
        assert_eq!(
            subscription_frequency(&subscription("canceled", Some("month"))),
            DonationFrequency::Cancelled
        );
        assert_eq!(
            subscription_frequency(&subscription("active", None)),
            DonationFrequency::Monthly
        );
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some("  a@b.org ")), Some("a@b.org".to_string()));
        assert_eq!(non_empty(Some("   ")), None);
        assert_eq!(non_empty(None), None);
    }

    #[test]
    fn test_donor_email_is_normalized() {
        assert_eq!(
            donor_email(Some(" Ada@Example.COM ")),
            Some("ada@example.com".to_string())
        );
        assert_eq!(donor_email(Some("")), None);
    }

    #[test]
    fn test_contact_fill_keeps_earlier_values() {
        let mut contact = DonorContact {
            email: Some("first@example.com".into()),
            name: None,
        };
        contact.fill(Some("second@example.com".into()), Some("Ada"));
        assert_eq!(contact.email.as_deref(), Some("first@example.com"));
        assert_eq!(contact.name.as_deref(), Some("Ada"));
    }
}
