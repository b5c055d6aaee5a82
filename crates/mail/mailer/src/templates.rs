//! Notification templates.
//!
//! Each [`Notification`] renders to a subject, an HTML body and a
//! plain-text alternative. Links point at the public site.

use patron_core::DonationFrequency;

use crate::message::{MessageType, OutgoingMessage};

/// Site details embedded in rendered mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteContext {
    /// Organization name used in greetings and signatures.
    pub organization: String,
    /// Public base URL, without a trailing slash.
    pub base_url: String,
}

impl SiteContext {
    pub fn new(organization: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Absolute link to `path` on the public site.
    pub fn link(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// A rendered email, ready to address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Notifications sent in response to payment events.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    DonationReceipt {
        name: Option<String>,
        amount_cents: i64,
        currency: String,
        receipt_url: Option<String>,
    },
    RecurringReceipt {
        name: Option<String>,
        amount_cents: i64,
        currency: String,
        frequency: DonationFrequency,
        lifetime_total_cents: i64,
        receipt_url: Option<String>,
    },
    PaymentFailed {
        name: Option<String>,
        amount_cents: i64,
        currency: String,
    },
    SubscriptionCancelled {
        name: Option<String>,
    },
}

impl Notification {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::DonationReceipt { .. } => MessageType::DonationReceipt,
            Self::RecurringReceipt { .. } => MessageType::RecurringReceipt,
            Self::PaymentFailed { .. } => MessageType::PaymentFailed,
            Self::SubscriptionCancelled { .. } => MessageType::SubscriptionCancelled,
        }
    }

    pub fn render(&self, site: &SiteContext) -> RenderedEmail {
        match self {
            Self::DonationReceipt {
                name,
                amount_cents,
                currency,
                receipt_url,
            } => {
                let amount = format_amount(*amount_cents, currency);
                let mut lines = vec![
                    greeting(name),
                    format!(
                        "Thank you for your gift of {amount} to {}.",
                        site.organization
                    ),
                ];
                if let Some(url) = receipt_url {
                    lines.push(format!("Your receipt: {url}"));
                }
                lines.push(format!("See your giving history at {}", site.link("account")));
                compose(format!("Thank you for your donation of {amount}"), &lines, site)
            }
            Self::RecurringReceipt {
                name,
                amount_cents,
                currency,
                frequency,
                lifetime_total_cents,
                receipt_url,
            } => {
                let amount = format_amount(*amount_cents, currency);
                let total = format_amount(*lifetime_total_cents, currency);
                let mut lines = vec![
                    greeting(name),
                    format!("We received your {frequency} gift of {amount}."),
                    format!("Your total giving to date is {total}."),
                ];
                if let Some(url) = receipt_url {
                    lines.push(format!("Your receipt: {url}"));
                }
                lines.push(format!(
                    "Manage your recurring gift at {}",
                    site.link("account/subscription")
                ));
                compose(format!("Receipt for your {frequency} donation"), &lines, site)
            }
            Self::PaymentFailed {
                name,
                amount_cents,
                currency,
            } => {
                let amount = format_amount(*amount_cents, currency);
                let lines = vec![
                    greeting(name),
                    format!("We could not process your recurring gift of {amount}."),
                    format!(
                        "Please update your payment details at {}",
                        site.link("account/billing")
                    ),
                ];
                compose("Action needed: your donation payment failed".to_string(), &lines, site)
            }
            Self::SubscriptionCancelled { name } => {
                let lines = vec![
                    greeting(name),
                    "Your recurring donation has been cancelled.".to_string(),
                    format!("You can start again any time at {}", site.link("donate")),
                ];
                compose("Your recurring donation was cancelled".to_string(), &lines, site)
            }
        }
    }

    /// Renders and addresses the notification.
    pub fn to_message(&self, to: impl Into<String>, site: &SiteContext) -> OutgoingMessage {
        let rendered = self.render(site);
        OutgoingMessage::new(to, rendered.subject, rendered.html).text(rendered.text)
    }
}

/// Formats minor units as a display amount: `$12.50` for USD,
/// `12.50 EUR` otherwise.
pub(crate) fn format_amount(amount_cents: i64, currency: &str) -> String {
    let sign = if amount_cents < 0 { "-" } else { "" };
    let abs = amount_cents.unsigned_abs();
    let major = format!("{}.{:02}", abs / 100, abs % 100);
    if currency.eq_ignore_ascii_case("usd") {
        format!("{sign}${major}")
    } else {
        format!("{sign}{major} {}", currency.to_ascii_uppercase())
    }
}

fn greeting(name: &Option<String>) -> String {
    match name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("Dear {name},"),
        None => "Dear friend,".to_string(),
    }
}

fn compose(subject: String, lines: &[String], site: &SiteContext) -> RenderedEmail {
    let signature = format!("With gratitude,\n{}", site.organization);

    let mut text = lines.join("\n\n");
    text.push_str("\n\n");
    text.push_str(&signature);

    let mut html = String::from("<!DOCTYPE html><html><body>");
    for line in lines {
        html.push_str("<p>");
        html.push_str(&escape_html(line));
        html.push_str("</p>");
    }
    html.push_str("<p>");
    html.push_str(&escape_html(&signature).replace('\n', "<br>"));
    html.push_str("</p></body></html>");

    RenderedEmail {
        subject,
        html,
        text,
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> SiteContext {
        SiteContext::new("Open Shelter", "https://shelter.example.org/")
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(2500, "usd"), "$25.00");
        assert_eq!(format_amount(1999, "eur"), "19.99 EUR");
        assert_eq!(format_amount(5, "USD"), "$0.05");
        assert_eq!(format_amount(-150, "usd"), "-$1.50");
    }

    #[test]
    fn test_links_use_site_base() {
        assert_eq!(site().link("/account"), "https://shelter.example.org/account");
    }

    #[test]
    fn test_donation_receipt() {
        let notification = Notification::DonationReceipt {
            name: Some("Dana".to_string()),
            amount_cents: 5000,
            currency: "usd".to_string(),
            receipt_url: Some("https://pay.example.com/r/1".to_string()),
        };
        let email = notification.render(&site());

        assert_eq!(email.subject, "Thank you for your donation of $50.00");
        assert!(email.text.starts_with("Dear Dana,"));
        assert!(email.text.contains("https://pay.example.com/r/1"));
        assert!(email.text.contains("https://shelter.example.org/account"));
        assert!(email.html.contains("<p>Dear Dana,</p>"));
        assert_eq!(notification.message_type(), MessageType::DonationReceipt);
    }

    #[test]
    fn test_recurring_receipt_mentions_total() {
        let email = Notification::RecurringReceipt {
            name: None,
            amount_cents: 1000,
            currency: "usd".to_string(),
            frequency: DonationFrequency::Monthly,
            lifetime_total_cents: 12000,
            receipt_url: None,
        }
        .render(&site());

        assert_eq!(email.subject, "Receipt for your monthly donation");
        assert!(email.text.starts_with("Dear friend,"));
        assert!(email.text.contains("$120.00"));
    }

    #[test]
    fn test_names_are_escaped_in_html() {
        let email = Notification::SubscriptionCancelled {
            name: Some("<script>".to_string()),
        }
        .render(&site());

        assert!(email.html.contains("Dear &lt;script&gt;,"));
        assert!(!email.html.contains("<script>"));
    }

    #[test]
    fn test_to_message_addresses_recipient() {
        let message = Notification::PaymentFailed {
            name: None,
            amount_cents: 1000,
            currency: "usd".to_string(),
        }
        .to_message("d@example.com", &site());

        assert_eq!(message.to, "d@example.com");
        assert!(message.subject.contains("payment failed"));
        assert!(message.text.unwrap().contains("account/billing"));
    }
}
