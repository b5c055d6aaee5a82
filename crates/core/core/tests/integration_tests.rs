//! Integration tests for Patron Core
//!
//! This test suite covers:
//! - Record serialization
//! - Donor update semantics
//! - Error handling

use patron_core::{
    Donation, DonationFrequency, Donor, DonorUpdate, NewDonation, PatronError, PatronResult,
};

mod serialization_tests {
    use super::*;

    #[test]
    fn test_frequency_serializes_snake_case() {
        let json = serde_json::to_string(&DonationFrequency::OneTime).unwrap();
        assert_eq!(json, "\"one_time\"");

        let parsed: DonationFrequency = serde_json::from_str("\"monthly\"").unwrap();
        assert_eq!(parsed, DonationFrequency::Monthly);
    }

    #[test]
    fn test_donation_omits_missing_references() {
        let donation = Donation::from_new(NewDonation {
            donor_email: "d@example.com".to_string(),
            amount_cents: 1500,
            currency: "usd".to_string(),
            is_recurring: false,
            frequency: DonationFrequency::OneTime,
            event_id: "evt_1".to_string(),
            payment_intent_id: Some("pi_1".to_string()),
            invoice_id: None,
            subscription_id: None,
            receipt_url: None,
        });

        let value = serde_json::to_value(&donation).unwrap();
        assert_eq!(value["payment_intent_id"], "pi_1");
        assert!(value.get("invoice_id").is_none());
        assert_eq!(donation.amount(), 15.0);
    }
}

mod donor_tests {
    use super::*;

    #[test]
    fn test_repeated_updates_sum_amounts() {
        let update = DonorUpdate {
            amount_cents: 1000,
            ..Default::default()
        };
        let mut donor = Donor::from_update("d@example.com", &update);
        for _ in 0..4 {
            donor.apply(&update);
        }
        assert_eq!(donor.lifetime_total_cents, 5000);
    }
}

mod error_tests {
    use super::*;

    fn lookup(found: bool) -> PatronResult<&'static str> {
        if found {
            Ok("donor")
        } else {
            Err(PatronError::not_found("donor", "email", "x@example.com"))
        }
    }

    #[test]
    fn test_error_propagation() {
        assert!(lookup(true).is_ok());
        let err = lookup(false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Record not found: donor with email=x@example.com"
        );
    }

    #[test]
    fn test_serde_error_conversion() {
        let err: PatronError = serde_json::from_str::<DonorUpdate>("{").unwrap_err().into();
        assert!(matches!(err, PatronError::SerializationError { .. }));
    }
}
