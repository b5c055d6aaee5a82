//! # Patron Core
//!
//! This crate provides the foundational types and traits for Patron.
//! It defines the core records (`User`, `Account`, `Session`, `Donor`,
//! `Donation`), the error type, and the `StorageAdapter` trait that
//! persistence backends implement.

pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used items at the crate root
pub use error::{PatronError, PatronResult};
pub use traits::StorageAdapter;
pub use types::{
    Account, Donation, DonationFrequency, Donor, DonorUpdate, NewDonation, Session, User,
};
