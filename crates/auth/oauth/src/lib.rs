//! # Patron OAuth
//!
//! Turns a verified identity-provider profile into a persisted user, a
//! linked provider account and a fresh session.
//!
//! ## Example
//!
//! ```rust,ignore
//! use patron_oauth::{IdentityService, ProviderProfile};
//!
//! let identity = IdentityService::new(storage);
//! let profile = ProviderProfile::new("github", "12345")
//!     .email("ada@example.com", true)
//!     .name("Ada Lovelace");
//!
//! let sign_in = identity.sign_in(&profile).await?;
//! println!("new user: {}", sign_in.is_new_user);
//! ```

mod error;
mod identity;
mod profile;

pub use error::{AuthError, AuthResult};
pub use identity::{IdentityConfig, IdentityService, SignIn};
pub use profile::ProviderProfile;
