//! Caller identity types for the admin surface.
//!
//! Credential verification happens upstream (the auth collaborator); every
//! admin request reaching this service carries a pre-validated user id. This
//! crate is the typed form of that contract.

pub mod principal;

pub use principal::{AuthError, CallerId};
