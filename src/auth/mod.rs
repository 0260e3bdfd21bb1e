//! Webhook authorization.
//!
//! The sender proves itself by including a shared secret somewhere inside the
//! payload.  No request parsing happens before the check.

pub mod token;

pub use token::SharedToken;
