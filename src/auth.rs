//! Credential primitives carried by the session.

pub mod token;

pub use token::*;
