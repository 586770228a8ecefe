//! Identity: verification of identity-provider tokens.

mod jwt;

pub use jwt::{Claims, IdentityVerifier};
