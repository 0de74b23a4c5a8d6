//! `rentworks-auth` — pure authentication boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage. Claims are
//! validated deterministically; token decoding lives behind `JwtValidator`.

pub mod claims;
pub mod roles;
pub mod token;

pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use roles::Role;
pub use token::{Hs256JwtValidator, JwtValidator, TokenError};
