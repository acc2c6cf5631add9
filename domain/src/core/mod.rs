//! Core domain concepts shared across all subdomains.
//!
//! - [`error::DomainError`]: transcript and turn invariant violations

pub mod error;
