//! Greenstem Core - Shared types library.
//!
//! This crate provides common types used by the Greenstem storefront:
//! type-safe entity ids, validated email addresses, and fixed-point
//! money helpers.
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP clients. This keeps it lightweight and
//! allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, emails, and money

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
