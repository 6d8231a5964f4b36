//! Core types for Greenstem.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{MoneyError, format_usd, from_minor_units, to_minor_units};
