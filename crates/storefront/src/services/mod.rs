//! Business logic services.
//!
//! Services own orchestration across repositories and external APIs;
//! route handlers stay thin and translate service errors into responses.

pub mod auth;
pub mod checkout;
pub mod email;

pub use auth::{AuthError, AuthService};
pub use checkout::{CheckoutError, CheckoutService};
pub use email::{EmailError, EmailService};
