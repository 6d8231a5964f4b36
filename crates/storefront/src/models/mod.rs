//! Domain model types for the storefront.

pub mod cart;
pub mod order;
pub mod product;
pub mod session;
pub mod user;

pub use cart::{Cart, CartError, CartLine, QuantityAction};
pub use order::{Order, OrderItem};
pub use product::{Category, Product};
pub use session::CurrentUser;
pub use user::User;
