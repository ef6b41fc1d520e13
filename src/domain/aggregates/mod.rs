//! Aggregates module
pub mod discount;
pub mod order;
pub mod cart;

pub use discount::{Discount, DiscountError, DiscountKind, DiscountRules, DiscountSnapshot};
pub use order::{Order, OrderError, OrderStatus, LineItem};
pub use cart::{Cart, CartError, CartItem};
