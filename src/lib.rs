//! OpenSASE Discounts
//!
//! Self-hosted discount and promotion service for the OpenSASE storefront.
//!
//! ## Features
//! - Percentage, fixed amount, free shipping and buy-X-get-Y discounts
//! - Date windows, global and per-customer usage caps
//! - Order amount bounds, product/category and customer eligibility
//! - First-order-only codes
//! - Best-of-several selection and automatic discounts
//! - Redemption tracking with NATS domain events

pub mod api;
pub mod config;
pub mod domain;
pub mod engine;
pub mod repository;
pub mod service;

pub use domain::aggregates::{Cart, CartItem, Discount, DiscountKind, DiscountRules, LineItem, Order};
pub use domain::value_objects::{DiscountCode, Money};
pub use engine::{AppliedDiscount, BestDiscount, ContextError, CustomerHistory, DiscountContext, DiscountEngine, DiscountLine, Rejection, ValidationError};
pub use service::DiscountService;

use thiserror::Error;
use domain::aggregates::{DiscountError, OrderError};
use domain::value_objects::DiscountCodeError;
use repository::RepositoryError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Discount not found")]
    NotFound,

    #[error("Discount code {0} already exists")]
    DuplicateCode(DiscountCode),

    #[error("Invalid discount code: {0}")]
    InvalidCode(#[from] DiscountCodeError),

    #[error("Invalid discount: {0}")]
    InvalidDiscount(#[from] DiscountError),

    #[error("Invalid order details: {0}")]
    InvalidContext(#[from] ContextError),

    #[error("Discount {} cannot be applied", .0.code)]
    Rejected(Rejection),

    #[error("Order cannot take this discount: {0}")]
    Order(#[from] OrderError),

    #[error("Storage error: {0}")]
    Storage(RepositoryError),
}

impl From<RepositoryError> for ServiceError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => Self::NotFound,
            RepositoryError::DuplicateCode(code) => Self::DuplicateCode(code),
            other => Self::Storage(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
