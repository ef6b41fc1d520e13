//! Discount persistence

mod memory;
mod postgres;

pub use memory::InMemoryDiscountRepository;
pub use postgres::PgDiscountRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use crate::domain::aggregates::Discount;
use crate::domain::value_objects::DiscountCode;
use crate::engine::CustomerHistory;

/// One use of a discount on an order.
#[derive(Clone, Debug, PartialEq)]
pub struct Redemption {
    pub discount_id: String,
    pub order_id: String,
    pub customer_id: Option<String>,
    pub amount: Decimal,
    pub redeemed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListFilter {
    pub active: Option<bool>,
    pub public: Option<bool>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ListFilter {
    pub fn page(&self) -> u32 { self.page.unwrap_or(1).max(1) }
    pub fn per_page(&self) -> u32 { self.per_page.unwrap_or(20).clamp(1, 100) }
    pub fn offset(&self) -> u64 { u64::from(self.page() - 1) * u64::from(self.per_page()) }

    fn matches(&self, d: &Discount) -> bool {
        if self.active.is_some_and(|a| d.is_active() != a) { return false; }
        if self.public.is_some_and(|p| d.is_public() != p) { return false; }
        match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(term) => {
                let term = term.to_lowercase();
                d.code().as_str().to_lowercase().contains(&term) || d.name().to_lowercase().contains(&term)
            }
            None => true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("discount not found")]
    NotFound,
    #[error("discount code {0} already exists")]
    DuplicateCode(DiscountCode),
    #[error("discount usage limit reached")]
    UsageLimitReached,
    #[error("discount already redeemed on order {0}")]
    AlreadyRedeemed(String),
    #[error("customer usage limit of {0} reached")]
    CustomerLimitReached(u32),
    #[error("corrupt discount record: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait DiscountRepository: Send + Sync {
    async fn insert(&self, discount: &Discount) -> Result<(), RepositoryError>;
    async fn update(&self, discount: &Discount) -> Result<(), RepositoryError>;
    async fn delete(&self, id: &str) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Discount>, RepositoryError>;
    async fn find_by_code(&self, code: &DiscountCode) -> Result<Option<Discount>, RepositoryError>;
    async fn find_by_codes(&self, codes: &[DiscountCode]) -> Result<Vec<Discount>, RepositoryError>;
    /// Page of discounts matching `filter`, newest first, plus the total match count.
    async fn list(&self, filter: &ListFilter) -> Result<(Vec<Discount>, u64), RepositoryError>;
    async fn list_public_active(&self) -> Result<Vec<Discount>, RepositoryError>;
    async fn customer_history(&self, customer_id: &str) -> Result<CustomerHistory, RepositoryError>;
    /// Counts a use against the discount's global and per-customer caps in one step.
    /// A second redemption for the same order fails with `AlreadyRedeemed`.
    /// The returned discount carries the `Redeemed` event.
    async fn record_redemption(&self, redemption: &Redemption) -> Result<Discount, RepositoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_filter_paging() {
        let f = ListFilter { page: Some(3), per_page: Some(500), ..Default::default() };
        assert_eq!(f.per_page(), 100);
        assert_eq!(f.offset(), 200);
        assert_eq!(ListFilter::default().offset(), 0);
        let last = ListFilter { page: Some(u32::MAX), per_page: Some(100), ..Default::default() };
        assert_eq!(last.offset(), u64::from(u32::MAX - 1) * 100);
    }
}
