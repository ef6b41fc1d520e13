use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use crate::domain::aggregates::{Discount, DiscountError};
use crate::domain::value_objects::DiscountCode;
use crate::engine::CustomerHistory;
use super::{DiscountRepository, ListFilter, Redemption, RepositoryError};

#[derive(Default)]
struct Tables {
    discounts: HashMap<String, Discount>,
    redemptions: Vec<Redemption>,
    completed_orders: HashMap<String, u32>,
}

/// Process-local store used when no database is configured.
#[derive(Clone, Default)]
pub struct InMemoryDiscountRepository {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryDiscountRepository {
    pub fn new() -> Self { Self::default() }

    /// Marks an order as completed for first-order checks.
    pub async fn record_completed_order(&self, customer_id: &str) {
        *self.tables.write().await.completed_orders.entry(customer_id.to_string()).or_default() += 1;
    }

    pub async fn redemptions(&self) -> Vec<Redemption> { self.tables.read().await.redemptions.clone() }
}

#[async_trait]
impl DiscountRepository for InMemoryDiscountRepository {
    async fn insert(&self, discount: &Discount) -> Result<(), RepositoryError> {
        let mut t = self.tables.write().await;
        if t.discounts.values().any(|d| d.code() == discount.code()) {
            return Err(RepositoryError::DuplicateCode(discount.code().clone()));
        }
        t.discounts.insert(discount.id().to_string(), discount.clone());
        Ok(())
    }

    async fn update(&self, discount: &Discount) -> Result<(), RepositoryError> {
        let mut t = self.tables.write().await;
        if t.discounts.values().any(|d| d.code() == discount.code() && d.id() != discount.id()) {
            return Err(RepositoryError::DuplicateCode(discount.code().clone()));
        }
        let slot = t.discounts.get_mut(discount.id()).ok_or(RepositoryError::NotFound)?;
        *slot = discount.clone();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        self.tables.write().await.discounts.remove(id).map(|_| ()).ok_or(RepositoryError::NotFound)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Discount>, RepositoryError> {
        Ok(self.tables.read().await.discounts.get(id).cloned())
    }

    async fn find_by_code(&self, code: &DiscountCode) -> Result<Option<Discount>, RepositoryError> {
        Ok(self.tables.read().await.discounts.values().find(|d| d.code() == code).cloned())
    }

    async fn find_by_codes(&self, codes: &[DiscountCode]) -> Result<Vec<Discount>, RepositoryError> {
        let t = self.tables.read().await;
        Ok(codes.iter().filter_map(|c| t.discounts.values().find(|d| d.code() == c).cloned()).collect())
    }

    async fn list(&self, filter: &ListFilter) -> Result<(Vec<Discount>, u64), RepositoryError> {
        let t = self.tables.read().await;
        let mut matching: Vec<&Discount> = t.discounts.values().filter(|d| filter.matches(d)).collect();
        matching.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then_with(|| a.code().cmp(b.code())));
        let total = matching.len() as u64;
        let page = matching.into_iter().skip(usize::try_from(filter.offset()).unwrap_or(usize::MAX)).take(filter.per_page() as usize).cloned().collect();
        Ok((page, total))
    }

    async fn list_public_active(&self) -> Result<Vec<Discount>, RepositoryError> {
        let t = self.tables.read().await;
        Ok(t.discounts.values().filter(|d| d.is_active() && d.is_public()).cloned().collect())
    }

    async fn customer_history(&self, customer_id: &str) -> Result<CustomerHistory, RepositoryError> {
        let t = self.tables.read().await;
        let mut history = CustomerHistory::new(customer_id);
        history.completed_orders = t.completed_orders.get(customer_id).copied().unwrap_or(0);
        for r in t.redemptions.iter().filter(|r| r.customer_id.as_deref() == Some(customer_id)) {
            *history.redemptions.entry(r.discount_id.clone()).or_default() += 1;
        }
        Ok(history)
    }

    async fn record_redemption(&self, redemption: &Redemption) -> Result<Discount, RepositoryError> {
        let mut t = self.tables.write().await;
        let discount = t.discounts.get(&redemption.discount_id).ok_or(RepositoryError::NotFound)?;
        if t.redemptions.iter().any(|r| r.discount_id == redemption.discount_id && r.order_id == redemption.order_id) {
            return Err(RepositoryError::AlreadyRedeemed(redemption.order_id.clone()));
        }
        if let (Some(limit), Some(customer_id)) = (discount.rules().per_customer_limit, redemption.customer_id.as_deref()) {
            let used = t.redemptions.iter()
                .filter(|r| r.discount_id == redemption.discount_id && r.customer_id.as_deref() == Some(customer_id))
                .count();
            if used >= limit as usize { return Err(RepositoryError::CustomerLimitReached(limit)); }
        }

        let mut updated = discount.clone();
        updated.record_usage(redemption.order_id.clone(), redemption.customer_id.clone(), redemption.amount)
            .map_err(|e| match e {
                DiscountError::UsageLimitReached => RepositoryError::UsageLimitReached,
                other => RepositoryError::Corrupt(other.to_string()),
            })?;
        let mut stored = updated.clone();
        stored.take_events();
        t.discounts.insert(stored.id().to_string(), stored);
        t.redemptions.push(redemption.clone());
        Ok(updated)
    }
}
