//! Discount application service
//!
//! Loads discounts and customer history from the repository, hands them to
//! the [`DiscountEngine`] and records redemptions.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use crate::domain::aggregates::{Cart, Discount, DiscountKind, DiscountRules, Order, OrderError};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::DiscountCode;
use crate::engine::{AppliedDiscount, BestDiscount, DiscountContext, DiscountEngine, Rejection, ValidationError};
use crate::repository::{DiscountRepository, ListFilter, Redemption, RepositoryError};
use crate::{Result, ServiceError};

/// Input for a new discount. A missing code is generated from `code_prefix`.
#[derive(Clone, Debug)]
pub struct NewDiscount {
    pub code: Option<DiscountCode>,
    pub code_prefix: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub kind: DiscountKind,
    pub rules: DiscountRules,
    pub currency: Option<String>,
    pub is_active: bool,
}

#[derive(Clone, Debug)]
pub struct DiscountUpdate {
    pub name: String,
    pub description: Option<String>,
    pub kind: DiscountKind,
    pub rules: DiscountRules,
}

/// Result of checking a single code.
#[derive(Clone, Debug, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(flatten)]
    pub rejection: Option<Rejection>,
    pub discount: Option<AppliedDiscount>,
}

pub struct DiscountService {
    repo: Arc<dyn DiscountRepository>,
    engine: DiscountEngine,
    nats: Option<async_nats::Client>,
    default_currency: String,
}

impl DiscountService {
    pub fn new(repo: Arc<dyn DiscountRepository>, default_currency: &str) -> Self {
        Self { repo, engine: DiscountEngine::new(), nats: None, default_currency: default_currency.to_uppercase() }
    }

    pub fn with_nats(mut self, client: async_nats::Client) -> Self { self.nats = Some(client); self }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_discount(&self, input: NewDiscount) -> Result<Discount> {
        let code = match input.code {
            Some(code) => code,
            None => DiscountCode::generate(input.code_prefix.as_deref().unwrap_or("PROMO"))?,
        };
        let currency = input.currency.unwrap_or_else(|| self.default_currency.clone());
        let mut discount = Discount::create(code, input.name, input.kind, input.rules, &currency)?;
        if let Some(description) = input.description { discount = discount.with_description(description); }
        if !input.is_active { discount.deactivate(); }
        self.repo.insert(&discount).await?;
        info!(code = %discount.code(), kind = discount.kind().label(), "discount created");
        self.publish(discount.take_events()).await;
        Ok(discount)
    }

    pub async fn get_discount(&self, id: &str) -> Result<Discount> {
        self.repo.find_by_id(id).await?.ok_or(ServiceError::NotFound)
    }

    pub async fn list_discounts(&self, filter: &ListFilter) -> Result<(Vec<Discount>, u64)> {
        Ok(self.repo.list(filter).await?)
    }

    #[instrument(skip(self, update))]
    pub async fn update_discount(&self, id: &str, update: DiscountUpdate) -> Result<Discount> {
        let mut discount = self.get_discount(id).await?;
        discount.rename(update.name, update.description)?;
        discount.update_rules(update.kind, update.rules)?;
        self.repo.update(&discount).await?;
        info!(code = %discount.code(), "discount updated");
        Ok(discount)
    }

    #[instrument(skip(self))]
    pub async fn set_active(&self, id: &str, active: bool) -> Result<Discount> {
        let mut discount = self.get_discount(id).await?;
        if active { discount.activate() } else { discount.deactivate() }
        self.repo.update(&discount).await?;
        self.publish(discount.take_events()).await;
        Ok(discount)
    }

    #[instrument(skip(self))]
    pub async fn delete_discount(&self, id: &str) -> Result<()> {
        self.repo.delete(id).await?;
        info!(id, "discount deleted");
        Ok(())
    }

    /// Checks a code and reports every reason it does not apply.
    #[instrument(skip(self, code, ctx), fields(code = %code))]
    pub async fn validate_code(&self, code: &DiscountCode, ctx: DiscountContext) -> Result<ValidationReport> {
        match self.apply_code(code, ctx).await {
            Ok(applied) => Ok(ValidationReport { valid: true, rejection: None, discount: Some(applied) }),
            Err(ServiceError::Rejected(rejection)) => Ok(ValidationReport { valid: false, rejection: Some(rejection), discount: None }),
            Err(e) => Err(e),
        }
    }

    pub async fn apply_code(&self, code: &DiscountCode, ctx: DiscountContext) -> Result<AppliedDiscount> {
        ctx.check()?;
        let discount = self.repo.find_by_code(code).await?
            .ok_or_else(|| ServiceError::Rejected(Rejection { code: code.clone(), errors: vec![ValidationError::NotFound] }))?;
        let ctx = self.with_history(ctx).await?;
        self.engine.apply(&discount, &ctx).map_err(ServiceError::Rejected)
    }

    /// Best of the given codes; unknown codes come back as rejections.
    #[instrument(skip(self, codes, ctx), fields(candidates = codes.len()))]
    pub async fn best_of(&self, codes: &[DiscountCode], ctx: DiscountContext) -> Result<BestDiscount> {
        ctx.check()?;
        let discounts = self.repo.find_by_codes(codes).await?;
        let ctx = self.with_history(ctx).await?;
        let mut best = self.engine.find_best(&discounts, &ctx);
        for code in codes.iter().filter(|c| !discounts.iter().any(|d| d.code() == *c)) {
            best.rejected.push(Rejection { code: code.clone(), errors: vec![ValidationError::NotFound] });
        }
        Ok(best)
    }

    #[instrument(skip(self, ctx))]
    pub async fn auto_apply(&self, ctx: DiscountContext) -> Result<Option<AppliedDiscount>> {
        ctx.check()?;
        let discounts = self.repo.list_public_active().await?;
        let ctx = self.with_history(ctx).await?;
        Ok(self.engine.auto_apply(&discounts, &ctx))
    }

    /// Re-validates the code against the final order and counts the use.
    #[instrument(skip(self, code, ctx), fields(code = %code))]
    pub async fn redeem(&self, code: &DiscountCode, order_id: &str, ctx: DiscountContext) -> Result<AppliedDiscount> {
        let customer_id = ctx.customer_id().map(str::to_string);
        let applied = self.apply_code(code, ctx).await?;
        let redemption = Redemption {
            discount_id: applied.discount_id.clone(), order_id: order_id.to_string(), customer_id,
            amount: applied.amount.amount(), redeemed_at: Utc::now(),
        };
        // Another checkout may have taken the last use since validation, or this order was already counted.
        let mut discount = self.repo.record_redemption(&redemption).await.map_err(|e| {
            let error = match e {
                RepositoryError::UsageLimitReached => ValidationError::UsageLimitReached,
                RepositoryError::CustomerLimitReached(limit) => ValidationError::CustomerLimitReached { limit },
                RepositoryError::AlreadyRedeemed(_) => ValidationError::AlreadyRedeemed,
                other => return ServiceError::from(other),
            };
            warn!(order_id, reason = error.code(), "redemption refused");
            ServiceError::Rejected(Rejection { code: code.clone(), errors: vec![error] })
        })?;
        info!(order_id, amount = %applied.amount, uses = discount.usage_count(), "discount redeemed");
        self.publish(discount.take_events()).await;
        Ok(applied)
    }

    /// Best of `codes` for a shopper's cart.
    pub async fn best_for_cart(&self, codes: &[DiscountCode], cart: &Cart) -> Result<BestDiscount> {
        self.best_of(codes, DiscountContext::from_cart(cart)).await
    }

    /// Redeems `code` against a pending order, writes the discount onto it and confirms it.
    #[instrument(skip(self, code, order), fields(code = %code, order_id = %order.id()))]
    pub async fn redeem_order(&self, code: &DiscountCode, order: &mut Order) -> Result<AppliedDiscount> {
        if !order.is_editable() { return Err(OrderError::NotEditable.into()); }
        let order_id = order.id().to_string();
        let applied = self.redeem(code, &order_id, DiscountContext::from_order(order)).await?;
        order.apply_discount(&applied)?;
        order.confirm()?;
        self.publish(order.take_events()).await;
        Ok(applied)
    }

    /// Merges stored history into the caller's so the larger counts win.
    async fn with_history(&self, mut ctx: DiscountContext) -> Result<DiscountContext> {
        if let Some(supplied) = ctx.customer.take() {
            let mut history = self.repo.customer_history(&supplied.customer_id).await?;
            history.merge(&supplied);
            ctx.customer = Some(history);
        }
        Ok(ctx)
    }

    async fn publish(&self, events: Vec<DomainEvent>) {
        let Some(client) = &self.nats else { return };
        for event in events {
            let payload = match serde_json::to_vec(&event) {
                Ok(payload) => payload,
                Err(e) => { warn!(error = %e, "failed to serialize event"); continue; }
            };
            if let Err(e) = client.publish(event.subject(), payload.into()).await {
                warn!(error = %e, subject = %event.subject(), "failed to publish event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use crate::domain::aggregates::LineItem;
    use crate::domain::value_objects::Money;
    use crate::engine::{ContextError, CustomerHistory, DiscountLine};
    use crate::repository::InMemoryDiscountRepository;

    fn new_discount(code: &str, kind: DiscountKind, rules: DiscountRules) -> NewDiscount {
        NewDiscount { code: Some(DiscountCode::new(code).unwrap()), code_prefix: None, name: code.into(), description: None, kind, rules, currency: None, is_active: true }
    }

    fn cart(customer: Option<&str>) -> DiscountContext {
        let ctx = DiscountContext::new("USD").with_line(DiscountLine::new("P1", 2, Decimal::new(50, 0)));
        match customer { Some(id) => ctx.with_customer(CustomerHistory::new(id)), None => ctx }
    }

    fn service() -> (DiscountService, InMemoryDiscountRepository) {
        let repo = InMemoryDiscountRepository::new();
        (DiscountService::new(Arc::new(repo.clone()), "usd"), repo)
    }

    #[tokio::test]
    async fn test_generated_code_and_default_currency() {
        let (svc, _) = service();
        let mut input = new_discount("UNUSED", DiscountKind::FreeShipping, DiscountRules::default());
        input.code = None;
        input.code_prefix = Some("ship".into());
        let d = svc.create_discount(input).await.unwrap();
        assert!(d.code().as_str().starts_with("SHIP-"));
        assert_eq!(d.currency(), "USD");
    }

    #[tokio::test]
    async fn test_unknown_code_is_reported() {
        let (svc, _) = service();
        let report = svc.validate_code(&DiscountCode::new("NOPE").unwrap(), cart(None)).await.unwrap();
        assert!(!report.valid);
        assert_eq!(report.rejection.unwrap().errors, vec![ValidationError::NotFound]);
    }

    #[tokio::test]
    async fn test_redeem_enforces_per_customer_limit_from_history() {
        let (svc, repo) = service();
        let rules = DiscountRules { per_customer_limit: Some(1), ..Default::default() };
        svc.create_discount(new_discount("ONCE", DiscountKind::Percentage { percent: Decimal::TEN }, rules)).await.unwrap();
        let code = DiscountCode::new("ONCE").unwrap();

        let applied = svc.redeem(&code, "O1", cart(Some("C1"))).await.unwrap();
        assert_eq!(applied.amount.amount(), Decimal::TEN);

        let err = svc.redeem(&code, "O2", cart(Some("C1"))).await.unwrap_err();
        match err {
            ServiceError::Rejected(r) => assert_eq!(r.errors, vec![ValidationError::CustomerLimitReached { limit: 1 }]),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(repo.redemptions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_first_order_uses_stored_history() {
        let (svc, repo) = service();
        let rules = DiscountRules { first_order_only: true, ..Default::default() };
        svc.create_discount(new_discount("WELCOME", DiscountKind::FixedAmount { amount: Decimal::new(5, 0) }, rules)).await.unwrap();
        repo.record_completed_order("C1").await;
        let report = svc.validate_code(&DiscountCode::new("WELCOME").unwrap(), cart(Some("C1"))).await.unwrap();
        assert!(!report.valid);
        let report = svc.validate_code(&DiscountCode::new("WELCOME").unwrap(), cart(Some("C2"))).await.unwrap();
        assert!(report.valid);
    }

    #[tokio::test]
    async fn test_best_of_and_auto_apply() {
        let (svc, _) = service();
        svc.create_discount(new_discount("TEN", DiscountKind::Percentage { percent: Decimal::TEN }, DiscountRules::default())).await.unwrap();
        svc.create_discount(new_discount("TWENTY", DiscountKind::FixedAmount { amount: Decimal::new(20, 0) }, DiscountRules { is_public: true, ..Default::default() })).await.unwrap();

        let codes = vec![DiscountCode::new("TEN").unwrap(), DiscountCode::new("TWENTY").unwrap(), DiscountCode::new("MISSING").unwrap()];
        let best = svc.best_of(&codes, cart(None)).await.unwrap();
        assert_eq!(best.best.unwrap().code.as_str(), "TWENTY");
        assert_eq!(best.rejected.len(), 1);

        let auto = svc.auto_apply(cart(None)).await.unwrap().unwrap();
        assert_eq!(auto.code.as_str(), "TWENTY");
    }

    #[tokio::test]
    async fn test_deactivated_discount_is_rejected() {
        let (svc, _) = service();
        let d = svc.create_discount(new_discount("PAUSED", DiscountKind::Percentage { percent: Decimal::TEN }, DiscountRules::default())).await.unwrap();
        svc.set_active(d.id(), false).await.unwrap();
        let err = svc.apply_code(d.code(), cart(None)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_first_order_trusts_larger_supplied_history() {
        let (svc, _) = service();
        let rules = DiscountRules { first_order_only: true, ..Default::default() };
        svc.create_discount(new_discount("WELCOME", DiscountKind::FixedAmount { amount: Decimal::new(5, 0) }, rules)).await.unwrap();
        let returning = CustomerHistory { customer_id: "C1".into(), completed_orders: 5, ..Default::default() };
        let ctx = DiscountContext::new("USD").with_line(DiscountLine::new("P1", 1, Decimal::TEN)).with_customer(returning);
        let report = svc.validate_code(&DiscountCode::new("WELCOME").unwrap(), ctx).await.unwrap();
        assert_eq!(report.rejection.unwrap().errors, vec![ValidationError::NotFirstOrder]);
    }

    #[tokio::test]
    async fn test_negative_prices_are_refused() {
        let (svc, _) = service();
        svc.create_discount(new_discount("FIVE", DiscountKind::FixedAmount { amount: Decimal::new(5, 0) }, DiscountRules::default())).await.unwrap();
        let ctx = DiscountContext::new("USD").with_line(DiscountLine::new("P1", 1, Decimal::new(-10, 0)));
        let err = svc.apply_code(&DiscountCode::new("FIVE").unwrap(), ctx).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidContext(ContextError::NegativePrice { .. })));
    }

    #[tokio::test]
    async fn test_redeem_same_order_twice() {
        let (svc, repo) = service();
        let rules = DiscountRules { usage_limit: Some(2), ..Default::default() };
        svc.create_discount(new_discount("RETRY", DiscountKind::Percentage { percent: Decimal::TEN }, rules)).await.unwrap();
        let code = DiscountCode::new("RETRY").unwrap();

        svc.redeem(&code, "O1", cart(Some("C1"))).await.unwrap();
        match svc.redeem(&code, "O1", cart(Some("C1"))).await.unwrap_err() {
            ServiceError::Rejected(r) => assert_eq!(r.errors, vec![ValidationError::AlreadyRedeemed]),
            other => panic!("unexpected error: {other}"),
        }
        svc.redeem(&code, "O2", cart(Some("C1"))).await.unwrap();
        assert_eq!(repo.redemptions().await.len(), 2);
    }

    #[tokio::test]
    async fn test_redeem_order_applies_and_confirms() {
        let (svc, repo) = service();
        svc.create_discount(new_discount("ORDER10", DiscountKind::Percentage { percent: Decimal::TEN }, DiscountRules::default())).await.unwrap();
        let code = DiscountCode::new("ORDER10").unwrap();
        let mut order = Order::create("C1", "USD");
        order.add_item(LineItem::new("P1", "Lamp", "L1", 2, Money::usd(Decimal::new(40, 0)))).unwrap();
        order.set_shipping(Money::usd(Decimal::new(5, 0))).unwrap();

        let applied = svc.redeem_order(&code, &mut order).await.unwrap();
        assert_eq!(applied.amount.amount(), Decimal::new(8, 0));
        assert_eq!(order.total().amount(), Decimal::new(77, 0));
        assert!(!order.is_editable());
        assert_eq!(repo.redemptions().await[0].order_id, order.id());

        let err = svc.redeem_order(&code, &mut order).await.unwrap_err();
        assert!(matches!(err, ServiceError::Order(OrderError::NotEditable)));
    }

    #[tokio::test]
    async fn test_best_for_cart() {
        let (svc, _) = service();
        svc.create_discount(new_discount("TEN", DiscountKind::Percentage { percent: Decimal::TEN }, DiscountRules::default())).await.unwrap();
        let mut shopper = Cart::for_customer("C1", "USD");
        shopper.add_item(crate::domain::aggregates::CartItem {
            product_id: "P1".into(), variant_id: None, name: "Lamp".into(), sku: "L1".into(), category_ids: vec![], quantity: 1, unit_price: Money::usd(Decimal::new(30, 0)),
        }).unwrap();
        let best = svc.best_for_cart(&[DiscountCode::new("TEN").unwrap()], &shopper).await.unwrap();
        assert_eq!(best.best.unwrap().amount.amount(), Decimal::new(3, 0));
    }
}
