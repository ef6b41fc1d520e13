//! Eligibility checks for a single discount.

use rust_decimal::Decimal;
use crate::domain::aggregates::{Discount, DiscountKind};
use super::context::DiscountContext;

/// A reason a discount cannot be used. Messages are shown to shoppers as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("This discount code does not exist")]
    NotFound,
    #[error("This discount is not active")]
    Inactive,
    #[error("This discount is not yet available")]
    NotStarted,
    #[error("This discount has expired")]
    Expired,
    #[error("This discount has reached its usage limit")]
    UsageLimitReached,
    #[error("You have already used this discount the maximum number of times ({limit})")]
    CustomerLimitReached { limit: u32 },
    #[error("Your cart is empty")]
    EmptyCart,
    #[error("Minimum order amount of {minimum} required")]
    BelowMinimum { minimum: Decimal },
    #[error("Order amount exceeds the maximum of {maximum} for this discount")]
    AboveMaximum { maximum: Decimal },
    #[error("No items in your cart are eligible for this discount")]
    NoEligibleItems,
    #[error("This discount is not available for your account")]
    CustomerNotEligible,
    #[error("This discount is only valid on your first order")]
    NotFirstOrder,
    #[error("This discount is only valid for {expected} orders")]
    CurrencyMismatch { expected: String, found: String },
    #[error("Add at least {required} eligible items to use this discount")]
    InsufficientQuantity { required: u64, found: u64 },
    #[error("This discount does not reduce your order")]
    NoValue,
    #[error("This discount has already been applied to this order")]
    AlreadyRedeemed,
}

impl ValidationError {
    /// Stable machine-readable identifier.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Inactive => "inactive",
            Self::NotStarted => "not_started",
            Self::Expired => "expired",
            Self::UsageLimitReached => "usage_limit_reached",
            Self::CustomerLimitReached { .. } => "customer_limit_reached",
            Self::EmptyCart => "empty_cart",
            Self::BelowMinimum { .. } => "below_minimum",
            Self::AboveMaximum { .. } => "above_maximum",
            Self::NoEligibleItems => "no_eligible_items",
            Self::CustomerNotEligible => "customer_not_eligible",
            Self::NotFirstOrder => "not_first_order",
            Self::CurrencyMismatch { .. } => "currency_mismatch",
            Self::InsufficientQuantity { .. } => "insufficient_quantity",
            Self::NoValue => "no_value",
            Self::AlreadyRedeemed => "already_redeemed",
        }
    }
}

/// Runs every rule and reports all failures; an empty list means the discount applies.
pub fn validate(discount: &Discount, ctx: &DiscountContext) -> Vec<ValidationError> {
    let rules = discount.rules();
    let mut errors = Vec::new();

    if !discount.is_active() { errors.push(ValidationError::Inactive); }
    if !discount.has_started(ctx.now) { errors.push(ValidationError::NotStarted); }
    if discount.has_expired(ctx.now) { errors.push(ValidationError::Expired); }
    if discount.is_exhausted() { errors.push(ValidationError::UsageLimitReached); }

    if !discount.currency().eq_ignore_ascii_case(&ctx.currency) {
        errors.push(ValidationError::CurrencyMismatch { expected: discount.currency().to_string(), found: ctx.currency.to_uppercase() });
    }

    // Guests have no history, so per-customer and first-order rules only bind known customers.
    if let Some(customer) = &ctx.customer {
        if let Some(limit) = rules.per_customer_limit {
            if customer.redemptions_of(discount.id()) >= limit { errors.push(ValidationError::CustomerLimitReached { limit }); }
        }
        if rules.first_order_only && !customer.is_first_order() { errors.push(ValidationError::NotFirstOrder); }
    }
    if !discount.is_customer_eligible(ctx.customer_id()) { errors.push(ValidationError::CustomerNotEligible); }

    if ctx.is_empty() {
        errors.push(ValidationError::EmptyCart);
        return errors;
    }

    let subtotal = ctx.subtotal();
    if let Some(minimum) = rules.min_order_amount {
        if subtotal < minimum { errors.push(ValidationError::BelowMinimum { minimum }); }
    }
    if let Some(maximum) = rules.max_order_amount {
        if subtotal > maximum { errors.push(ValidationError::AboveMaximum { maximum }); }
    }

    let eligible_units: u64 = ctx.lines.iter()
        .filter(|l| l.quantity > 0 && discount.is_item_eligible(&l.product_id, l.category_ids.iter()))
        .map(|l| u64::from(l.quantity))
        .sum();
    if eligible_units == 0 {
        errors.push(ValidationError::NoEligibleItems);
    } else if let DiscountKind::BuyXGetY { buy, get, .. } = discount.kind() {
        let required = u64::from(*buy) + u64::from(*get);
        if eligible_units < required { errors.push(ValidationError::InsufficientQuantity { required, found: eligible_units }); }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::domain::aggregates::DiscountRules;
    use crate::domain::value_objects::DiscountCode;
    use crate::engine::context::{CustomerHistory, DiscountLine};

    fn discount(kind: DiscountKind, rules: DiscountRules) -> Discount {
        Discount::create(DiscountCode::new("TEST10").unwrap(), "Test", kind, rules, "USD").unwrap()
    }

    fn ten_percent(rules: DiscountRules) -> Discount { discount(DiscountKind::Percentage { percent: Decimal::TEN }, rules) }

    fn cart(total: i64) -> DiscountContext {
        DiscountContext::new("USD").with_line(DiscountLine::new("P1", 1, Decimal::new(total, 0)).in_category("shirts"))
    }

    #[test]
    fn test_valid_discount_has_no_errors() {
        assert!(validate(&ten_percent(DiscountRules::default()), &cart(100)).is_empty());
    }

    #[test]
    fn test_collects_every_failure() {
        let now = chrono::Utc::now();
        let rules = DiscountRules { expires_at: Some(now - Duration::hours(1)), min_order_amount: Some(Decimal::new(500, 0)), ..Default::default() };
        let mut d = ten_percent(rules);
        d.deactivate();
        let errors = validate(&d, &cart(100).at(now));
        assert_eq!(errors, vec![ValidationError::Inactive, ValidationError::Expired, ValidationError::BelowMinimum { minimum: Decimal::new(500, 0) }]);
    }

    #[test]
    fn test_window_boundaries() {
        let now = chrono::Utc::now();
        let rules = DiscountRules { starts_at: Some(now), expires_at: Some(now + Duration::days(1)), ..Default::default() };
        let d = ten_percent(rules);
        assert!(validate(&d, &cart(10).at(now)).is_empty());
        assert_eq!(validate(&d, &cart(10).at(now - Duration::seconds(1))), vec![ValidationError::NotStarted]);
        assert_eq!(validate(&d, &cart(10).at(now + Duration::days(1))), vec![ValidationError::Expired]);
    }

    #[test]
    fn test_usage_limits() {
        let rules = DiscountRules { usage_limit: Some(1), per_customer_limit: Some(2), ..Default::default() };
        let mut d = ten_percent(rules);
        let mut customer = CustomerHistory::new("C1");
        customer.redemptions.insert(d.id().to_string(), 2);
        assert_eq!(validate(&d, &cart(10).with_customer(customer)), vec![ValidationError::CustomerLimitReached { limit: 2 }]);
        d.record_usage("O1", None, Decimal::ONE).unwrap();
        assert_eq!(validate(&d, &cart(10)), vec![ValidationError::UsageLimitReached]);
    }

    #[test]
    fn test_order_amount_range() {
        let rules = DiscountRules { min_order_amount: Some(Decimal::new(50, 0)), max_order_amount: Some(Decimal::new(200, 0)), ..Default::default() };
        let d = ten_percent(rules);
        assert!(validate(&d, &cart(50)).is_empty());
        assert!(validate(&d, &cart(200)).is_empty());
        assert_eq!(validate(&d, &cart(201)), vec![ValidationError::AboveMaximum { maximum: Decimal::new(200, 0) }]);
    }

    #[test]
    fn test_product_and_category_eligibility() {
        let rules = DiscountRules { applicable_categories: ["shoes".to_string()].into(), ..Default::default() };
        assert_eq!(validate(&ten_percent(rules), &cart(10)), vec![ValidationError::NoEligibleItems]);
        let rules = DiscountRules { applicable_products: ["P1".to_string()].into(), ..Default::default() };
        assert!(validate(&ten_percent(rules), &cart(10)).is_empty());
    }

    #[test]
    fn test_customer_eligibility_rejects_guests() {
        let rules = DiscountRules { eligible_customers: ["VIP".to_string()].into(), ..Default::default() };
        let d = ten_percent(rules);
        assert_eq!(validate(&d, &cart(10)), vec![ValidationError::CustomerNotEligible]);
        assert_eq!(validate(&d, &cart(10).with_customer(CustomerHistory::new("C1"))), vec![ValidationError::CustomerNotEligible]);
        assert!(validate(&d, &cart(10).with_customer(CustomerHistory::new("VIP"))).is_empty());
    }

    #[test]
    fn test_first_order_only() {
        let d = ten_percent(DiscountRules { first_order_only: true, ..Default::default() });
        let returning = CustomerHistory { customer_id: "C1".into(), completed_orders: 3, ..Default::default() };
        assert_eq!(validate(&d, &cart(10).with_customer(returning)), vec![ValidationError::NotFirstOrder]);
        assert!(validate(&d, &cart(10).with_customer(CustomerHistory::new("C2"))).is_empty());
        assert!(validate(&d, &cart(10)).is_empty());
    }

    #[test]
    fn test_empty_cart_and_currency() {
        let d = ten_percent(DiscountRules::default());
        assert_eq!(validate(&d, &DiscountContext::new("USD")), vec![ValidationError::EmptyCart]);
        let eur = DiscountContext::new("EUR").with_line(DiscountLine::new("P1", 1, Decimal::TEN));
        assert!(matches!(validate(&d, &eur).as_slice(), [ValidationError::CurrencyMismatch { .. }]));
    }

    #[test]
    fn test_buy_x_get_y_needs_enough_units() {
        let d = discount(DiscountKind::BuyXGetY { buy: 2, get: 1, get_percent: Decimal::ONE_HUNDRED }, DiscountRules::default());
        let two = DiscountContext::new("USD").with_line(DiscountLine::new("P1", 2, Decimal::TEN));
        assert_eq!(validate(&d, &two), vec![ValidationError::InsufficientQuantity { required: 3, found: 2 }]);
        let three = DiscountContext::new("USD").with_line(DiscountLine::new("P1", 3, Decimal::TEN));
        assert!(validate(&d, &three).is_empty());
    }

    #[test]
    fn test_unit_count_does_not_overflow() {
        let d = discount(DiscountKind::BuyXGetY { buy: 1, get: 1, get_percent: Decimal::ONE_HUNDRED }, DiscountRules::default());
        let ctx = DiscountContext::new("USD")
            .with_line(DiscountLine::new("P1", u32::MAX, Decimal::ONE))
            .with_line(DiscountLine::new("P2", 1, Decimal::ONE));
        assert!(validate(&d, &ctx).is_empty());
    }
}
