//! Discount amount computation for the four discount kinds.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use crate::domain::aggregates::{Discount, DiscountKind};
use crate::domain::value_objects::{DiscountCode, Money};
use super::context::DiscountContext;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LineAllocation {
    pub product_id: String,
    pub amount: Decimal,
}

/// A priced discount. `amount` is rounded to cents and `allocations` sum to it exactly.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppliedDiscount {
    pub discount_id: String,
    pub code: DiscountCode,
    pub kind: &'static str,
    pub amount: Money,
    pub free_shipping: bool,
    pub allocations: Vec<LineAllocation>,
}

impl AppliedDiscount {
    /// Subtotal plus shipping less the discount, never below zero.
    pub fn total_after(&self, ctx: &DiscountContext) -> Decimal {
        ctx.subtotal().saturating_add(ctx.shipping).saturating_sub(self.amount.amount()).max(Decimal::ZERO)
    }
}

fn cents(value: Decimal) -> Decimal { value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero) }

fn sum(values: impl Iterator<Item = Decimal>) -> Decimal { values.fold(Decimal::ZERO, Decimal::saturating_add) }

/// Prices `discount` against `ctx` without checking eligibility rules.
pub fn calculate(discount: &Discount, ctx: &DiscountContext) -> AppliedDiscount {
    // Per-line weights over eligible lines; the final amount is split by these.
    let eligible: Vec<(usize, Decimal)> = ctx.lines.iter().enumerate()
        .filter(|(_, l)| l.quantity > 0 && discount.is_item_eligible(&l.product_id, l.category_ids.iter()))
        .map(|(i, l)| (i, l.line_total()))
        .collect();
    let base = sum(eligible.iter().map(|(_, total)| *total));

    let (raw, ceiling, weights) = match discount.kind() {
        DiscountKind::Percentage { percent } => (base.saturating_mul(*percent) / Decimal::ONE_HUNDRED, base, eligible),
        DiscountKind::FixedAmount { amount } => ((*amount).min(base), base, eligible),
        DiscountKind::FreeShipping => (ctx.shipping, ctx.shipping, vec![]),
        DiscountKind::BuyXGetY { buy, get, get_percent } => {
            let weights = buy_x_get_y(ctx, &eligible, *buy, *get, *get_percent);
            (sum(weights.iter().map(|(_, w)| *w)), base, weights)
        }
    };

    let ceiling = ceiling.max(Decimal::ZERO);
    let mut amount = raw.max(Decimal::ZERO);
    if let Some(cap) = discount.rules().max_discount_amount { amount = amount.min(cap); }
    let mut amount = cents(amount.min(ceiling));
    if amount > ceiling { amount = ceiling.round_dp_with_strategy(2, RoundingStrategy::ToZero); }

    AppliedDiscount {
        discount_id: discount.id().to_string(),
        code: discount.code().clone(),
        kind: discount.kind().label(),
        amount: Money::new(amount, &ctx.currency),
        free_shipping: matches!(discount.kind(), DiscountKind::FreeShipping),
        allocations: allocate(ctx, amount, &weights),
    }
}

/// Cheapest eligible units are the discounted ones. Walks lines by unit price
/// instead of expanding them, so cost does not depend on quantities.
fn buy_x_get_y(ctx: &DiscountContext, eligible: &[(usize, Decimal)], buy: u32, get: u32, get_percent: Decimal) -> Vec<(usize, Decimal)> {
    let mut lines: Vec<usize> = eligible.iter().map(|(i, _)| *i).collect();
    lines.sort_by(|a, b| ctx.lines[*a].unit_price.cmp(&ctx.lines[*b].unit_price));

    let units: u64 = lines.iter().map(|i| u64::from(ctx.lines[*i].quantity)).sum();
    let group = u64::from(buy) + u64::from(get);
    let mut free_units = units.checked_div(group).unwrap_or(0) * u64::from(get);

    let mut per_line: Vec<(usize, Decimal)> = Vec::new();
    for i in lines {
        if free_units == 0 { break; }
        let line = &ctx.lines[i];
        let taken = free_units.min(u64::from(line.quantity));
        free_units -= taken;
        let off = line.unit_price.saturating_mul(Decimal::from(taken)).saturating_mul(get_percent) / Decimal::ONE_HUNDRED;
        per_line.push((i, off));
    }
    per_line.sort_by_key(|(i, _)| *i);
    per_line
}

/// Splits `amount` across lines in proportion to `weights`; the last line absorbs rounding.
fn allocate(ctx: &DiscountContext, amount: Decimal, weights: &[(usize, Decimal)]) -> Vec<LineAllocation> {
    let weights: Vec<&(usize, Decimal)> = weights.iter().filter(|(_, w)| *w > Decimal::ZERO).collect();
    let total = sum(weights.iter().map(|(_, w)| *w));
    if total.is_zero() || amount.is_zero() { return vec![]; }

    let mut remaining = amount;
    let last = weights.len() - 1;
    weights.iter().enumerate().map(|(n, (i, w))| {
        let share = if n == last { remaining } else { (amount * (*w / total)).round_dp_with_strategy(2, RoundingStrategy::ToZero) };
        remaining -= share;
        LineAllocation { product_id: ctx.lines[*i].product_id.clone(), amount: share }
    }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::DiscountRules;
    use crate::engine::context::DiscountLine;

    fn discount(kind: DiscountKind, rules: DiscountRules) -> Discount {
        Discount::create(DiscountCode::new("CALC").unwrap(), "Calc", kind, rules, "USD").unwrap()
    }

    fn usd(value: i64, scale: u32) -> Decimal { Decimal::new(value, scale) }

    #[test]
    fn test_percentage() {
        let d = discount(DiscountKind::Percentage { percent: usd(10, 0) }, DiscountRules::default());
        let ctx = DiscountContext::new("USD").with_line(DiscountLine::new("P1", 1, usd(100, 0)));
        let applied = calculate(&d, &ctx);
        assert_eq!(applied.amount.amount(), usd(10, 0));
        assert_eq!(applied.kind, "percentage");
        assert_eq!(applied.total_after(&ctx), usd(90, 0));
    }

    #[test]
    fn test_percentage_capped() {
        let rules = DiscountRules { max_discount_amount: Some(usd(25, 0)), ..Default::default() };
        let d = discount(DiscountKind::Percentage { percent: usd(50, 0) }, rules);
        let ctx = DiscountContext::new("USD").with_line(DiscountLine::new("P1", 2, usd(100, 0)));
        assert_eq!(calculate(&d, &ctx).amount.amount(), usd(25, 0));
    }

    #[test]
    fn test_percentage_only_on_eligible_lines() {
        let rules = DiscountRules { applicable_categories: ["books".to_string()].into(), ..Default::default() };
        let d = discount(DiscountKind::Percentage { percent: usd(20, 0) }, rules);
        let ctx = DiscountContext::new("USD")
            .with_line(DiscountLine::new("B1", 1, usd(40, 0)).in_category("books"))
            .with_line(DiscountLine::new("T1", 1, usd(60, 0)).in_category("toys"));
        let applied = calculate(&d, &ctx);
        assert_eq!(applied.amount.amount(), usd(8, 0));
        assert_eq!(applied.allocations, vec![LineAllocation { product_id: "B1".into(), amount: usd(8, 0) }]);
    }

    #[test]
    fn test_fixed_amount_never_exceeds_base() {
        let d = discount(DiscountKind::FixedAmount { amount: usd(50, 0) }, DiscountRules::default());
        let ctx = DiscountContext::new("USD").with_line(DiscountLine::new("P1", 1, usd(30, 0))).with_shipping(usd(5, 0));
        let applied = calculate(&d, &ctx);
        assert_eq!(applied.amount.amount(), usd(30, 0));
        assert_eq!(applied.total_after(&ctx), usd(5, 0));
    }

    #[test]
    fn test_fixed_amount_allocations_sum_exactly() {
        let d = discount(DiscountKind::FixedAmount { amount: usd(10, 0) }, DiscountRules::default());
        let ctx = DiscountContext::new("USD")
            .with_line(DiscountLine::new("A", 1, usd(10, 0)))
            .with_line(DiscountLine::new("B", 1, usd(10, 0)))
            .with_line(DiscountLine::new("C", 1, usd(10, 0)));
        let applied = calculate(&d, &ctx);
        let amounts: Vec<Decimal> = applied.allocations.iter().map(|a| a.amount).collect();
        assert_eq!(amounts, vec![usd(333, 2), usd(333, 2), usd(334, 2)]);
    }

    #[test]
    fn test_free_shipping() {
        let d = discount(DiscountKind::FreeShipping, DiscountRules::default());
        let ctx = DiscountContext::new("USD").with_line(DiscountLine::new("P1", 1, usd(30, 0))).with_shipping(usd(799, 2));
        let applied = calculate(&d, &ctx);
        assert!(applied.free_shipping);
        assert_eq!(applied.amount.amount(), usd(799, 2));
        assert!(applied.allocations.is_empty());
        assert_eq!(applied.total_after(&ctx), usd(30, 0));
    }

    #[test]
    fn test_buy_two_get_one_free_discounts_cheapest() {
        let d = discount(DiscountKind::BuyXGetY { buy: 2, get: 1, get_percent: Decimal::ONE_HUNDRED }, DiscountRules::default());
        let ctx = DiscountContext::new("USD")
            .with_line(DiscountLine::new("EXPENSIVE", 2, usd(30, 0)))
            .with_line(DiscountLine::new("CHEAP", 1, usd(12, 0)));
        let applied = calculate(&d, &ctx);
        assert_eq!(applied.amount.amount(), usd(12, 0));
        assert_eq!(applied.allocations, vec![LineAllocation { product_id: "CHEAP".into(), amount: usd(12, 0) }]);
    }

    #[test]
    fn test_buy_one_get_one_half_off() {
        let d = discount(DiscountKind::BuyXGetY { buy: 1, get: 1, get_percent: usd(50, 0) }, DiscountRules::default());
        // 5 units -> 2 complete groups -> 2 half-price units
        let ctx = DiscountContext::new("USD").with_line(DiscountLine::new("P1", 5, usd(20, 0)));
        assert_eq!(calculate(&d, &ctx).amount.amount(), usd(20, 0));
    }

    #[test]
    fn test_rounding_to_cents() {
        let d = discount(DiscountKind::Percentage { percent: usd(15, 0) }, DiscountRules::default());
        let ctx = DiscountContext::new("USD").with_line(DiscountLine::new("P1", 1, usd(3333, 2)));
        assert_eq!(calculate(&d, &ctx).amount.amount(), usd(500, 2));
    }

    #[test]
    fn test_buy_x_get_y_with_huge_quantity() {
        let d = discount(DiscountKind::BuyXGetY { buy: 1, get: 1, get_percent: Decimal::ONE_HUNDRED }, DiscountRules::default());
        let ctx = DiscountContext::new("USD")
            .with_line(DiscountLine::new("BULK", u32::MAX, usd(2, 0)))
            .with_line(DiscountLine::new("SINGLE", 1, usd(1, 0)));
        // 4294967296 units -> 2147483648 free, cheapest first: 1 x 1.00 then 2147483647 x 2.00
        let applied = calculate(&d, &ctx);
        assert_eq!(applied.amount.amount(), usd(4_294_967_295, 0));
        assert_eq!(applied.allocations.iter().map(|a| a.amount).sum::<Decimal>(), applied.amount.amount());
    }

    #[test]
    fn test_negative_prices_never_give_negative_amounts() {
        let d = discount(DiscountKind::FixedAmount { amount: usd(5, 0) }, DiscountRules::default());
        let ctx = DiscountContext::new("USD").with_line(DiscountLine::new("P1", 1, usd(-10, 0))).with_shipping(usd(-3, 0));
        assert_eq!(calculate(&d, &ctx).amount.amount(), Decimal::ZERO);
        let shipping = discount(DiscountKind::FreeShipping, DiscountRules::default());
        assert_eq!(calculate(&shipping, &ctx).amount.amount(), Decimal::ZERO);
    }

    #[test]
    fn test_huge_prices_saturate() {
        let d = discount(DiscountKind::Percentage { percent: usd(50, 0) }, DiscountRules::default());
        let ctx = DiscountContext::new("USD").with_line(DiscountLine::new("P1", u32::MAX, Decimal::MAX));
        let applied = calculate(&d, &ctx);
        assert!(applied.amount.amount() > Decimal::ZERO);
        assert!(applied.amount.amount() <= ctx.subtotal());
    }
}
