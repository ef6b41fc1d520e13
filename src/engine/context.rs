//! Pricing context the engine evaluates discounts against.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use crate::domain::aggregates::{Cart, Order};

/// Largest quantity accepted on a single line.
pub const MAX_LINE_QUANTITY: u32 = 1_000_000;
/// Largest cart subtotal accepted, in major currency units.
pub const MAX_CONTEXT_AMOUNT: i64 = 1_000_000_000_000;

/// A pricing context the engine will not evaluate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("unit price of {product_id} must not be negative")]
    NegativePrice { product_id: String },
    #[error("shipping must not be negative")]
    NegativeShipping,
    #[error("quantity of {product_id} exceeds {}", MAX_LINE_QUANTITY)]
    QuantityTooLarge { product_id: String },
    #[error("order amount exceeds {}", MAX_CONTEXT_AMOUNT)]
    AmountTooLarge,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscountLine {
    pub product_id: String,
    #[serde(default)]
    pub category_ids: Vec<String>,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl DiscountLine {
    pub fn new(product_id: impl Into<String>, quantity: u32, unit_price: Decimal) -> Self {
        Self { product_id: product_id.into(), category_ids: vec![], quantity, unit_price }
    }

    pub fn in_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_ids.push(category_id.into());
        self
    }

    pub fn line_total(&self) -> Decimal { self.unit_price.saturating_mul(Decimal::from(self.quantity)) }
}

/// What the store already knows about the customer placing the order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerHistory {
    pub customer_id: String,
    /// Orders placed before the one being priced.
    #[serde(default)]
    pub completed_orders: u32,
    /// Redemptions per discount id.
    #[serde(default)]
    pub redemptions: HashMap<String, u32>,
}

impl CustomerHistory {
    pub fn new(customer_id: impl Into<String>) -> Self { Self { customer_id: customer_id.into(), ..Default::default() } }
    pub fn redemptions_of(&self, discount_id: &str) -> u32 { self.redemptions.get(discount_id).copied().unwrap_or(0) }
    pub fn is_first_order(&self) -> bool { self.completed_orders == 0 }

    /// Keeps the larger of both counts so neither source can understate usage.
    pub fn merge(&mut self, other: &CustomerHistory) {
        self.completed_orders = self.completed_orders.max(other.completed_orders);
        for (discount_id, used) in &other.redemptions {
            let entry = self.redemptions.entry(discount_id.clone()).or_default();
            *entry = (*entry).max(*used);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscountContext {
    pub currency: String,
    #[serde(default)]
    pub lines: Vec<DiscountLine>,
    #[serde(default)]
    pub shipping: Decimal,
    #[serde(default)]
    pub customer: Option<CustomerHistory>,
    #[serde(default = "Utc::now")]
    pub now: DateTime<Utc>,
}

impl DiscountContext {
    pub fn new(currency: &str) -> Self {
        Self { currency: currency.trim().to_uppercase(), lines: vec![], shipping: Decimal::ZERO, customer: None, now: Utc::now() }
    }

    pub fn from_cart(cart: &Cart) -> Self {
        let mut ctx = Self::new(cart.currency());
        ctx.lines = cart.items().iter().map(|i| DiscountLine {
            product_id: i.product_id.clone(), category_ids: i.category_ids.clone(), quantity: i.quantity, unit_price: i.unit_price.amount(),
        }).collect();
        ctx.shipping = cart.shipping().amount();
        if let Some(customer_id) = cart.customer_id() { ctx.customer = Some(CustomerHistory::new(customer_id)); }
        ctx
    }

    pub fn from_order(order: &Order) -> Self {
        let mut ctx = Self::new(order.currency());
        ctx.lines = order.items().iter().map(|i| DiscountLine {
            product_id: i.product_id.clone(), category_ids: i.category_ids.clone(), quantity: i.quantity, unit_price: i.unit_price.amount(),
        }).collect();
        ctx.shipping = order.shipping().amount();
        ctx.customer = Some(CustomerHistory::new(order.customer_id()));
        ctx
    }

    pub fn with_line(mut self, line: DiscountLine) -> Self { self.lines.push(line); self }
    pub fn with_shipping(mut self, shipping: Decimal) -> Self { self.shipping = shipping; self }
    pub fn with_customer(mut self, customer: CustomerHistory) -> Self { self.customer = Some(customer); self }
    pub fn at(mut self, now: DateTime<Utc>) -> Self { self.now = now; self }

    pub fn customer_id(&self) -> Option<&str> { self.customer.as_ref().map(|c| c.customer_id.as_str()) }
    pub fn subtotal(&self) -> Decimal { self.lines.iter().map(DiscountLine::line_total).fold(Decimal::ZERO, Decimal::saturating_add) }
    pub fn is_empty(&self) -> bool { self.lines.iter().all(|l| l.quantity == 0) }

    /// Rejects negative money and amounts too large to price.
    pub fn check(&self) -> Result<(), ContextError> {
        let limit = Decimal::from(MAX_CONTEXT_AMOUNT);
        if self.shipping < Decimal::ZERO { return Err(ContextError::NegativeShipping); }
        if self.shipping > limit { return Err(ContextError::AmountTooLarge); }
        let mut subtotal = Decimal::ZERO;
        for line in &self.lines {
            if line.unit_price < Decimal::ZERO {
                return Err(ContextError::NegativePrice { product_id: line.product_id.clone() });
            }
            if line.quantity > MAX_LINE_QUANTITY {
                return Err(ContextError::QuantityTooLarge { product_id: line.product_id.clone() });
            }
            subtotal = line.unit_price.checked_mul(Decimal::from(line.quantity))
                .and_then(|total| subtotal.checked_add(total))
                .filter(|total| *total <= limit)
                .ok_or(ContextError::AmountTooLarge)?;
        }
        Ok(())
    }
}
