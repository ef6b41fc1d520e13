//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{DiscountCode, Money, MoneyError};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::engine::AppliedDiscount;

#[derive(Clone, Debug)]
pub struct Order {
    id: String,
    customer_id: String,
    status: OrderStatus,
    items: Vec<LineItem>,
    subtotal: Money,
    shipping: Money,
    tax: Money,
    discount: Money,
    discount_code: Option<DiscountCode>,
    total: Money,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem { pub id: String, pub product_id: String, pub name: String, pub sku: String, #[serde(default)] pub category_ids: Vec<String>, pub quantity: u32, pub unit_price: Money, pub total: Money }
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)] pub enum OrderStatus { #[default] Pending, Confirmed }

impl LineItem {
    pub fn new(product_id: impl Into<String>, name: impl Into<String>, sku: impl Into<String>, quantity: u32, unit_price: Money) -> Self {
        let total = unit_price.multiply(quantity);
        Self { id: Uuid::new_v4().to_string(), product_id: product_id.into(), name: name.into(), sku: sku.into(), category_ids: vec![], quantity, unit_price, total }
    }

    pub fn in_categories(mut self, categories: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.category_ids = categories.into_iter().map(Into::into).collect();
        self
    }
}

impl Order {
    pub fn create(customer_id: impl Into<String>, currency: &str) -> Self {
        let id = Uuid::new_v4().to_string();
        let customer_id = customer_id.into();
        let now = Utc::now();
        let mut order = Self {
            id: id.clone(), customer_id: customer_id.clone(), status: OrderStatus::Pending,
            items: vec![], subtotal: Money::zero(currency), shipping: Money::zero(currency), tax: Money::zero(currency),
            discount: Money::zero(currency), discount_code: None, total: Money::zero(currency),
            created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Created { order_id: id, customer_id }));
        order
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn customer_id(&self) -> &str { &self.customer_id }
    pub fn status(&self) -> &OrderStatus { &self.status }
    pub fn is_editable(&self) -> bool { self.status == OrderStatus::Pending }
    pub fn currency(&self) -> &str { self.subtotal.currency() }
    pub fn subtotal(&self) -> &Money { &self.subtotal }
    pub fn shipping(&self) -> &Money { &self.shipping }
    pub fn tax(&self) -> &Money { &self.tax }
    pub fn discount(&self) -> &Money { &self.discount }
    pub fn discount_code(&self) -> Option<&DiscountCode> { self.discount_code.as_ref() }
    pub fn total(&self) -> &Money { &self.total }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    pub fn add_item(&mut self, item: LineItem) -> Result<(), OrderError> {
        self.ensure_editable()?;
        self.items.push(item);
        self.recalculate()
    }

    pub fn set_shipping(&mut self, shipping: Money) -> Result<(), OrderError> {
        self.ensure_editable()?;
        self.shipping = shipping;
        self.recalculate()
    }

    pub fn set_tax(&mut self, tax: Money) -> Result<(), OrderError> {
        self.ensure_editable()?;
        self.tax = tax;
        self.recalculate()
    }

    /// Replaces any previously applied discount.
    pub fn apply_discount(&mut self, applied: &AppliedDiscount) -> Result<(), OrderError> {
        self.ensure_editable()?;
        if applied.amount.currency() != self.currency() {
            return Err(OrderError::Money(MoneyError::CurrencyMismatch { expected: self.currency().to_string(), found: applied.amount.currency().to_string() }));
        }
        self.discount = applied.amount.clone();
        self.discount_code = Some(applied.code.clone());
        self.recalculate()?;
        self.raise_event(DomainEvent::Order(OrderEvent::DiscountApplied { order_id: self.id.clone(), code: applied.code.clone(), amount: self.discount.amount() }));
        Ok(())
    }

    pub fn remove_discount(&mut self) -> Result<(), OrderError> {
        self.ensure_editable()?;
        self.discount = Money::zero(self.currency());
        self.discount_code = None;
        self.recalculate()
    }

    /// Locks the order; prices and discounts can no longer change.
    pub fn confirm(&mut self) -> Result<(), OrderError> {
        self.ensure_editable()?;
        if self.items.is_empty() { return Err(OrderError::NoItems); }
        self.status = OrderStatus::Confirmed;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Confirmed { order_id: self.id.clone(), total: self.total.amount() }));
        Ok(())
    }

    fn ensure_editable(&self) -> Result<(), OrderError> {
        if !self.is_editable() { return Err(OrderError::NotEditable); }
        Ok(())
    }

    fn recalculate(&mut self) -> Result<(), OrderError> {
        let mut subtotal = Money::zero(self.currency());
        for item in &self.items { subtotal = subtotal.add(&item.total)?; }
        self.subtotal = subtotal;
        let gross = self.subtotal.add(&self.shipping)?.add(&self.tax)?;
        self.total = gross.subtract(&self.discount)?;
        self.touch();
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("order has no items")]
    NoItems,
    #[error("order can no longer be modified")]
    NotEditable,
    #[error(transparent)]
    Money(#[from] MoneyError),
}
