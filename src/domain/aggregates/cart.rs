//! Cart Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{Money, MoneyError};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cart {
    id: String,
    customer_id: Option<String>,
    items: Vec<CartItem>,
    subtotal: Money,
    shipping: Money,
    currency: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub name: String,
    pub sku: String,
    #[serde(default)]
    pub category_ids: Vec<String>,
    pub quantity: u32,
    pub unit_price: Money,
}

impl CartItem {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

impl Cart {
    pub fn new(currency: &str) -> Self {
        let currency = currency.trim().to_uppercase();
        Self {
            id: Uuid::new_v4().to_string(), customer_id: None,
            items: vec![], subtotal: Money::zero(&currency), shipping: Money::zero(&currency), currency,
            created_at: Utc::now(), updated_at: Utc::now(),
        }
    }

    pub fn for_customer(customer_id: impl Into<String>, currency: &str) -> Self {
        let mut cart = Self::new(currency);
        cart.customer_id = Some(customer_id.into());
        cart
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn customer_id(&self) -> Option<&str> { self.customer_id.as_deref() }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn subtotal(&self) -> &Money { &self.subtotal }
    pub fn shipping(&self) -> &Money { &self.shipping }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    pub fn add_item(&mut self, item: CartItem) -> Result<(), CartError> {
        if item.unit_price.currency() != self.currency {
            return Err(CartError::Money(MoneyError::CurrencyMismatch { expected: self.currency.clone(), found: item.unit_price.currency().to_string() }));
        }
        if item.quantity == 0 { return Err(CartError::InvalidQuantity); }
        if let Some(existing) = self.items.iter_mut().find(|i| i.product_id == item.product_id && i.variant_id == item.variant_id) {
            existing.quantity += item.quantity;
        } else {
            self.items.push(item);
        }
        self.recalculate()
    }

    pub fn update_quantity(&mut self, product_id: &str, quantity: u32) -> Result<(), CartError> {
        let item = self.items.iter_mut().find(|i| i.product_id == product_id).ok_or(CartError::ItemNotFound)?;
        if quantity == 0 { self.items.retain(|i| i.product_id != product_id); }
        else { item.quantity = quantity; }
        self.recalculate()
    }

    pub fn remove_item(&mut self, product_id: &str) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        self.recalculate()
    }

    pub fn set_shipping(&mut self, amount: Decimal) -> Result<(), CartError> {
        if amount < Decimal::ZERO { return Err(CartError::NegativeShipping); }
        self.shipping = Money::new(amount, &self.currency);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn clear(&mut self) -> Result<(), CartError> { self.items.clear(); self.recalculate() }

    fn recalculate(&mut self) -> Result<(), CartError> {
        let mut subtotal = Money::zero(&self.currency);
        for item in &self.items { subtotal = subtotal.add(&item.line_total())?; }
        self.subtotal = subtotal;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CartError {
    #[error("item not found")]
    ItemNotFound,
    #[error("quantity must be at least 1")]
    InvalidQuantity,
    #[error("shipping cost cannot be negative")]
    NegativeShipping,
    #[error(transparent)]
    Money(#[from] MoneyError),
}
