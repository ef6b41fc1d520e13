//! Discount Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;
use crate::domain::value_objects::{DiscountCode, Money};
use crate::domain::events::{DomainEvent, DiscountEvent};

/// How a discount is priced once it has passed validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscountKind {
    /// `percent` off the eligible subtotal, on the 0-100 scale.
    Percentage { percent: Decimal },
    /// Flat amount off, in the discount's currency.
    FixedAmount { amount: Decimal },
    FreeShipping,
    /// For every `buy` units the customer gets `get` more at `get_percent` off (100 = free).
    BuyXGetY { buy: u32, get: u32, #[serde(default = "full_price_off")] get_percent: Decimal },
}

fn full_price_off() -> Decimal { Decimal::ONE_HUNDRED }

/// Upper bound for `buy` and `get` in a buy-X-get-Y offer.
pub const MAX_BUY_GET_QUANTITY: u32 = 1_000;

impl DiscountKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Percentage { .. } => "percentage",
            Self::FixedAmount { .. } => "fixed_amount",
            Self::FreeShipping => "free_shipping",
            Self::BuyXGetY { .. } => "buy_x_get_y",
        }
    }

    fn check(&self) -> Result<(), DiscountError> {
        match self {
            Self::Percentage { percent } if *percent <= Decimal::ZERO || *percent > Decimal::ONE_HUNDRED => Err(DiscountError::InvalidPercent(*percent)),
            Self::FixedAmount { amount } if *amount <= Decimal::ZERO => Err(DiscountError::InvalidAmount(*amount)),
            Self::BuyXGetY { buy, get, .. } if !(1..=MAX_BUY_GET_QUANTITY).contains(buy) || !(1..=MAX_BUY_GET_QUANTITY).contains(get) => Err(DiscountError::InvalidBuyXGetY),
            Self::BuyXGetY { get_percent, .. } if *get_percent <= Decimal::ZERO || *get_percent > Decimal::ONE_HUNDRED => Err(DiscountError::InvalidPercent(*get_percent)),
            _ => Ok(()),
        }
    }
}

/// Eligibility rules checked before a discount is priced.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscountRules {
    pub starts_at: Option<DateTime<Utc>>,
    /// Exclusive upper bound of the active window.
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<u32>,
    pub per_customer_limit: Option<u32>,
    pub min_order_amount: Option<Decimal>,
    pub max_order_amount: Option<Decimal>,
    /// Ceiling on the computed discount amount.
    pub max_discount_amount: Option<Decimal>,
    pub applicable_products: BTreeSet<String>,
    pub applicable_categories: BTreeSet<String>,
    pub excluded_products: BTreeSet<String>,
    /// Customer ids allowed to use the code; empty means everyone.
    pub eligible_customers: BTreeSet<String>,
    pub first_order_only: bool,
    /// Public discounts are considered by auto-apply.
    pub is_public: bool,
}

impl DiscountRules {
    fn check(&self) -> Result<(), DiscountError> {
        if let (Some(start), Some(end)) = (self.starts_at, self.expires_at) {
            if start >= end { return Err(DiscountError::InvalidWindow); }
        }
        for amount in [self.min_order_amount, self.max_order_amount, self.max_discount_amount].into_iter().flatten() {
            if amount < Decimal::ZERO { return Err(DiscountError::InvalidAmount(amount)); }
        }
        if let (Some(min), Some(max)) = (self.min_order_amount, self.max_order_amount) {
            if min > max { return Err(DiscountError::InvalidOrderRange); }
        }
        if self.usage_limit == Some(0) || self.per_customer_limit == Some(0) { return Err(DiscountError::InvalidUsageLimit); }
        Ok(())
    }
}

/// Persisted state of a discount.
#[derive(Clone, Debug)]
pub struct DiscountSnapshot {
    pub id: String,
    pub code: DiscountCode,
    pub name: String,
    pub description: Option<String>,
    pub kind: DiscountKind,
    pub rules: DiscountRules,
    pub currency: String,
    pub usage_count: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Discount {
    id: String,
    code: DiscountCode,
    name: String,
    description: Option<String>,
    kind: DiscountKind,
    rules: DiscountRules,
    currency: String,
    usage_count: u32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Discount {
    pub fn create(code: DiscountCode, name: impl Into<String>, kind: DiscountKind, rules: DiscountRules, currency: &str) -> Result<Self, DiscountError> {
        let name = name.into();
        if name.trim().is_empty() { return Err(DiscountError::MissingName); }
        kind.check()?;
        rules.check()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now();
        let mut discount = Self {
            id: id.clone(), code: code.clone(), name, description: None, kind, rules,
            currency: currency.trim().to_uppercase(), usage_count: 0, is_active: true,
            created_at: now, updated_at: now, events: vec![],
        };
        discount.raise_event(DomainEvent::Discount(DiscountEvent::Created { discount_id: id, code }));
        Ok(discount)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self { self.description = Some(description.into()); self }

    /// Rebuilds a stored discount without re-running definition checks or raising events.
    pub fn restore(s: DiscountSnapshot) -> Self {
        Self {
            id: s.id, code: s.code, name: s.name, description: s.description, kind: s.kind, rules: s.rules,
            currency: s.currency, usage_count: s.usage_count, is_active: s.is_active,
            created_at: s.created_at, updated_at: s.updated_at, events: vec![],
        }
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn code(&self) -> &DiscountCode { &self.code }
    pub fn name(&self) -> &str { &self.name }
    pub fn description(&self) -> Option<&str> { self.description.as_deref() }
    pub fn kind(&self) -> &DiscountKind { &self.kind }
    pub fn rules(&self) -> &DiscountRules { &self.rules }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn usage_count(&self) -> u32 { self.usage_count }
    pub fn is_active(&self) -> bool { self.is_active }
    pub fn is_public(&self) -> bool { self.rules.is_public }
    pub fn expires_at(&self) -> Option<DateTime<Utc>> { self.rules.expires_at }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// Fixed-amount value as money in the discount's currency.
    pub fn fixed_amount(&self) -> Option<Money> {
        match &self.kind { DiscountKind::FixedAmount { amount } => Some(Money::new(*amount, &self.currency)), _ => None }
    }

    pub fn remaining_uses(&self) -> Option<u32> { self.rules.usage_limit.map(|limit| limit.saturating_sub(self.usage_count)) }
    pub fn is_exhausted(&self) -> bool { self.remaining_uses() == Some(0) }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool { self.rules.starts_at.map_or(true, |start| now >= start) }
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool { self.rules.expires_at.is_some_and(|end| now >= end) }
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool { self.has_started(now) && !self.has_expired(now) }

    pub fn has_item_restrictions(&self) -> bool {
        !self.rules.applicable_products.is_empty() || !self.rules.applicable_categories.is_empty() || !self.rules.excluded_products.is_empty()
    }

    /// Exclusions win over inclusions; with no inclusion lists every product qualifies.
    pub fn is_item_eligible<'a>(&self, product_id: &str, mut category_ids: impl Iterator<Item = &'a String>) -> bool {
        let rules = &self.rules;
        if rules.excluded_products.contains(product_id) { return false; }
        if rules.applicable_products.is_empty() && rules.applicable_categories.is_empty() { return true; }
        rules.applicable_products.contains(product_id) || category_ids.any(|c| rules.applicable_categories.contains(c))
    }

    pub fn is_customer_eligible(&self, customer_id: Option<&str>) -> bool {
        if self.rules.eligible_customers.is_empty() { return true; }
        customer_id.is_some_and(|id| self.rules.eligible_customers.contains(id))
    }

    pub fn rename(&mut self, name: impl Into<String>, description: Option<String>) -> Result<(), DiscountError> {
        let name = name.into();
        if name.trim().is_empty() { return Err(DiscountError::MissingName); }
        self.name = name;
        self.description = description;
        self.touch();
        Ok(())
    }

    pub fn update_rules(&mut self, kind: DiscountKind, rules: DiscountRules) -> Result<(), DiscountError> {
        kind.check()?;
        rules.check()?;
        self.kind = kind;
        self.rules = rules;
        self.touch();
        Ok(())
    }

    pub fn activate(&mut self) {
        if self.is_active { return; }
        self.is_active = true;
        self.touch();
        self.raise_event(DomainEvent::Discount(DiscountEvent::Activated { discount_id: self.id.clone() }));
    }

    pub fn deactivate(&mut self) {
        if !self.is_active { return; }
        self.is_active = false;
        self.touch();
        self.raise_event(DomainEvent::Discount(DiscountEvent::Deactivated { discount_id: self.id.clone() }));
    }

    pub fn record_usage(&mut self, order_id: impl Into<String>, customer_id: Option<String>, amount: Decimal) -> Result<(), DiscountError> {
        if self.is_exhausted() { return Err(DiscountError::UsageLimitReached); }
        self.usage_count += 1;
        self.touch();
        self.raise_event(DomainEvent::Discount(DiscountEvent::Redeemed {
            discount_id: self.id.clone(), code: self.code.clone(), order_id: order_id.into(), customer_id, amount,
        }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscountError {
    #[error("discount name is required")]
    MissingName,
    #[error("percentage must be greater than 0 and at most 100, got {0}")]
    InvalidPercent(Decimal),
    #[error("amount must be positive, got {0}")]
    InvalidAmount(Decimal),
    #[error("buy and get quantities must both be between 1 and {}", MAX_BUY_GET_QUANTITY)]
    InvalidBuyXGetY,
    #[error("start date must be before the expiry date")]
    InvalidWindow,
    #[error("minimum order amount exceeds maximum order amount")]
    InvalidOrderRange,
    #[error("usage limits must be at least 1")]
    InvalidUsageLimit,
    #[error("discount usage limit reached")]
    UsageLimitReached,
}
