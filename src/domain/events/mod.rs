//! Domain events
use crate::domain::value_objects::DiscountCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Discount(DiscountEvent),
    Order(OrderEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscountEvent {
    Created { discount_id: String, code: DiscountCode },
    Activated { discount_id: String },
    Deactivated { discount_id: String },
    Redeemed { discount_id: String, code: DiscountCode, order_id: String, customer_id: Option<String>, amount: Decimal },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: String, customer_id: String },
    Confirmed { order_id: String, total: Decimal },
    DiscountApplied { order_id: String, code: DiscountCode, amount: Decimal },
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> String {
        match self {
            Self::Discount(e) => format!("ecommerce.discounts.{}", e.name()),
            Self::Order(e) => format!("ecommerce.orders.{}", e.name()),
        }
    }
}

impl DiscountEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Activated { .. } => "activated",
            Self::Deactivated { .. } => "deactivated",
            Self::Redeemed { .. } => "redeemed",
        }
    }
}

impl OrderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Confirmed { .. } => "confirmed",
            Self::DiscountApplied { .. } => "discount_applied",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subjects() {
        let e = DomainEvent::Discount(DiscountEvent::Activated { discount_id: "d1".into() });
        assert_eq!(e.subject(), "ecommerce.discounts.activated");
        let e = DomainEvent::Order(OrderEvent::DiscountApplied { order_id: "o1".into(), code: DiscountCode::new("SAVE10").unwrap(), amount: Decimal::TEN });
        assert_eq!(e.subject(), "ecommerce.orders.discount_applied");
    }

    #[test]
    fn test_event_json_shape() {
        let e = DomainEvent::Discount(DiscountEvent::Deactivated { discount_id: "d1".into() });
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["aggregate"], "discount");
        assert_eq!(json["event"]["type"], "deactivated");
    }
}
