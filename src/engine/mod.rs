//! Discount engine
//!
//! Validates discount codes against a cart or order and prices them.
//! Everything here is synchronous and works on data the caller has
//! already loaded; persistence lives in [`crate::repository`].

pub mod calculation;
pub mod context;
pub mod validation;

pub use calculation::{AppliedDiscount, LineAllocation};
pub use context::{ContextError, CustomerHistory, DiscountContext, DiscountLine};
pub use validation::ValidationError;

use serde::Serialize;
use std::cmp::Ordering;
use crate::domain::aggregates::Discount;
use crate::domain::value_objects::DiscountCode;

/// A discount that failed validation, with every reason it failed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Rejection {
    pub code: DiscountCode,
    #[serde(serialize_with = "serialize_errors")]
    pub errors: Vec<ValidationError>,
}

fn serialize_errors<S: serde::Serializer>(errors: &[ValidationError], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(errors.iter().map(|e| ErrorView { code: e.code(), message: e.to_string() }))
}

#[derive(Serialize)]
struct ErrorView { code: &'static str, message: String }

/// Outcome of picking among several candidate discounts.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BestDiscount {
    pub best: Option<AppliedDiscount>,
    pub rejected: Vec<Rejection>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DiscountEngine;

impl DiscountEngine {
    pub fn new() -> Self { Self }

    pub fn validate(&self, discount: &Discount, ctx: &DiscountContext) -> Vec<ValidationError> {
        validation::validate(discount, ctx)
    }

    /// Prices a discount without checking its rules.
    pub fn calculate(&self, discount: &Discount, ctx: &DiscountContext) -> AppliedDiscount {
        calculation::calculate(discount, ctx)
    }

    /// Validates then prices. A discount that passes every rule but is worth nothing
    /// (other than free shipping) is rejected with [`ValidationError::NoValue`].
    pub fn apply(&self, discount: &Discount, ctx: &DiscountContext) -> Result<AppliedDiscount, Rejection> {
        let errors = self.validate(discount, ctx);
        if !errors.is_empty() {
            tracing::debug!(code = %discount.code(), reasons = errors.len(), "discount rejected");
            return Err(Rejection { code: discount.code().clone(), errors });
        }
        let applied = self.calculate(discount, ctx);
        if applied.amount.is_zero() && !applied.free_shipping {
            return Err(Rejection { code: discount.code().clone(), errors: vec![ValidationError::NoValue] });
        }
        Ok(applied)
    }

    /// Picks the most valuable applicable discount. Equal amounts go to the discount
    /// expiring soonest (open-ended last), then to the alphabetically first code.
    pub fn find_best<'a>(&self, discounts: impl IntoIterator<Item = &'a Discount>, ctx: &DiscountContext) -> BestDiscount {
        let mut result = BestDiscount::default();
        let mut winner: Option<(&Discount, AppliedDiscount)> = None;

        for discount in discounts {
            match self.apply(discount, ctx) {
                Ok(applied) => {
                    let better = match &winner {
                        None => true,
                        Some((current, current_applied)) => rank(discount, &applied, current, current_applied) == Ordering::Less,
                    };
                    if better { winner = Some((discount, applied)); }
                }
                Err(rejection) => result.rejected.push(rejection),
            }
        }

        result.best = winner.map(|(_, applied)| applied);
        result
    }

    /// Best of the active public discounts; no code entry needed.
    pub fn auto_apply<'a>(&self, discounts: impl IntoIterator<Item = &'a Discount>, ctx: &DiscountContext) -> Option<AppliedDiscount> {
        let candidates = discounts.into_iter().filter(|d| d.is_active() && d.is_public());
        self.find_best(candidates, ctx).best
    }
}

/// `Less` means `a` should win over `b`.
fn rank(a: &Discount, a_applied: &AppliedDiscount, b: &Discount, b_applied: &AppliedDiscount) -> Ordering {
    b_applied.amount.amount().cmp(&a_applied.amount.amount())
        .then_with(|| match (a.expires_at(), b.expires_at()) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.code().cmp(b.code()))
}
