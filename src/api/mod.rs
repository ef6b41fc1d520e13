//! HTTP surface
//!
//! - `GET /health`
//! - `GET|POST /api/v1/discounts`, `GET|PUT|DELETE /api/v1/discounts/:id`
//! - `POST /api/v1/discounts/:id/activate`, `POST /api/v1/discounts/:id/deactivate`
//! - `POST /api/v1/discounts/validate|apply|best|auto-apply|redeem`

pub mod error;
pub mod handlers;

use axum::{routing::{get, post}, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use crate::service::DiscountService;

#[derive(Clone)]
pub struct AppState { pub service: Arc<DiscountService> }

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/discounts", get(handlers::list_discounts).post(handlers::create_discount))
        .route("/api/v1/discounts/validate", post(handlers::validate_code))
        .route("/api/v1/discounts/apply", post(handlers::apply_code))
        .route("/api/v1/discounts/best", post(handlers::best_discount))
        .route("/api/v1/discounts/auto-apply", post(handlers::auto_apply))
        .route("/api/v1/discounts/redeem", post(handlers::redeem))
        .route("/api/v1/discounts/:id", get(handlers::get_discount).put(handlers::update_discount).delete(handlers::delete_discount))
        .route("/api/v1/discounts/:id/activate", post(handlers::activate_discount))
        .route("/api/v1/discounts/:id/deactivate", post(handlers::deactivate_discount))
        .layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(state)
}
