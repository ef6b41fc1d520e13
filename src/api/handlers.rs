use axum::{extract::{Path, Query, State}, http::StatusCode, Json};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;
use crate::domain::aggregates::{Discount, DiscountKind, DiscountRules};
use crate::engine::{AppliedDiscount, BestDiscount, DiscountContext};
use crate::repository::ListFilter;
use crate::service::{DiscountUpdate, NewDiscount, ValidationReport};
use crate::{DiscountCode, ServiceError};
use super::{error::ApiError, AppState};

type ApiResult<T> = Result<T, ApiError>;

fn parse_code(code: &str) -> Result<DiscountCode, ApiError> {
    DiscountCode::new(code).map_err(|e| ApiError::from(ServiceError::from(e)))
}

fn default_true() -> bool { true }

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDiscountRequest {
    #[validate(length(min = 3, max = 50))]
    pub code: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub code_prefix: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub kind: DiscountKind,
    #[serde(default)]
    pub rules: DiscountRules,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateDiscountRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub kind: DiscountKind,
    #[serde(default)]
    pub rules: DiscountRules,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CodeRequest {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    pub context: DiscountContext,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BestRequest {
    #[validate(length(min = 1, max = 20))]
    pub codes: Vec<String>,
    pub context: DiscountContext,
}

#[derive(Debug, Deserialize)]
pub struct AutoApplyRequest {
    pub context: DiscountContext,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RedeemRequest {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    #[validate(length(min = 1, max = 100))]
    pub order_id: String,
    pub context: DiscountContext,
}

#[derive(Debug, Serialize)] pub struct PaginatedResponse<T> { pub data: Vec<T>, pub total: u64, pub page: u32 }
#[derive(Debug, Serialize)] pub struct PricedResponse { pub discount: Option<AppliedDiscount>, pub total: Decimal }
#[derive(Debug, Serialize)] pub struct BestResponse { #[serde(flatten)] pub result: BestDiscount, pub total: Decimal }

fn priced(applied: Option<AppliedDiscount>, ctx: &DiscountContext) -> PricedResponse {
    let total = applied.as_ref().map_or_else(|| ctx.subtotal().saturating_add(ctx.shipping), |a| a.total_after(ctx));
    PricedResponse { discount: applied, total }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy", "service": "opensase-discounts"}))
}

pub async fn list_discounts(State(s): State<AppState>, Query(f): Query<ListFilter>) -> ApiResult<Json<PaginatedResponse<Discount>>> {
    let (data, total) = s.service.list_discounts(&f).await?;
    Ok(Json(PaginatedResponse { data, total, page: f.page() }))
}

pub async fn get_discount(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Discount>> {
    Ok(Json(s.service.get_discount(&id).await?))
}

pub async fn create_discount(State(s): State<AppState>, Json(r): Json<CreateDiscountRequest>) -> ApiResult<(StatusCode, Json<Discount>)> {
    r.validate()?;
    let code = r.code.as_deref().map(parse_code).transpose()?;
    let discount = s.service.create_discount(NewDiscount {
        code, code_prefix: r.code_prefix, name: r.name, description: r.description,
        kind: r.kind, rules: r.rules, currency: r.currency, is_active: r.is_active,
    }).await?;
    Ok((StatusCode::CREATED, Json(discount)))
}

pub async fn update_discount(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<UpdateDiscountRequest>) -> ApiResult<Json<Discount>> {
    r.validate()?;
    let update = DiscountUpdate { name: r.name, description: r.description, kind: r.kind, rules: r.rules };
    Ok(Json(s.service.update_discount(&id, update).await?))
}

pub async fn delete_discount(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    s.service.delete_discount(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn activate_discount(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Discount>> {
    Ok(Json(s.service.set_active(&id, true).await?))
}

pub async fn deactivate_discount(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Discount>> {
    Ok(Json(s.service.set_active(&id, false).await?))
}

pub async fn validate_code(State(s): State<AppState>, Json(r): Json<CodeRequest>) -> ApiResult<Json<ValidationReport>> {
    r.validate()?;
    let code = parse_code(&r.code)?;
    Ok(Json(s.service.validate_code(&code, r.context).await?))
}

pub async fn apply_code(State(s): State<AppState>, Json(r): Json<CodeRequest>) -> ApiResult<Json<PricedResponse>> {
    r.validate()?;
    let code = parse_code(&r.code)?;
    let applied = s.service.apply_code(&code, r.context.clone()).await?;
    Ok(Json(priced(Some(applied), &r.context)))
}

pub async fn best_discount(State(s): State<AppState>, Json(r): Json<BestRequest>) -> ApiResult<Json<BestResponse>> {
    r.validate()?;
    let codes = r.codes.iter().map(|c| parse_code(c)).collect::<Result<Vec<_>, _>>()?;
    let result = s.service.best_of(&codes, r.context.clone()).await?;
    let total = priced(result.best.clone(), &r.context).total;
    Ok(Json(BestResponse { result, total }))
}

pub async fn auto_apply(State(s): State<AppState>, Json(r): Json<AutoApplyRequest>) -> ApiResult<Json<PricedResponse>> {
    let applied = s.service.auto_apply(r.context.clone()).await?;
    Ok(Json(priced(applied, &r.context)))
}

pub async fn redeem(State(s): State<AppState>, Json(r): Json<RedeemRequest>) -> ApiResult<Json<PricedResponse>> {
    r.validate()?;
    let code = parse_code(&r.code)?;
    let applied = s.service.redeem(&code, &r.order_id, r.context.clone()).await?;
    Ok(Json(priced(Some(applied), &r.context)))
}
