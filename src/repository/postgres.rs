use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow, PgPool, Postgres, Transaction};
use crate::domain::aggregates::{Discount, DiscountError, DiscountKind, DiscountRules, DiscountSnapshot};
use crate::domain::value_objects::DiscountCode;
use crate::engine::CustomerHistory;
use super::{DiscountRepository, ListFilter, Redemption, RepositoryError};

const COLUMNS: &str = "id, code, name, description, kind, rules, currency, usage_count, is_active, created_at, updated_at";

#[derive(Debug, FromRow)]
struct DiscountRow {
    id: String,
    code: String,
    name: String,
    description: Option<String>,
    kind: Json<DiscountKind>,
    rules: Json<DiscountRules>,
    currency: String,
    usage_count: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DiscountRow {
    fn into_discount(self) -> Result<Discount, RepositoryError> {
        let row = self;
        let code = DiscountCode::new(row.code).map_err(|e| RepositoryError::Corrupt(e.to_string()))?;
        let usage_count = u32::try_from(row.usage_count).map_err(|_| RepositoryError::Corrupt(format!("negative usage count on {}", row.id)))?;
        Ok(Discount::restore(DiscountSnapshot {
            id: row.id, code, name: row.name, description: row.description, kind: row.kind.0, rules: row.rules.0,
            currency: row.currency, usage_count, is_active: row.is_active, created_at: row.created_at, updated_at: row.updated_at,
        }))
    }
}

fn rows_to_discounts(rows: Vec<DiscountRow>) -> Result<Vec<Discount>, RepositoryError> {
    rows.into_iter().map(DiscountRow::into_discount).collect()
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

/// Discounts stored in Postgres; kind and rules are JSONB columns.
#[derive(Clone)]
pub struct PgDiscountRepository {
    db: PgPool,
}

impl PgDiscountRepository {
    pub fn new(db: PgPool) -> Self { Self { db } }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.db).await
    }

    async fn lock(tx: &mut Transaction<'_, Postgres>, id: &str) -> Result<Discount, RepositoryError> {
        let row = sqlx::query_as::<_, DiscountRow>(&format!("SELECT {COLUMNS} FROM discounts WHERE id = $1 FOR UPDATE"))
            .bind(id).fetch_optional(&mut **tx).await?
            .ok_or(RepositoryError::NotFound)?;
        DiscountRow::into_discount(row)
    }
}

#[async_trait]
impl DiscountRepository for PgDiscountRepository {
    async fn insert(&self, d: &Discount) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO discounts (id, code, name, description, kind, rules, currency, usage_count, is_active, is_public, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)")
            .bind(d.id()).bind(d.code().as_str()).bind(d.name()).bind(d.description())
            .bind(Json(d.kind())).bind(Json(d.rules())).bind(d.currency())
            .bind(d.usage_count() as i32).bind(d.is_active()).bind(d.is_public())
            .bind(d.created_at()).bind(d.updated_at())
            .execute(&self.db).await
            .map_err(|e| if is_unique_violation(&e) { RepositoryError::DuplicateCode(d.code().clone()) } else { e.into() })?;
        Ok(())
    }

    async fn update(&self, d: &Discount) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE discounts SET code = $2, name = $3, description = $4, kind = $5, rules = $6, currency = $7, is_active = $8, is_public = $9, updated_at = $10 WHERE id = $1")
            .bind(d.id()).bind(d.code().as_str()).bind(d.name()).bind(d.description())
            .bind(Json(d.kind())).bind(Json(d.rules())).bind(d.currency())
            .bind(d.is_active()).bind(d.is_public()).bind(d.updated_at())
            .execute(&self.db).await
            .map_err(|e| if is_unique_violation(&e) { RepositoryError::DuplicateCode(d.code().clone()) } else { e.into() })?;
        if result.rows_affected() == 0 { return Err(RepositoryError::NotFound); }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM discounts WHERE id = $1").bind(id).execute(&self.db).await?;
        if result.rows_affected() == 0 { return Err(RepositoryError::NotFound); }
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Discount>, RepositoryError> {
        sqlx::query_as::<_, DiscountRow>(&format!("SELECT {COLUMNS} FROM discounts WHERE id = $1"))
            .bind(id).fetch_optional(&self.db).await?
            .map(DiscountRow::into_discount).transpose()
    }

    async fn find_by_code(&self, code: &DiscountCode) -> Result<Option<Discount>, RepositoryError> {
        sqlx::query_as::<_, DiscountRow>(&format!("SELECT {COLUMNS} FROM discounts WHERE code = $1"))
            .bind(code.as_str()).fetch_optional(&self.db).await?
            .map(DiscountRow::into_discount).transpose()
    }

    async fn find_by_codes(&self, codes: &[DiscountCode]) -> Result<Vec<Discount>, RepositoryError> {
        let codes: Vec<String> = codes.iter().map(|c| c.as_str().to_string()).collect();
        let rows = sqlx::query_as::<_, DiscountRow>(&format!("SELECT {COLUMNS} FROM discounts WHERE code = ANY($1) ORDER BY code"))
            .bind(&codes).fetch_all(&self.db).await?;
        rows_to_discounts(rows)
    }

    async fn list(&self, filter: &ListFilter) -> Result<(Vec<Discount>, u64), RepositoryError> {
        const WHERE: &str = "WHERE ($1::bool IS NULL OR is_active = $1) AND ($2::bool IS NULL OR is_public = $2) AND ($3::text IS NULL OR code ILIKE '%' || $3 || '%' OR name ILIKE '%' || $3 || '%')";
        let search = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let rows = sqlx::query_as::<_, DiscountRow>(&format!("SELECT {COLUMNS} FROM discounts {WHERE} ORDER BY created_at DESC, code LIMIT $4 OFFSET $5"))
            .bind(filter.active).bind(filter.public).bind(search)
            .bind(i64::from(filter.per_page())).bind(i64::try_from(filter.offset()).unwrap_or(i64::MAX))
            .fetch_all(&self.db).await?;
        let total: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM discounts {WHERE}"))
            .bind(filter.active).bind(filter.public).bind(search)
            .fetch_one(&self.db).await?;
        Ok((rows_to_discounts(rows)?, total.0.max(0) as u64))
    }

    async fn list_public_active(&self) -> Result<Vec<Discount>, RepositoryError> {
        let rows = sqlx::query_as::<_, DiscountRow>(&format!("SELECT {COLUMNS} FROM discounts WHERE is_active AND is_public"))
            .fetch_all(&self.db).await?;
        rows_to_discounts(rows)
    }

    async fn customer_history(&self, customer_id: &str) -> Result<CustomerHistory, RepositoryError> {
        let orders: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE customer_id::text = $1 AND status NOT IN ('pending', 'cancelled')")
            .bind(customer_id).fetch_one(&self.db).await?;
        let used: Vec<(String, i64)> = sqlx::query_as("SELECT discount_id, COUNT(*) FROM discount_redemptions WHERE customer_id = $1 GROUP BY discount_id")
            .bind(customer_id).fetch_all(&self.db).await?;
        let mut history = CustomerHistory::new(customer_id);
        history.completed_orders = u32::try_from(orders.0).unwrap_or(u32::MAX);
        history.redemptions = used.into_iter().map(|(id, n)| (id, u32::try_from(n).unwrap_or(u32::MAX))).collect();
        Ok(history)
    }

    async fn record_redemption(&self, r: &Redemption) -> Result<Discount, RepositoryError> {
        let mut tx = self.db.begin().await?;
        let mut discount = Self::lock(&mut tx, &r.discount_id).await?;

        let seen: Option<(uuid::Uuid,)> = sqlx::query_as("SELECT id FROM discount_redemptions WHERE discount_id = $1 AND order_id = $2")
            .bind(&r.discount_id).bind(&r.order_id).fetch_optional(&mut *tx).await?;
        if seen.is_some() { return Err(RepositoryError::AlreadyRedeemed(r.order_id.clone())); }

        if let (Some(limit), Some(customer_id)) = (discount.rules().per_customer_limit, r.customer_id.as_deref()) {
            let used: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM discount_redemptions WHERE discount_id = $1 AND customer_id = $2")
                .bind(&r.discount_id).bind(customer_id).fetch_one(&mut *tx).await?;
            if used.0 >= i64::from(limit) { return Err(RepositoryError::CustomerLimitReached(limit)); }
        }

        discount.record_usage(r.order_id.clone(), r.customer_id.clone(), r.amount).map_err(|e| match e {
            DiscountError::UsageLimitReached => RepositoryError::UsageLimitReached,
            other => RepositoryError::Corrupt(other.to_string()),
        })?;

        sqlx::query("UPDATE discounts SET usage_count = $2, updated_at = $3 WHERE id = $1")
            .bind(discount.id()).bind(discount.usage_count() as i32).bind(discount.updated_at())
            .execute(&mut *tx).await?;
        sqlx::query("INSERT INTO discount_redemptions (id, discount_id, order_id, customer_id, amount, redeemed_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(uuid::Uuid::now_v7()).bind(&r.discount_id).bind(&r.order_id).bind(&r.customer_id).bind(r.amount).bind(r.redeemed_at)
            .execute(&mut *tx).await
            .map_err(|e| if is_unique_violation(&e) { RepositoryError::AlreadyRedeemed(r.order_id.clone()) } else { e.into() })?;
        tx.commit().await?;
        Ok(discount)
    }
}
