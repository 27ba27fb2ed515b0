//! Row mapping trait and helpers for reducing boilerplate in queries.
//!
//! Models implement `FromRow` to describe how they are built from a
//! `SELECT {COLS}` row; `query_one` / `query_all` do the rest.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
///
/// A corrupt enum value becomes a row error instead of a panic.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Decode a JSON text column, falling back to the default on bad data.
fn json_col<T: serde::de::DeserializeOwned + Default>(row: &Row, col: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(col)?;
    Ok(serde_json::from_str(&raw).unwrap_or_default())
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const USER_COLS: &str = "id, email, name, created_at, updated_at";

pub const STORED_PLAN_COLS: &str = "id, name, price";

pub const SUBSCRIPTION_COLS: &str = "id, user_id, plan_id, status, payment_status, provider, transaction_id, current_period_start, current_period_end, created_at, updated_at";

pub const BUSINESS_COLS: &str = "id, owner_id, subscription_id, name, tagline, description, category, tags, address, city, state, zip_code, latitude, longitude, phone, email, website, logo_url, image_urls, social_links, premium, is_active, created_at, updated_at";

pub const DISCOUNT_CODE_COLS: &str = "id, code, discount_type, discount_value, plan_ids, starts_at, expires_at, max_uses, used_count, is_active, created_at";

pub const PROMOTION_COLS: &str =
    "id, plan_id, name, discount_type, discount_value, starts_at, ends_at, is_active, created_at";

pub const PAYMENT_ATTEMPT_COLS: &str = "id, idempotency_key, user_id, kind, provider, plan_id, amount_cents, discount_id, business_id, status, provider_session_id, transaction_id, is_downgrade, error, created_at, updated_at";

// ============ FromRow Implementations ============

impl FromRow for User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }
}

impl FromRow for StoredPlan {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(StoredPlan {
            id: row.get(0)?,
            name: row.get(1)?,
            price: row.get(2)?,
        })
    }
}

impl FromRow for Subscription {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Subscription {
            id: row.get(0)?,
            user_id: row.get(1)?,
            plan_id: row.get(2)?,
            status: parse_enum(row, 3, "status")?,
            payment_status: parse_enum(row, 4, "payment_status")?,
            provider: row.get(5)?,
            transaction_id: row.get(6)?,
            current_period_start: row.get(7)?,
            current_period_end: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

impl FromRow for Business {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Business {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            subscription_id: row.get(2)?,
            name: row.get(3)?,
            tagline: row.get(4)?,
            description: row.get(5)?,
            category: row.get(6)?,
            tags: json_col(row, 7)?,
            address: row.get(8)?,
            city: row.get(9)?,
            state: row.get(10)?,
            zip_code: row.get(11)?,
            latitude: row.get(12)?,
            longitude: row.get(13)?,
            phone: row.get(14)?,
            email: row.get(15)?,
            website: row.get(16)?,
            logo_url: row.get(17)?,
            image_urls: json_col(row, 18)?,
            social_links: json_col(row, 19)?,
            premium: json_col(row, 20)?,
            is_active: row.get::<_, i32>(21)? != 0,
            created_at: row.get(22)?,
            updated_at: row.get(23)?,
        })
    }
}

impl FromRow for DiscountCode {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(DiscountCode {
            id: row.get(0)?,
            code: row.get(1)?,
            discount_type: parse_enum(row, 2, "discount_type")?,
            discount_value: row.get(3)?,
            plan_ids: json_col(row, 4)?,
            starts_at: row.get(5)?,
            expires_at: row.get(6)?,
            max_uses: row.get(7)?,
            used_count: row.get(8)?,
            is_active: row.get::<_, i32>(9)? != 0,
            created_at: row.get(10)?,
        })
    }
}

impl FromRow for Promotion {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Promotion {
            id: row.get(0)?,
            plan_id: row.get(1)?,
            name: row.get(2)?,
            discount_type: parse_enum(row, 3, "discount_type")?,
            discount_value: row.get(4)?,
            starts_at: row.get(5)?,
            ends_at: row.get(6)?,
            is_active: row.get::<_, i32>(7)? != 0,
            created_at: row.get(8)?,
        })
    }
}

impl FromRow for PaymentAttempt {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PaymentAttempt {
            id: row.get(0)?,
            idempotency_key: row.get(1)?,
            user_id: row.get(2)?,
            kind: parse_enum(row, 3, "kind")?,
            provider: row.get(4)?,
            plan_id: row.get(5)?,
            amount_cents: row.get(6)?,
            discount_id: row.get(7)?,
            business_id: row.get(8)?,
            status: parse_enum(row, 9, "status")?,
            provider_session_id: row.get(10)?,
            transaction_id: row.get(11)?,
            is_downgrade: row.get::<_, i32>(12)? != 0,
            error: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }
}
