use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params, types::Value};

use crate::crypto::{generate_api_key, hash_secret};
use crate::error::{AppError, Result};
use crate::id::EntityType;
use crate::models::*;

use super::from_row::{
    BUSINESS_COLS, DISCOUNT_CODE_COLS, PAYMENT_ATTEMPT_COLS, PROMOTION_COLS, STORED_PLAN_COLS,
    SUBSCRIPTION_COLS, USER_COLS, query_all, query_one,
};

/// Length of one subscription period.
pub const SUBSCRIPTION_PERIOD_DAYS: i64 = 365;

const SECONDS_PER_DAY: i64 = 86400;

fn now() -> i64 {
    Utc::now().timestamp()
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Into::into)
}

/// Builder for dynamic UPDATE statements.
/// Combines multiple field updates into a single query.
struct UpdateBuilder {
    table: &'static str,
    id: String,
    fields: Vec<(&'static str, Value)>,
    track_updated_at: bool,
}

impl UpdateBuilder {
    fn new(table: &'static str, id: &str) -> Self {
        Self {
            table,
            id: id.to_string(),
            fields: Vec::new(),
            track_updated_at: false,
        }
    }

    fn with_updated_at(mut self) -> Self {
        self.track_updated_at = true;
        self
    }

    fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((column, value.into()));
        self
    }

    /// Set a column to an explicit value, `None` writes NULL.
    fn set_nullable<V: Into<Value>>(mut self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.fields.push((column, v.into())),
            None => self.fields.push((column, Value::Null)),
        }
        self
    }

    fn build(mut self) -> Option<(String, Vec<Value>)> {
        if self.fields.is_empty() {
            return None;
        }
        if self.track_updated_at {
            self.fields.push(("updated_at", now().into()));
        }
        let sets: Vec<String> = self
            .fields
            .iter()
            .map(|(col, _)| format!("{} = ?", col))
            .collect();
        let mut values: Vec<Value> = self.fields.into_iter().map(|(_, v)| v).collect();
        values.push(self.id.into());
        let sql = format!("UPDATE {} SET {} WHERE id = ?", self.table, sets.join(", "));
        Some((sql, values))
    }

    fn execute(self, conn: &Connection) -> Result<bool> {
        let Some((sql, values)) = self.build() else {
            return Ok(false);
        };
        let affected = conn.execute(&sql, rusqlite::params_from_iter(values))?;
        Ok(affected > 0)
    }

    /// Execute and return the updated row via RETURNING.
    /// None if no row matched.
    fn execute_returning<T: super::from_row::FromRow>(
        self,
        conn: &Connection,
        returning_cols: &str,
    ) -> Result<Option<T>> {
        let Some((sql, values)) = self.build() else {
            return Ok(None);
        };
        let sql = format!("{} RETURNING {}", sql, returning_cols);
        conn.query_row(&sql, rusqlite::params_from_iter(values), T::from_row)
            .optional()
            .map_err(Into::into)
    }
}

// ============ Users ============

pub fn create_user(conn: &Connection, input: &CreateUser) -> Result<User> {
    let id = EntityType::User.gen_id();
    let now = now();
    let email = input.email.trim().to_lowercase();

    conn.execute(
        "INSERT INTO users (id, email, name, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![&id, &email, &input.name, now, now],
    )?;

    Ok(User {
        id,
        email,
        name: input.name.clone(),
        created_at: now,
        updated_at: now,
    })
}

pub fn get_user_by_id(conn: &Connection, id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLS),
        &[&id],
    )
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let email = email.trim().to_lowercase();
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE email = ?1", USER_COLS),
        &[&email],
    )
}

pub fn count_users(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
        .map_err(Into::into)
}

/// Issue a new API key for a user. Returns the plaintext key (shown once).
pub fn create_api_key(conn: &Connection, user_id: &str) -> Result<String> {
    let key = generate_api_key();
    conn.execute(
        "INSERT INTO api_keys (id, user_id, key_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![uuid::Uuid::new_v4().to_string(), user_id, hash_secret(&key), now()],
    )?;
    Ok(key)
}

pub fn get_user_by_api_key(conn: &Connection, api_key: &str) -> Result<Option<User>> {
    let hash = hash_secret(api_key);
    query_one(
        conn,
        "SELECT u.id, u.email, u.name, u.created_at, u.updated_at
         FROM api_keys k JOIN users u ON u.id = k.user_id
         WHERE k.key_hash = ?1 AND k.revoked_at IS NULL",
        &[&hash],
    )
}

// ============ Plans ============

pub fn get_stored_plan_by_name(conn: &Connection, name: &str) -> Result<Option<StoredPlan>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM subscription_plans WHERE name = ?1 COLLATE NOCASE",
            STORED_PLAN_COLS
        ),
        &[&name.trim()],
    )
}

pub fn get_stored_plan(conn: &Connection, id: &str) -> Result<Option<StoredPlan>> {
    query_one(
        conn,
        &format!("SELECT {} FROM subscription_plans WHERE id = ?1", STORED_PLAN_COLS),
        &[&id],
    )
}

// ============ Subscriptions ============

/// Create an active subscription whose period starts now and runs one year.
pub fn create_subscription(conn: &Connection, input: &CreateSubscription) -> Result<Subscription> {
    let id = EntityType::Subscription.gen_id();
    let now = now();
    let period_end = now + SUBSCRIPTION_PERIOD_DAYS * SECONDS_PER_DAY;

    conn.execute(
        "INSERT INTO subscriptions (id, user_id, plan_id, status, payment_status, provider, transaction_id,
                                    current_period_start, current_period_end, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            &id,
            &input.user_id,
            &input.plan_id,
            SubscriptionStatus::Active.as_ref(),
            input.payment_status.as_ref(),
            &input.provider,
            &input.transaction_id,
            now,
            period_end,
            now,
            now
        ],
    )?;

    Ok(Subscription {
        id,
        user_id: input.user_id.clone(),
        plan_id: input.plan_id.clone(),
        status: SubscriptionStatus::Active,
        payment_status: input.payment_status,
        provider: input.provider.clone(),
        transaction_id: input.transaction_id.clone(),
        current_period_start: now,
        current_period_end: period_end,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_subscription(conn: &Connection, id: &str) -> Result<Option<Subscription>> {
    query_one(
        conn,
        &format!("SELECT {} FROM subscriptions WHERE id = ?1", SUBSCRIPTION_COLS),
        &[&id],
    )
}

pub fn list_subscriptions_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Subscription>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM subscriptions WHERE user_id = ?1 ORDER BY created_at DESC",
            SUBSCRIPTION_COLS
        ),
        &[&user_id],
    )
}

/// Move a subscription onto another plan after a paid upgrade.
pub fn update_subscription_plan(
    conn: &Connection,
    id: &str,
    plan_id: &str,
    provider: Option<&str>,
    transaction_id: Option<&str>,
) -> Result<Option<Subscription>> {
    UpdateBuilder::new("subscriptions", id)
        .with_updated_at()
        .set("plan_id", plan_id.to_string())
        .set_nullable("provider", provider.map(String::from))
        .set_nullable("transaction_id", transaction_id.map(String::from))
        .execute_returning(conn, SUBSCRIPTION_COLS)
}

pub fn set_subscription_status(
    conn: &Connection,
    id: &str,
    status: SubscriptionStatus,
) -> Result<bool> {
    UpdateBuilder::new("subscriptions", id)
        .with_updated_at()
        .set("status", status.as_ref().to_string())
        .execute(conn)
}

// ============ Businesses ============

/// Insert the inactive placeholder row linked to a fresh subscription.
pub fn create_placeholder_business(
    conn: &Connection,
    owner_id: &str,
    subscription_id: &str,
) -> Result<Business> {
    let id = EntityType::Business.gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO businesses (id, owner_id, subscription_id, name, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)",
        params![&id, owner_id, subscription_id, PENDING_BUSINESS_NAME, now, now],
    )?;

    get_business(conn, &id)?
        .ok_or_else(|| AppError::Internal("Business vanished after insert".into()))
}

pub fn get_business(conn: &Connection, id: &str) -> Result<Option<Business>> {
    query_one(
        conn,
        &format!("SELECT {} FROM businesses WHERE id = ?1", BUSINESS_COLS),
        &[&id],
    )
}

pub fn get_business_for_subscription(
    conn: &Connection,
    subscription_id: &str,
) -> Result<Option<Business>> {
    query_one(
        conn,
        &format!("SELECT {} FROM businesses WHERE subscription_id = ?1", BUSINESS_COLS),
        &[&subscription_id],
    )
}

pub fn list_businesses_for_owner(conn: &Connection, owner_id: &str) -> Result<Vec<Business>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM businesses WHERE owner_id = ?1 ORDER BY created_at DESC",
            BUSINESS_COLS
        ),
        &[&owner_id],
    )
}

/// Write the full listing onto a business row and flip it active.
pub fn complete_business_listing(
    conn: &Connection,
    id: &str,
    form: &WizardFormData,
) -> Result<Option<Business>> {
    let name = form
        .name
        .clone()
        .ok_or_else(|| AppError::BadRequest("Business name is required".into()))?;

    UpdateBuilder::new("businesses", id)
        .with_updated_at()
        .set("name", name)
        .set_nullable("tagline", form.tagline.clone())
        .set_nullable("description", form.description.clone())
        .set_nullable("category", form.category.clone())
        .set("tags", to_json(&form.tags)?)
        .set_nullable("address", form.address.clone())
        .set_nullable("city", form.city.clone())
        .set_nullable("state", form.state.clone())
        .set_nullable("zip_code", form.zip_code.clone())
        .set_nullable("latitude", form.latitude)
        .set_nullable("longitude", form.longitude)
        .set_nullable("phone", form.phone.clone())
        .set_nullable("email", form.email.clone())
        .set_nullable("website", form.website.clone())
        .set_nullable("logo_url", form.logo_url.clone())
        .set("image_urls", to_json(&form.image_urls)?)
        .set("social_links", to_json(&form.social_links)?)
        .set("premium", to_json(&form.premium)?)
        .set("is_active", 1i64)
        .execute_returning(conn, BUSINESS_COLS)
}

pub fn set_business_active(conn: &Connection, id: &str, active: bool) -> Result<bool> {
    UpdateBuilder::new("businesses", id)
        .with_updated_at()
        .set("is_active", active as i64)
        .execute(conn)
}

// ============ Discount codes & promotions ============

pub fn create_discount_code(conn: &Connection, input: &CreateDiscountCode) -> Result<DiscountCode> {
    let id = EntityType::DiscountCode.gen_id();
    let now = now();
    let code = input.code.trim().to_uppercase();

    conn.execute(
        "INSERT INTO discount_codes (id, code, discount_type, discount_value, plan_ids, starts_at,
                                     expires_at, max_uses, used_count, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, 1, ?9)",
        params![
            &id,
            &code,
            input.discount_type.as_ref(),
            input.discount_value,
            to_json(&input.plan_ids)?,
            input.starts_at,
            input.expires_at,
            input.max_uses,
            now
        ],
    )?;

    Ok(DiscountCode {
        id,
        code,
        discount_type: input.discount_type,
        discount_value: input.discount_value,
        plan_ids: input.plan_ids.clone(),
        starts_at: input.starts_at,
        expires_at: input.expires_at,
        max_uses: input.max_uses,
        used_count: 0,
        is_active: true,
        created_at: now,
    })
}

/// Lookup by normalized (upper-cased) code.
pub fn get_discount_code(conn: &Connection, code: &str) -> Result<Option<DiscountCode>> {
    query_one(
        conn,
        &format!("SELECT {} FROM discount_codes WHERE code = ?1", DISCOUNT_CODE_COLS),
        &[&code],
    )
}

pub fn get_discount_code_by_id(conn: &Connection, id: &str) -> Result<Option<DiscountCode>> {
    query_one(
        conn,
        &format!("SELECT {} FROM discount_codes WHERE id = ?1", DISCOUNT_CODE_COLS),
        &[&id],
    )
}

pub fn set_discount_code_active(conn: &Connection, id: &str, active: bool) -> Result<bool> {
    UpdateBuilder::new("discount_codes", id)
        .set("is_active", active as i64)
        .execute(conn)
}

/// Count one redemption, refusing to exceed `max_uses`.
/// Returns false when the code is exhausted or unknown.
pub fn increment_discount_usage(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE discount_codes SET used_count = used_count + 1
         WHERE id = ?1 AND (max_uses IS NULL OR used_count < max_uses)",
        params![id],
    )?;
    Ok(affected > 0)
}

pub fn create_promotion(conn: &Connection, input: &CreatePromotion) -> Result<Promotion> {
    let id = EntityType::Promotion.gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO promotions (id, plan_id, name, discount_type, discount_value, starts_at, ends_at, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)",
        params![
            &id,
            &input.plan_id,
            &input.name,
            input.discount_type.as_ref(),
            input.discount_value,
            input.starts_at,
            input.ends_at,
            now
        ],
    )?;

    Ok(Promotion {
        id,
        plan_id: input.plan_id.clone(),
        name: input.name.clone(),
        discount_type: input.discount_type,
        discount_value: input.discount_value,
        starts_at: input.starts_at,
        ends_at: input.ends_at,
        is_active: true,
        created_at: now,
    })
}

/// Most recently started promotion running for a plan at `at`.
pub fn get_active_promotion_for_plan(
    conn: &Connection,
    plan_id: &str,
    at: i64,
) -> Result<Option<Promotion>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM promotions
             WHERE plan_id = ?1 AND is_active = 1 AND starts_at <= ?2 AND (ends_at IS NULL OR ends_at > ?2)
             ORDER BY starts_at DESC LIMIT 1",
            PROMOTION_COLS
        ),
        &[&plan_id, &at],
    )
}

// ============ Payment attempts ============

pub fn create_payment_attempt(
    conn: &Connection,
    input: &CreatePaymentAttempt,
) -> Result<PaymentAttempt> {
    let id = EntityType::PaymentAttempt.gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO payment_attempts (id, idempotency_key, user_id, kind, provider, plan_id, amount_cents,
                                       discount_id, business_id, status, is_downgrade, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11, ?12)",
        params![
            &id,
            &input.idempotency_key,
            &input.user_id,
            input.kind.as_ref(),
            &input.provider,
            &input.plan_id,
            input.amount_cents,
            &input.discount_id,
            &input.business_id,
            AttemptStatus::Pending.as_ref(),
            now,
            now
        ],
    )?;

    Ok(PaymentAttempt {
        id,
        idempotency_key: input.idempotency_key.clone(),
        user_id: input.user_id.clone(),
        kind: input.kind,
        provider: input.provider.clone(),
        plan_id: input.plan_id.clone(),
        amount_cents: input.amount_cents,
        discount_id: input.discount_id.clone(),
        business_id: input.business_id.clone(),
        status: AttemptStatus::Pending,
        provider_session_id: None,
        transaction_id: None,
        is_downgrade: false,
        error: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_payment_attempt_by_key(
    conn: &Connection,
    idempotency_key: &str,
) -> Result<Option<PaymentAttempt>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payment_attempts WHERE idempotency_key = ?1",
            PAYMENT_ATTEMPT_COLS
        ),
        &[&idempotency_key],
    )
}

pub fn get_payment_attempt_by_session(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<PaymentAttempt>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payment_attempts WHERE provider_session_id = ?1",
            PAYMENT_ATTEMPT_COLS
        ),
        &[&session_id],
    )
}

pub fn list_unconfirmed_payment_attempts(conn: &Connection) -> Result<Vec<PaymentAttempt>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM payment_attempts WHERE status = 'unconfirmed' ORDER BY created_at",
            PAYMENT_ATTEMPT_COLS
        ),
        &[],
    )
}

/// Record the outcome of a gateway call on an attempt.
pub fn finish_payment_attempt(
    conn: &Connection,
    id: &str,
    status: AttemptStatus,
    transaction_id: Option<&str>,
    is_downgrade: bool,
    error: Option<&str>,
) -> Result<bool> {
    UpdateBuilder::new("payment_attempts", id)
        .with_updated_at()
        .set("status", status.as_ref().to_string())
        .set_nullable("transaction_id", transaction_id.map(String::from))
        .set("is_downgrade", is_downgrade as i64)
        .set_nullable("error", error.map(String::from))
        .execute(conn)
}

pub fn set_payment_attempt_session(conn: &Connection, id: &str, session_id: &str) -> Result<bool> {
    UpdateBuilder::new("payment_attempts", id)
        .with_updated_at()
        .set("provider_session_id", session_id.to_string())
        .execute(conn)
}

/// Put a failed or unconfirmed attempt back to pending before re-sending it.
/// Compare-and-swap so two concurrent retries cannot both proceed.
pub fn try_reopen_payment_attempt(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payment_attempts SET status = 'pending', error = NULL, updated_at = ?2
         WHERE id = ?1 AND status IN ('failed', 'unconfirmed')",
        params![id, now()],
    )?;
    Ok(affected > 0)
}

/// Link the business an attempt produced. Only the first link wins.
pub fn try_link_payment_attempt_business(conn: &Connection, id: &str, business_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payment_attempts SET business_id = ?2, updated_at = ?3
         WHERE id = ?1 AND business_id IS NULL",
        params![id, business_id, now()],
    )?;
    Ok(affected > 0)
}

// ============ Wizard resume ============

/// Replace the user's resume token in one statement.
pub fn save_resume_token(conn: &Connection, user_id: &str, token: &ResumeToken) -> Result<()> {
    conn.execute(
        "INSERT INTO wizard_resume (user_id, version, payload, updated_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id) DO UPDATE SET version = excluded.version, payload = excluded.payload,
                                            updated_at = excluded.updated_at",
        params![user_id, token.version, to_json(token)?, now()],
    )?;
    Ok(())
}

/// Load the user's resume token. Tokens of another layout version, or that
/// fail to decode, are treated as absent.
pub fn get_resume_token(conn: &Connection, user_id: &str) -> Result<Option<ResumeToken>> {
    let row: Option<(u32, String)> = conn
        .query_row(
            "SELECT version, payload FROM wizard_resume WHERE user_id = ?1",
            params![user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((version, payload)) = row else {
        return Ok(None);
    };

    if version != RESUME_TOKEN_VERSION {
        tracing::warn!(
            "Discarding resume token for user {} with version {} (current {})",
            user_id,
            version,
            RESUME_TOKEN_VERSION
        );
        return Ok(None);
    }

    match serde_json::from_str::<ResumeToken>(&payload) {
        Ok(token) => Ok(Some(token)),
        Err(e) => {
            tracing::warn!("Discarding unreadable resume token for user {}: {}", user_id, e);
            Ok(None)
        }
    }
}

pub fn clear_resume_token(conn: &Connection, user_id: &str) -> Result<bool> {
    let affected = conn.execute("DELETE FROM wizard_resume WHERE user_id = ?1", params![user_id])?;
    Ok(affected > 0)
}

// ============ Settings ============

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM settings WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, now()],
    )?;
    Ok(())
}
