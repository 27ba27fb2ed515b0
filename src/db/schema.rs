use rusqlite::{Connection, params};

use crate::catalog::PlanCatalog;

/// Initialize the database schema and mirror the plan catalog.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        -- Users (listing owners)
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Bearer API keys (hash only)
        CREATE TABLE IF NOT EXISTS api_keys (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            key_hash TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL,
            revoked_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_api_keys_user ON api_keys(user_id);

        -- Plan identities (mirror of the static catalog)
        CREATE TABLE IF NOT EXISTS subscription_plans (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            price INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );

        -- Subscriptions (one per paid listing)
        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            plan_id TEXT NOT NULL REFERENCES subscription_plans(id),
            status TEXT NOT NULL CHECK (status IN ('active', 'past_due', 'cancelled', 'inactive')),
            payment_status TEXT NOT NULL CHECK (payment_status IN ('paid', 'pending', 'free')),
            provider TEXT,
            transaction_id TEXT,
            current_period_start INTEGER NOT NULL,
            current_period_end INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_subscriptions_user ON subscriptions(user_id);

        -- Businesses (directory listings, 1:1 with a subscription)
        -- tags, image_urls, social_links, premium are JSON text
        CREATE TABLE IF NOT EXISTS businesses (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            subscription_id TEXT NOT NULL UNIQUE REFERENCES subscriptions(id),
            name TEXT NOT NULL,
            tagline TEXT,
            description TEXT,
            category TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            address TEXT,
            city TEXT,
            state TEXT,
            zip_code TEXT,
            latitude REAL,
            longitude REAL,
            phone TEXT,
            email TEXT,
            website TEXT,
            logo_url TEXT,
            image_urls TEXT NOT NULL DEFAULT '[]',
            social_links TEXT NOT NULL DEFAULT '{}',
            premium TEXT NOT NULL DEFAULT '{}',
            is_active INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_businesses_owner ON businesses(owner_id);
        CREATE INDEX IF NOT EXISTS idx_businesses_active ON businesses(id) WHERE is_active = 1;

        -- Discount codes (stored upper-cased)
        CREATE TABLE IF NOT EXISTS discount_codes (
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            discount_type TEXT NOT NULL CHECK (discount_type IN ('percentage', 'fixed')),
            discount_value REAL NOT NULL,
            plan_ids TEXT NOT NULL DEFAULT '[]',
            starts_at INTEGER,
            expires_at INTEGER,
            max_uses INTEGER,
            used_count INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL
        );

        -- Automatic plan promotions
        CREATE TABLE IF NOT EXISTS promotions (
            id TEXT PRIMARY KEY,
            plan_id TEXT NOT NULL REFERENCES subscription_plans(id),
            name TEXT NOT NULL,
            discount_type TEXT NOT NULL CHECK (discount_type IN ('percentage', 'fixed')),
            discount_value REAL NOT NULL,
            starts_at INTEGER NOT NULL,
            ends_at INTEGER,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_promotions_plan ON promotions(plan_id);

        -- Payment attempt ledger, keyed by client idempotency key
        CREATE TABLE IF NOT EXISTS payment_attempts (
            id TEXT PRIMARY KEY,
            idempotency_key TEXT NOT NULL UNIQUE,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            kind TEXT NOT NULL CHECK (kind IN ('checkout', 'charge', 'upgrade')),
            provider TEXT NOT NULL,
            plan_id TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            discount_id TEXT,
            business_id TEXT,
            status TEXT NOT NULL CHECK (status IN ('pending', 'succeeded', 'failed', 'unconfirmed')),
            provider_session_id TEXT,
            transaction_id TEXT,
            is_downgrade INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_payment_attempts_session ON payment_attempts(provider_session_id);
        CREATE INDEX IF NOT EXISTS idx_payment_attempts_user ON payment_attempts(user_id);

        -- Wizard resume state, one versioned JSON payload per user
        CREATE TABLE IF NOT EXISTS wizard_resume (
            user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            version INTEGER NOT NULL,
            payload TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Process-wide settings (payment provider preference)
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );
        "#,
    )?;

    sync_plans(conn, &PlanCatalog::standard())
}

/// Upsert every catalog plan into `subscription_plans`.
pub fn sync_plans(conn: &Connection, catalog: &PlanCatalog) -> rusqlite::Result<()> {
    let now = chrono::Utc::now().timestamp();
    for plan in catalog.plans() {
        conn.execute(
            "INSERT INTO subscription_plans (id, name, price, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, price = excluded.price",
            params![plan.id, plan.name, plan.price, now],
        )?;
    }
    Ok(())
}
