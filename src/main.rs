use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bizlist::catalog::PlanCatalog;
use bizlist::config::Config;
use bizlist::db::{AppState, create_pool, init_db, queries, sync_plans};
use bizlist::discount::DiscountResolver;
use bizlist::handlers;
use bizlist::models::{CreateDiscountCode, CreatePromotion, CreateUser, DiscountType};
use bizlist::payments::{EcomPaymentsClient, PaymentOrchestrator, ProviderSelector, StripeClient};

#[derive(Parser, Debug)]
#[command(name = "bizlist")]
#[command(about = "Business directory listings with paid plans")]
struct Cli {
    /// Seed the database with dev data (user, API key, discount codes, promotion)
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

fn bootstrap_first_user(state: &AppState, email: &str) {
    let conn = state.db.get().expect("Failed to get db connection for bootstrap");

    let count = queries::count_users(&conn).expect("Failed to count users");
    if count > 0 {
        tracing::info!("Users already exist, skipping bootstrap");
        return;
    }

    let user = queries::create_user(
        &conn,
        &CreateUser {
            email: email.to_string(),
            name: "Bootstrap User".to_string(),
        },
    )
    .expect("Failed to create bootstrap user");
    let api_key = queries::create_api_key(&conn, &user.id).expect("Failed to create API key");

    tracing::info!("============================================");
    tracing::info!("BOOTSTRAP USER CREATED");
    tracing::info!("Email: {}", user.email);
    tracing::info!("API Key: {}", api_key);
    tracing::info!("============================================");
    tracing::info!("SAVE THIS API KEY - IT WILL NOT BE SHOWN AGAIN");
    tracing::info!("============================================");
}

/// Seeds a listing owner, two discount codes, and a Starter promotion.
/// Only runs in dev mode and when the database has no users.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    let count = queries::count_users(&conn).expect("Failed to count users");
    if count > 0 {
        tracing::info!("Database already has data, skipping seed");
        return;
    }

    tracing::info!("============================================");
    tracing::info!("SEEDING DEV DATA");
    tracing::info!("============================================");

    let user = queries::create_user(
        &conn,
        &CreateUser {
            email: "owner@bizlist.local".to_string(),
            name: "Dev Owner".to_string(),
        },
    )
    .expect("Failed to create dev user");
    let api_key = queries::create_api_key(&conn, &user.id).expect("Failed to create API key");
    tracing::info!("User: {} ({})", user.email, user.id);

    for (code, value) in [("SAVE10", 10.0), ("FREE100", 100.0)] {
        let discount = queries::create_discount_code(
            &conn,
            &CreateDiscountCode {
                code: code.to_string(),
                discount_type: DiscountType::Percentage,
                discount_value: value,
                plan_ids: vec![],
                starts_at: None,
                expires_at: None,
                max_uses: None,
            },
        )
        .expect("Failed to create dev discount code");
        tracing::info!("Discount code: {} ({}% off)", discount.code, discount.discount_value);
    }

    let promotion = queries::create_promotion(
        &conn,
        &CreatePromotion {
            plan_id: "starter".to_string(),
            name: "Launch week".to_string(),
            discount_type: DiscountType::Fixed,
            discount_value: 5.0,
            starts_at: chrono::Utc::now().timestamp(),
            ends_at: None,
        },
    )
    .expect("Failed to create dev promotion");
    tracing::info!("Promotion: {} on {}", promotion.name, promotion.plan_id);

    tracing::info!("============================================");
    tracing::info!("DEV DATA SEEDED SUCCESSFULLY");
    tracing::info!("============================================");

    // Copy-paste friendly output
    println!();
    println!("--- COPY FROM HERE ---");
    println!("  api_key: {}", api_key);
    println!("  user_id: {}", user.id);
    println!("--- END COPY ---");
    println!();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bizlist=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }
    if config.stripe.is_none() {
        tracing::warn!("STRIPE_SECRET_KEY not set, Stripe checkout will be unavailable");
    }
    if config.ecom.is_none() {
        tracing::warn!("ECOM_API_KEY/ECOM_MERCHANT_ID not set, card payments will be unavailable");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    let catalog = Arc::new(PlanCatalog::standard());

    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
        sync_plans(&conn, &catalog).expect("Failed to sync plan catalog");
    }

    let providers = ProviderSelector::load(db_pool.clone(), config.default_provider)
        .expect("Failed to load payment provider setting");
    tracing::info!("Active payment provider: {}", providers.get());

    let orchestrator = PaymentOrchestrator::new(
        db_pool.clone(),
        catalog.clone(),
        Arc::new(StripeClient::new(config.stripe.clone())),
        Arc::new(EcomPaymentsClient::new(config.ecom.clone())),
        config.currency.clone(),
    );

    let state = AppState {
        db: db_pool.clone(),
        base_url: config.base_url.clone(),
        catalog: catalog.clone(),
        providers,
        discounts: DiscountResolver::new(db_pool, catalog),
        orchestrator: Arc::new(orchestrator),
    };

    {
        let conn = state.db.get().expect("Failed to get connection");
        match queries::list_unconfirmed_payment_attempts(&conn) {
            Ok(attempts) if !attempts.is_empty() => {
                tracing::warn!(
                    "{} payment attempt(s) have an unconfirmed outcome and need reconciliation",
                    attempts.len()
                );
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to list unconfirmed payment attempts: {}", e),
        }
    }

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set BIZLIST_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    if let Some(ref email) = config.bootstrap_user_email {
        bootstrap_first_user(&state, email);
    }

    let app = Router::new()
        // Public endpoints (no auth)
        .merge(handlers::public::router())
        // Listing owner API (API key auth)
        .merge(handlers::account::router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();

    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("Bizlist server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral database...");
        if let Err(e) = std::fs::remove_file(&db_path) {
            tracing::warn!("Failed to remove {}: {}", db_path, e);
        } else {
            tracing::info!("Removed {}", db_path);
        }
        let _ = std::fs::remove_file(format!("{}-wal", db_path));
        let _ = std::fs::remove_file(format!("{}-shm", db_path));
        tracing::info!("Ephemeral cleanup complete");
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
