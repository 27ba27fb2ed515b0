//! Test utilities and fixtures for bizlist integration tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

pub use bizlist::catalog::PlanCatalog;
pub use bizlist::db::{AppState, DbPool, init_db, queries};
pub use bizlist::discount::DiscountResolver;
pub use bizlist::models::*;
pub use bizlist::payments::mock::{MockDirectCharge, MockHostedCheckout};
pub use bizlist::payments::{
    CardData, PaymentOptions, PaymentOrchestrator, Provider, ProviderSelector,
};

pub const BASE_URL: &str = "http://localhost:3000";

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Single-connection pool so every handle sees the same in-memory database.
/// Never hold a connection while calling code that takes another one.
pub fn setup_test_pool() -> DbPool {
    let manager = SqliteConnectionManager::memory()
        .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON;"));
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }
    pool
}

/// App state wired to mock gateways. The mocks are returned for inspection.
pub struct TestApp {
    pub state: AppState,
    pub hosted: Arc<MockHostedCheckout>,
    pub direct: Arc<MockDirectCharge>,
}

pub fn create_test_app_state() -> TestApp {
    create_test_app_state_with(Provider::EcomPayments)
}

pub fn create_test_app_state_with(default_provider: Provider) -> TestApp {
    let pool = setup_test_pool();
    let catalog = Arc::new(PlanCatalog::standard());
    let hosted = Arc::new(MockHostedCheckout::new());
    let direct = Arc::new(MockDirectCharge::new());

    let orchestrator = PaymentOrchestrator::new(
        pool.clone(),
        catalog.clone(),
        hosted.clone(),
        direct.clone(),
        "usd".to_string(),
    );

    let state = AppState {
        db: pool.clone(),
        base_url: BASE_URL.to_string(),
        catalog: catalog.clone(),
        providers: ProviderSelector::load(pool.clone(), default_provider).unwrap(),
        discounts: DiscountResolver::new(pool, catalog),
        orchestrator: Arc::new(orchestrator),
    };

    TestApp {
        state,
        hosted,
        direct,
    }
}

/// Full router (public + account) over the given state.
pub fn test_router(state: AppState) -> Router {
    Router::new()
        .merge(bizlist::handlers::public::router())
        .merge(bizlist::handlers::account::router(state.clone()))
        .with_state(state)
}

/// Create a listing owner with an API key
pub fn create_test_user(conn: &Connection, email: &str) -> (User, String) {
    let user = queries::create_user(
        conn,
        &CreateUser {
            email: email.to_string(),
            name: format!("Test Owner {}", email),
        },
    )
    .expect("Failed to create test user");
    let api_key = queries::create_api_key(conn, &user.id).expect("Failed to create API key");
    (user, api_key)
}

/// Create a percentage code valid for every plan
pub fn create_percentage_code(conn: &Connection, code: &str, percent: f64) -> DiscountCode {
    queries::create_discount_code(
        conn,
        &CreateDiscountCode {
            code: code.to_string(),
            discount_type: DiscountType::Percentage,
            discount_value: percent,
            plan_ids: vec![],
            starts_at: None,
            expires_at: None,
            max_uses: None,
        },
    )
    .expect("Failed to create discount code")
}

pub fn create_code(conn: &Connection, input: CreateDiscountCode) -> DiscountCode {
    queries::create_discount_code(conn, &input).expect("Failed to create discount code")
}

pub fn code_input(code: &str, discount_type: DiscountType, value: f64) -> CreateDiscountCode {
    CreateDiscountCode {
        code: code.to_string(),
        discount_type,
        discount_value: value,
        plan_ids: vec![],
        starts_at: None,
        expires_at: None,
        max_uses: None,
    }
}

/// A card that passes local validation
pub fn test_card() -> CardData {
    CardData {
        number: "4242 4242 4242 4242".to_string(),
        exp_month: 12,
        exp_year: 2099,
        cvv: "123".to_string(),
        holder_name: "Jane Owner".to_string(),
    }
}

/// Payment options for a catalog plan with no discount
pub fn plan_options(plan_name: &str, provider: Provider, key: &str) -> PaymentOptions {
    let catalog = PlanCatalog::standard();
    let plan = catalog.resolve(plan_name).expect("unknown plan");
    PaymentOptions {
        plan_name: plan.name.to_string(),
        plan_price: plan.price as f64,
        customer_email: Some("owner@example.com".to_string()),
        discount: None,
        metadata: serde_json::Value::Null,
        provider,
        success_url: format!("{}/checkout/return?success=true", BASE_URL),
        cancel_url: format!("{}/checkout/return?canceled=true", BASE_URL),
        idempotency_key: key.to_string(),
    }
}

/// Form data that passes every wizard step
pub fn complete_form_patch() -> FormPatch {
    FormPatch {
        name: Some("Joe's Tacos".to_string()),
        tagline: Some("Best tacos in town".to_string()),
        category: Some("Restaurants".to_string()),
        tags: Some(vec!["tacos".to_string(), "mexican".to_string()]),
        address: Some("1 Main St".to_string()),
        city: Some("Austin".to_string()),
        state: Some("TX".to_string()),
        zip_code: Some("78701".to_string()),
        latitude: Some(Some(30.27)),
        longitude: Some(Some(-97.74)),
        phone: Some("555-0100".to_string()),
        email: Some("hello@joestacos.com".to_string()),
        website: Some("https://joestacos.com".to_string()),
        ..Default::default()
    }
}

/// Send one request through the router and decode the JSON body
/// (`Value::Null` when the body is empty).
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    api_key: Option<&str>,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("Authorization", format!("Bearer {}", key));
    }
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Card in the JSON shape the account API accepts
pub fn card_json() -> Value {
    serde_json::to_value(test_card()).unwrap()
}
