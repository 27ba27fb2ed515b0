//! Plan changes for existing listings.

#[path = "../common/mod.rs"]
mod common;
use common::*;

use bizlist::activation::{self, Activation};
use bizlist::error::msg;
use bizlist::payments::{PaymentResult, UpgradeOptions};

fn setup_listing(plan: &str) -> (TestApp, User, Activation) {
    let app = create_test_app_state();
    let conn = app.state.db.get().unwrap();
    let (user, _) = create_test_user(&conn, "owner@example.com");
    let activation = activation::activate(
        &conn,
        &app.state.catalog,
        &user.id,
        plan,
        &PaymentResult::charged(Provider::EcomPayments, "ecom_tx_seed".into()),
    )
    .unwrap();
    drop(conn);
    (app, user, activation)
}

fn upgrade_options(activation: &Activation, new_plan: &str, provider: Provider, key: &str) -> UpgradeOptions {
    UpgradeOptions {
        business_id: activation.business.id.clone(),
        current_plan_name: "Starter Plan".into(),
        payment: plan_options(new_plan, provider, key),
    }
}

#[tokio::test]
async fn test_direct_upgrade_requires_card() {
    let (app, user, activation) = setup_listing("Starter Plan");
    let options = upgrade_options(&activation, "VIP Plan", Provider::EcomPayments, "up-1");

    let result = app.state.orchestrator.upgrade_plan(&user.id, &options, None).await.unwrap();
    assert!(!result.success());
    assert_eq!(result.error(), Some(msg::CARD_REQUIRED));
    assert_eq!(app.direct.upgrade_count().await, 0);
}

#[tokio::test]
async fn test_direct_upgrade_charges_full_new_price() {
    let (app, user, activation) = setup_listing("Starter Plan");
    let options = upgrade_options(&activation, "VIP Plan", Provider::EcomPayments, "up-2");

    let result = app
        .state
        .orchestrator
        .upgrade_plan(&user.id, &options, Some(&test_card()))
        .await
        .unwrap();
    assert!(result.success());
    assert_eq!(result.transaction_id(), Some("ecom_up_1"));
    assert!(!result.is_downgrade());

    let conn = app.state.db.get().unwrap();
    let attempt = queries::get_payment_attempt_by_key(&conn, "up-2").unwrap().unwrap();
    assert_eq!(attempt.kind, AttemptKind::Upgrade);
    assert_eq!(attempt.amount_cents, 10000);
    assert_eq!(attempt.business_id.as_deref(), Some(activation.business.id.as_str()));

    let subscription =
        activation::change_plan(&conn, &user.id, &activation.business.id, "VIP Plan", &result).unwrap();
    assert_eq!(subscription.id, activation.subscription.id);
    assert_eq!(subscription.plan_id, "vip");
    assert_eq!(subscription.transaction_id.as_deref(), Some("ecom_up_1"));
}

#[tokio::test]
async fn test_direct_gateway_may_answer_downgrade() {
    let (app, user, activation) = setup_listing("VIP Plan");
    app.direct.set_downgrade(true).await;
    let mut options = upgrade_options(&activation, "Starter Plan", Provider::EcomPayments, "up-3");
    options.current_plan_name = "VIP Plan".into();

    let result = app
        .state
        .orchestrator
        .upgrade_plan(&user.id, &options, Some(&test_card()))
        .await
        .unwrap();
    assert!(result.success());
    assert!(result.is_downgrade());
    assert_eq!(result.transaction_id(), None);

    // replay keeps the downgrade flag
    let replayed = app
        .state
        .orchestrator
        .upgrade_plan(&user.id, &options, Some(&test_card()))
        .await
        .unwrap();
    assert!(replayed.is_downgrade());
    assert_eq!(app.direct.upgrade_count().await, 1);
}

#[tokio::test]
async fn test_hosted_upgrade_tags_session() {
    let (app, user, activation) = setup_listing("Starter Plan");
    let options = upgrade_options(&activation, "Enhanced Plan", Provider::Stripe, "up-4");

    let result = app.state.orchestrator.upgrade_plan(&user.id, &options, None).await.unwrap();
    assert!(result.success());
    assert!(result.url().is_some());

    let request = app.hosted.last_request().await.unwrap();
    assert_eq!(request.product_name, "Upgrade to Enhanced Plan");
    assert_eq!(request.amount_cents, 6000);
    assert!(request.metadata.iter().any(|(k, v)| k == "mode" && v == "upgrade"));
    assert!(
        request
            .metadata
            .iter()
            .any(|(k, v)| k == "business_id" && *v == activation.business.id)
    );
}
