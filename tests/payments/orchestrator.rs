//! Checkout and direct charges through the orchestrator with mock gateways.

#[path = "../common/mod.rs"]
mod common;
use common::*;

use bizlist::discount::DiscountOutcome;
use bizlist::error::AppError;
use bizlist::payments::GatewayError;

fn setup() -> (TestApp, User) {
    let app = create_test_app_state();
    let user = {
        let conn = app.state.db.get().unwrap();
        create_test_user(&conn, "owner@example.com").0
    };
    (app, user)
}

fn attempt(app: &TestApp, key: &str) -> PaymentAttempt {
    let conn = app.state.db.get().unwrap();
    queries::get_payment_attempt_by_key(&conn, key).unwrap().expect("attempt")
}

fn with_code(app: &TestApp, mut options: PaymentOptions, code: &str) -> PaymentOptions {
    match app.state.discounts.apply_code(code, &options.plan_name).unwrap() {
        DiscountOutcome::Applied(d) => options.discount = Some(d),
        other => panic!("expected applied, got {:?}", other),
    }
    options
}

mod free_checkout {
    use super::*;

    #[tokio::test]
    async fn test_full_discount_skips_every_gateway() {
        let (app, user) = setup();
        let code_id = {
            let conn = app.state.db.get().unwrap();
            create_percentage_code(&conn, "FREE100", 100.0).id
        };

        for provider in [Provider::Stripe, Provider::EcomPayments] {
            let key = format!("free-{}", provider);
            let options = with_code(&app, plan_options("Enhanced Plan", provider, &key), "FREE100");
            let result = app.state.orchestrator.create_session(&user.id, &options).await.unwrap();

            assert!(result.success());
            assert!(result.free_transaction());
            assert!(result.url().is_none());
            assert_eq!(attempt(&app, &key).status, AttemptStatus::Succeeded);
        }

        assert_eq!(app.hosted.session_count().await, 0);
        assert_eq!(app.direct.charge_count().await, 0);

        let conn = app.state.db.get().unwrap();
        let code = queries::get_discount_code_by_id(&conn, &code_id).unwrap().unwrap();
        assert_eq!(code.used_count, 2);
    }
}

mod hosted_checkout {
    use super::*;

    #[tokio::test]
    async fn test_stripe_session_carries_discounted_amount() {
        let (app, user) = setup();
        {
            let conn = app.state.db.get().unwrap();
            create_percentage_code(&conn, "SAVE10", 10.0);
        }

        let options = with_code(&app, plan_options("Enhanced Plan", Provider::Stripe, "k-1"), "SAVE10");
        let result = app.state.orchestrator.create_session(&user.id, &options).await.unwrap();

        assert!(result.success());
        assert_eq!(result.url(), Some("https://checkout.stripe.test/c/pay/cs_test_1"));

        let request = app.hosted.last_request().await.unwrap();
        assert_eq!(request.amount_cents, 5400);
        assert_eq!(request.idempotency_key, "k-1");
        assert!(request.metadata.iter().any(|(k, _)| k == "attempt_id"));
        assert!(request.metadata.iter().any(|(k, v)| k == "plan" && v == "Enhanced Plan"));

        let recorded = attempt(&app, "k-1");
        assert_eq!(recorded.status, AttemptStatus::Pending);
        assert_eq!(recorded.provider_session_id.as_deref(), Some("cs_test_1"));
        assert_eq!(recorded.amount_cents, 5400);
    }

    #[tokio::test]
    async fn test_confirm_checkout_requires_paid_session() {
        let (app, user) = setup();
        let options = plan_options("Starter Plan", Provider::Stripe, "k-2");
        app.state.orchestrator.create_session(&user.id, &options).await.unwrap();

        let err = app.state.orchestrator.confirm_checkout("cs_test_1").await.unwrap_err();
        assert!(matches!(err, AppError::PaymentFailed(_)));

        app.hosted.mark_paid("cs_test_1").await;
        let confirmed = app.state.orchestrator.confirm_checkout("cs_test_1").await.unwrap();
        assert_eq!(confirmed.status, AttemptStatus::Succeeded);
        assert_eq!(confirmed.transaction_id.as_deref(), Some("cs_test_1"));

        // confirming again is a no-op
        let again = app.state.orchestrator.confirm_checkout("cs_test_1").await.unwrap();
        assert_eq!(again.id, confirmed.id);
    }

    #[tokio::test]
    async fn test_confirm_unknown_session() {
        let (app, _) = setup();
        let err = app.state.orchestrator.confirm_checkout("cs_forged").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unconfigured_provider_message() {
        let (app, user) = setup();
        app.hosted
            .set_failure(Some(GatewayError::NotConfigured("Stripe")))
            .await;

        let options = plan_options("Starter Plan", Provider::Stripe, "k-3");
        let result = app.state.orchestrator.create_session(&user.id, &options).await.unwrap();

        assert!(!result.success());
        assert_eq!(
            result.error(),
            Some("Payment service is temporarily unavailable. Please try again later.")
        );
        assert_eq!(attempt(&app, "k-3").status, AttemptStatus::Failed);
    }
}

mod direct_charge {
    use super::*;

    #[tokio::test]
    async fn test_session_for_direct_provider_asks_for_card() {
        let (app, user) = setup();
        let options = plan_options("Starter Plan", Provider::EcomPayments, "k-10");
        let result = app.state.orchestrator.create_session(&user.id, &options).await.unwrap();

        assert!(result.needs_direct_charge());
        assert_eq!(app.direct.charge_count().await, 0);
    }

    #[tokio::test]
    async fn test_charge_succeeds_and_replays() {
        let (app, user) = setup();
        let options = plan_options("VIP Plan", Provider::EcomPayments, "k-11");

        let first = app
            .state
            .orchestrator
            .charge_direct(&user.id, &options, &test_card())
            .await
            .unwrap();
        assert!(first.success());
        assert_eq!(first.transaction_id(), Some("ecom_tx_1"));
        assert_eq!(app.direct.last_charge().await.unwrap().amount_cents, 10000);

        let second = app
            .state
            .orchestrator
            .charge_direct(&user.id, &options, &test_card())
            .await
            .unwrap();
        assert_eq!(second.transaction_id(), Some("ecom_tx_1"));
        assert_eq!(app.direct.charge_count().await, 1);
        assert_eq!(attempt(&app, "k-11").status, AttemptStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_decline_shows_friendly_message_and_allows_retry() {
        let (app, user) = setup();
        app.direct
            .set_failure(Some(GatewayError::Rejected("Card declined by issuer".into())))
            .await;

        let options = plan_options("Starter Plan", Provider::EcomPayments, "k-12");
        let result = app
            .state
            .orchestrator
            .charge_direct(&user.id, &options, &test_card())
            .await
            .unwrap();

        assert!(!result.success());
        let message = result.error().unwrap();
        assert!(message.contains("declined"));
        assert!(message.contains("try a different card"));
        assert_eq!(attempt(&app, "k-12").status, AttemptStatus::Failed);

        app.direct.set_failure(None).await;
        let retry = app
            .state
            .orchestrator
            .charge_direct(&user.id, &options, &test_card())
            .await
            .unwrap();
        assert!(retry.success());
        assert_eq!(attempt(&app, "k-12").status, AttemptStatus::Succeeded);
        assert_eq!(app.direct.settled_count().await, 1);
    }

    #[tokio::test]
    async fn test_timeout_is_unconfirmed() {
        let (app, user) = setup();
        app.direct.set_failure(Some(GatewayError::Timeout)).await;

        let options = plan_options("Starter Plan", Provider::EcomPayments, "k-13");
        let result = app
            .state
            .orchestrator
            .charge_direct(&user.id, &options, &test_card())
            .await
            .unwrap();

        assert!(!result.success());
        assert!(result.outcome_unknown());

        let conn = app.state.db.get().unwrap();
        let unconfirmed = queries::list_unconfirmed_payment_attempts(&conn).unwrap();
        assert_eq!(unconfirmed.len(), 1);
        assert_eq!(unconfirmed[0].idempotency_key, "k-13");
    }

    #[tokio::test]
    async fn test_unreadable_reply_is_unconfirmed_and_hidden() {
        let (app, user) = setup();
        app.direct
            .set_failure(Some(GatewayError::UnreadableResponse(
                "error decoding response body: expected value at line 1 column 1".into(),
            )))
            .await;

        let options = plan_options("Starter Plan", Provider::EcomPayments, "k-16");
        let result = app
            .state
            .orchestrator
            .charge_direct(&user.id, &options, &test_card())
            .await
            .unwrap();

        assert!(result.outcome_unknown());
        let message = result.error().unwrap();
        assert!(!message.contains("decoding"));
        assert!(!message.contains("column"));
        assert_eq!(attempt(&app, "k-16").status, AttemptStatus::Unconfirmed);

        // the same key goes back to the gateway, which deduplicates
        app.direct.set_failure(None).await;
        let retry = app
            .state
            .orchestrator
            .charge_direct(&user.id, &options, &test_card())
            .await
            .unwrap();
        assert!(retry.success());
        assert_eq!(app.direct.settled_count().await, 1);
        assert_eq!(attempt(&app, "k-16").status, AttemptStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_invalid_card_never_reaches_gateway() {
        let (app, user) = setup();
        let card = CardData {
            number: "1234".into(),
            ..test_card()
        };

        let options = plan_options("Starter Plan", Provider::EcomPayments, "k-14");
        let result = app
            .state
            .orchestrator
            .charge_direct(&user.id, &options, &card)
            .await
            .unwrap();

        assert_eq!(result.error(), Some("Please enter a valid card number"));
        assert_eq!(app.direct.charge_count().await, 0);
        let conn = app.state.db.get().unwrap();
        assert!(queries::get_payment_attempt_by_key(&conn, "k-14").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_key_reuse_for_different_payment_conflicts() {
        let (app, user) = setup();
        let starter = plan_options("Starter Plan", Provider::EcomPayments, "k-15");
        app.state
            .orchestrator
            .charge_direct(&user.id, &starter, &test_card())
            .await
            .unwrap();

        let vip = plan_options("VIP Plan", Provider::EcomPayments, "k-15");
        let err = app
            .state
            .orchestrator
            .charge_direct(&user.id, &vip, &test_card())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(app.direct.charge_count().await, 1);
    }
}
