//! Payment through listing submission, driven the way the account API does.

#[path = "../common/mod.rs"]
mod common;
use common::*;

use bizlist::activation;
use bizlist::discount::DiscountOutcome;
use bizlist::payments::{PaymentFlow, PaymentFlowState};
use bizlist::wizard::{ListingWizard, WizardError};

#[tokio::test]
async fn test_enhanced_plan_with_code_end_to_end() {
    let app = create_test_app_state();
    let user = {
        let conn = app.state.db.get().unwrap();
        create_percentage_code(&conn, "SAVE10", 10.0);
        create_test_user(&conn, "owner@example.com").0
    };

    let mut options = plan_options("Enhanced Plan", Provider::EcomPayments, "e2e-1");
    match app.state.discounts.apply_code("save10", "Enhanced Plan").unwrap() {
        DiscountOutcome::Applied(d) => options.discount = Some(d),
        other => panic!("expected applied, got {:?}", other),
    }
    assert_eq!(options.final_amount(), 54.0);

    let mut flow = PaymentFlow::new();
    let state = flow
        .run(app.state.orchestrator.charge_direct(&user.id, &options, &test_card()))
        .await
        .unwrap();
    assert_eq!(state, PaymentFlowState::Success);
    assert_eq!(app.direct.last_charge().await.unwrap().amount_cents, 5400);

    let mut conn = app.state.db.get().unwrap();
    let payment = flow.result().unwrap().clone();
    let activated =
        activation::activate_for_attempt(&mut conn, &app.state.catalog, "e2e-1", "Enhanced Plan", &payment)
            .unwrap();
    assert_eq!(activated.subscription.status, SubscriptionStatus::Active);
    assert!(!activated.business.is_active);

    // resume where activation left the wizard
    let token = queries::get_resume_token(&conn, &user.id).unwrap().unwrap();
    let mut wizard = ListingWizard::resume(token, &app.state.catalog).unwrap();
    assert_eq!(
        wizard.steps(),
        &[
            WizardStep::Info,
            WizardStep::Location,
            WizardStep::Media,
            WizardStep::PremiumFeatures,
            WizardStep::Summary,
        ]
    );

    wizard.update_form(complete_form_patch());
    while wizard.current_step() != WizardStep::Summary {
        wizard.next().unwrap();
    }
    let business = wizard.submit(&conn, &user.id).unwrap();

    assert!(business.is_active);
    assert_eq!(business.id, activated.business.id);
    assert_eq!(business.subscription_id, activated.subscription.id);
    assert_eq!(business.name, "Joe's Tacos");
    assert!(wizard.is_submitted());
}

#[test]
fn test_next_blocks_on_invalid_media_and_keeps_step() {
    let conn = setup_test_db();
    let catalog = PlanCatalog::standard();
    let (user, _) = create_test_user(&conn, "owner@example.com");
    activation::activate(
        &conn,
        &catalog,
        &user.id,
        "Starter Plan",
        &bizlist::payments::PaymentResult::free(Provider::EcomPayments),
    )
    .unwrap();

    let token = queries::get_resume_token(&conn, &user.id).unwrap().unwrap();
    let mut wizard = ListingWizard::resume(token, &catalog).unwrap();
    wizard.update_form(FormPatch {
        email: Some("not-an-email".into()),
        ..complete_form_patch()
    });

    assert_eq!(wizard.next().unwrap(), WizardStep::Location);
    assert_eq!(wizard.next().unwrap(), WizardStep::Media);
    let err = wizard.next().unwrap_err();
    assert!(matches!(err, WizardError::Invalid(_)));
    assert_eq!(wizard.current_step(), WizardStep::Media);
    assert!(wizard.error().is_some());

    // progress survives a reload
    queries::save_resume_token(&conn, &user.id, &wizard.to_resume()).unwrap();
    let token = queries::get_resume_token(&conn, &user.id).unwrap().unwrap();
    let reloaded = ListingWizard::resume(token, &catalog).unwrap();
    assert_eq!(reloaded.current_step(), WizardStep::Media);
    assert_eq!(reloaded.form().email.as_deref(), Some("not-an-email"));
}

#[test]
fn test_submit_twice_refused() {
    let conn = setup_test_db();
    let catalog = PlanCatalog::standard();
    let (user, _) = create_test_user(&conn, "owner@example.com");
    activation::activate(
        &conn,
        &catalog,
        &user.id,
        "Starter Plan",
        &bizlist::payments::PaymentResult::free(Provider::EcomPayments),
    )
    .unwrap();

    let token = queries::get_resume_token(&conn, &user.id).unwrap().unwrap();
    let mut wizard = ListingWizard::resume(token, &catalog).unwrap();
    wizard.update_form(complete_form_patch());
    while wizard.current_step() != WizardStep::Summary {
        wizard.next().unwrap();
    }
    wizard.submit(&conn, &user.id).unwrap();

    let err = wizard.submit(&conn, &user.id).unwrap_err();
    assert!(matches!(err, WizardError::AlreadySubmitted));
}

#[test]
fn test_unpaid_wizard_starts_on_payment() {
    let catalog = PlanCatalog::standard();
    let mut wizard = ListingWizard::new(catalog.resolve("vip").unwrap(), false);
    assert_eq!(wizard.current_step(), WizardStep::Payment);
    assert!(wizard.next().is_err());

    wizard.mark_payment_completed("bl_biz_00000000000000000000000000000001".into());
    assert_eq!(wizard.current_step(), WizardStep::Info);
    assert!(!wizard.steps().contains(&WizardStep::Payment));
}
