//! Discount code validation against the store.

#[path = "../common/mod.rs"]
mod common;
use common::*;

use bizlist::discount::{DiscountOutcome, DiscountRejection};
use bizlist::error::AppError;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn rejection(outcome: DiscountOutcome) -> DiscountRejection {
    match outcome {
        DiscountOutcome::Rejected(reason) => reason,
        DiscountOutcome::Applied(d) => panic!("expected rejection, got {:?}", d),
    }
}

#[test]
fn test_code_lookup_is_case_insensitive_and_trimmed() {
    let app = create_test_app_state();
    let id = {
        let conn = app.state.db.get().unwrap();
        create_percentage_code(&conn, "save10", 10.0).id
    };

    let outcome = app.state.discounts.apply_code("  Save10 ", "Enhanced Plan").unwrap();
    match outcome {
        DiscountOutcome::Applied(d) => {
            assert_eq!(d.discount_id, id);
            assert_eq!(d.code.as_deref(), Some("SAVE10"));
            assert_eq!(d.discount_type, DiscountType::Percentage);
            assert_eq!(d.discount_value, 10.0);
        }
        other => panic!("expected applied, got {:?}", other),
    }
}

#[test]
fn test_empty_and_unknown_codes_rejected() {
    let app = create_test_app_state();
    let resolver = &app.state.discounts;

    assert_eq!(rejection(resolver.apply_code("   ", "Starter Plan").unwrap()), DiscountRejection::Empty);
    assert_eq!(
        rejection(resolver.apply_code("NOPE", "Starter Plan").unwrap()),
        DiscountRejection::NotFound
    );
}

#[test]
fn test_unknown_plan_is_an_error_not_a_rejection() {
    let app = create_test_app_state();
    let err = app.state.discounts.apply_code("SAVE10", "Platinum Plan").unwrap_err();
    assert!(matches!(AppError::from(err), AppError::NotFound(_)));
}

#[test]
fn test_window_and_scope_rules() {
    let app = create_test_app_state();
    {
        let conn = app.state.db.get().unwrap();
        create_code(
            &conn,
            CreateDiscountCode {
                expires_at: Some(now() - 60),
                ..code_input("OLD", DiscountType::Percentage, 10.0)
            },
        );
        create_code(
            &conn,
            CreateDiscountCode {
                starts_at: Some(now() + 3600),
                ..code_input("SOON", DiscountType::Percentage, 10.0)
            },
        );
        create_code(
            &conn,
            CreateDiscountCode {
                plan_ids: vec!["vip".into()],
                ..code_input("VIPONLY", DiscountType::Fixed, 25.0)
            },
        );
        let inactive = create_percentage_code(&conn, "OFF", 10.0);
        queries::set_discount_code_active(&conn, &inactive.id, false).unwrap();
    }

    let resolver = &app.state.discounts;
    assert_eq!(rejection(resolver.apply_code("OLD", "Starter Plan").unwrap()), DiscountRejection::Expired);
    assert_eq!(
        rejection(resolver.apply_code("SOON", "Starter Plan").unwrap()),
        DiscountRejection::NotYetValid
    );
    assert_eq!(
        rejection(resolver.apply_code("VIPONLY", "Starter Plan").unwrap()),
        DiscountRejection::NotApplicable
    );
    assert!(matches!(
        resolver.apply_code("VIPONLY", "vip").unwrap(),
        DiscountOutcome::Applied(_)
    ));
    assert_eq!(rejection(resolver.apply_code("OFF", "Starter Plan").unwrap()), DiscountRejection::Inactive);
}

#[test]
fn test_exhausted_code_rejected() {
    let app = create_test_app_state();
    {
        let conn = app.state.db.get().unwrap();
        let code = create_code(
            &conn,
            CreateDiscountCode {
                max_uses: Some(1),
                ..code_input("ONCE", DiscountType::Percentage, 50.0)
            },
        );
        assert!(queries::increment_discount_usage(&conn, &code.id).unwrap());
        assert!(!queries::increment_discount_usage(&conn, &code.id).unwrap());
    }

    let outcome = app.state.discounts.apply_code("ONCE", "Starter Plan").unwrap();
    assert_eq!(rejection(outcome), DiscountRejection::Exhausted);
}

#[test]
fn test_checkout_falls_back_to_running_promotion() {
    let app = create_test_app_state();
    {
        let conn = app.state.db.get().unwrap();
        queries::create_promotion(
            &conn,
            &CreatePromotion {
                plan_id: "starter".into(),
                name: "Spring sale".into(),
                discount_type: DiscountType::Fixed,
                discount_value: 5.0,
                starts_at: now() - 60,
                ends_at: None,
            },
        )
        .unwrap();
    }

    let resolver = &app.state.discounts;
    let promo = resolver.resolve_for_checkout(None, "Starter Plan").unwrap().unwrap();
    assert_eq!(promo.code, None);
    assert_eq!(promo.label, "Spring sale");

    // blank code counts as no code
    assert!(resolver.resolve_for_checkout(Some("  "), "Starter Plan").unwrap().is_some());
    assert!(resolver.resolve_for_checkout(None, "Enhanced Plan").unwrap().is_none());
}

#[test]
fn test_checkout_rejects_bad_code() {
    let app = create_test_app_state();
    let err = app
        .state
        .discounts
        .resolve_for_checkout(Some("BOGUS"), "Starter Plan")
        .unwrap_err();
    match err {
        AppError::BadRequest(message) => assert_eq!(message, "Invalid discount code"),
        other => panic!("expected BadRequest, got {:?}", other),
    }
}
