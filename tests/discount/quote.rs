//! Price quotes with a code applied and removed.

#[path = "../common/mod.rs"]
mod common;
use common::*;

use bizlist::discount::{DiscountOutcome, PriceQuote};

fn applied(app: &TestApp, code: &str, plan: &str) -> bizlist::discount::AppliedDiscount {
    match app.state.discounts.apply_code(code, plan).unwrap() {
        DiscountOutcome::Applied(d) => d,
        other => panic!("expected applied, got {:?}", other),
    }
}

#[test]
fn test_enhanced_plan_with_ten_percent() {
    let app = create_test_app_state();
    {
        let conn = app.state.db.get().unwrap();
        create_percentage_code(&conn, "SAVE10", 10.0);
    }

    let mut quote = PriceQuote::new(60.0);
    quote.apply(applied(&app, "SAVE10", "Enhanced Plan"));
    assert_eq!(quote.amount(), 54.0);
    assert_eq!(quote.amount_cents(), 5400);
}

#[test]
fn test_apply_remove_cycles_never_compound() {
    let app = create_test_app_state();
    {
        let conn = app.state.db.get().unwrap();
        create_percentage_code(&conn, "SAVE10", 10.0);
        create_code(&conn, code_input("TENOFF", DiscountType::Fixed, 10.0));
    }
    let percent = applied(&app, "SAVE10", "VIP Plan");
    let fixed = applied(&app, "TENOFF", "VIP Plan");

    let mut quote = PriceQuote::new(100.0);
    for i in 0..12 {
        let discount = if i % 2 == 0 { percent.clone() } else { fixed.clone() };
        quote.apply(discount);
        assert_eq!(quote.amount(), 90.0, "cycle {}", i);
        quote.remove_code();
        assert_eq!(quote.amount(), 100.0, "cycle {}", i);
        assert!(quote.discount().is_none());
    }
}

#[test]
fn test_reapplying_replaces_previous_discount() {
    let app = create_test_app_state();
    {
        let conn = app.state.db.get().unwrap();
        create_percentage_code(&conn, "SAVE10", 10.0);
        create_percentage_code(&conn, "HALF", 50.0);
    }

    let mut quote = PriceQuote::new(20.0);
    quote.apply(applied(&app, "SAVE10", "Starter Plan"));
    quote.apply(applied(&app, "HALF", "Starter Plan"));
    assert_eq!(quote.amount(), 10.0);
    assert_eq!(quote.discount().and_then(|d| d.code.as_deref()), Some("HALF"));
}

#[test]
fn test_full_discount_is_free() {
    let app = create_test_app_state();
    {
        let conn = app.state.db.get().unwrap();
        create_percentage_code(&conn, "FREE100", 100.0);
        create_code(&conn, code_input("BIGFIXED", DiscountType::Fixed, 500.0));
    }

    let mut quote = PriceQuote::new(60.0);
    quote.apply(applied(&app, "FREE100", "Enhanced Plan"));
    assert!(quote.is_free());

    // fixed amounts larger than the price clamp at zero
    quote.apply(applied(&app, "BIGFIXED", "Enhanced Plan"));
    assert_eq!(quote.amount(), 0.0);
    assert!(quote.is_free());
}

#[test]
fn test_removing_code_leaves_usage_untouched() {
    let app = create_test_app_state();
    let id = {
        let conn = app.state.db.get().unwrap();
        create_percentage_code(&conn, "SAVE10", 10.0).id
    };

    let mut quote = PriceQuote::new(20.0);
    quote.apply(applied(&app, "SAVE10", "Starter Plan"));
    quote.remove_code();

    let conn = app.state.db.get().unwrap();
    let stored = queries::get_discount_code_by_id(&conn, &id).unwrap().unwrap();
    assert_eq!(stored.used_count, 0);
}
