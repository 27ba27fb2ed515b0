//! Query-level tests against an in-memory database.

#[path = "../common/mod.rs"]
mod common;
use common::*;

use rusqlite::params;

fn attempt_input(user_id: &str, key: &str) -> CreatePaymentAttempt {
    CreatePaymentAttempt {
        idempotency_key: key.into(),
        user_id: user_id.into(),
        kind: AttemptKind::Charge,
        provider: "ecomPayments".into(),
        plan_id: "starter".into(),
        amount_cents: 2000,
        discount_id: None,
        business_id: None,
    }
}

mod users {
    use super::*;

    #[test]
    fn test_email_stored_lowercase_and_found_by_key() {
        let conn = setup_test_db();
        let (user, api_key) = create_test_user(&conn, "Owner@Example.COM");
        assert_eq!(user.email, "owner@example.com");
        assert!(api_key.starts_with(bizlist::crypto::API_KEY_PREFIX));

        let by_email = queries::get_user_by_email(&conn, "owner@example.com").unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
        let by_id = queries::get_user_by_id(&conn, &user.id).unwrap().unwrap();
        assert_eq!(by_id.email, user.email);

        let by_key = queries::get_user_by_api_key(&conn, &api_key).unwrap().unwrap();
        assert_eq!(by_key.id, user.id);
        assert!(queries::get_user_by_api_key(&conn, "bl_wrong").unwrap().is_none());
        assert_eq!(queries::count_users(&conn).unwrap(), 1);
    }

    #[test]
    fn test_api_key_stored_hashed() {
        let conn = setup_test_db();
        let (_, api_key) = create_test_user(&conn, "owner@example.com");

        let stored: String = conn
            .query_row("SELECT key_hash FROM api_keys LIMIT 1", [], |row| row.get(0))
            .unwrap();
        assert_ne!(stored, api_key);
        assert_eq!(stored, bizlist::crypto::hash_secret(&api_key));
    }
}

mod plans {
    use super::*;

    #[test]
    fn test_catalog_mirrored_into_store() {
        let conn = setup_test_db();
        let vip = queries::get_stored_plan(&conn, "vip").unwrap().unwrap();
        assert_eq!(vip.name, "VIP Plan");
        assert_eq!(vip.price, 100);

        let enhanced = queries::get_stored_plan_by_name(&conn, "enhanced plan").unwrap().unwrap();
        assert_eq!(enhanced.id, "enhanced");
    }
}

mod ledger {
    use super::*;

    #[test]
    fn test_idempotency_key_is_unique() {
        let conn = setup_test_db();
        let (user, _) = create_test_user(&conn, "owner@example.com");
        queries::create_payment_attempt(&conn, &attempt_input(&user.id, "k")).unwrap();
        assert!(queries::create_payment_attempt(&conn, &attempt_input(&user.id, "k")).is_err());
    }

    #[test]
    fn test_reopen_only_from_failed_or_unconfirmed() {
        let conn = setup_test_db();
        let (user, _) = create_test_user(&conn, "owner@example.com");
        let attempt = queries::create_payment_attempt(&conn, &attempt_input(&user.id, "k")).unwrap();
        assert_eq!(attempt.status, AttemptStatus::Pending);

        // pending cannot be reopened
        assert!(!queries::try_reopen_payment_attempt(&conn, &attempt.id).unwrap());

        queries::finish_payment_attempt(&conn, &attempt.id, AttemptStatus::Unconfirmed, None, false, Some("timeout"))
            .unwrap();
        let unconfirmed = queries::list_unconfirmed_payment_attempts(&conn).unwrap();
        assert_eq!(unconfirmed.len(), 1);

        assert!(queries::try_reopen_payment_attempt(&conn, &attempt.id).unwrap());
        // second reopen loses the race
        assert!(!queries::try_reopen_payment_attempt(&conn, &attempt.id).unwrap());

        let reopened = queries::get_payment_attempt_by_key(&conn, "k").unwrap().unwrap();
        assert_eq!(reopened.status, AttemptStatus::Pending);
        assert_eq!(reopened.error, None);
        assert!(queries::list_unconfirmed_payment_attempts(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_lookup_by_session() {
        let conn = setup_test_db();
        let (user, _) = create_test_user(&conn, "owner@example.com");
        let attempt = queries::create_payment_attempt(&conn, &attempt_input(&user.id, "k")).unwrap();
        queries::set_payment_attempt_session(&conn, &attempt.id, "cs_test_9").unwrap();

        let found = queries::get_payment_attempt_by_session(&conn, "cs_test_9").unwrap().unwrap();
        assert_eq!(found.id, attempt.id);
        assert!(queries::get_payment_attempt_by_session(&conn, "cs_other").unwrap().is_none());
    }
}

mod resume_tokens {
    use super::*;

    fn token() -> ResumeToken {
        ResumeToken {
            version: RESUME_TOKEN_VERSION,
            plan_name: "Starter Plan".into(),
            plan_price: 20,
            payment_completed: false,
            business_id: None,
            current_step: WizardStep::Payment,
            form: WizardFormData::default(),
            submitted: false,
        }
    }

    #[test]
    fn test_save_replaces_and_clear_removes() {
        let conn = setup_test_db();
        let (user, _) = create_test_user(&conn, "owner@example.com");

        queries::save_resume_token(&conn, &user.id, &token()).unwrap();
        let mut updated = token();
        updated.current_step = WizardStep::Info;
        updated.payment_completed = true;
        queries::save_resume_token(&conn, &user.id, &updated).unwrap();

        assert_eq!(queries::get_resume_token(&conn, &user.id).unwrap(), Some(updated));

        assert!(queries::clear_resume_token(&conn, &user.id).unwrap());
        assert!(queries::get_resume_token(&conn, &user.id).unwrap().is_none());
        assert!(!queries::clear_resume_token(&conn, &user.id).unwrap());
    }

    #[test]
    fn test_stale_or_corrupt_tokens_ignored() {
        let conn = setup_test_db();
        let (user, _) = create_test_user(&conn, "owner@example.com");
        queries::save_resume_token(&conn, &user.id, &token()).unwrap();

        conn.execute(
            "UPDATE wizard_resume SET version = ?1 WHERE user_id = ?2",
            params![RESUME_TOKEN_VERSION + 1, &user.id],
        )
        .unwrap();
        assert!(queries::get_resume_token(&conn, &user.id).unwrap().is_none());

        conn.execute(
            "UPDATE wizard_resume SET version = ?1, payload = '{not json' WHERE user_id = ?2",
            params![RESUME_TOKEN_VERSION, &user.id],
        )
        .unwrap();
        assert!(queries::get_resume_token(&conn, &user.id).unwrap().is_none());
    }
}

mod settings {
    use super::*;

    #[test]
    fn test_setting_upsert() {
        let conn = setup_test_db();
        assert_eq!(queries::get_setting(&conn, "payment_provider").unwrap(), None);
        queries::set_setting(&conn, "payment_provider", "stripe").unwrap();
        queries::set_setting(&conn, "payment_provider", "ecomPayments").unwrap();
        assert_eq!(
            queries::get_setting(&conn, "payment_provider").unwrap().as_deref(),
            Some("ecomPayments")
        );
    }
}
