#![cfg(feature = "web")]
//! Page handlers through the full router with an in-memory store.

mod common;

use axum::http::StatusCode;
use sportfund::domain::enrollment::EnrollmentStatus;
use std::sync::Arc;
use tower::ServiceExt;

use common::web::*;
use common::*;

const TRADER: &str = "trader@example.com";
const ADMIN: &str = "admin@example.com";

/// Catalog plus one trader (id 1) and one admin (id 2).
fn seeded(store: MockStore) -> Arc<MockStore> {
    let store = store.with_challenges(catalog());
    store.add_account(TRADER, &TEST_PASSWORD_HASH, false);
    store.add_account(ADMIN, &TEST_PASSWORD_HASH, true);
    Arc::new(store)
}

mod public_pages {
    use super::*;

    #[tokio::test]
    async fn home_quotes_cheapest_tier() {
        let app = app(seeded(MockStore::new()));
        let response = app.oneshot(get("/", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("<html"));
        assert!(body.contains("Challenges start at $29.99"));
    }

    #[tokio::test]
    async fn home_survives_catalog_failure() {
        let app = app(seeded(MockStore::new().failing_catalog()));
        let response = app.oneshot(get("/", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(!body.contains("Challenges start at"));
    }

    #[tokio::test]
    async fn htmx_request_gets_fragment_only() {
        let app = app(seeded(MockStore::new()));
        let request = axum::http::Request::builder()
            .uri("/about")
            .header("HX-Request", "true")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(!body.contains("<html"));
        assert!(!body.contains("site-header"));
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = app(seeded(MockStore::new()));
        let response = app.oneshot(get("/health", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "ok");
    }

    #[tokio::test]
    async fn unknown_path_is_404_page() {
        let app = app(seeded(MockStore::new()));
        let response = app.oneshot(get("/no-such-page", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_string(response).await;
        assert!(body.contains("Page not found"));
    }
}

mod challenge_catalog {
    use super::*;

    #[tokio::test]
    async fn defaults_to_standard_five_thousand() {
        let app = app(seeded(MockStore::new()));
        let response = app.oneshot(get("/challenges", None)).await.unwrap();

        let body = body_string(response).await;
        assert!(body.contains("id=\"challenge-2\""));
        assert!(body.contains("$5000 Standard"));
        assert!(body.contains("You will be asked to sign in first."));
    }

    #[tokio::test]
    async fn pro_plan_shows_three_phases() {
        let app = app(seeded(MockStore::new()));
        let response = app
            .oneshot(get("/challenges?plan=pro&balance=10000", None))
            .await
            .unwrap();

        let body = body_string(response).await;
        assert!(body.contains("id=\"challenge-5\""));
        assert!(body.contains("Phase 3"));
        assert!(body.contains("$1,500"));
    }

    #[tokio::test]
    async fn unavailable_balance_falls_back_to_first_tier() {
        let app = app(seeded(MockStore::new()));
        let response = app
            .oneshot(get("/challenges?plan=pro&balance=5000", None))
            .await
            .unwrap();

        let body = body_string(response).await;
        assert!(body.contains("id=\"challenge-5\""));
    }

    #[tokio::test]
    async fn inactive_tiers_are_hidden() {
        let store = seeded(MockStore::new());
        use sportfund::ports::store_port::ChallengeStore;
        store.set_challenge_active(2, false).unwrap();
        let app = app(store);

        let response = app
            .oneshot(get("/challenges?plan=standard&balance=5000", None))
            .await
            .unwrap();
        let body = body_string(response).await;
        assert!(!body.contains("id=\"challenge-2\""));
        assert!(body.contains("id=\"challenge-1\""));
    }

    #[tokio::test]
    async fn catalog_failure_shows_notice() {
        let app = app(seeded(MockStore::new().failing_catalog()));
        let response = app.oneshot(get("/challenges", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("Failed to load challenges"));
        assert!(body.contains("No challenges are available"));
    }
}

mod enrollment {
    use super::*;

    #[tokio::test]
    async fn successful_purchase_redirects_to_dashboard() {
        let store = seeded(MockStore::new());
        let app = app(Arc::clone(&store));
        let cookie = sign_in(&app, TRADER).await;

        let response = app
            .clone()
            .oneshot(post_form("/challenges/enroll", "challenge_id=3", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response).as_deref(), Some("/dashboard"));

        let rows = store.enrollments();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.user_id, 1);
        assert_eq!(row.challenge_id, 3);
        assert_eq!(row.status, EnrollmentStatus::Active);
        assert_eq!(row.current_phase, 1);
        assert_eq!(row.total_paid, 274.99);
        assert_eq!(row.current_balance, 10_000.0);
        assert_eq!(row.max_balance, 10_000.0);

        let response = app.oneshot(get("/dashboard", Some(&cookie))).await.unwrap();
        let body = body_string(response).await;
        assert!(body.contains("Successfully enrolled in $10000 Standard!"));
        assert!(body.contains("Active (1)"));
    }

    #[tokio::test]
    async fn htmx_purchase_navigates_with_hx_redirect() {
        let store = seeded(MockStore::new());
        let app = app(Arc::clone(&store));
        let cookie = sign_in(&app, TRADER).await;

        let response = app
            .oneshot(htmx(post_form(
                "/challenges/enroll",
                "challenge_id=3",
                Some(&cookie),
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(location(&response).is_none());
        assert_eq!(
            response.headers().get("HX-Redirect").unwrap(),
            "/dashboard"
        );
        assert_eq!(store.enrollment_count(), 1);
    }

    #[tokio::test]
    async fn insert_failure_rerenders_without_redirect() {
        let store = seeded(MockStore::new().failing_enrollments());
        let app = app(Arc::clone(&store));
        let cookie = sign_in(&app, TRADER).await;

        let response = app
            .oneshot(post_form("/challenges/enroll", "challenge_id=3", Some(&cookie)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(location(&response).is_none());
        let body = body_string(response).await;
        assert!(body.contains("Failed to enroll in challenge"));
        assert!(body.contains("id=\"challenge-3\""));
        assert_eq!(store.enrollment_count(), 0);
    }

    #[tokio::test]
    async fn anonymous_purchase_goes_to_sign_in() {
        let store = seeded(MockStore::new());
        let app = app(Arc::clone(&store));

        let response = app
            .oneshot(post_form("/challenges/enroll", "challenge_id=3", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            location(&response).as_deref(),
            Some("/auth?next=%2Fchallenges")
        );
        assert_eq!(store.enrollment_count(), 0);
    }

    #[tokio::test]
    async fn unknown_tier_is_reported() {
        let store = seeded(MockStore::new());
        let app = app(Arc::clone(&store));
        let cookie = sign_in(&app, TRADER).await;

        let response = app
            .oneshot(post_form("/challenges/enroll", "challenge_id=99", Some(&cookie)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("Challenge not found"));
        assert_eq!(store.enrollment_count(), 0);
    }

    #[tokio::test]
    async fn repeat_purchases_create_separate_rows() {
        let store = seeded(MockStore::new());
        let app = app(Arc::clone(&store));
        let cookie = sign_in(&app, TRADER).await;

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(post_form("/challenges/enroll", "challenge_id=1", Some(&cookie)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::SEE_OTHER);
        }
        assert_eq!(store.enrollment_count(), 2);
    }
}

mod dashboard {
    use super::*;

    #[tokio::test]
    async fn empty_dashboard_invites_browsing() {
        let app = app(seeded(MockStore::new()));
        let cookie = sign_in(&app, TRADER).await;

        let response = app.oneshot(get("/dashboard", Some(&cookie))).await.unwrap();
        let body = body_string(response).await;
        assert!(body.contains("Welcome back, Trader!"));
        assert!(body.contains("No Active Challenges"));
    }

    #[tokio::test]
    async fn shows_progress_and_win_rate() {
        let store = seeded(MockStore::new());
        let tier = store.challenge(3).unwrap();
        let mut row = enrollment(1, 1, &tier, 0);
        row.current_profit = 450.0;
        row.total_trades = 20;
        row.winning_trades = 14;
        store.seed_enrollment(row);
        let app = app(Arc::clone(&store));
        let cookie = sign_in(&app, TRADER).await;

        let response = app.oneshot(get("/dashboard", Some(&cookie))).await.unwrap();
        let body = body_string(response).await;
        assert!(body.contains("22.5%"));
        assert!(body.contains("70.0%"));
        assert!(body.contains("$450 of $2,000"));
        assert!(body.contains("14 won, 6 lost"));
    }

    #[tokio::test]
    async fn passed_attempts_are_listed_as_completed() {
        let store = seeded(MockStore::new());
        let tier = store.challenge(1).unwrap();
        let mut passed = enrollment(1, 1, &tier, 10);
        passed.status = EnrollmentStatus::Passed;
        let mut failed = enrollment(2, 1, &tier, 5);
        failed.status = EnrollmentStatus::Failed;
        store.seed_enrollment(passed);
        store.seed_enrollment(failed);
        store.seed_enrollment(enrollment(3, 1, &tier, 0));
        let app = app(Arc::clone(&store));
        let cookie = sign_in(&app, TRADER).await;

        let response = app.oneshot(get("/dashboard", Some(&cookie))).await.unwrap();
        let body = body_string(response).await;
        assert!(body.contains("Active (1)"));
        assert!(body.contains("Completed (1)"));
        assert!(!body.contains("id=\"enrollment-2\""));
    }

    #[tokio::test]
    async fn only_own_enrollments_are_shown() {
        let store = seeded(MockStore::new());
        let tier = store.challenge(1).unwrap();
        store.seed_enrollment(enrollment(7, 2, &tier, 0));
        let app = app(Arc::clone(&store));
        let cookie = sign_in(&app, TRADER).await;

        let response = app.oneshot(get("/dashboard", Some(&cookie))).await.unwrap();
        let body = body_string(response).await;
        assert!(!body.contains("id=\"enrollment-7\""));
        assert!(body.contains("No Active Challenges"));
    }
}

mod profile {
    use super::*;
    use sportfund::ports::store_port::ProfileStore;

    #[tokio::test]
    async fn update_saves_and_redirects() {
        let store = seeded(MockStore::new());
        let app = app(Arc::clone(&store));
        let cookie = sign_in(&app, TRADER).await;

        let response = app
            .clone()
            .oneshot(post_form(
                "/profile",
                "first_name=%20Grace%20&last_name=Hopper&phone=%2B61%20400%20000%20000",
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response).as_deref(), Some("/profile"));

        let profile = store.get_profile(1).unwrap().unwrap();
        assert_eq!(profile.first_name, "Grace");
        assert_eq!(profile.phone, "+61 400 000 000");

        let response = app.oneshot(get("/profile", Some(&cookie))).await.unwrap();
        let body = body_string(response).await;
        assert!(body.contains("Profile updated successfully!"));
        assert!(body.contains("value=\"Grace\""));
    }

    #[tokio::test]
    async fn invalid_phone_keeps_form_values() {
        let store = seeded(MockStore::new());
        let app = app(Arc::clone(&store));
        let cookie = sign_in(&app, TRADER).await;

        let response = app
            .oneshot(post_form(
                "/profile",
                "first_name=Grace&phone=call%20me",
                Some(&cookie),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("may only contain digits"));
        assert!(body.contains("value=\"Grace\""));
        assert_eq!(store.get_profile(1).unwrap().unwrap().first_name, "");
    }

    #[tokio::test]
    async fn store_failure_is_reported() {
        let store = seeded(MockStore::new());
        store
            .fail_profile_update
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let app = app(Arc::clone(&store));
        let cookie = sign_in(&app, TRADER).await;

        let response = app
            .oneshot(post_form("/profile", "first_name=Grace", Some(&cookie)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("Failed to update profile"));
    }
}

mod back_office {
    use super::*;

    fn with_mixed_statuses() -> Arc<MockStore> {
        let store = seeded(MockStore::new());
        let tier = store.challenge(2).unwrap();
        let mut passed = enrollment(1, 1, &tier, 20);
        passed.status = EnrollmentStatus::Passed;
        store.seed_enrollment(passed);
        store.seed_enrollment(enrollment(2, 1, &tier, 10));
        store
    }

    #[tokio::test]
    async fn status_filter_narrows_rows() {
        let app = app(with_mixed_statuses());
        let cookie = sign_in(&app, ADMIN).await;

        let response = app
            .oneshot(get("/admin/enrollments?status=passed", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("id=\"enrollment-1\""));
        assert!(!body.contains("id=\"enrollment-2\""));
    }

    #[tokio::test]
    async fn unknown_status_filter_is_bad_request() {
        let app = app(with_mixed_statuses());
        let cookie = sign_in(&app, ADMIN).await;

        let response = app
            .oneshot(get("/admin/enrollments?status=bogus", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn status_update_is_saved() {
        let store = with_mixed_statuses();
        let app = app(Arc::clone(&store));
        let cookie = sign_in(&app, ADMIN).await;

        let response = app
            .oneshot(post_form(
                "/admin/enrollments/2/status",
                "status=failed",
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response).as_deref(), Some("/admin/enrollments"));

        let row = store.enrollments().into_iter().find(|e| e.id == 2).unwrap();
        assert_eq!(row.status, EnrollmentStatus::Failed);
    }

    #[tokio::test]
    async fn status_update_for_missing_enrollment_is_404() {
        let app = app(with_mixed_statuses());
        let cookie = sign_in(&app, ADMIN).await;

        let response = app
            .oneshot(post_form(
                "/admin/enrollments/99/status",
                "status=failed",
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn toggle_flips_tier_visibility() {
        let store = with_mixed_statuses();
        let app = app(Arc::clone(&store));
        let cookie = sign_in(&app, ADMIN).await;

        let response = app
            .clone()
            .oneshot(post_form("/admin/challenges/4/toggle", "", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(!store.challenge(4).unwrap().is_active);

        let response = app
            .oneshot(get("/admin/challenges", Some(&cookie)))
            .await
            .unwrap();
        let body = body_string(response).await;
        assert!(body.contains("$20000 Standard is now inactive"));
    }

    #[tokio::test]
    async fn overview_counts_revenue() {
        let app = app(with_mixed_statuses());
        let cookie = sign_in(&app, ADMIN).await;

        let response = app.oneshot(get("/admin", Some(&cookie))).await.unwrap();
        let body = body_string(response).await;
        // Two purchases of the $144.99 tier.
        assert!(body.contains("$289.98"));
        assert!(body.contains("100.0"));
    }
}

mod user_admin {
    use super::*;
    use sportfund::domain::profile::ProfileUpdate;
    use sportfund::ports::store_port::{AccountStore, ProfileStore};

    /// Trader (id 1) named Tess Ray with two purchases, admin (id 2), and
    /// a second trader (id 3) with none.
    fn with_users() -> Arc<MockStore> {
        let store = seeded(MockStore::new());
        store
            .update_profile(
                1,
                &ProfileUpdate {
                    first_name: "Tess".into(),
                    last_name: "Ray".into(),
                    phone: String::new(),
                },
            )
            .unwrap();
        store.add_account("other@example.com", &TEST_PASSWORD_HASH, false);
        let tier = store.challenge(1).unwrap();
        store.seed_enrollment(enrollment(1, 1, &tier, 20));
        store.seed_enrollment(enrollment(2, 1, &tier, 10));
        store
    }

    #[tokio::test]
    async fn lists_every_account_with_counts() {
        let app = app(with_users());
        let cookie = sign_in(&app, ADMIN).await;

        let response = app.oneshot(get("/admin/users", Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("Users (3)"));
        assert!(body.contains("id=\"user-1\""));
        assert!(body.contains("id=\"user-3\""));
        assert!(body.contains("Tess Ray"));
        assert!(body.contains("<td>2</td>"));
        // No demote button on the signed-in admin's own row.
        assert!(!body.contains("/admin/users/2/admin"));
        assert!(body.contains("/admin/users/1/admin"));
    }

    #[tokio::test]
    async fn search_matches_email_and_name() {
        let app = app(with_users());
        let cookie = sign_in(&app, ADMIN).await;

        let response = app
            .clone()
            .oneshot(get("/admin/users?q=TESS", Some(&cookie)))
            .await
            .unwrap();
        let body = body_string(response).await;
        assert!(body.contains("Users (1 of 3)"));
        assert!(body.contains("id=\"user-1\""));
        assert!(!body.contains("id=\"user-3\""));

        let response = app
            .oneshot(get("/admin/users?q=other%40", Some(&cookie)))
            .await
            .unwrap();
        let body = body_string(response).await;
        assert!(body.contains("id=\"user-3\""));
        assert!(!body.contains("id=\"user-1\""));
    }

    #[tokio::test]
    async fn toggle_grants_then_revokes_admin() {
        let store = with_users();
        let app = app(Arc::clone(&store));
        let cookie = sign_in(&app, ADMIN).await;

        let response = app
            .clone()
            .oneshot(post_form("/admin/users/1/admin", "", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response).as_deref(), Some("/admin/users"));
        assert!(store.get_account(1).unwrap().unwrap().is_admin);

        let trader = sign_in(&app, TRADER).await;
        let response = app.clone().oneshot(get("/admin", Some(&trader))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(get("/admin/users", Some(&cookie)))
            .await
            .unwrap();
        let body = body_string(response).await;
        assert!(body.contains("trader@example.com is now an administrator"));

        app.clone()
            .oneshot(post_form("/admin/users/1/admin", "", Some(&cookie)))
            .await
            .unwrap();
        assert!(!store.get_account(1).unwrap().unwrap().is_admin);
        let response = app.oneshot(get("/admin", Some(&trader))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_cannot_demote_themselves() {
        let store = with_users();
        let app = app(Arc::clone(&store));
        let cookie = sign_in(&app, ADMIN).await;

        let response = app
            .clone()
            .oneshot(post_form("/admin/users/2/admin", "", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(store.get_account(2).unwrap().unwrap().is_admin);

        let response = app.oneshot(get("/admin/users", Some(&cookie))).await.unwrap();
        let body = body_string(response).await;
        assert!(body.contains("You cannot change your own admin access"));
    }

    #[tokio::test]
    async fn toggle_for_missing_user_is_404() {
        let app = app(with_users());
        let cookie = sign_in(&app, ADMIN).await;

        let response = app
            .oneshot(post_form("/admin/users/99/admin", "", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
