use actix_web::{test, web, App};
use serde_json::json;
use sqlx::{PgPool, Row};

use progressly::api;

mod support;

async fn seed_approved_affiliate(pool: &PgPool, user_id: i32, pending_cents: i64) -> i32 {
    sqlx::query(
        r#"INSERT INTO affiliates
               (user_id, email, first_name, last_name, code, status,
                total_earnings_cents, pending_earnings_cents, paid_earnings_cents)
           VALUES ($1, $2, 'Test', 'Affiliate', $3, 'approved', $4, $4, 0)
           RETURNING id"#,
    )
    .bind(user_id)
    .bind(format!("affiliate{user_id}@example.com"))
    .bind(format!("code{user_id:04}"))
    .bind(pending_cents)
    .fetch_one(pool)
    .await
    .expect("insert affiliate")
    .get("id")
}

async fn affiliate_balances(pool: &PgPool, affiliate_id: i32) -> (i64, i64, i64) {
    let row = sqlx::query(
        r#"SELECT total_earnings_cents, pending_earnings_cents, paid_earnings_cents
           FROM affiliates WHERE id = $1"#,
    )
    .bind(affiliate_id)
    .fetch_one(pool)
    .await
    .expect("select affiliate");
    (
        row.get("total_earnings_cents"),
        row.get("pending_earnings_cents"),
        row.get("paid_earnings_cents"),
    )
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(api::auth::register)
        .service(api::auth::login)
        .service(
            web::scope("/api")
                .wrap(api::auth::JwtMiddleware)
                .service(api::affiliate::request_payout)
                .service(
                    web::scope("/admin")
                        .service(api::admin::list_payouts)
                        .service(api::admin::process_payout),
                ),
        );
}

#[actix_web::test]
async fn complete_payout_moves_pending_to_paid_once() {
    let test_db = support::init_test_db().await;
    let pool = test_db.pool.clone();
    let state = web::Data::new(support::build_state(pool.clone()));

    let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

    let (user_token, user_id) = support::register_user(&app, "payout_user@example.com").await;
    let affiliate_id = seed_approved_affiliate(&pool, user_id, 5_000).await;

    let (_, admin_id) = support::register_user(&app, "payout_admin@example.com").await;
    let admin_token = support::promote_to_admin(&app, &pool, "payout_admin@example.com", admin_id).await;

    // Affiliate requests a payout of 30.00.
    let req = test::TestRequest::post()
        .uri("/api/affiliate/payouts")
        .insert_header(("Authorization", format!("Bearer {user_token}")))
        .set_json(json!({"amountCents": 3_000}))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], json!(true));
    let payout_id = body["payout"]["id"].as_i64().expect("payout id");

    // Requesting does not debit pending.
    assert_eq!(affiliate_balances(&pool, affiliate_id).await, (5_000, 5_000, 0));

    // Admin completes it.
    let req = test::TestRequest::patch()
        .uri(&format!("/api/admin/payouts/{payout_id}"))
        .insert_header(("Authorization", format!("Bearer {admin_token}")))
        .set_json(json!({"action": "complete", "notes": "paid via paypal"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let (total, pending, paid) = affiliate_balances(&pool, affiliate_id).await;
    assert_eq!((total, pending, paid), (5_000, 2_000, 3_000));
    assert_eq!(total, pending + paid);

    // Second completion attempt fails and credits nothing.
    let req = test::TestRequest::patch()
        .uri(&format!("/api/admin/payouts/{payout_id}"))
        .insert_header(("Authorization", format!("Bearer {admin_token}")))
        .set_json(json!({"action": "complete"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(affiliate_balances(&pool, affiliate_id).await, (5_000, 2_000, 3_000));
}

#[actix_web::test]
async fn rejected_payout_leaves_pending_untouched() {
    let test_db = support::init_test_db().await;
    let pool = test_db.pool.clone();
    let state = web::Data::new(support::build_state(pool.clone()));

    let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

    let (user_token, user_id) = support::register_user(&app, "reject_user@example.com").await;
    let affiliate_id = seed_approved_affiliate(&pool, user_id, 5_000).await;

    let (_, admin_id) = support::register_user(&app, "reject_admin@example.com").await;
    let admin_token = support::promote_to_admin(&app, &pool, "reject_admin@example.com", admin_id).await;

    let req = test::TestRequest::post()
        .uri("/api/affiliate/payouts")
        .insert_header(("Authorization", format!("Bearer {user_token}")))
        .set_json(json!({"amountCents": 5_000}))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let payout_id = body["payout"]["id"].as_i64().expect("payout id");

    let req = test::TestRequest::patch()
        .uri(&format!("/api/admin/payouts/{payout_id}"))
        .insert_header(("Authorization", format!("Bearer {admin_token}")))
        .set_json(json!({"action": "reject", "notes": "paypal email bounced"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    // The 50.00 never left pending; rejection keeps it available.
    assert_eq!(affiliate_balances(&pool, affiliate_id).await, (5_000, 5_000, 0));

    let row = sqlx::query("SELECT status, notes FROM payouts WHERE id = $1")
        .bind(payout_id as i32)
        .fetch_one(&pool)
        .await
        .expect("select payout");
    assert_eq!(row.get::<String, _>("status"), "rejected");
    assert_eq!(row.get::<Option<String>, _>("notes").as_deref(), Some("paypal email bounced"));
}

#[actix_web::test]
async fn payout_requests_cannot_exceed_available_pending() {
    let test_db = support::init_test_db().await;
    let pool = test_db.pool.clone();
    let state = web::Data::new(support::build_state(pool.clone()));

    let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

    let (user_token, user_id) = support::register_user(&app, "cap_user@example.com").await;
    seed_approved_affiliate(&pool, user_id, 2_000).await;

    let req = test::TestRequest::post()
        .uri("/api/affiliate/payouts")
        .insert_header(("Authorization", format!("Bearer {user_token}")))
        .set_json(json!({"amountCents": 1_500}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    // 15.00 of the 20.00 is reserved by the open request.
    let req = test::TestRequest::post()
        .uri("/api/affiliate/payouts")
        .insert_header(("Authorization", format!("Bearer {user_token}")))
        .set_json(json!({"amountCents": 1_000}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn payout_admin_routes_enforce_auth_and_role() {
    let test_db = support::init_test_db().await;
    let pool = test_db.pool.clone();
    let state = web::Data::new(support::build_state(pool.clone()));

    let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

    // No token: the middleware rejects before any handler runs.
    let req = test::TestRequest::patch()
        .uri("/api/admin/payouts/1")
        .set_json(json!({"action": "complete"}))
        .to_request();
    let status = match test::try_call_service(&app, req).await {
        Ok(resp) => resp.status(),
        Err(e) => e.error_response().status(),
    };
    assert_eq!(status, 401);

    // Authenticated non-admin: forbidden.
    let (user_token, _) = support::register_user(&app, "plain_user@example.com").await;
    let req = test::TestRequest::patch()
        .uri("/api/admin/payouts/1")
        .insert_header(("Authorization", format!("Bearer {user_token}")))
        .set_json(json!({"action": "complete"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    // Admin with an invalid action verb: 400. Missing payout: 404.
    let (_, admin_id) = support::register_user(&app, "role_admin@example.com").await;
    let admin_token = support::promote_to_admin(&app, &pool, "role_admin@example.com", admin_id).await;

    let req = test::TestRequest::patch()
        .uri("/api/admin/payouts/1")
        .insert_header(("Authorization", format!("Bearer {admin_token}")))
        .set_json(json!({"action": "approve"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::patch()
        .uri("/api/admin/payouts/999999")
        .insert_header(("Authorization", format!("Bearer {admin_token}")))
        .set_json(json!({"action": "complete"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}
