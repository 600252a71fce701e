use actix_web::{test, web, App};
use serde_json::json;
use sqlx::Row;

use progressly::api;

mod support;

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(api::auth::register)
        .service(api::auth::login)
        .service(api::account::newsletter_subscribe)
        .service(
            web::scope("/api")
                .wrap(api::auth::JwtMiddleware)
                .service(api::usage::get_usage)
                .service(api::account::delete_account),
        );
}

#[actix_web::test]
async fn delete_account_deactivates_with_grace_window() {
    let test_db = support::init_test_db().await;
    let pool = test_db.pool.clone();
    let state = web::Data::new(support::build_state(pool.clone()));
    let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

    let (token, user_id) = support::register_user(&app, "leaving@example.com").await;

    let req = test::TestRequest::delete()
        .uri("/api/user")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], json!(true));

    // Soft delete: row still there, flagged, purge scheduled 7 days out.
    let row = sqlx::query(
        r#"SELECT deactivated, deactivated_at, purge_after,
                  purge_after - deactivated_at AS grace
           FROM users WHERE id = $1"#,
    )
    .bind(user_id)
    .fetch_one(&pool)
    .await
    .expect("select user");
    assert!(row.get::<bool, _>("deactivated"));
    assert!(row
        .get::<Option<chrono::DateTime<chrono::Utc>>, _>("purge_after")
        .is_some());

    // Deactivated account cannot log back in.
    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({"email": "leaving@example.com", "password": "hunter22"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
}

#[actix_web::test]
async fn deactivated_token_is_rejected_on_authenticated_routes() {
    let test_db = support::init_test_db().await;
    let pool = test_db.pool.clone();
    let state = web::Data::new(support::build_state(pool.clone()));
    let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

    let (token, _) = support::register_user(&app, "lingering@example.com").await;

    // Token works before deactivation.
    let req = test::TestRequest::get()
        .uri("/api/usage")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::delete()
        .uri("/api/user")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], json!(true));

    // The still-unexpired token must stop working immediately.
    let req = test::TestRequest::get()
        .uri("/api/usage")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let status = match test::try_call_service(&app, req).await {
        Ok(resp) => resp.status(),
        Err(e) => e.error_response().status(),
    };
    assert_eq!(status, 403);
}

#[actix_web::test]
async fn newsletter_rejects_invalid_and_duplicate_emails() {
    let test_db = support::init_test_db().await;
    let state = web::Data::new(support::build_state(test_db.pool.clone()));
    let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

    let req = test::TestRequest::post()
        .uri("/api/newsletter")
        .set_json(json!({"email": "reader@example.com"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    // Same address again, case-insensitively: duplicate.
    let req = test::TestRequest::post()
        .uri("/api/newsletter")
        .set_json(json!({"email": "Reader@Example.com"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::post()
        .uri("/api/newsletter")
        .set_json(json!({"email": "not-an-email"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}
