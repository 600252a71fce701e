// src/main.rs
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use dotenvy::dotenv;
use sqlx::PgPool;
use std::env;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use progressly::{api, docs, AppState};

async fn index() -> impl Responder {
    HttpResponse::Ok().body("Service ready!")
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    // Fail at boot rather than on the first request.
    env::var("JWT_SECRET").expect("JWT_SECRET required");
    let checkout_webhook_key = env::var("CHECKOUT_WEBHOOK_KEY").expect("CHECKOUT_WEBHOOK_KEY required");
    let research_api_key = env::var("RESEARCH_API_KEY").unwrap_or_default();
    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let state = web::Data::new(AppState {
        pool,
        checkout_webhook_key,
        research_api_key,
    });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/", web::get().to(index))
            .service(
                SwaggerUi::new("/docs/{_:.*}")
                    .url("/api-docs/openapi.json", docs::ApiDoc::openapi()),
            )
            // Public auth routes
            .service(api::auth::register)
            .service(api::auth::login)
            // Public marketing/affiliate routes
            .service(api::account::newsletter_subscribe)
            .service(
                web::scope("/api/public")
                    .service(api::affiliate::apply)
                    .service(api::affiliate::referral_click),
            )
            // Provider webhooks (key-guarded, not session-guarded)
            .service(web::scope("/webhooks").service(api::webhooks::checkout_webhook))
            // Authenticated routes
            .service(
                web::scope("/api")
                    .wrap(api::auth::JwtMiddleware)
                    .service(api::usage::get_usage)
                    .service(api::usage::analysis_entitlement)
                    .service(api::usage::record_analysis)
                    .service(api::usage::record_optimization)
                    .service(api::usage::record_format_search)
                    .service(api::affiliate::affiliate_me)
                    .service(api::affiliate::request_payout)
                    .service(api::tickets::list_tickets)
                    .service(api::tickets::create_ticket)
                    .service(api::tickets::get_ticket)
                    .service(api::tickets::update_ticket)
                    .service(api::tickets::delete_ticket)
                    .service(api::tickets::add_message)
                    .service(api::account::delete_account)
                    .service(
                        web::scope("/admin")
                            .service(api::admin::list_tickets)
                            .service(api::admin::close_ticket)
                            .service(api::admin::reply_ticket)
                            .service(api::admin::list_payouts)
                            .service(api::admin::process_payout)
                            .service(api::admin::list_affiliates)
                            .service(api::admin::review_affiliate)
                            .service(api::admin::list_users)
                            .service(api::admin::update_user)
                            .service(api::admin::research_outliers),
                    ),
            )
    })
    .bind(bind_addr)?
    .run()
    .await
}
