use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::auth::register,
        crate::api::auth::login,
        crate::api::usage::get_usage,
        crate::api::usage::record_analysis,
        crate::api::affiliate::affiliate_me,
        crate::api::affiliate::apply,
        crate::api::tickets::create_ticket,
        crate::api::tickets::update_ticket,
        crate::api::admin::process_payout,
        crate::api::account::delete_account,
        crate::api::account::newsletter_subscribe
    ),
    components(
        schemas(
            crate::api::auth::RegisterRequest,
            crate::api::auth::LoginRequest,
            crate::api::auth::AuthResponse,
            crate::api::usage::UsageSummary,
            crate::api::usage::CategoryUsage,
            crate::api::affiliate::ApplyRequest,
            crate::api::tickets::CreateTicketRequest,
            crate::api::tickets::UpdateTicketRequest,
            crate::api::tickets::NewMessageRequest,
            crate::api::admin::ProcessPayoutRequest,
            crate::api::account::NewsletterRequest,
            crate::entitlements::AnalysisEntitlement,
            crate::models::Ticket,
            crate::models::TicketMessage,
            crate::models::Affiliate,
            crate::models::Payout
        )
    ),
    tags(
        (name = "auth", description = "Authentication"),
        (name = "usage", description = "Plan usage and entitlements"),
        (name = "affiliate", description = "Affiliate program"),
        (name = "tickets", description = "Support tickets"),
        (name = "admin", description = "Admin operations"),
        (name = "account", description = "Account lifecycle")
    )
)]
pub struct ApiDoc;
