// src/api/tickets.rs

use actix_web::{delete, get, patch, post, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::api::auth::AuthedUser;
use crate::{tickets, AppState};

fn not_found() -> HttpResponse {
    // Ownership is a filter: someone else's ticket looks like no ticket.
    HttpResponse::NotFound().json(json!({"error": "ticket not found"}))
}

#[get("/tickets")]
pub async fn list_tickets(
    state: web::Data<AppState>,
    user: web::ReqData<AuthedUser>,
) -> impl Responder {
    match tickets::list_for_user(&state.pool, user.id).await {
        Ok(list) => HttpResponse::Ok().json(list),
        Err(e) => {
            log::error!("list_for_user error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTicketRequest {
    pub subject: String,
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/api/tickets",
    request_body = CreateTicketRequest,
    responses((status = 200, body = crate::models::Ticket), (status = 400), (status = 401)),
    tag = "tickets"
)]
#[post("/tickets")]
pub async fn create_ticket(
    state: web::Data<AppState>,
    user: web::ReqData<AuthedUser>,
    payload: web::Json<CreateTicketRequest>,
) -> impl Responder {
    let subject = payload.subject.trim();
    let message = payload.message.trim();
    if subject.is_empty() || message.is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "error": "subject and message are required"
        }));
    }

    match tickets::create(&state.pool, user.id, subject, message).await {
        Ok(ticket) => HttpResponse::Ok().json(ticket),
        Err(e) => {
            log::error!("ticket create error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[get("/tickets/{id}")]
pub async fn get_ticket(
    state: web::Data<AppState>,
    user: web::ReqData<AuthedUser>,
    path: web::Path<i32>,
) -> impl Responder {
    let ticket_id = path.into_inner();

    let ticket = match tickets::get_visible(&state.pool, ticket_id, user.id, user.is_admin).await {
        Ok(Some(t)) => t,
        Ok(None) => return not_found(),
        Err(e) => {
            log::error!("get_visible error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    match tickets::messages(&state.pool, ticket_id).await {
        Ok(messages) => HttpResponse::Ok().json(json!({
            "ticket": ticket,
            "messages": messages
        })),
        Err(e) => {
            log::error!("ticket messages error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTicketRequest {
    pub status: String,
}

#[utoipa::path(
    patch,
    path = "/api/tickets/{id}",
    request_body = UpdateTicketRequest,
    responses((status = 200), (status = 400), (status = 404)),
    tag = "tickets"
)]
#[patch("/tickets/{id}")]
pub async fn update_ticket(
    state: web::Data<AppState>,
    user: web::ReqData<AuthedUser>,
    path: web::Path<i32>,
    payload: web::Json<UpdateTicketRequest>,
) -> impl Responder {
    let status = payload.status.as_str();
    if status != "open" && status != "closed" {
        return HttpResponse::BadRequest().json(json!({
            "error": "status must be open or closed"
        }));
    }

    match tickets::set_status_owned(&state.pool, path.into_inner(), user.id, status).await {
        Ok(Some(ticket)) => HttpResponse::Ok().json(ticket),
        Ok(None) => not_found(),
        Err(e) => {
            log::error!("set_status_owned error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[delete("/tickets/{id}")]
pub async fn delete_ticket(
    state: web::Data<AppState>,
    user: web::ReqData<AuthedUser>,
    path: web::Path<i32>,
) -> impl Responder {
    match tickets::delete(&state.pool, path.into_inner(), user.id, user.is_admin).await {
        Ok(true) => HttpResponse::Ok().json(json!({"success": true})),
        Ok(false) => not_found(),
        Err(e) => {
            log::error!("ticket delete error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NewMessageRequest {
    pub body: String,
}

#[post("/tickets/{id}/messages")]
pub async fn add_message(
    state: web::Data<AppState>,
    user: web::ReqData<AuthedUser>,
    path: web::Path<i32>,
    payload: web::Json<NewMessageRequest>,
) -> impl Responder {
    let body = payload.body.trim();
    if body.is_empty() {
        return HttpResponse::BadRequest().json(json!({"error": "message body is required"}));
    }

    let ticket_id = path.into_inner();

    // Visibility check first so non-owners get the same 404 as a missing id.
    match tickets::get_visible(&state.pool, ticket_id, user.id, user.is_admin).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found(),
        Err(e) => {
            log::error!("get_visible error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    }

    match tickets::add_message(&state.pool, ticket_id, user.id, user.is_admin, body).await {
        Ok(message) => HttpResponse::Ok().json(message),
        Err(e) => {
            log::error!("add_message error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}
