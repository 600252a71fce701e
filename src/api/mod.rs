pub mod account;
pub mod admin;
pub mod affiliate;
pub mod auth;
pub mod tickets;
pub mod usage;
pub mod webhooks;
