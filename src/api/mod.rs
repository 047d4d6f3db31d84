pub mod accounting;
pub mod application;
pub mod auth;
pub mod document;
pub mod health;
pub mod notification;
pub mod organization;
pub mod user;
