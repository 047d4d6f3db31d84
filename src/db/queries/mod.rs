pub mod accounting;
pub mod application;
pub mod business_trip;
pub mod document;
pub mod expense_item;
pub mod notification;
pub mod organization;
pub mod user;
pub mod workflow;
