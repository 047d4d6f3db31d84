pub mod accounting;
pub mod application;
pub mod approval;
pub mod business_trip;
pub mod expense_item;
pub mod notification;
pub mod organization;
pub mod user;
