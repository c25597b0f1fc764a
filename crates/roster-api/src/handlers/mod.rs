//! API handlers

pub mod auth;
pub mod health;
pub mod localization;
pub mod users;
