//! HTTP routes for Browserver

pub mod admin;
pub mod health;

pub use admin::{handle_admin_request, redirect_to_new_host};
pub use health::{health_check, status_check, version_info};
