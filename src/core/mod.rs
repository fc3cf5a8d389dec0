//! The core module holds the host device boundary, the error types and the context settings.

pub mod app_info;
pub mod device;
pub mod error;
pub mod headless;
