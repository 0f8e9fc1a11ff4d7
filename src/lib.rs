pub mod api;
pub mod config;
pub mod context;
pub mod jobs;
pub mod logging;
pub mod notifications;
pub mod timing;
