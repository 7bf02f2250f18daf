pub mod cache;
pub mod config;
pub mod context;
pub mod errors;
pub mod invoke;
pub mod template;
pub mod ui;
pub mod workflow;
