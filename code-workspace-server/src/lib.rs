pub mod config;
pub mod models;
pub mod service;

pub use config::ServerConfig;
pub use service::{AppState, build_workspace, create_app};
