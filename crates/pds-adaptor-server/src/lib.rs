pub mod config;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod server;
pub mod service;

pub use config::{AppConfig, AuthSettings, LoggingConfig, PdsConfig, ServerConfig};
pub use observability::init_tracing;
pub use server::{AppState, PdsAdaptorServer, ServerBuilder, build_app, build_router};
pub use service::PdsService;
