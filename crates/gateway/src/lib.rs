pub mod annotate;
pub mod config;
pub mod encode;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod server;
pub mod state;
