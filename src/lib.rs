//! FireTail intercepting proxy library.

pub mod audit;
pub mod config;
pub mod http;
pub mod intercept;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod validator;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use intercept::FilterPipeline;
pub use lifecycle::Shutdown;
