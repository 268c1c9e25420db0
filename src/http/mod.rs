//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, scope decision)
//!     → request.rs (request ID, request meta, upstream request)
//!     → intercept::FilterPipeline (capture, validate, audit)
//!     → upstream (hyper client)
//!     → response.rs (strip hop-by-hop, rebuild or synthesize)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
