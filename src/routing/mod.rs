//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path)
//!     → router.rs (route lookup)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: interception on or off for this request
//!
//! Route Compilation (at startup and on config reload):
//!     RouteConfig[]
//!     → Sort by priority
//!     → Compile matchers
//!     → Freeze as immutable Router, swapped in atomically
//! ```
//!
//! # Design Decisions
//! - Host and path prefix only; no regex per request
//! - Highest priority wins, ties keep file order
//! - No matching route falls back to `firetail.enabled`

pub mod matcher;
pub mod router;

pub use router::{Route, Router};
