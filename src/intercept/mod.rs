//! Interception subsystem.
//!
//! # Data Flow
//! ```text
//! Host delivers request headers
//!     → FilterPipeline::on_request_headers (capture once)
//! Host delivers request body chunks (any number of calls)
//!     → chunk.rs (accumulate until the terminal chunk)
//!     → stages.rs RequestValidationStage
//!         ├─ declined → RequestVerdict::Reject (upstream never contacted)
//!         └─ valid    → RequestVerdict::Forward(body, maybe rewritten)
//! Host delivers response status + headers (real or synthesized)
//!     → FilterPipeline::on_response_headers (capture once)
//! Host delivers response body chunks
//!     → chunk.rs (accumulate until the terminal chunk)
//!     → stages.rs ResponseValidationStage
//!         ├─ bypass   → replay pending request error
//!         ├─ declined → ResponseVerdict::Replace
//!         └─ valid    → AuditStage → ResponseVerdict::Release
//!     → exchange finalized; later calls pass through
//! ```
//!
//! # Design Decisions
//! - One ExchangeState per request, owned by the caller, never shared
//! - Declined validation is a verdict, not an error
//! - Errors are request-scoped and map to a fixed status (error.rs)

pub mod chunk;
pub mod error;
pub mod exchange;
pub mod headers;
pub mod pipeline;
pub mod responder;
pub mod stages;

pub use chunk::{BodyChunk, ChunkAccumulator};
pub use error::PipelineError;
pub use exchange::{ExchangeId, ExchangePhase, ExchangeState, ExchangeTable, RequestMeta};
pub use headers::{HeaderCollector, HeaderList, HeaderMultiMap};
pub use pipeline::{FilterPipeline, Flow, RequestVerdict, ResponseVerdict, Stage};
pub use responder::{ErrorResponder, SynthesizedResponse};
pub use stages::{AuditStage, RequestValidationStage, ResponseValidationStage, ValidationScope};

