//! dialect_rewrite: query-tree passes for restricted SQL dialects.
//!
//! The host compiles a query into a dialect-agnostic [`tree::Select`] tree
//! and hands it to [`pipeline::process`]. The returned tree only uses what a
//! restricted target engine supports:
//!
//! - no OFFSET: row windows are emulated with row numbering and `TOP n`
//!   ([`passes::pagination`]);
//! - ORDER BY keys are output columns or plain expressions over the node's
//!   own sources ([`passes::order_by`]);
//! - string operations use the dialect's 1-based function vocabulary
//!   ([`translate`]), and date/time comparisons can run on the dialect's
//!   double representation for millisecond precision ([`passes::temporal`]).
//!
//! Passes are pure functions from tree to tree. The only process-wide state
//! is the read-only [`config::DialectSettings`] installed by the host at
//! startup.

pub mod config;
pub mod error;
pub mod passes;
pub mod pipeline;
pub mod translate;
pub mod tree;

pub use error::{RewriteError, RewriteErrorKind};
pub use pipeline::{Pipeline, PipelineOptions, process};
