//! Lowering of logical streaming operations into physical plan nodes.
//!
//! Architecture role:
//! - builds one immutable [`PlanNode`] per logical operator, bottom-up, on
//!   top of a [`ssq_execution::StreamRuntime`]
//! - propagates schemas and key fields and decides when a grouping needs a
//!   repartition
//! - records sink attachments beside the plan
//! - renders execution plans for diagnostics
//!
//! Key modules:
//! - [`builder`]
//! - [`node`]
//! - [`explain`]
//! - [`sink`]

pub mod builder;
pub mod explain;
mod grouped;
pub mod node;
pub mod sink;

pub use builder::{JoinSpec, PhysicalPlanBuilder};
pub use explain::ExecutionPlan;
pub use grouped::GroupedStream;
pub use node::{DataflowHandle, PlanKind, PlanNode, PlanOp};
pub use sink::{SinkAttachment, SinkAttachments, SinkRequest};
