//! Plan-building vocabulary shared by the execution and physical layers.
//!
//! Key modules:
//! - [`logical_plan`]: scalar expression AST, select items, aggregate calls,
//!   join kinds and window bounds
//! - [`schema`]: key-field metadata and schema helpers
//! - [`explain`]: stable text rendering of expressions

pub mod explain;
pub mod logical_plan;
pub mod schema;

pub use explain::fmt_expr;
pub use logical_plan::*;
pub use schema::*;
