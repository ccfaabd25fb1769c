//! Execution-layer primitives produced by plan lowering.
//!
//! Architecture role:
//! - row values and the expression compiler/evaluator
//! - scalar function registry with built-ins
//! - the pure row functions (mappers, predicates, joiners, key extractors,
//!   aggregators) handed to the runtime
//! - the runtime substrate contract
//!
//! Key modules:
//! - [`expressions`]
//! - [`operators`]
//! - [`stream`]
//! - [`udf`]

pub mod expressions;
mod functions;
pub mod operators;
pub mod stream;
pub mod udf;
pub mod value;

pub use expressions::{compile_expr, compile_exprs, CompiledExpression, PhysicalExpr};
pub use operators::{
    Aggregator, GroupByMapper, RekeyMapper, SelectValueMapper, SinkValueMapper, SqlPredicate,
    ValueJoiner, GROUP_BY_KEY_DELIMITER,
};
pub use stream::{
    AggregateFn, Grouped, Initializer, JoinSerdes, KeyMapper, RecordKey, RowPredicate, SinkTopic,
    StreamRuntime, TimeWindow, ValueJoinerFn, ValueMapper,
};
pub use udf::{FunctionRegistry, InMemoryFunctionRegistry, ScalarFunction};
pub use value::{Row, Value};
