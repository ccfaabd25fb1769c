//! Contract of the dataflow runtime that physical plan nodes are lowered onto.
//!
//! The runtime owns delivery, partitioning and windowing. Planning only hands
//! it pure row functions and opaque serde handles, and keeps whatever handle
//! each call returns.

use std::fmt;
use std::sync::Arc;

use arrow_schema::SchemaRef;
use serde::{Deserialize, Serialize};
use ssq_common::Result;
use ssq_planner::{JoinKind, JoinWindow, KeyFormat};

use crate::value::{Row, Value};

/// Half-open event-time window `[start_ms, end_ms)` of a windowed key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl TimeWindow {
    pub fn new(start_ms: i64, end_ms: i64) -> Self {
        Self { start_ms, end_ms }
    }
}

/// Record key as seen by row functions.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordKey {
    Plain(Value),
    Windowed { key: Value, window: TimeWindow },
}

impl RecordKey {
    /// The key value without its window.
    pub fn value(&self) -> &Value {
        match self {
            RecordKey::Plain(v) => v,
            RecordKey::Windowed { key, .. } => key,
        }
    }

    pub fn window(&self) -> Option<&TimeWindow> {
        match self {
            RecordKey::Plain(_) => None,
            RecordKey::Windowed { window, .. } => Some(window),
        }
    }

    pub fn format(&self) -> KeyFormat {
        match self {
            RecordKey::Plain(_) => KeyFormat::Plain,
            RecordKey::Windowed { .. } => KeyFormat::Windowed,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Plain(v) => write!(f, "{v}"),
            RecordKey::Windowed { key, window } => {
                write!(f, "{key}@[{}, {})", window.start_ms, window.end_ms)
            }
        }
    }
}

/// Per-record value transformation. `None` is a tombstone in both directions.
pub type ValueMapper = Arc<dyn Fn(Option<&Row>) -> Option<Row> + Send + Sync>;
/// Per-record filter.
pub type RowPredicate = Arc<dyn Fn(&RecordKey, Option<&Row>) -> bool + Send + Sync>;
/// Derives a new record key from a non-null row.
pub type KeyMapper = Arc<dyn Fn(&Row) -> Value + Send + Sync>;
/// Merges a left and a right value; either side may be missing.
pub type ValueJoinerFn = Arc<dyn Fn(Option<&Row>, Option<&Row>) -> Row + Send + Sync>;
/// Initial aggregate row for a new group.
pub type Initializer = Arc<dyn Fn() -> Row + Send + Sync>;
/// Folds one row into a group's aggregate: `(key, row, aggregate) -> aggregate`.
pub type AggregateFn = Arc<dyn Fn(&Value, &Row, Row) -> Row + Send + Sync>;

/// Grouping parameters of a group-by.
#[derive(Debug, Clone)]
pub struct Grouped<S> {
    /// Key format of the grouped records.
    pub key_format: KeyFormat,
    pub value_serde: S,
}

/// Value serdes of the two join inputs.
#[derive(Debug, Clone)]
pub struct JoinSerdes<S> {
    pub left: S,
    pub right: S,
}

/// Output topic of a sink.
#[derive(Debug, Clone)]
pub struct SinkTopic<S> {
    pub name: String,
    pub value_serde: S,
    pub partitions: u32,
    pub replicas: u16,
}

/// Primitive dataflow operators consumed by plan lowering.
///
/// Handles are opaque to planning. Every method takes its inputs by reference:
/// the plan node that produced a handle keeps owning it.
pub trait StreamRuntime {
    type Stream;
    type Table;
    type Grouped;
    type Serde: Clone + fmt::Debug;

    fn stream_source(&self, topic: &str, schema: &SchemaRef) -> Result<Self::Stream>;

    fn table_source(&self, topic: &str, schema: &SchemaRef) -> Result<Self::Table>;

    fn filter(&self, input: &Self::Stream, predicate: RowPredicate) -> Self::Stream;

    fn filter_table(&self, input: &Self::Table, predicate: RowPredicate) -> Self::Table;

    fn map_values(&self, input: &Self::Stream, mapper: ValueMapper) -> Self::Stream;

    fn map_table_values(&self, input: &Self::Table, mapper: ValueMapper) -> Self::Table;

    /// Re-key (and so repartition) a stream. Rows reaching the mapper are non-null.
    fn select_key(&self, input: &Self::Stream, key: KeyMapper) -> Self::Stream;

    /// Group on the existing key without repartitioning.
    fn group_by_key(&self, input: &Self::Stream, grouped: Grouped<Self::Serde>) -> Self::Grouped;

    /// Group on a derived key, repartitioning the stream.
    fn group_by(
        &self,
        input: &Self::Stream,
        key: KeyMapper,
        grouped: Grouped<Self::Serde>,
    ) -> Self::Grouped;

    fn aggregate(
        &self,
        input: &Self::Grouped,
        initializer: Initializer,
        aggregator: AggregateFn,
    ) -> Self::Table;

    fn stream_table_join(
        &self,
        left: &Self::Stream,
        right: &Self::Table,
        kind: JoinKind,
        joiner: ValueJoinerFn,
        serdes: JoinSerdes<Self::Serde>,
    ) -> Self::Stream;

    fn stream_stream_join(
        &self,
        left: &Self::Stream,
        right: &Self::Stream,
        kind: JoinKind,
        window: JoinWindow,
        joiner: ValueJoinerFn,
        serdes: JoinSerdes<Self::Serde>,
    ) -> Self::Stream;

    fn table_to_stream(&self, input: &Self::Table) -> Self::Stream;

    /// Write a stream to a topic.
    fn to_sink(&self, input: &Self::Stream, topic: SinkTopic<Self::Serde>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::{RecordKey, TimeWindow};
    use crate::value::Value;
    use ssq_planner::KeyFormat;

    #[test]
    fn record_key_accessors() {
        let plain = RecordKey::Plain(Value::from("k1"));
        assert_eq!(plain.value(), &Value::from("k1"));
        assert!(plain.window().is_none());
        assert_eq!(plain.format(), KeyFormat::Plain);

        let windowed = RecordKey::Windowed {
            key: Value::from("k1"),
            window: TimeWindow::new(1000, 2000),
        };
        assert_eq!(windowed.window().map(|w| w.start_ms), Some(1000));
        assert_eq!(windowed.to_string(), "k1@[1000, 2000)");
    }
}
