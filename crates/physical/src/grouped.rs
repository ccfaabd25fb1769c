use std::fmt;
use std::sync::Arc;

use ssq_execution::{GroupByMapper, StreamRuntime};
use ssq_planner::{KeyField, KeyFormat};

use crate::node::PlanNode;

/// A stream grouped for aggregation.
///
/// Not a plan node itself: it renders through the node it was grouped from
/// and becomes part of the plan once aggregated.
pub struct GroupedStream<R: StreamRuntime> {
    pub(crate) source: Arc<PlanNode<R>>,
    pub(crate) key_field: KeyField,
    pub(crate) key_format: KeyFormat,
    pub(crate) key_mapper: Option<Arc<GroupByMapper>>,
    pub(crate) handle: R::Grouped,
}

impl<R: StreamRuntime> GroupedStream<R> {
    /// The node that was grouped.
    pub fn source(&self) -> &Arc<PlanNode<R>> {
        &self.source
    }

    /// The reused key, or the synthetic composite key after a repartition.
    pub fn key_field(&self) -> &KeyField {
        &self.key_field
    }

    pub fn key_format(&self) -> KeyFormat {
        self.key_format
    }

    /// Whether grouping required a repartition.
    pub fn is_repartitioned(&self) -> bool {
        self.key_mapper.is_some()
    }

    /// Composite-key function of a repartitioned grouping.
    pub fn key_mapper(&self) -> Option<&Arc<GroupByMapper>> {
        self.key_mapper.as_ref()
    }

    pub fn handle(&self) -> &R::Grouped {
        &self.handle
    }
}

impl<R: StreamRuntime> fmt::Debug for GroupedStream<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupedStream")
            .field("source", &self.source.id())
            .field("key_field", &self.key_field.to_string())
            .field("key_format", &self.key_format)
            .field("repartitioned", &self.is_repartitioned())
            .finish()
    }
}
