//! Physical plan nodes.

use std::fmt;
use std::sync::Arc;

use arrow_schema::SchemaRef;
use ssq_common::NodeId;
use ssq_execution::{Aggregator, GroupByMapper, RekeyMapper, SelectValueMapper, SqlPredicate};
use ssq_execution::{StreamRuntime, ValueJoiner};
use ssq_planner::{schema_definition_string, JoinKind, JoinWindow, KeyField, KeyFormat};

use crate::explain::ExecutionPlan;

/// Operator tag rendered in execution plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanKind {
    Source,
    Project,
    Filter,
    Aggregate,
    Sink,
    Rekey,
    Join,
    ToStream,
}

impl fmt::Display for PlanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlanKind::Source => "SOURCE",
            PlanKind::Project => "PROJECT",
            PlanKind::Filter => "FILTER",
            PlanKind::Aggregate => "AGGREGATE",
            PlanKind::Sink => "SINK",
            PlanKind::Rekey => "REKEY",
            PlanKind::Join => "JOIN",
            PlanKind::ToStream => "TOSTREAM",
        })
    }
}

/// Runtime object behind a node.
pub enum DataflowHandle<R: StreamRuntime> {
    Stream(R::Stream),
    Table(R::Table),
}

impl<R: StreamRuntime> DataflowHandle<R> {
    pub fn as_stream(&self) -> Option<&R::Stream> {
        match self {
            DataflowHandle::Stream(s) => Some(s),
            DataflowHandle::Table(_) => None,
        }
    }

    pub fn as_table(&self) -> Option<&R::Table> {
        match self {
            DataflowHandle::Stream(_) => None,
            DataflowHandle::Table(t) => Some(t),
        }
    }
}

/// What a node does, with the inputs and row functions it owns.
pub enum PlanOp<R: StreamRuntime> {
    Source {
        topic: String,
    },
    Project {
        input: Arc<PlanNode<R>>,
        mapper: Arc<SelectValueMapper>,
    },
    Filter {
        input: Arc<PlanNode<R>>,
        predicate: Arc<SqlPredicate>,
    },
    Rekey {
        input: Arc<PlanNode<R>>,
        rekey: RekeyMapper,
    },
    Join {
        left: Arc<PlanNode<R>>,
        right: Arc<PlanNode<R>>,
        kind: JoinKind,
        window: Option<JoinWindow>,
        joiner: ValueJoiner,
    },
    Aggregate {
        input: Arc<PlanNode<R>>,
        /// Composite-key function when the grouping repartitioned the input.
        group_key: Option<Arc<GroupByMapper>>,
        aggregator: Arc<Aggregator>,
    },
    ToStream {
        input: Arc<PlanNode<R>>,
    },
}

impl<R: StreamRuntime> PlanOp<R> {
    pub fn kind(&self) -> PlanKind {
        match self {
            PlanOp::Source { .. } => PlanKind::Source,
            PlanOp::Project { .. } => PlanKind::Project,
            PlanOp::Filter { .. } => PlanKind::Filter,
            PlanOp::Rekey { .. } => PlanKind::Rekey,
            PlanOp::Join { .. } => PlanKind::Join,
            PlanOp::Aggregate { .. } => PlanKind::Aggregate,
            PlanOp::ToStream { .. } => PlanKind::ToStream,
        }
    }

    /// Upstream nodes, left first for joins.
    pub fn upstream(&self) -> Vec<&Arc<PlanNode<R>>> {
        match self {
            PlanOp::Source { .. } => Vec::new(),
            PlanOp::Project { input, .. }
            | PlanOp::Filter { input, .. }
            | PlanOp::Rekey { input, .. }
            | PlanOp::Aggregate { input, .. }
            | PlanOp::ToStream { input } => vec![input],
            PlanOp::Join { left, right, .. } => vec![left, right],
        }
    }
}

/// One streaming operator of a physical plan.
///
/// Nodes are immutable once built. Any change of schema, key or operator
/// produces a new node; sinks are recorded outside the node.
pub struct PlanNode<R: StreamRuntime> {
    pub(crate) id: NodeId,
    pub(crate) schema: SchemaRef,
    pub(crate) key_field: Option<KeyField>,
    pub(crate) key_format: KeyFormat,
    pub(crate) op: PlanOp<R>,
    pub(crate) handle: DataflowHandle<R>,
}

impl<R: StreamRuntime> PlanNode<R> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// The partitioning key; `None` when the node is unkeyed.
    pub fn key_field(&self) -> Option<&KeyField> {
        self.key_field.as_ref()
    }

    pub fn key_format(&self) -> KeyFormat {
        self.key_format
    }

    pub fn kind(&self) -> PlanKind {
        self.op.kind()
    }

    pub fn op(&self) -> &PlanOp<R> {
        &self.op
    }

    pub fn handle(&self) -> &DataflowHandle<R> {
        &self.handle
    }

    pub fn is_table(&self) -> bool {
        matches!(self.handle, DataflowHandle::Table(_))
    }

    pub fn upstream(&self) -> Vec<&Arc<PlanNode<R>>> {
        self.op.upstream()
    }

    /// Plan dump rooted at this node.
    pub fn execution_plan<'a>(&'a self, indent: &str) -> ExecutionPlan<'a, R> {
        ExecutionPlan::new(self, indent)
    }
}

impl<R: StreamRuntime> fmt::Debug for PlanNode<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanNode")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("form", &if self.is_table() { "table" } else { "stream" })
            .field("schema", &schema_definition_string(&self.schema))
            .field(
                "key_field",
                &self.key_field.as_ref().map(|k| k.to_string()),
            )
            .field("key_format", &self.key_format)
            .field(
                "upstream",
                &self.upstream().iter().map(|n| n.id).collect::<Vec<_>>(),
            )
            .finish()
    }
}
