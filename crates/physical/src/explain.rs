//! Text dump of a plan tree.
//!
//! Each node renders as `{indent} > [ KIND ] Schema: [..].` followed by its
//! upstream nodes, each prefixed with a tab and the current indent and
//! rendered one tab deeper. A node with an attached sink is preceded by a
//! `SINK` line carrying the sink's value schema.

use std::fmt;

use ssq_execution::StreamRuntime;
use ssq_planner::schema_definition_string;

use crate::node::{PlanKind, PlanNode};
use crate::sink::SinkAttachments;

/// Lazily rendered execution plan; the text is produced by `Display`.
pub struct ExecutionPlan<'a, R: StreamRuntime> {
    root: &'a PlanNode<R>,
    sinks: Option<&'a SinkAttachments<R::Serde>>,
    indent: String,
}

impl<'a, R: StreamRuntime> ExecutionPlan<'a, R> {
    pub(crate) fn new(root: &'a PlanNode<R>, indent: &str) -> Self {
        Self {
            root,
            sinks: None,
            indent: indent.to_string(),
        }
    }

    /// Also render sink attachments found in the tree.
    pub fn with_sinks(mut self, sinks: &'a SinkAttachments<R::Serde>) -> Self {
        self.sinks = Some(sinks);
        self
    }

    fn write_node(
        &self,
        f: &mut fmt::Formatter<'_>,
        node: &PlanNode<R>,
        indent: &str,
    ) -> fmt::Result {
        if let Some(sink) = self.sinks.and_then(|s| s.get(node.id())) {
            writeln!(
                f,
                "{indent} > [ {} ] Schema: {}.",
                PlanKind::Sink,
                schema_definition_string(sink.schema())
            )?;
            write!(f, "\t{indent}")?;
            return self.write_operator(f, node, &format!("{indent}\t"));
        }
        self.write_operator(f, node, indent)
    }

    fn write_operator(
        &self,
        f: &mut fmt::Formatter<'_>,
        node: &PlanNode<R>,
        indent: &str,
    ) -> fmt::Result {
        writeln!(
            f,
            "{indent} > [ {} ] Schema: {}.",
            node.kind(),
            schema_definition_string(node.schema())
        )?;
        for upstream in node.upstream() {
            write!(f, "\t{indent}")?;
            self.write_node(f, upstream, &format!("{indent}\t"))?;
        }
        Ok(())
    }
}

impl<R: StreamRuntime> fmt::Display for ExecutionPlan<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_node(f, self.root, &self.indent)
    }
}
