//! Sink attachments, kept beside the plan rather than inside its nodes.

use std::collections::{BTreeMap, BTreeSet};

use arrow_schema::SchemaRef;
use ssq_common::{NodeId, Result, SsqError};

/// Caller's description of an output topic.
#[derive(Debug, Clone)]
pub struct SinkRequest<S> {
    pub topic: String,
    pub value_serde: S,
    /// Columns of the node's rows that are not written to the value.
    pub rowkey_indexes: BTreeSet<usize>,
    /// Defaults to the configured sink partitions.
    pub partitions: Option<u32>,
    /// Defaults to the configured sink replicas.
    pub replicas: Option<u16>,
}

impl<S> SinkRequest<S> {
    pub fn new(topic: impl Into<String>, value_serde: S) -> Self {
        Self {
            topic: topic.into(),
            value_serde,
            rowkey_indexes: BTreeSet::new(),
            partitions: None,
            replicas: None,
        }
    }

    pub fn without_columns(mut self, indexes: impl IntoIterator<Item = usize>) -> Self {
        self.rowkey_indexes.extend(indexes);
        self
    }
}

/// A sink attached to a plan node.
#[derive(Debug, Clone)]
pub struct SinkAttachment<S> {
    pub(crate) node: NodeId,
    pub(crate) topic: String,
    pub(crate) value_serde: S,
    pub(crate) rowkey_indexes: BTreeSet<usize>,
    pub(crate) partitions: u32,
    pub(crate) replicas: u16,
    pub(crate) schema: SchemaRef,
}

impl<S> SinkAttachment<S> {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn value_serde(&self) -> &S {
        &self.value_serde
    }

    pub fn rowkey_indexes(&self) -> &BTreeSet<usize> {
        &self.rowkey_indexes
    }

    pub fn partitions(&self) -> u32 {
        self.partitions
    }

    pub fn replicas(&self) -> u16 {
        self.replicas
    }

    /// Schema of the written values.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }
}

/// Sink attachments by node.
#[derive(Debug, Clone)]
pub struct SinkAttachments<S> {
    by_node: BTreeMap<NodeId, SinkAttachment<S>>,
}

impl<S> Default for SinkAttachments<S> {
    fn default() -> Self {
        Self {
            by_node: BTreeMap::new(),
        }
    }
}

impl<S> SinkAttachments<S> {
    pub fn get(&self, node: NodeId) -> Option<&SinkAttachment<S>> {
        self.by_node.get(&node)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.by_node.contains_key(&node)
    }

    pub fn len(&self) -> usize {
        self.by_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SinkAttachment<S>> {
        self.by_node.values()
    }

    pub(crate) fn insert(&mut self, attachment: SinkAttachment<S>) -> Result<&SinkAttachment<S>> {
        use std::collections::btree_map::Entry;
        match self.by_node.entry(attachment.node) {
            Entry::Occupied(e) => Err(SsqError::UnsupportedShape(format!(
                "{} already writes to sink '{}'",
                e.key(),
                e.get().topic
            ))),
            Entry::Vacant(e) => Ok(e.insert(attachment)),
        }
    }
}
