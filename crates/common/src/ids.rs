//! Typed identifiers shared by plan builders and runtimes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Builder-unique identity of a physical plan node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(
    /// Raw numeric id value.
    pub u64,
);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}
