//! Identifier newtypes for pipeline entities.
//!
//! [`NodeId`] and [`LinkId`] are distinct wrappers over `u32` so that a node id
//! cannot be passed where an edge id is expected. Both are drawn from a single
//! [`IdAllocator`] per pipeline, so a node and an edge never share a value.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a node within its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Identifier of an edge registered in a pipeline's edge table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkId(pub u32);

/// Arena slot of a link. Never serialized and never reused within a pipeline.
///
/// Two port slots holding the same `LinkKey` refer to the same link object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkKey(pub(crate) u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic id source shared by nodes and edges.
///
/// Once `u32::MAX` has been handed out or reserved the allocator is
/// exhausted and [`allocate`](Self::allocate) returns `None`.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: Option<u32>,
}

impl Default for IdAllocator {
    fn default() -> Self {
        IdAllocator { next: Some(0) }
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out the next unused raw id.
    pub fn allocate(&mut self) -> Option<u32> {
        let id = self.next?;
        self.next = id.checked_add(1);
        Some(id)
    }

    /// Records an externally chosen id so later allocations stay above it.
    pub fn reserve(&mut self, id: u32) {
        self.next = match (self.next, id.checked_add(1)) {
            (Some(next), Some(after)) => Some(next.max(after)),
            _ => None,
        };
    }

    /// The value the next call to [`allocate`](Self::allocate) returns.
    pub fn peek(&self) -> Option<u32> {
        self.next
    }
}
