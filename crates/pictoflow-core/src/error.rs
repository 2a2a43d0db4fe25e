//! Error types for pictoflow-core.
//!
//! Uses `thiserror` for structured, matchable variants covering every failure
//! mode of template resolution, graph mutation, hydration and decoding.

use thiserror::Error;

use crate::id::{LinkId, LinkKey, NodeId};
use crate::link::PortDirection;

/// Error raised by an operation's processing function.
pub type ProcessError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced by the pipeline engine.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A template name was not found in the registry.
    #[error("unknown template: '{name}'")]
    UnknownTemplate { name: String },

    /// A node id was not found in the pipeline.
    #[error("unknown node: NodeId({id})")]
    UnknownNode { id: NodeId },

    /// A link id was not found in the edge table.
    #[error("unknown link: LinkId({id})")]
    UnknownLink { id: LinkId },

    /// A link slot that has since been discarded by unlink or node removal.
    #[error("link slot {key:?} is no longer live")]
    UnknownLinkKey { key: LinkKey },

    /// A port index beyond the template's arity.
    #[error("{direction} port {index} out of range on node {node} (arity {arity})")]
    PortIndexOutOfRange {
        node: NodeId,
        direction: PortDirection,
        index: usize,
        arity: usize,
    },

    /// A processing function failed while hydrating a node.
    #[error("processing failed at node {node}: {source}")]
    ProcessingFailure {
        node: NodeId,
        #[source]
        source: ProcessError,
    },

    /// A processing function returned the wrong number of output values.
    #[error("node {node} produced {got} output value(s), template declares {expected}")]
    OutputArityMismatch {
        node: NodeId,
        expected: usize,
        got: usize,
    },

    /// An explicit id is already held by a node or a registered link.
    #[error("duplicate id: {id}")]
    DuplicateId { id: u32 },

    /// Every id in the shared node/edge id space has been handed out.
    #[error("id space exhausted")]
    IdSpaceExhausted,

    /// The port is already bound into an edge.
    #[error("{direction} port {index} on node {node} is already linked")]
    PortOccupied {
        node: NodeId,
        direction: PortDirection,
        index: usize,
    },

    /// An edge would close a cycle, or hydration re-entered a node.
    #[error("cycle detected through node {node}")]
    CycleDetected { node: NodeId },

    /// Hydration recursed deeper than the configured limit.
    #[error("hydration depth limit ({limit}) exceeded at node {node}")]
    DepthExceeded { node: NodeId, limit: usize },

    /// Evaluation was requested without a designated output node.
    #[error("no output node designated")]
    NoOutputNode,

    /// A serialized pipeline is structurally invalid.
    #[error("malformed document: {reason}")]
    MalformedDocument { reason: String },
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        GraphError::MalformedDocument {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_entity() {
        let err = GraphError::UnknownNode { id: NodeId(42) };
        assert_eq!(err.to_string(), "unknown node: NodeId(42)");

        let err = GraphError::PortIndexOutOfRange {
            node: NodeId(3),
            direction: PortDirection::Input,
            index: 2,
            arity: 1,
        };
        assert_eq!(
            err.to_string(),
            "input port 2 out of range on node 3 (arity 1)"
        );
    }

    #[test]
    fn processing_failure_keeps_its_source() {
        use std::error::Error as _;

        let err = GraphError::ProcessingFailure {
            node: NodeId(1),
            source: "bad pixels".into(),
        };
        assert_eq!(err.source().unwrap().to_string(), "bad pixels");
    }

    #[test]
    fn json_errors_become_malformed_document() {
        let err: GraphError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, GraphError::MalformedDocument { .. }));
    }

    #[test]
    fn graph_error_is_send_and_sync() {
        fn assert_send_sync<E: Send + Sync>() {}
        assert_send_sync::<GraphError>();
    }
}
