//! Nodes: operation instances bound to a template.
//!
//! A [`Node`] owns its ports as arena keys into the pipeline's link table,
//! never as references. Ports are materialized from the template when the node
//! is created, so `inputs().len()` and `outputs().len()` always equal the
//! template's arity.

use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::error::GraphError;
use crate::id::{LinkKey, NodeId};
use crate::link::PortDirection;
use crate::template::NodeTemplate;

pub(crate) type PortSlots = SmallVec<[LinkKey; 4]>;

/// An operation instance inside a pipeline.
#[derive(Debug)]
pub struct Node<T, M> {
    id: NodeId,
    template_name: String,
    template: Arc<NodeTemplate<T, M>>,
    metadata: M,
    inputs: PortSlots,
    outputs: PortSlots,
    /// Named literals replacing pulled or computed port values.
    overrides: IndexMap<String, T>,
    /// Input versions seen by the last processing run; `None` forces a run.
    processed_with: Option<SmallVec<[u64; 4]>>,
}

impl<T, M> Node<T, M> {
    pub(crate) fn new(
        id: NodeId,
        template_name: String,
        template: Arc<NodeTemplate<T, M>>,
        metadata: M,
        overrides: IndexMap<String, T>,
        inputs: PortSlots,
        outputs: PortSlots,
    ) -> Self {
        Node {
            id,
            template_name,
            template,
            metadata,
            inputs,
            outputs,
            overrides,
            processed_with: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn template_name(&self) -> &str {
        &self.template_name
    }

    pub fn template(&self) -> &Arc<NodeTemplate<T, M>> {
        &self.template
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    pub(crate) fn set_metadata(&mut self, metadata: M) {
        self.metadata = metadata;
        self.invalidate();
    }

    /// Input port slots in port order.
    pub fn inputs(&self) -> &[LinkKey] {
        &self.inputs
    }

    /// Output port slots in port order.
    pub fn outputs(&self) -> &[LinkKey] {
        &self.outputs
    }

    /// Link key at a port, failing on an index beyond the template's arity.
    pub fn port(&self, direction: PortDirection, index: usize) -> Result<LinkKey, GraphError> {
        let slots = match direction {
            PortDirection::Input => &self.inputs,
            PortDirection::Output => &self.outputs,
        };
        slots
            .get(index)
            .copied()
            .ok_or(GraphError::PortIndexOutOfRange {
                node: self.id,
                direction,
                index,
                arity: slots.len(),
            })
    }

    pub fn input(&self, index: usize) -> Result<LinkKey, GraphError> {
        self.port(PortDirection::Input, index)
    }

    pub fn output(&self, index: usize) -> Result<LinkKey, GraphError> {
        self.port(PortDirection::Output, index)
    }

    pub(crate) fn set_port(&mut self, direction: PortDirection, index: usize, key: LinkKey) {
        match direction {
            PortDirection::Input => self.inputs[index] = key,
            PortDirection::Output => self.outputs[index] = key,
        }
    }

    pub fn overrides(&self) -> &IndexMap<String, T> {
        &self.overrides
    }

    pub(crate) fn overrides_mut(&mut self) -> &mut IndexMap<String, T> {
        self.invalidate();
        &mut self.overrides
    }

    /// Override literal for a port, resolved through the template's port name.
    pub fn override_for(&self, direction: PortDirection, index: usize) -> Option<&T> {
        self.template
            .port_name(direction, index)
            .and_then(|name| self.overrides.get(name))
    }

    /// Whether a run is needed given the current input versions.
    pub(crate) fn is_stale(&self, input_versions: &[u64]) -> bool {
        match &self.processed_with {
            Some(seen) => seen.as_slice() != input_versions,
            None => true,
        }
    }

    pub(crate) fn mark_processed(&mut self, input_versions: &[u64]) {
        self.processed_with = Some(SmallVec::from_slice(input_versions));
    }

    /// Forgets the memoized run so the next hydration re-processes.
    pub(crate) fn invalidate(&mut self) {
        self.processed_with = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::Link;
    use crate::template::LinkTemplate;
    use smallvec::smallvec;

    fn blur_template() -> Arc<NodeTemplate<i32, ()>> {
        Arc::new(
            NodeTemplate::new((), |inputs: &[&Link<i32, ()>], _: &()| {
                Ok(vec![*inputs[0].value()])
            })
            .input(LinkTemplate::new((), 0))
            .input(LinkTemplate::new((), 1).named("radius"))
            .output(LinkTemplate::new((), 0)),
        )
    }

    fn node() -> Node<i32, ()> {
        let mut overrides = IndexMap::new();
        overrides.insert("radius".to_string(), 5);
        Node::new(
            NodeId(3),
            "Blur".into(),
            blur_template(),
            (),
            overrides,
            smallvec![LinkKey(0), LinkKey(1)],
            smallvec![LinkKey(2)],
        )
    }

    #[test]
    fn port_lookup_within_arity() {
        let node = node();
        assert_eq!(node.input(1).unwrap(), LinkKey(1));
        assert_eq!(node.output(0).unwrap(), LinkKey(2));
    }

    #[test]
    fn port_lookup_out_of_range_errors() {
        let node = node();
        match node.output(1) {
            Err(GraphError::PortIndexOutOfRange {
                node,
                direction,
                index,
                arity,
            }) => {
                assert_eq!(node, NodeId(3));
                assert_eq!(direction, PortDirection::Output);
                assert_eq!(index, 1);
                assert_eq!(arity, 1);
            }
            other => panic!("expected PortIndexOutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn overrides_bind_through_template_names() {
        let node = node();
        assert_eq!(node.override_for(PortDirection::Input, 1), Some(&5));
        assert_eq!(node.override_for(PortDirection::Input, 0), None);
        assert_eq!(node.override_for(PortDirection::Output, 0), None);
    }

    #[test]
    fn staleness_tracks_input_versions() {
        let mut node = node();
        assert!(node.is_stale(&[0, 0]));

        node.mark_processed(&[0, 0]);
        assert!(!node.is_stale(&[0, 0]));
        assert!(node.is_stale(&[1, 0]));

        node.invalidate();
        assert!(node.is_stale(&[0, 0]));
    }

    #[test]
    fn editing_overrides_invalidates() {
        let mut node = node();
        node.mark_processed(&[0, 0]);
        node.overrides_mut().insert("radius".into(), 9);
        assert!(node.is_stale(&[0, 0]));
    }
}
