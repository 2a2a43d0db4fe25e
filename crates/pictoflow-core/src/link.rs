//! Links: the stateful, cacheable edges of a pipeline.
//!
//! A [`Link`] connects one node's output port (its producer) to another node's
//! input port (its consumer). Either end may be unconnected. Links live in the
//! pipeline's arena; a bound link is referenced by key from both the producer's
//! output slot and the consumer's input slot, so the value cached on it is seen
//! identically from either end.
//!
//! The pull entry point is [`Pipeline::get_value`](crate::pipeline::Pipeline::get_value),
//! which hydrates the producer before reading; [`Link::value`] is the raw
//! cached read.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::id::{LinkId, NodeId};
use crate::template::LinkTemplate;

/// Which side of a node a port sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => f.write_str("input"),
            PortDirection::Output => f.write_str("output"),
        }
    }
}

/// One end of a link: a node and a port index on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub node: NodeId,
    pub port: usize,
}

/// A typed edge carrying a cached value.
#[derive(Debug, Clone)]
pub struct Link<T, M> {
    /// Edge-table id; `None` until the link is bound by `Pipeline::link`.
    id: Option<LinkId>,
    template: Arc<LinkTemplate<T, M>>,
    producer: Option<Endpoint>,
    consumer: Option<Endpoint>,
    value: T,
    /// Set until the value has been hydrated.
    dirty: bool,
    /// The value was supplied by the caller rather than the template default
    /// or a producer.
    literal: bool,
    /// Bumped on every change of `value`.
    version: u64,
    metadata: M,
}

impl<T: Clone, M: Clone> Link<T, M> {
    /// Creates an unconnected link holding the template's default value.
    pub fn new(template: Arc<LinkTemplate<T, M>>, id: Option<LinkId>) -> Self {
        Link {
            id,
            value: template.default_value().clone(),
            metadata: template.metadata().clone(),
            template,
            producer: None,
            consumer: None,
            dirty: true,
            literal: false,
            version: 0,
        }
    }
}

impl<T, M> Link<T, M> {
    pub fn id(&self) -> Option<LinkId> {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: Option<LinkId>) {
        self.id = id;
    }

    pub fn template(&self) -> &Arc<LinkTemplate<T, M>> {
        &self.template
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    pub(crate) fn set_metadata(&mut self, metadata: M) {
        self.metadata = metadata;
    }

    pub fn connect_producer(&mut self, node: NodeId, output_index: usize) {
        self.producer = Some(Endpoint {
            node,
            port: output_index,
        });
    }

    pub fn connect_consumer(&mut self, node: NodeId, input_index: usize) {
        self.consumer = Some(Endpoint {
            node,
            port: input_index,
        });
    }

    pub fn disconnect_producer(&mut self) {
        self.producer = None;
    }

    pub fn disconnect_consumer(&mut self) {
        self.consumer = None;
    }

    pub fn is_producer_connected(&self) -> bool {
        self.producer.is_some()
    }

    pub fn is_consumer_connected(&self) -> bool {
        self.consumer.is_some()
    }

    pub fn producer(&self) -> Option<Endpoint> {
        self.producer
    }

    pub fn consumer(&self) -> Option<Endpoint> {
        self.consumer
    }

    /// Bound into the graph on both ends.
    pub fn is_bound(&self) -> bool {
        self.producer.is_some() && self.consumer.is_some()
    }

    /// Overwrites the cached value with a caller-supplied constant.
    pub fn set_literal(&mut self, value: T) {
        self.value = value;
        self.dirty = true;
        self.literal = true;
        self.version += 1;
    }

    /// Whether the cached value came from [`set_literal`](Self::set_literal).
    pub fn is_literal(&self) -> bool {
        self.literal
    }

    /// The cached value, without hydrating anything.
    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Counter bumped whenever the cached value changes.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Stores a freshly computed value and marks it clean.
    pub(crate) fn store(&mut self, value: T) {
        self.value = value;
        self.dirty = false;
        self.literal = false;
        self.version += 1;
    }

    /// Replaces the value on a detached copy handed to a processing function
    /// in place of an overridden input. The version is left alone.
    pub(crate) fn force(&mut self, value: T) {
        self.value = value;
        self.dirty = false;
    }

    /// Marks the value stale after the upstream side changed.
    pub(crate) fn mark_stale(&mut self) {
        self.dirty = true;
        self.version += 1;
    }
}

impl<T: Clone, M: Clone> Link<T, M> {
    /// Drops any literal or computed value and restores template defaults.
    pub(crate) fn reset(&mut self) {
        self.value = self.template.default_value().clone();
        self.metadata = self.template.metadata().clone();
        self.literal = false;
        self.mark_stale();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Link<&'static str, u8> {
        Link::new(Arc::new(LinkTemplate::new(7, "default")), None)
    }

    #[test]
    fn new_link_is_unconnected_dirty_default() {
        let link = fresh();
        assert!(!link.is_producer_connected());
        assert!(!link.is_consumer_connected());
        assert!(link.is_dirty());
        assert!(!link.is_literal());
        assert_eq!(*link.value(), "default");
        assert_eq!(*link.metadata(), 7);
        assert_eq!(link.id(), None);
    }

    #[test]
    fn connect_and_disconnect_only_touch_endpoints() {
        let mut link = fresh();
        link.connect_producer(NodeId(1), 0);
        link.connect_consumer(NodeId(2), 3);
        assert!(link.is_bound());
        assert_eq!(
            link.consumer(),
            Some(Endpoint {
                node: NodeId(2),
                port: 3
            })
        );

        link.disconnect_producer();
        assert!(!link.is_producer_connected());
        assert!(link.is_consumer_connected());
        assert!(link.is_dirty());
        assert_eq!(link.version(), 0);

        link.disconnect_consumer();
        assert!(!link.is_consumer_connected());
    }

    #[test]
    fn set_literal_marks_dirty_and_custom() {
        let mut link = fresh();
        link.clear_dirty();
        link.set_literal("img-1");
        assert!(link.is_dirty());
        assert!(link.is_literal());
        assert_eq!(*link.value(), "img-1");
        assert_eq!(link.version(), 1);
    }

    #[test]
    fn store_clears_dirty_and_bumps_version() {
        let mut link = fresh();
        link.store("computed");
        assert!(!link.is_dirty());
        assert!(!link.is_literal());
        assert_eq!(link.version(), 1);
    }

    #[test]
    fn reset_restores_template_state() {
        let mut link = fresh();
        link.set_literal("custom");
        link.set_metadata(9);
        link.reset();
        assert_eq!(*link.value(), "default");
        assert_eq!(*link.metadata(), 7);
        assert!(!link.is_literal());
        assert!(link.is_dirty());
    }

    #[test]
    fn direction_display() {
        assert_eq!(PortDirection::Input.to_string(), "input");
        assert_eq!(PortDirection::Output.to_string(), "output");
    }
}
