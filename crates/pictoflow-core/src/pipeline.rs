//! Pipeline: the graph container.
//!
//! [`Pipeline`] owns every node and every link. Links sit in an arena keyed by
//! [`LinkKey`]; nodes hold keys only. Binding an edge with [`Pipeline::link`]
//! installs the consumer's input link into the producer's output slot, so both
//! slots hold the same key and observe the same cached value.
//!
//! Node ids and edge ids come from one [`IdAllocator`]. An explicit id is
//! decided before the entity is inserted, so the lookup key and the id the
//! entity carries can never disagree.
//!
//! Hydration (the pull side) lives in [`crate::hydrate`].

use std::sync::Arc;

use indexmap::IndexMap;
use petgraph::algo::has_path_connecting;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::GraphError;
use crate::id::{IdAllocator, LinkId, LinkKey, NodeId};
use crate::link::{Endpoint, Link, PortDirection};
use crate::node::{Node, PortSlots};
use crate::template::TemplateRegistry;

/// A graph of operation nodes connected by cached links.
pub struct Pipeline<T, M> {
    registry: Arc<TemplateRegistry<T, M>>,
    config: EngineConfig,
    nodes: IndexMap<NodeId, Node<T, M>>,
    /// Every live link, bound or not.
    pub(crate) arena: IndexMap<LinkKey, Link<T, M>>,
    /// Bound links by edge id, in link order.
    edges: IndexMap<LinkId, LinkKey>,
    ids: IdAllocator,
    next_key: u32,
    output: Option<NodeId>,
}

impl<T: Clone, M: Clone> Pipeline<T, M> {
    /// Creates an empty pipeline with the default [`EngineConfig`].
    pub fn new(registry: Arc<TemplateRegistry<T, M>>) -> Self {
        Self::with_config(registry, EngineConfig::default())
    }

    pub fn with_config(registry: Arc<TemplateRegistry<T, M>>, config: EngineConfig) -> Self {
        Pipeline {
            registry,
            config,
            nodes: IndexMap::new(),
            arena: IndexMap::new(),
            edges: IndexMap::new(),
            ids: IdAllocator::new(),
            next_key: 0,
            output: None,
        }
    }

    pub fn registry(&self) -> &Arc<TemplateRegistry<T, M>> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    /// Instantiates `template` as a new node and returns its id.
    ///
    /// With `explicit_id` the node is created under exactly that id, which
    /// must not be held by any live node or registered edge.
    pub fn create_node(
        &mut self,
        template: &str,
        metadata: M,
        overrides: IndexMap<String, T>,
        explicit_id: Option<NodeId>,
    ) -> Result<NodeId, GraphError> {
        let resolved = self.registry.resolve(template)?;

        let id = match explicit_id {
            Some(id) => {
                self.claim_explicit(id.0)?;
                id
            }
            None => NodeId(self.ids.allocate().ok_or(GraphError::IdSpaceExhausted)?),
        };

        let inputs: PortSlots = resolved
            .inputs()
            .iter()
            .enumerate()
            .map(|(index, port)| {
                let mut link = Link::new(Arc::clone(port), None);
                link.connect_consumer(id, index);
                self.insert_link(link)
            })
            .collect();
        let outputs: PortSlots = resolved
            .outputs()
            .iter()
            .enumerate()
            .map(|(index, port)| {
                let mut link = Link::new(Arc::clone(port), None);
                link.connect_producer(id, index);
                self.insert_link(link)
            })
            .collect();

        let node = Node::new(
            id,
            template.to_string(),
            resolved,
            metadata,
            overrides,
            inputs,
            outputs,
        );
        self.nodes.insert(id, node);
        debug!(node = %id, template, "created node");
        Ok(id)
    }

    /// Removes a node, severing every edge it takes part in.
    ///
    /// Neighbours keep an unconnected port where the edge used to be. Clears
    /// the output designation if it pointed at this node.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node<T, M>, GraphError> {
        let node = self.get_node(id)?;
        let slots: Vec<LinkKey> = node.inputs().iter().chain(node.outputs()).copied().collect();

        for key in slots {
            if self.arena.get(&key).is_some_and(Link::is_bound) {
                self.sever(key)?;
            }
        }

        let node = self
            .nodes
            .shift_remove(&id)
            .ok_or(GraphError::UnknownNode { id })?;
        for key in node.inputs().iter().chain(node.outputs()) {
            self.arena.shift_remove(key);
        }
        if self.output == Some(id) {
            self.output = None;
        }
        debug!(node = %id, "removed node");
        Ok(node)
    }

    /// Looks up a node by id.
    pub fn get_node(&self, id: NodeId) -> Result<&Node<T, M>, GraphError> {
        self.nodes.get(&id).ok_or(GraphError::UnknownNode { id })
    }

    pub(crate) fn get_node_mut(&mut self, id: NodeId) -> Result<&mut Node<T, M>, GraphError> {
        self.nodes.get_mut(&id).ok_or(GraphError::UnknownNode { id })
    }

    /// Every node, in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node<T, M>> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn set_node_metadata(&mut self, id: NodeId, metadata: M) -> Result<(), GraphError> {
        self.get_node_mut(id)?.set_metadata(metadata);
        Ok(())
    }

    /// Replaces the metadata of every node, e.g. with a runtime context after
    /// decoding.
    pub fn set_all_node_metadata(&mut self, metadata: M) {
        for node in self.nodes.values_mut() {
            node.set_metadata(metadata.clone());
        }
    }

    /// Sets a named override literal on a node.
    pub fn set_override(
        &mut self,
        id: NodeId,
        name: impl Into<String>,
        value: T,
    ) -> Result<Option<T>, GraphError> {
        Ok(self.get_node_mut(id)?.overrides_mut().insert(name.into(), value))
    }

    pub fn clear_override(&mut self, id: NodeId, name: &str) -> Result<Option<T>, GraphError> {
        Ok(self.get_node_mut(id)?.overrides_mut().shift_remove(name))
    }

    /// Forgets a node's memoized result so the next pull re-processes it.
    pub fn invalidate(&mut self, id: NodeId) -> Result<(), GraphError> {
        self.get_node_mut(id)?.invalidate();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Output designation
    // -----------------------------------------------------------------------

    pub fn set_output_node(&mut self, id: NodeId) -> Result<(), GraphError> {
        self.get_node(id)?;
        self.output = Some(id);
        Ok(())
    }

    /// The designated output node, if any.
    pub fn output_node(&self) -> Option<&Node<T, M>> {
        self.output.and_then(|id| self.nodes.get(&id))
    }

    pub fn output_node_id(&self) -> Option<NodeId> {
        self.output
    }

    // -----------------------------------------------------------------------
    // Links
    // -----------------------------------------------------------------------

    /// Binds `from`'s output port to `to`'s input port.
    ///
    /// The consumer's existing input link becomes the shared edge: it is
    /// installed into the producer's output slot, stamped with an id and the
    /// given metadata, and registered in the edge table. Both endpoints are
    /// validated before anything is mutated.
    pub fn link(
        &mut self,
        from: NodeId,
        from_port: usize,
        to: NodeId,
        to_port: usize,
        metadata: M,
        explicit_id: Option<LinkId>,
    ) -> Result<LinkId, GraphError> {
        let producer_key = self.get_node(from)?.output(from_port)?;
        let consumer_key = self.get_node(to)?.input(to_port)?;

        if self.live(consumer_key)?.is_producer_connected() {
            return Err(GraphError::PortOccupied {
                node: to,
                direction: PortDirection::Input,
                index: to_port,
            });
        }
        if self.live(producer_key)?.is_consumer_connected() {
            return Err(GraphError::PortOccupied {
                node: from,
                direction: PortDirection::Output,
                index: from_port,
            });
        }
        if self.config.reject_cycles && self.reaches(to, from) {
            return Err(GraphError::CycleDetected { node: to });
        }

        let id = match explicit_id {
            Some(id) => {
                self.claim_explicit(id.0)?;
                id
            }
            None => LinkId(self.ids.allocate().ok_or(GraphError::IdSpaceExhausted)?),
        };

        // The producer's placeholder output link is replaced by the shared one.
        self.arena.shift_remove(&producer_key);
        self.get_node_mut(from)?
            .set_port(PortDirection::Output, from_port, consumer_key);

        let link = self
            .arena
            .get_mut(&consumer_key)
            .ok_or(GraphError::UnknownLinkKey { key: consumer_key })?;
        link.connect_producer(from, from_port);
        link.set_id(Some(id));
        link.set_metadata(metadata);
        link.mark_stale();
        self.edges.insert(id, consumer_key);

        debug!(link = %id, %from, from_port, %to, to_port, "linked");
        Ok(id)
    }

    /// Severs the edge from `from`'s output port to `to`'s input port.
    ///
    /// The consumer keeps its link object, reset to the template default and
    /// unconnected upstream; the producer gets a fresh unconnected output
    /// link. A no-op when the two ports are not linked to each other.
    pub fn unlink(
        &mut self,
        from: NodeId,
        from_port: usize,
        to: NodeId,
        to_port: usize,
    ) -> Result<(), GraphError> {
        self.get_node(from)?.output(from_port)?;
        let consumer_key = self.get_node(to)?.input(to_port)?;

        let expected = Endpoint {
            node: from,
            port: from_port,
        };
        if self.live(consumer_key)?.producer() != Some(expected) {
            return Ok(());
        }
        self.sever(consumer_key)?;
        debug!(%from, from_port, %to, to_port, "unlinked");
        Ok(())
    }

    /// Installs a fresh link from the template at a node's port.
    ///
    /// The previous link leaves this slot. If it is still held by the other
    /// end of an edge it stays alive there; otherwise it is discarded. Either
    /// way it is no longer a registered edge. An explicit `id` is checked
    /// against every node and link like any other explicit id.
    pub fn replace_port(
        &mut self,
        node: NodeId,
        index: usize,
        direction: PortDirection,
        id: Option<LinkId>,
    ) -> Result<LinkKey, GraphError> {
        let target = self.get_node(node)?;
        let old_key = target.port(direction, index)?;
        let template = target
            .template()
            .port(direction, index)
            .cloned()
            .ok_or(GraphError::PortIndexOutOfRange {
                node,
                direction,
                index,
                arity: target.template().arity(direction),
            })?;
        if let Some(id) = id {
            self.claim_explicit(id.0)?;
        }

        let mut fresh = Link::new(template, id);
        match direction {
            PortDirection::Input => fresh.connect_consumer(node, index),
            PortDirection::Output => fresh.connect_producer(node, index),
        }
        let new_key = self.insert_link(fresh);
        self.get_node_mut(node)?.set_port(direction, index, new_key);

        if let Some(old) = self.arena.get_mut(&old_key) {
            match direction {
                PortDirection::Input => old.disconnect_consumer(),
                PortDirection::Output => old.disconnect_producer(),
            }
            if let Some(edge_id) = old.id() {
                old.set_id(None);
                self.edges.shift_remove(&edge_id);
            }
            if !old.is_producer_connected() && !old.is_consumer_connected() {
                self.arena.shift_remove(&old_key);
            }
        }
        Ok(new_key)
    }

    /// Overwrites the value on a node's input link with a caller constant.
    pub fn set_input_literal(&mut self, node: NodeId, port: usize, value: T) -> Result<(), GraphError> {
        let key = self.get_node(node)?.input(port)?;
        self.arena
            .get_mut(&key)
            .ok_or(GraphError::UnknownLinkKey { key })?
            .set_literal(value);
        Ok(())
    }

    pub fn is_input_occupied(&self, node: NodeId, port: usize) -> Result<bool, GraphError> {
        let key = self.get_node(node)?.input(port)?;
        Ok(self.live(key)?.is_producer_connected())
    }

    pub fn is_output_occupied(&self, node: NodeId, port: usize) -> Result<bool, GraphError> {
        let key = self.get_node(node)?.output(port)?;
        Ok(self.live(key)?.is_consumer_connected())
    }

    /// A link by arena key, bound or not.
    pub fn link_at(&self, key: LinkKey) -> Option<&Link<T, M>> {
        self.arena.get(&key)
    }

    /// A registered edge by id.
    pub fn link_by_id(&self, id: LinkId) -> Result<&Link<T, M>, GraphError> {
        self.edges
            .get(&id)
            .and_then(|key| self.arena.get(key))
            .ok_or(GraphError::UnknownLink { id })
    }

    /// Registered edges, in link order.
    pub fn links(&self) -> impl Iterator<Item = &Link<T, M>> {
        self.edges.values().filter_map(|key| self.arena.get(key))
    }

    pub fn link_count(&self) -> usize {
        self.edges.len()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    pub(crate) fn live(&self, key: LinkKey) -> Result<&Link<T, M>, GraphError> {
        self.arena.get(&key).ok_or(GraphError::UnknownLinkKey { key })
    }

    fn insert_link(&mut self, link: Link<T, M>) -> LinkKey {
        let key = LinkKey(self.next_key);
        self.next_key += 1;
        self.arena.insert(key, link);
        key
    }

    /// Accepts an explicit raw id for a node or a link.
    fn claim_explicit(&mut self, raw: u32) -> Result<(), GraphError> {
        let link_id = Some(LinkId(raw));
        if self.nodes.contains_key(&NodeId(raw))
            || self.edges.contains_key(&LinkId(raw))
            || self.arena.values().any(|link| link.id() == link_id)
        {
            return Err(GraphError::DuplicateId { id: raw });
        }
        self.ids.reserve(raw);
        Ok(())
    }

    /// Breaks a bound link at its producer. The consumer keeps the link,
    /// reset to template defaults.
    fn sever(&mut self, key: LinkKey) -> Result<(), GraphError> {
        let producer = self.live(key)?.producer();
        if let Some(Endpoint { node, port }) = producer {
            self.replace_port(node, port, PortDirection::Output, None)?;
        }
        if let Some(link) = self.arena.get_mut(&key) {
            link.reset();
        }
        Ok(())
    }

    /// Whether `target` is reachable downstream from `start` over bound edges.
    fn reaches(&self, start: NodeId, target: NodeId) -> bool {
        if start == target {
            return true;
        }
        let mut graph: DiGraphMap<NodeId, ()> = DiGraphMap::new();
        for link in self.links() {
            if let (Some(producer), Some(consumer)) = (link.producer(), link.consumer()) {
                graph.add_edge(producer.node, consumer.node, ());
            }
        }
        if !graph.contains_node(start) || !graph.contains_node(target) {
            return false;
        }
        has_path_connecting(&graph, start, target, None)
    }
}
