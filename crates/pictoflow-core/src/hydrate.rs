//! Hydration: recursive pull-and-memoize evaluation.
//!
//! Reading a link through [`Pipeline::get_value`] hydrates the link's producer
//! first. Hydrating a node:
//!
//! 1. For each input port in order, either substitutes the node's override
//!    literal (when the template names the port and the override table has
//!    that name) or pulls the input link, recursively hydrating upstream. An
//!    override is handed to the processing function on a copy of the link and
//!    never written into the graph, so clearing it exposes the upstream or
//!    default value again.
//! 2. Calls the template's processing function with the input links and the
//!    node metadata.
//! 3. Stores each returned value on the matching output link, or the output's
//!    override literal, and clears its dirty flag.
//!
//! Results are memoized. A node re-runs only if it has never run, an input
//! link's version moved since its last run, one of its output links is dirty,
//! or it was invalidated (metadata or override edits, [`Pipeline::invalidate`]).
//! Pulling twice without upstream changes therefore runs every reachable
//! processing function once.

use std::collections::HashSet;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::trace;

use crate::error::GraphError;
use crate::id::{LinkKey, NodeId};
use crate::link::{Link, PortDirection};
use crate::pipeline::Pipeline;

impl<T: Clone, M: Clone> Pipeline<T, M> {
    /// Pulls a link's value, hydrating its producer when connected.
    pub fn get_value(&mut self, key: LinkKey) -> Result<&T, GraphError> {
        let mut visiting = HashSet::new();
        self.pull(key, 0, &mut visiting)?;
        Ok(self.live(key)?.value())
    }

    /// Hydrates a single node and everything upstream of it.
    pub fn hydrate(&mut self, id: NodeId) -> Result<(), GraphError> {
        let mut visiting = HashSet::new();
        self.hydrate_node(id, 0, &mut visiting)
    }

    /// Runs the whole pipeline: pulls the output node's primary output.
    pub fn evaluate(&mut self) -> Result<T, GraphError> {
        let id = self.output_node_id().ok_or(GraphError::NoOutputNode)?;
        let key = self.get_node(id)?.output(0)?;
        self.get_value(key).cloned()
    }

    fn pull(
        &mut self,
        key: LinkKey,
        depth: usize,
        visiting: &mut HashSet<NodeId>,
    ) -> Result<(), GraphError> {
        let producer = self.live(key)?.producer();
        if let Some(producer) = producer {
            self.hydrate_node(producer.node, depth, visiting)?;
        }
        if let Some(link) = self.arena.get_mut(&key) {
            link.clear_dirty();
        }
        Ok(())
    }

    fn hydrate_node(
        &mut self,
        id: NodeId,
        depth: usize,
        visiting: &mut HashSet<NodeId>,
    ) -> Result<(), GraphError> {
        let limit = self.config().max_depth;
        if depth >= limit {
            return Err(GraphError::DepthExceeded { node: id, limit });
        }
        if !visiting.insert(id) {
            return Err(GraphError::CycleDetected { node: id });
        }
        let result = self.run_node(id, depth, visiting);
        visiting.remove(&id);
        result
    }

    fn run_node(
        &mut self,
        id: NodeId,
        depth: usize,
        visiting: &mut HashSet<NodeId>,
    ) -> Result<(), GraphError> {
        let node = self.get_node(id)?;
        let template = Arc::clone(node.template());
        let inputs: SmallVec<[LinkKey; 4]> = SmallVec::from_slice(node.inputs());
        let outputs: SmallVec<[LinkKey; 4]> = SmallVec::from_slice(node.outputs());

        let mut forced: Vec<Option<T>> = Vec::with_capacity(inputs.len());
        for (index, &key) in inputs.iter().enumerate() {
            let value = self
                .get_node(id)?
                .override_for(PortDirection::Input, index)
                .cloned();
            if value.is_none() {
                self.pull(key, depth + 1, visiting)?;
            }
            forced.push(value);
        }

        let versions = inputs
            .iter()
            .map(|&key| self.live(key).map(Link::version))
            .collect::<Result<SmallVec<[u64; 4]>, _>>()?;
        let mut outputs_dirty = false;
        for &key in &outputs {
            outputs_dirty |= self.live(key)?.is_dirty();
        }
        if !outputs_dirty && !self.get_node(id)?.is_stale(&versions) {
            trace!(node = %id, "memoized");
            return Ok(());
        }

        let values = {
            // Overridden inputs reach the processing function as detached
            // copies; the shared link keeps the upstream or default value.
            let mut shadows = Vec::with_capacity(inputs.len());
            for (&key, value) in inputs.iter().zip(forced) {
                let shadow = match value {
                    Some(value) => {
                        let mut link = self.live(key)?.clone();
                        link.force(value);
                        Some(link)
                    }
                    None => None,
                };
                shadows.push(shadow);
            }
            let links = inputs
                .iter()
                .zip(&shadows)
                .map(|(&key, shadow)| match shadow {
                    Some(link) => Ok(link),
                    None => self.live(key),
                })
                .collect::<Result<Vec<_>, _>>()?;
            template
                .process(&links, self.get_node(id)?.metadata())
                .map_err(|source| GraphError::ProcessingFailure { node: id, source })?
        };
        if values.len() != outputs.len() {
            return Err(GraphError::OutputArityMismatch {
                node: id,
                expected: outputs.len(),
                got: values.len(),
            });
        }

        for (index, (&key, computed)) in outputs.iter().zip(values).enumerate() {
            let value = self
                .get_node(id)?
                .override_for(PortDirection::Output, index)
                .cloned()
                .unwrap_or(computed);
            self.arena
                .get_mut(&key)
                .ok_or(GraphError::UnknownLinkKey { key })?
                .store(value);
        }

        self.get_node_mut(id)?.mark_processed(&versions);
        trace!(node = %id, template = self.get_node(id)?.template_name(), "processed");
        Ok(())
    }
}
