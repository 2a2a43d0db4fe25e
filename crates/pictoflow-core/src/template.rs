//! Operation templates and the registry that names them.
//!
//! A [`NodeTemplate`] describes one kind of operation: its ordered input and
//! output ports (each a [`LinkTemplate`] with a default value), the symbolic
//! names some ports carry for override binding, and the processing function
//! supplied by the embedding operation library. The engine never looks at what
//! the processing function computes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{GraphError, ProcessError};
use crate::link::{Link, PortDirection};

/// Processing function of a template: ordered input links and the node's
/// metadata in, ordered output values out.
pub type ProcessFn<T, M> =
    Arc<dyn Fn(&[&Link<T, M>], &M) -> Result<Vec<T>, ProcessError> + Send + Sync>;

/// Immutable descriptor of a single port.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkTemplate<T, M> {
    default_value: T,
    metadata: M,
    name: Option<String>,
}

impl<T, M> LinkTemplate<T, M> {
    pub fn new(metadata: M, default_value: T) -> Self {
        LinkTemplate {
            default_value,
            metadata,
            name: None,
        }
    }

    /// Gives the port a symbolic name so node overrides can target it.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn default_value(&self) -> &T {
        &self.default_value
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Immutable descriptor of an operation kind.
///
/// Built with [`NodeTemplate::new`] and the [`input`](Self::input) /
/// [`output`](Self::output) builder methods; the index-to-name maps used for
/// override binding are filled from the names of the pushed port templates.
pub struct NodeTemplate<T, M> {
    inputs: Vec<Arc<LinkTemplate<T, M>>>,
    outputs: Vec<Arc<LinkTemplate<T, M>>>,
    metadata: M,
    input_names: HashMap<usize, String>,
    output_names: HashMap<usize, String>,
    process: ProcessFn<T, M>,
}

impl<T, M> NodeTemplate<T, M> {
    pub fn new<F>(metadata: M, process: F) -> Self
    where
        F: Fn(&[&Link<T, M>], &M) -> Result<Vec<T>, ProcessError> + Send + Sync + 'static,
    {
        NodeTemplate {
            inputs: Vec::new(),
            outputs: Vec::new(),
            metadata,
            input_names: HashMap::new(),
            output_names: HashMap::new(),
            process: Arc::new(process),
        }
    }

    /// Appends an input port.
    pub fn input(mut self, port: LinkTemplate<T, M>) -> Self {
        if let Some(name) = port.name() {
            self.input_names.insert(self.inputs.len(), name.to_string());
        }
        self.inputs.push(Arc::new(port));
        self
    }

    /// Appends an output port.
    pub fn output(mut self, port: LinkTemplate<T, M>) -> Self {
        if let Some(name) = port.name() {
            self.output_names.insert(self.outputs.len(), name.to_string());
        }
        self.outputs.push(Arc::new(port));
        self
    }

    pub fn inputs(&self) -> &[Arc<LinkTemplate<T, M>>] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Arc<LinkTemplate<T, M>>] {
        &self.outputs
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    /// Number of ports in the given direction.
    pub fn arity(&self, direction: PortDirection) -> usize {
        match direction {
            PortDirection::Input => self.inputs.len(),
            PortDirection::Output => self.outputs.len(),
        }
    }

    /// Port template at `index`, if within arity.
    pub fn port(&self, direction: PortDirection, index: usize) -> Option<&Arc<LinkTemplate<T, M>>> {
        match direction {
            PortDirection::Input => self.inputs.get(index),
            PortDirection::Output => self.outputs.get(index),
        }
    }

    /// Symbolic name bound to a port, if any.
    pub fn port_name(&self, direction: PortDirection, index: usize) -> Option<&str> {
        let names = match direction {
            PortDirection::Input => &self.input_names,
            PortDirection::Output => &self.output_names,
        };
        names.get(&index).map(String::as_str)
    }

    pub(crate) fn process(&self, inputs: &[&Link<T, M>], metadata: &M) -> Result<Vec<T>, ProcessError> {
        (self.process)(inputs, metadata)
    }
}

impl<T, M: fmt::Debug> fmt::Debug for NodeTemplate<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeTemplate")
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .field("metadata", &self.metadata)
            .field("input_names", &self.input_names)
            .field("output_names", &self.output_names)
            .finish_non_exhaustive()
    }
}

/// Catalog of node templates keyed by name.
///
/// Populated once by the operation library, then shared (behind an `Arc`)
/// by every pipeline built against it.
pub struct TemplateRegistry<T, M> {
    templates: IndexMap<String, Arc<NodeTemplate<T, M>>>,
}

impl<T, M> TemplateRegistry<T, M> {
    pub fn new() -> Self {
        TemplateRegistry {
            templates: IndexMap::new(),
        }
    }

    /// Stores `template` under `name`, returning any template it replaced.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        template: NodeTemplate<T, M>,
    ) -> Option<Arc<NodeTemplate<T, M>>> {
        self.templates.insert(name.into(), Arc::new(template))
    }

    /// Looks up a template by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<NodeTemplate<T, M>>, GraphError> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| GraphError::UnknownTemplate {
                name: name.to_string(),
            })
    }

    /// Registered template names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl<T, M> Default for TemplateRegistry<T, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, M: fmt::Debug> fmt::Debug for TemplateRegistry<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.templates.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passthrough() -> NodeTemplate<i32, ()> {
        NodeTemplate::new((), |inputs: &[&Link<i32, ()>], _: &()| {
            Ok(inputs.iter().map(|link| *link.value()).collect())
        })
        .input(LinkTemplate::new((), 0).named("value"))
        .output(LinkTemplate::new((), -1))
    }

    #[test]
    fn register_then_resolve() {
        let mut registry = TemplateRegistry::new();
        assert!(registry.register("pass", passthrough()).is_none());

        let template = registry.resolve("pass").unwrap();
        assert_eq!(template.arity(PortDirection::Input), 1);
        assert_eq!(template.arity(PortDirection::Output), 1);
        assert_eq!(*template.inputs()[0].default_value(), 0);
    }

    #[test]
    fn resolve_unknown_template_errors() {
        let registry: TemplateRegistry<i32, ()> = TemplateRegistry::new();
        match registry.resolve("Missing") {
            Err(GraphError::UnknownTemplate { name }) => assert_eq!(name, "Missing"),
            other => panic!("expected UnknownTemplate, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn register_replaces_existing_template() {
        let mut registry = TemplateRegistry::new();
        registry.register("pass", passthrough());
        let previous = registry.register(
            "pass",
            NodeTemplate::new((), |_: &[&Link<i32, ()>], _: &()| Ok(vec![])),
        );
        assert!(previous.is_some());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("pass").unwrap().arity(PortDirection::Input), 0);
    }

    #[test]
    fn names_enumerates_every_template() {
        let mut registry = TemplateRegistry::new();
        registry.register("a", passthrough());
        registry.register("b", passthrough());
        let mut names: Vec<&str> = registry.names().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn port_names_follow_link_templates() {
        let template = passthrough();
        assert_eq!(template.port_name(PortDirection::Input, 0), Some("value"));
        assert_eq!(template.port_name(PortDirection::Output, 0), None);
        assert!(template.port(PortDirection::Input, 1).is_none());
    }
}
