//! JSON document codec for pipelines.
//!
//! A pipeline document has three top-level fields:
//!
//! ```json
//! {
//!   "nodes":  [{"id": 0, "template": "ImgSrc", "metadata": {}, "overrides": {"image": "img-1"}}],
//!   "links":  [{"id": 2, "from": 0, "fromIndex": 0, "to": 1, "toIndex": 0, "metadata": {}}],
//!   "output": 1
//! }
//! ```
//!
//! Decoding creates every node under its serialized id before any edge is
//! bound, then links, then designates the output. Link entries without both
//! endpoints are skipped; a node entry that is incomplete or names an unknown
//! template fails the whole decode. Node and edge ids share one id space: a
//! serialized link id already held by a node or an earlier edge is replaced
//! with a freshly allocated one. Computed values are never persisted,
//! only literals set on bound links (`defaultValue`).

use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::GraphError;
use crate::id::{LinkId, NodeId};
use crate::pipeline::Pipeline;
use crate::template::TemplateRegistry;

/// Serialized form of a whole pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize, M: Serialize",
    deserialize = "T: Deserialize<'de>, M: Deserialize<'de> + Default"
))]
pub struct SerializedPipeline<T, M> {
    pub nodes: Vec<SerializedNode<T, M>>,
    #[serde(default)]
    pub links: Vec<SerializedLink<T, M>>,
    /// Absent, `null` and negative numbers all mean no output node.
    #[serde(default, deserialize_with = "lenient_output")]
    pub output: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize, M: Serialize",
    deserialize = "T: Deserialize<'de>, M: Deserialize<'de> + Default"
))]
pub struct SerializedNode<T, M> {
    pub id: NodeId,
    pub template: String,
    #[serde(default)]
    pub metadata: M,
    #[serde(default, alias = "values")]
    pub overrides: IndexMap<String, T>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(
    serialize = "T: Serialize, M: Serialize",
    deserialize = "T: Deserialize<'de>, M: Deserialize<'de> + Default"
))]
pub struct SerializedLink<T, M> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<LinkId>,
    #[serde(default)]
    pub from: Option<NodeId>,
    #[serde(default)]
    pub from_index: Option<usize>,
    #[serde(default)]
    pub to: Option<NodeId>,
    #[serde(default)]
    pub to_index: Option<usize>,
    #[serde(default)]
    pub metadata: M,
    /// Literal set on the link, re-applied after linking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<T>,
}

fn lenient_output<'de, D>(deserializer: D) -> Result<Option<NodeId>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<i64>::deserialize(deserializer)? {
        Some(raw) if raw >= 0 => u32::try_from(raw)
            .map(|id| Some(NodeId(id)))
            .map_err(|_| D::Error::custom(format!("output id {raw} out of range"))),
        _ => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Captures the structure of a pipeline: nodes, edges and output designation.
pub fn encode<T: Clone, M: Clone>(pipeline: &Pipeline<T, M>) -> SerializedPipeline<T, M> {
    let nodes = pipeline
        .nodes()
        .map(|node| SerializedNode {
            id: node.id(),
            template: node.template_name().to_string(),
            metadata: node.metadata().clone(),
            overrides: node.overrides().clone(),
        })
        .collect();

    let links = pipeline
        .links()
        .map(|link| SerializedLink {
            id: link.id(),
            from: link.producer().map(|end| end.node),
            from_index: link.producer().map(|end| end.port),
            to: link.consumer().map(|end| end.node),
            to_index: link.consumer().map(|end| end.port),
            metadata: link.metadata().clone(),
            default_value: link.is_literal().then(|| link.value().clone()),
        })
        .collect();

    SerializedPipeline {
        nodes,
        links,
        output: pipeline.output_node_id(),
    }
}

pub fn encode_value<T, M>(pipeline: &Pipeline<T, M>) -> Result<serde_json::Value, GraphError>
where
    T: Clone + Serialize,
    M: Clone + Serialize,
{
    Ok(serde_json::to_value(encode(pipeline))?)
}

/// Pretty-printed JSON document.
pub fn encode_string<T, M>(pipeline: &Pipeline<T, M>) -> Result<String, GraphError>
where
    T: Clone + Serialize,
    M: Clone + Serialize,
{
    Ok(serde_json::to_string_pretty(&encode(pipeline))?)
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Rebuilds a pipeline against `registry` with the default [`EngineConfig`].
pub fn decode<T: Clone, M: Clone>(
    document: SerializedPipeline<T, M>,
    registry: Arc<TemplateRegistry<T, M>>,
) -> Result<Pipeline<T, M>, GraphError> {
    decode_with_config(document, registry, EngineConfig::default())
}

pub fn decode_with_config<T: Clone, M: Clone>(
    document: SerializedPipeline<T, M>,
    registry: Arc<TemplateRegistry<T, M>>,
    config: EngineConfig,
) -> Result<Pipeline<T, M>, GraphError> {
    let mut pipeline = Pipeline::with_config(registry, config);

    for node in document.nodes {
        pipeline.create_node(&node.template, node.metadata, node.overrides, Some(node.id))?;
    }

    let mut skipped = 0usize;
    for (position, entry) in document.links.into_iter().enumerate() {
        let (Some(from), Some(to)) = (entry.from, entry.to) else {
            warn!(position, "skipping link entry without both endpoints");
            skipped += 1;
            continue;
        };
        let from_index = entry.from_index.ok_or_else(|| GraphError::MalformedDocument {
            reason: format!("link entry {position} has 'from' but no 'fromIndex'"),
        })?;
        let to_index = entry.to_index.ok_or_else(|| GraphError::MalformedDocument {
            reason: format!("link entry {position} has 'to' but no 'toIndex'"),
        })?;

        let id = entry.id.filter(|&id| {
            let taken =
                pipeline.get_node(NodeId(id.0)).is_ok() || pipeline.link_by_id(id).is_ok();
            if taken {
                warn!(link = %id, "link id already in use, allocating a fresh one");
            }
            !taken
        });
        pipeline.link(from, from_index, to, to_index, entry.metadata, id)?;
        if let Some(value) = entry.default_value {
            pipeline.set_input_literal(to, to_index, value)?;
        }
    }

    if let Some(output) = document.output {
        pipeline.set_output_node(output)?;
    }

    debug!(
        nodes = pipeline.node_count(),
        links = pipeline.link_count(),
        skipped,
        "decoded pipeline"
    );
    Ok(pipeline)
}

pub fn decode_value<T, M>(
    value: serde_json::Value,
    registry: Arc<TemplateRegistry<T, M>>,
) -> Result<Pipeline<T, M>, GraphError>
where
    T: Clone + for<'de> Deserialize<'de>,
    M: Clone + Default + for<'de> Deserialize<'de>,
{
    let document: SerializedPipeline<T, M> = serde_json::from_value(value)?;
    decode(document, registry)
}

pub fn decode_str<T, M>(
    json: &str,
    registry: Arc<TemplateRegistry<T, M>>,
) -> Result<Pipeline<T, M>, GraphError>
where
    T: Clone + for<'de> Deserialize<'de>,
    M: Clone + Default + for<'de> Deserialize<'de>,
{
    let document: SerializedPipeline<T, M> = serde_json::from_str(json)?;
    decode(document, registry)
}
