pub mod id;
pub mod config;
pub mod error;
pub mod link;
pub mod template;
pub mod node;
pub mod pipeline;
pub mod hydrate;
pub mod codec;

// Re-export commonly used types
pub use codec::{
    decode, decode_str, decode_value, decode_with_config, encode, encode_string, encode_value,
    SerializedLink, SerializedNode, SerializedPipeline,
};
pub use config::EngineConfig;
pub use error::{GraphError, ProcessError};
pub use id::{LinkId, LinkKey, NodeId};
pub use link::{Endpoint, Link, PortDirection};
pub use node::Node;
pub use pipeline::Pipeline;
pub use template::{LinkTemplate, NodeTemplate, ProcessFn, TemplateRegistry};
