//! Demo operation library.
//!
//! Every template describes its transform symbolically: values are JSON, an
//! image is whatever its source node was given (usually an id or a path), and
//! each operation wraps its inputs in a marker string such as `invert(img-1)`.

use std::sync::Arc;

use serde_json::{json, Value};

use pictoflow_core::{Link, LinkTemplate, NodeTemplate, ProcessError, TemplateRegistry};

pub type Registry = TemplateRegistry<Value, Value>;

fn port(default: Value) -> LinkTemplate<Value, Value> {
    LinkTemplate::new(Value::Null, default)
}

/// Renders a value inside a marker: strings bare, everything else as JSON.
fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn marker(op: &str, inputs: &[&Link<Value, Value>]) -> Result<Vec<Value>, ProcessError> {
    let args: Vec<String> = inputs.iter().map(|link| describe(link.value())).collect();
    Ok(vec![json!(format!("{}({})", op, args.join(",")))])
}

fn pass_through(inputs: &[&Link<Value, Value>], _: &Value) -> Result<Vec<Value>, ProcessError> {
    Ok(vec![inputs[0].value().clone()])
}

pub fn build() -> Arc<Registry> {
    let mut registry = Registry::new();

    registry.register(
        "ImgSrc",
        NodeTemplate::new(Value::Null, pass_through)
            .input(port(json!(-1)).named("image"))
            .output(port(Value::Null).named("image")),
    );
    registry.register(
        "ImgOut",
        NodeTemplate::new(Value::Null, pass_through)
            .input(port(Value::Null))
            .output(port(json!(-1))),
    );
    registry.register(
        "Invert",
        NodeTemplate::new(Value::Null, |inputs: &[&Link<Value, Value>], _: &Value| {
            marker("invert", inputs)
        })
        .input(port(Value::Null))
        .output(port(Value::Null)),
    );
    registry.register(
        "CompOver",
        NodeTemplate::new(Value::Null, |inputs: &[&Link<Value, Value>], _: &Value| {
            marker("over", inputs)
        })
        .input(port(Value::Null))
        .input(port(Value::Null))
        .output(port(Value::Null)),
    );
    registry.register(
        "BrightCont",
        NodeTemplate::new(Value::Null, |inputs: &[&Link<Value, Value>], _: &Value| {
            marker("brightness_contrast", inputs)
        })
        .input(port(Value::Null))
        .input(port(json!(0.0)).named("brightness"))
        .input(port(json!(0.0)).named("contrast"))
        .output(port(Value::Null)),
    );
    registry.register(
        "GaussBlur",
        NodeTemplate::new(Value::Null, |inputs: &[&Link<Value, Value>], _: &Value| {
            if inputs[1..].iter().any(|link| link.value().as_f64().is_some_and(|v| v < 0.0)) {
                return Err("standard deviation must not be negative".into());
            }
            marker("gaussian_blur", inputs)
        })
        .input(port(Value::Null))
        .input(port(json!(1.0)).named("std_dev_x"))
        .input(port(json!(1.0)).named("std_dev_y"))
        .output(port(Value::Null)),
    );

    Arc::new(registry)
}
