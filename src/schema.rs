//! Tool schema derivation.
//!
//! A [`ToolSchema`] is what the completion gateway advertises to the model
//! for one tool: name, description, and a JSON-schema `object` describing the
//! parameters. Typed tools derive the parameter object from their argument
//! struct via schemars; hand-written tools supply it directly. In both cases
//! the reserved context-variable parameter is stripped before the schema
//! leaves the process — the model is never asked to supply context variables.

use schemars::{gen::SchemaGenerator, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Reserved parameter name under which the run's context is injected into
/// tool arguments. Stripped from every schema advertised to the model.
pub const CONTEXT_VARIABLES_PARAM: &str = "context_variables";

/// Machine-readable description of one tool, as sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSchema {
    /// Derive the advertised schema for a tool, with the reserved context
    /// parameter removed from `properties` and `required`.
    pub fn from_tool(tool: &dyn crate::tool::Tool) -> Self {
        let mut parameters = tool.parameters_schema();
        strip_context_parameter(&mut parameters);
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters,
        }
    }
}

/// Derive a JSON-schema parameter object from a typed argument struct.
///
/// Fields without `Option`/defaults land in `required`; doc comments on the
/// struct's fields become property descriptions.
pub fn parameters_for<A: JsonSchema>() -> Value {
    let root = SchemaGenerator::default().into_root_schema_for::<A>();
    let mut value = serde_json::to_value(root.schema).expect("schema to value");
    if let Some(obj) = value.as_object_mut() {
        obj.remove("title");
        obj.entry("type").or_insert(json!("object"));
        obj.entry("properties").or_insert(json!({}));
    }
    value
}

/// Whether a parameter object declares the reserved context parameter.
pub fn declares_context(parameters: &Value) -> bool {
    parameters
        .get("properties")
        .and_then(Value::as_object)
        .is_some_and(|props| props.contains_key(CONTEXT_VARIABLES_PARAM))
}

/// Remove the reserved context parameter from `properties` and `required`,
/// wherever it is declared.
pub fn strip_context_parameter(parameters: &mut Value) {
    if let Some(props) = parameters
        .get_mut("properties")
        .and_then(Value::as_object_mut)
    {
        props.remove(CONTEXT_VARIABLES_PARAM);
    }
    if let Some(required) = parameters
        .get_mut("required")
        .and_then(Value::as_array_mut)
    {
        required.retain(|entry| entry.as_str() != Some(CONTEXT_VARIABLES_PARAM));
    }
}
