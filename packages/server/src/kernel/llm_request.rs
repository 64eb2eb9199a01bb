// Typed structured output on top of BaseAI
//
// Response types derive `JsonSchema + Deserialize`; the schema is generated
// from the type and tightened for OpenAI strict mode before it is sent.

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use super::{BaseAI, Completion};

#[derive(Debug, Error)]
pub enum StructuredOutputError {
    #[error("structured output request failed: {0}")]
    Request(#[from] anyhow::Error),

    #[error("failed to parse {type_name} from model output: {source}")]
    Parse {
        type_name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A parsed structured response plus what it cost.
#[derive(Debug, Clone)]
pub struct Structured<T> {
    pub value: T,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Trait for types that can be used as structured output.
///
/// Automatically implemented for any type that implements `JsonSchema + DeserializeOwned`.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    /// Strict-mode schema: every object closed and every property required.
    fn strict_schema() -> serde_json::Value {
        let mut value = serde_json::to_value(schema_for!(Self)).unwrap_or_default();
        close_objects(&mut value);
        if let serde_json::Value::Object(map) = &mut value {
            map.remove("$schema");
        }
        value
    }

    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

fn close_objects(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if map.get("type").and_then(|t| t.as_str()) == Some("object") {
                map.insert(
                    "additionalProperties".to_string(),
                    serde_json::Value::Bool(false),
                );
                if let Some(serde_json::Value::Object(props)) = map.get("properties") {
                    let required = props
                        .keys()
                        .cloned()
                        .map(serde_json::Value::String)
                        .collect();
                    map.insert("required".to_string(), serde_json::Value::Array(required));
                }
            }
            for child in map.values_mut() {
                close_objects(child);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                close_objects(item);
            }
        }
        _ => {}
    }
}

/// Ask `ai` for a `T`, parsing the JSON it returns.
pub async fn extract<T: StructuredOutput>(
    ai: &dyn BaseAI,
    system_prompt: &str,
    user_prompt: &str,
) -> Result<Structured<T>, StructuredOutputError> {
    let Completion {
        content,
        prompt_tokens,
        completion_tokens,
    } = ai
        .generate_structured(system_prompt, user_prompt, T::strict_schema())
        .await?;

    debug!(
        type_name = %T::type_name(),
        response_length = content.len(),
        "structured output received"
    );

    let value = serde_json::from_str(&content).map_err(|source| StructuredOutputError::Parse {
        type_name: T::type_name(),
        source,
    })?;

    Ok(Structured {
        value,
        prompt_tokens,
        completion_tokens,
    })
}
