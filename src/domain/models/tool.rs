#[cfg(test)]
#[path = "tool_test.rs"]
mod tests;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use serde_json::Value;

use super::View;
use super::Widget;

/// Result sent back to a provider when a tool handler fails.
pub const TOOL_FAILURE_RESULT: &str = "Failed to execute tool";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

impl ToolCall {
    pub fn new(id: &str, name: &str, args: Value) -> ToolCall {
        return ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            args,
        };
    }

    /// Providers may omit call ids, fall back to the position in the turn.
    pub fn fallback_id(index: usize) -> String {
        return format!("call-{index}");
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolOutcome {
    Success(String),
    Failure(String),
}

impl ToolOutcome {
    pub fn to_json(&self) -> Value {
        return match self {
            ToolOutcome::Success(result) => json!({ "result": result }),
            ToolOutcome::Failure(error) => json!({ "error": error }),
        };
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn new(call: &ToolCall, outcome: ToolOutcome) -> ToolResult {
        return ToolResult {
            call_id: call.id.to_string(),
            name: call.name.to_string(),
            outcome,
        };
    }
}

/// Tool calls of a finished first phase, paired with their results.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolContinuation {
    pub calls: Vec<ToolCall>,
    pub results: Vec<ToolResult>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolParameter {
    pub name: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// All parameters are required strings.
    pub parameters: Vec<ToolParameter>,
}

impl ToolDeclaration {
    pub fn new(name: &str, description: &str) -> ToolDeclaration {
        return ToolDeclaration {
            name: name.to_string(),
            description: description.to_string(),
            parameters: vec![],
        };
    }

    pub fn with_parameter(mut self, name: &str, description: &str) -> ToolDeclaration {
        self.parameters.push(ToolParameter {
            name: name.to_string(),
            description: description.to_string(),
        });
        return self;
    }

    fn schema(&self, object_type: &str, string_type: &str) -> Value {
        let mut properties = serde_json::Map::new();
        for param in self.parameters.iter() {
            properties.insert(
                param.name.to_string(),
                json!({ "type": string_type, "description": param.description }),
            );
        }
        let required = self
            .parameters
            .iter()
            .map(|param| return param.name.to_string())
            .collect::<Vec<String>>();

        return json!({
            "type": object_type,
            "properties": properties,
            "required": required,
        });
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolFormat {
    OpenAi,
    Gemini,
}

impl ToolFormat {
    pub fn render(&self, declarations: &[ToolDeclaration]) -> Value {
        return match self {
            ToolFormat::OpenAi => render_openai(declarations),
            ToolFormat::Gemini => render_gemini(declarations),
        };
    }
}

fn render_openai(declarations: &[ToolDeclaration]) -> Value {
    let tools = declarations
        .iter()
        .map(|decl| {
            return json!({
                "type": "function",
                "function": {
                    "name": decl.name,
                    "description": decl.description,
                    "parameters": decl.schema("object", "string"),
                }
            });
        })
        .collect::<Vec<Value>>();

    return Value::Array(tools);
}

// Parameterless functions leave out `parameters` entirely, Gemini rejects
// empty OBJECT schemas.
fn render_gemini(declarations: &[ToolDeclaration]) -> Value {
    let functions = declarations
        .iter()
        .map(|decl| {
            let mut function = json!({
                "name": decl.name,
                "description": decl.description,
            });
            if !decl.parameters.is_empty() {
                function["parameters"] = decl.schema("OBJECT", "STRING");
            }
            return function;
        })
        .collect::<Vec<Value>>();

    return json!([{ "functionDeclarations": functions }]);
}

/// UI visible effect of a tool, delivered to whoever owns the view state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolEffect {
    OpenContact,
    ShowWidget(Widget),
    Navigate(View),
}

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, call: &ToolCall) -> Result<String>;
}
