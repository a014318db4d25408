//! Prompt templates exposed through prompts/list and prompts/get.
//!
//! Two prompts: a basic one with no arguments, and a complex one taking a
//! target year and returning a multi-message conversation ending with the
//! embedded community logo.

use serde::Serialize;
use serde_json::Value;

use crate::error::McpError;
use crate::mcp::protocol::Role;

/// Embedded community logo (1x1 PNG), attached to the complex prompt.
const LOGO_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// A prompt definition for the prompts/list response.
#[derive(Debug, Clone, Serialize)]
pub struct PromptDefinition {
    /// Unique prompt name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared arguments.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<PromptArgument>,
}

/// An argument a prompt accepts.
#[derive(Debug, Clone, Serialize)]
pub struct PromptArgument {
    /// Argument name.
    pub name: String,
    /// What the argument means.
    pub description: String,
    /// Whether the argument must be supplied.
    pub required: bool,
}

/// Content of a prompt message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PromptContent {
    /// Text content.
    Text {
        /// The text.
        text: String,
    },
    /// Base64-encoded image content.
    Image {
        /// The base64 payload.
        data: String,
        /// The image MIME type.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

/// A role-tagged message in a prompt conversation.
#[derive(Debug, Clone, Serialize)]
pub struct PromptMessage {
    /// Who authored the message.
    pub role: Role,
    /// The message content.
    pub content: PromptContent,
}

impl PromptMessage {
    fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: PromptContent::Text { text: text.into() },
        }
    }
}

/// Result of a prompts/get request.
#[derive(Debug, Clone, Serialize)]
pub struct GetPromptResult {
    /// Description of the resolved prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The rendered conversation.
    pub messages: Vec<PromptMessage>,
}

/// The static prompt catalogue.
#[derive(Debug)]
pub struct PromptRegistry {
    definitions: Vec<PromptDefinition>,
}

impl PromptRegistry {
    /// Builds the registry.
    ///
    /// # Panics
    ///
    /// Panics if two definitions share a name.
    #[must_use]
    pub fn new() -> Self {
        let definitions = vec![
            PromptDefinition {
                name: "communityBasicPrompt".to_string(),
                description: Some(
                    "A simple prompt without arguments asking for a community summary."
                        .to_string(),
                ),
                arguments: Vec::new(),
            },
            PromptDefinition {
                name: "communityComplexPrompt".to_string(),
                description: Some(
                    "A complex prompt about community events for a given year.".to_string(),
                ),
                arguments: vec![PromptArgument {
                    name: "year".to_string(),
                    description: "The target year for the community events summary".to_string(),
                    required: true,
                }],
            },
        ];

        let mut seen = std::collections::HashSet::new();
        for definition in &definitions {
            assert!(
                seen.insert(definition.name.clone()),
                "duplicate prompt name: {}",
                definition.name
            );
        }

        Self { definitions }
    }

    /// Returns the prompt definitions for prompts/list.
    #[must_use]
    pub fn definitions(&self) -> &[PromptDefinition] {
        &self.definitions
    }

    /// Renders a prompt by name.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::InvalidParams`] for an unknown prompt name or a
    /// missing/non-integer `year` argument on the complex prompt.
    pub fn get(&self, name: &str, arguments: &Value) -> Result<GetPromptResult, McpError> {
        match name {
            "communityBasicPrompt" => Ok(GetPromptResult {
                description: Some("A simple community summary request".to_string()),
                messages: vec![PromptMessage::text(
                    Role::User,
                    "Provide a detailed summary of this developer community, its mission, \
                     and its activities.",
                )],
            }),
            "communityComplexPrompt" => {
                let year = parse_year(arguments)?;
                Ok(GetPromptResult {
                    description: Some(format!("Community events summary for {year}")),
                    messages: vec![
                        PromptMessage::text(
                            Role::User,
                            format!(
                                "Provide a detailed summary of this developer community. \
                                 Include key information about its mission, activities, and \
                                 how it engages with developers. Additionally, summarize its \
                                 {year} events, including key topics, speakers, and any \
                                 notable takeaways."
                            ),
                        ),
                        PromptMessage::text(
                            Role::Assistant,
                            "I understand. You've provided a complex prompt with a year \
                             argument. How would you like me to proceed?",
                        ),
                        PromptMessage {
                            role: Role::User,
                            content: PromptContent::Image {
                                data: LOGO_PNG_BASE64.to_string(),
                                mime_type: "image/png".to_string(),
                            },
                        },
                    ],
                })
            }
            other => Err(McpError::invalid_params(format!(
                "Unknown prompt: {other}"
            ))),
        }
    }
}

impl Default for PromptRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Extracts the required `year` argument, accepting integers or numeric strings.
fn parse_year(arguments: &Value) -> Result<i64, McpError> {
    let year = arguments
        .get("year")
        .ok_or_else(|| McpError::invalid_params("Missing required argument 'year'"))?;

    match year {
        Value::Number(n) if n.is_i64() => Ok(n.as_i64().unwrap_or_default()),
        Value::String(s) => s
            .parse()
            .map_err(|_| McpError::invalid_params("Argument 'year' must be an integer")),
        _ => Err(McpError::invalid_params(
            "Argument 'year' must be an integer",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_lists_both_prompts() {
        let registry = PromptRegistry::new();
        let names: Vec<&str> = registry
            .definitions()
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["communityBasicPrompt", "communityComplexPrompt"]);
    }

    #[test]
    fn basic_prompt_has_one_user_message() {
        let registry = PromptRegistry::new();
        let result = registry.get("communityBasicPrompt", &json!({})).unwrap();

        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].role, Role::User);
    }

    #[test]
    fn complex_prompt_references_the_year_and_ends_with_the_logo() {
        let registry = PromptRegistry::new();
        let result = registry
            .get("communityComplexPrompt", &json!({"year": 2025}))
            .unwrap();

        assert_eq!(result.messages.len(), 3);
        let PromptContent::Text { text } = &result.messages[0].content else {
            panic!("Expected text content");
        };
        assert!(text.contains("2025"));
        assert_eq!(result.messages[1].role, Role::Assistant);
        assert!(matches!(
            result.messages[2].content,
            PromptContent::Image { .. }
        ));
    }

    #[test]
    fn complex_prompt_accepts_string_year() {
        let registry = PromptRegistry::new();
        let result = registry
            .get("communityComplexPrompt", &json!({"year": "2024"}))
            .unwrap();
        let PromptContent::Text { text } = &result.messages[0].content else {
            panic!("Expected text content");
        };
        assert!(text.contains("2024"));
    }

    #[test]
    fn complex_prompt_missing_year_is_invalid() {
        let registry = PromptRegistry::new();
        let err = registry
            .get("communityComplexPrompt", &json!({}))
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidParams { .. }));
        assert!(err.to_string().contains("year"));
    }

    #[test]
    fn unknown_prompt_is_invalid_params() {
        let registry = PromptRegistry::new();
        let err = registry.get("nonexistent", &json!({})).unwrap_err();
        assert!(err.to_string().contains("nonexistent"));
    }

    #[test]
    fn image_content_serialises_with_mime_type() {
        let registry = PromptRegistry::new();
        let result = registry
            .get("communityComplexPrompt", &json!({"year": 2025}))
            .unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["messages"][2]["content"]["type"], "image");
        assert_eq!(json["messages"][2]["content"]["mimeType"], "image/png");
    }
}
