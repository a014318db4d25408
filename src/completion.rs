//! Autocomplete support for prompt arguments and resource references.
//!
//! The index is static: it maps an argument name to its candidate values
//! and is read-only after startup. Filtering is a case-sensitive prefix
//! match in both the resource and the prompt-argument branch.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::McpError;

/// Reference type for resource completions.
pub const REF_RESOURCE: &str = "ref/resource";
/// Reference type for prompt-argument completions.
pub const REF_PROMPT: &str = "ref/prompt";

/// Completion key conventionally tied to resource identifiers.
const RESOURCE_ID_KEY: &str = "resourceId";

/// Parameters of a `completion/complete` request.
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteParams {
    /// What is being completed: a prompt argument or a resource reference.
    #[serde(rename = "ref")]
    pub reference: CompletionReference,
    /// The argument under completion and the partial input typed so far.
    pub argument: CompletionArgument,
}

/// A completion reference.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionReference {
    /// Reference kind: `ref/resource` or `ref/prompt`.
    #[serde(rename = "type")]
    pub ref_type: String,
    /// Resource URI, for `ref/resource`.
    #[serde(default)]
    pub uri: Option<String>,
    /// Prompt name, for `ref/prompt`.
    #[serde(default)]
    pub name: Option<String>,
}

/// The argument being completed.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionArgument {
    /// Argument name.
    pub name: String,
    /// Partial input to filter candidates against.
    pub value: String,
}

/// A completion answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    /// Candidate values matching the partial input.
    pub values: Vec<String>,
    /// Whether more candidates exist beyond `values`.
    pub has_more: bool,
    /// Total number of matches.
    pub total: usize,
}

/// Static argument-name to candidate-value index.
#[derive(Debug)]
pub struct CompletionIndex {
    entries: HashMap<&'static str, Vec<&'static str>>,
}

impl CompletionIndex {
    /// Builds the index with the example candidate lists.
    #[must_use]
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert("style", vec!["casual", "formal", "technical", "friendly"]);
        entries.insert("temperature", vec!["0", "0.5", "0.7", "1.0"]);
        entries.insert(RESOURCE_ID_KEY, vec!["1", "2", "3", "4", "5"]);
        Self { entries }
    }

    /// Answers a completion request.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::UnknownArgument`] for a prompt argument with no
    /// candidate list, and [`McpError::UnsupportedReferenceType`] for any
    /// reference kind other than `ref/resource` or `ref/prompt`.
    pub fn complete(&self, params: &CompleteParams) -> Result<Completion, McpError> {
        match params.reference.ref_type.as_str() {
            REF_RESOURCE => {
                // Resource references complete against resource identifiers
                let candidates = &self.entries[RESOURCE_ID_KEY];
                Ok(filter_by_prefix(candidates, &params.argument.value))
            }
            REF_PROMPT => {
                let candidates = self
                    .entries
                    .get(params.argument.name.as_str())
                    .ok_or_else(|| McpError::UnknownArgument {
                        name: params.argument.name.clone(),
                    })?;
                Ok(filter_by_prefix(candidates, &params.argument.value))
            }
            other => Err(McpError::UnsupportedReferenceType {
                ref_type: other.to_string(),
            }),
        }
    }
}

impl Default for CompletionIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Case-sensitive prefix filter shared by both reference branches.
fn filter_by_prefix(candidates: &[&str], partial: &str) -> Completion {
    let values: Vec<String> = candidates
        .iter()
        .filter(|candidate| candidate.starts_with(partial))
        .map(|candidate| (*candidate).to_string())
        .collect();
    let total = values.len();

    Completion {
        values,
        has_more: false,
        total,
    }
}
