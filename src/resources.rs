//! Resource catalogue: one direct resource, one template, and a generated
//! set of derived resources addressed through the template.
//!
//! The catalogue is built once at startup and is read-only afterwards.
//! Template URIs carry a 1-based index into the generated set; whether a
//! read returns text or a base64 blob is decided solely by the entry's
//! MIME type, never by content inspection.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use serde::Serialize;

use crate::error::McpError;

/// URI of the single direct resource.
pub const DIRECT_RESOURCE_URI: &str = "test://direct/text/resource";

/// URI prefix shared by all template-addressed resources.
pub const TEMPLATE_URI_PREFIX: &str = "test://template/resource/";

/// Number of generated resources reachable through the template.
pub const GENERATED_RESOURCE_COUNT: usize = 100;

const TEXT_MIME: &str = "text/plain";
const BLOB_MIME: &str = "application/octet-stream";

/// A catalogued resource. Immutable once listed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEntry {
    /// Unique resource URI.
    pub uri: String,
    /// Human-readable name.
    pub name: String,
    /// Description; for generated resources this doubles as the payload.
    pub description: String,
    /// MIME type deciding the text/blob rendering branch.
    pub mime_type: String,
}

/// A parametrised resource template with one placeholder.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplateEntry {
    /// URI pattern with an `{id}` placeholder.
    pub uri_template: String,
    /// Human-readable name.
    pub name: String,
    /// Description of the template.
    pub description: String,
}

/// Contents returned by a resource read.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResourceContent {
    /// Literal text contents.
    Text {
        /// The resource URI.
        uri: String,
        /// The catalogue entry's MIME type.
        #[serde(rename = "mimeType")]
        mime_type: String,
        /// The text payload.
        text: String,
    },
    /// Base64-encoded binary contents.
    Blob {
        /// The resource URI.
        uri: String,
        /// The catalogue entry's MIME type.
        #[serde(rename = "mimeType")]
        mime_type: String,
        /// The base64 payload.
        blob: String,
    },
}

impl ResourceContent {
    /// Returns the MIME type of these contents.
    #[must_use]
    pub fn mime_type(&self) -> &str {
        match self {
            Self::Text { mime_type, .. } | Self::Blob { mime_type, .. } => mime_type,
        }
    }
}

/// Result of a `resources/read` request.
#[derive(Debug, Clone, Serialize)]
pub struct ReadResourceResult {
    /// The resolved contents.
    pub contents: Vec<ResourceContent>,
}

/// The static resource catalogue.
#[derive(Debug)]
pub struct ResourceCatalog {
    direct: ResourceEntry,
    generated: Vec<ResourceEntry>,
}

impl ResourceCatalog {
    /// Builds the catalogue: the direct resource plus the generated set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            direct: ResourceEntry {
                uri: DIRECT_RESOURCE_URI.to_string(),
                name: "Direct Text Resource".to_string(),
                description: "A direct text resource".to_string(),
                mime_type: TEXT_MIME.to_string(),
            },
            generated: generate_resources(),
        }
    }

    /// Returns the resources exposed by `resources/list`.
    ///
    /// The generated set is reachable through the template only, so the
    /// listing contains just the direct resource.
    #[must_use]
    pub fn list(&self) -> Vec<&ResourceEntry> {
        vec![&self.direct]
    }

    /// Returns the resource templates exposed by `resources/templates/list`.
    #[must_use]
    pub fn templates(&self) -> Vec<ResourceTemplateEntry> {
        vec![ResourceTemplateEntry {
            uri_template: format!("{TEMPLATE_URI_PREFIX}{{id}}"),
            name: "Template Resource".to_string(),
            description: "A template resource with a numeric ID".to_string(),
        }]
    }

    /// Returns the generated resource entries (template-addressed).
    #[must_use]
    pub fn generated(&self) -> &[ResourceEntry] {
        &self.generated
    }

    /// Resolves a URI to resource contents.
    ///
    /// Checks the direct resource first; otherwise the URI must carry the
    /// template prefix followed by a 1-based index into the generated set.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::UnknownResource`] for a wrong prefix, a
    /// non-numeric suffix, or an out-of-range index.
    pub fn read(&self, uri: &str) -> Result<ReadResourceResult, McpError> {
        if uri == DIRECT_RESOURCE_URI {
            return Ok(ReadResourceResult {
                contents: vec![ResourceContent::Text {
                    uri: uri.to_string(),
                    mime_type: TEXT_MIME.to_string(),
                    text: "This is a direct resource".to_string(),
                }],
            });
        }

        let entry = self.resolve_template(uri)?;

        let content = if entry.mime_type == TEXT_MIME {
            ResourceContent::Text {
                uri: entry.uri.clone(),
                mime_type: entry.mime_type.clone(),
                text: entry.description.clone(),
            }
        } else {
            ResourceContent::Blob {
                uri: entry.uri.clone(),
                mime_type: entry.mime_type.clone(),
                blob: entry.description.clone(),
            }
        };

        Ok(ReadResourceResult {
            contents: vec![content],
        })
    }

    fn resolve_template(&self, uri: &str) -> Result<&ResourceEntry, McpError> {
        let unknown = || McpError::UnknownResource {
            uri: uri.to_string(),
        };

        let suffix = uri.strip_prefix(TEMPLATE_URI_PREFIX).ok_or_else(unknown)?;
        let id: usize = suffix.parse().map_err(|_| unknown())?;

        // 1-based on the wire, 0-based into the generated list
        let index = id.checked_sub(1).ok_or_else(unknown)?;
        self.generated.get(index).ok_or_else(unknown)
    }
}

impl Default for ResourceCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Generates the derived resource list.
///
/// Odd IDs are plaintext, even IDs are base64 blobs; the payload lives in
/// the entry's description.
fn generate_resources() -> Vec<ResourceEntry> {
    (1..=GENERATED_RESOURCE_COUNT)
        .map(|id| {
            let uri = format!("{TEMPLATE_URI_PREFIX}{id}");
            let name = format!("Generated Resource {id}");
            if id % 2 == 1 {
                ResourceEntry {
                    uri,
                    name,
                    description: format!("Resource {id}: This is a plaintext resource"),
                    mime_type: TEXT_MIME.to_string(),
                }
            } else {
                let payload = format!("Resource {id}: This is a base64 blob");
                ResourceEntry {
                    uri,
                    name,
                    description: BASE64_STANDARD.encode(payload),
                    mime_type: BLOB_MIME.to_string(),
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_resource_reads_as_text() {
        let catalog = ResourceCatalog::new();
        let result = catalog.read(DIRECT_RESOURCE_URI).unwrap();

        assert_eq!(result.contents.len(), 1);
        let ResourceContent::Text { text, mime_type, .. } = &result.contents[0] else {
            panic!("Expected text contents");
        };
        assert_eq!(text, "This is a direct resource");
        assert_eq!(mime_type, TEXT_MIME);
    }

    #[test]
    fn read_round_trip_preserves_mime_type() {
        let catalog = ResourceCatalog::new();

        for entry in catalog.generated() {
            let result = catalog.read(&entry.uri).unwrap();
            assert_eq!(
                result.contents[0].mime_type(),
                entry.mime_type,
                "MIME mismatch for {}",
                entry.uri
            );
        }
    }

    #[test]
    fn odd_ids_are_text_even_ids_are_blobs() {
        let catalog = ResourceCatalog::new();

        let result = catalog.read("test://template/resource/1").unwrap();
        assert!(matches!(result.contents[0], ResourceContent::Text { .. }));

        let result = catalog.read("test://template/resource/2").unwrap();
        assert!(matches!(result.contents[0], ResourceContent::Blob { .. }));
    }

    #[test]
    fn template_index_boundaries() {
        let catalog = ResourceCatalog::new();

        // 0 and count+1 are both out of range
        assert!(matches!(
            catalog.read("test://template/resource/0"),
            Err(McpError::UnknownResource { .. })
        ));
        let past_end = format!("{TEMPLATE_URI_PREFIX}{}", GENERATED_RESOURCE_COUNT + 1);
        assert!(matches!(
            catalog.read(&past_end),
            Err(McpError::UnknownResource { .. })
        ));

        // Every index in 1..=count resolves
        for id in 1..=GENERATED_RESOURCE_COUNT {
            let uri = format!("{TEMPLATE_URI_PREFIX}{id}");
            assert!(catalog.read(&uri).is_ok(), "index {id} should resolve");
        }
    }

    #[test]
    fn non_numeric_suffix_is_unknown_resource() {
        let catalog = ResourceCatalog::new();
        let err = catalog.read("test://template/resource/abc").unwrap_err();

        let McpError::UnknownResource { uri } = err else {
            panic!("Expected UnknownResource, got {err:?}");
        };
        assert_eq!(uri, "test://template/resource/abc");
    }

    #[test]
    fn wrong_prefix_is_unknown_resource() {
        let catalog = ResourceCatalog::new();
        assert!(matches!(
            catalog.read("test://other/resource/1"),
            Err(McpError::UnknownResource { .. })
        ));
    }

    #[test]
    fn listing_contains_only_the_direct_resource() {
        let catalog = ResourceCatalog::new();
        let listed = catalog.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].uri, DIRECT_RESOURCE_URI);
    }

    #[test]
    fn template_listing_has_one_placeholder() {
        let catalog = ResourceCatalog::new();
        let templates = catalog.templates();
        assert_eq!(templates.len(), 1);
        assert_eq!(
            templates[0].uri_template,
            "test://template/resource/{id}"
        );
    }

    #[test]
    fn blob_payloads_are_valid_base64() {
        let catalog = ResourceCatalog::new();
        let result = catalog.read("test://template/resource/2").unwrap();

        let ResourceContent::Blob { blob, .. } = &result.contents[0] else {
            panic!("Expected blob contents");
        };
        let decoded = BASE64_STANDARD.decode(blob).unwrap();
        let text = String::from_utf8(decoded).unwrap();
        assert_eq!(text, "Resource 2: This is a base64 blob");
    }
}
