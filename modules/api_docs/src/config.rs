use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Name of the document built when none is configured.
pub const DEFAULT_DOCUMENT: &str = "v1";

/// `modules.api_docs` configuration section.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ApiDocsConfig {
    /// Overrides `app.name` in document titles.
    #[serde(default)]
    pub app_name: Option<String>,
    /// Document name → settings. Empty means a single `v1` document.
    #[serde(default)]
    pub documents: BTreeMap<String, DocumentConfig>,
    /// Tag name → description for document-level tags.
    #[serde(default)]
    pub tag_descriptions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DocumentConfig {
    /// Full title; default is `"<app> | <document>"`.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Only endpoints whose path starts with one of these prefixes.
    #[serde(default)]
    pub path_prefixes: Vec<String>,
    /// Only endpoints carrying at least one of these tags.
    #[serde(default)]
    pub include_tags: Vec<String>,
}

impl ApiDocsConfig {
    /// Configured document names, or `v1` when none are configured.
    pub fn document_names(&self) -> Vec<String> {
        if self.documents.is_empty() {
            vec![DEFAULT_DOCUMENT.to_string()]
        } else {
            self.documents.keys().cloned().collect()
        }
    }

    pub fn document(&self, name: &str) -> Option<DocumentConfig> {
        match self.documents.get(name) {
            Some(doc) => Some(doc.clone()),
            None if self.documents.is_empty() && name == DEFAULT_DOCUMENT => {
                Some(DocumentConfig::default())
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_a_single_v1_document() {
        let cfg = ApiDocsConfig::default();
        assert_eq!(cfg.document_names(), vec!["v1".to_string()]);
        assert!(cfg.document("v1").is_some());
        assert!(cfg.document("v2").is_none());
    }

    #[test]
    fn parses_yaml_section() {
        let cfg: ApiDocsConfig = serde_yaml::from_str(
            r#"
app_name: "Shop"
documents:
  public:
    version: "2.0.0"
    path_prefixes: ["/todos"]
  internal:
    include_tags: ["admin"]
tag_descriptions:
  todos: "Todo items"
"#,
        )
        .unwrap();

        assert_eq!(cfg.document_names(), vec!["internal".to_string(), "public".to_string()]);
        assert_eq!(cfg.document("public").unwrap().version.as_deref(), Some("2.0.0"));
        assert!(cfg.document("v1").is_none());
        assert_eq!(cfg.tag_descriptions["todos"], "Todo items");
    }

    #[test]
    fn rejects_unknown_fields() {
        let result: Result<ApiDocsConfig, _> = serde_yaml::from_str("bind_addr: \"0.0.0.0\"\n");
        assert!(result.is_err());
    }
}
