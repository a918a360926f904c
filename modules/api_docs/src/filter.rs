use std::fmt;
use std::sync::Arc;

use crate::config::DocumentConfig;
use crate::endpoint::EndpointDescription;
use crate::route::normalize_route_template;

type Predicate = Arc<dyn Fn(&str, &EndpointDescription) -> bool + Send + Sync>;

/// Decides which endpoints belong to a document.
#[derive(Clone)]
pub struct DocumentFilter {
    predicate: Predicate,
}

impl DocumentFilter {
    /// Endpoints without a group, or grouped under the document's name.
    pub fn by_group() -> Self {
        Self::custom(|document, endpoint| {
            endpoint
                .group_name
                .as_deref()
                .map_or(true, |group| group == document)
        })
    }

    /// Group filter narrowed by the document's configured path prefixes and tags.
    pub fn from_config(config: &DocumentConfig) -> Self {
        let prefixes: Vec<String> = config
            .path_prefixes
            .iter()
            .map(|p| normalize_route_template(p))
            .collect();
        let tags = config.include_tags.clone();
        let group = Self::by_group();
        Self::custom(move |document, endpoint| {
            if !group.includes(document, endpoint) {
                return false;
            }
            if !prefixes.is_empty() {
                let path = normalize_route_template(&endpoint.route);
                if !prefixes.iter().any(|prefix| path_has_prefix(&path, prefix)) {
                    return false;
                }
            }
            tags.is_empty() || endpoint.tags.iter().any(|t| tags.contains(t))
        })
    }

    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&str, &EndpointDescription) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    pub fn includes(&self, document: &str, endpoint: &EndpointDescription) -> bool {
        (self.predicate)(document, endpoint)
    }
}

impl Default for DocumentFilter {
    fn default() -> Self {
        Self::by_group()
    }
}

impl fmt::Debug for DocumentFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentFilter").finish_non_exhaustive()
    }
}

/// Segment-aware prefix match: `/todos` covers `/todos` and `/todos/{id}`, not `/todosx`.
fn path_has_prefix(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path == prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
}
