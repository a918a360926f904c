use std::collections::{BTreeMap, BTreeSet};

use modkit_openapi::Tag;
use parking_lot::Mutex;

use crate::endpoint::EndpointDescription;

/// Collects operation tags for one document build.
#[derive(Debug, Default)]
pub struct TagAccumulator {
    seen: Mutex<BTreeSet<Tag>>,
}

impl TagAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags of `endpoint` in declaration order, falling back to its controller name.
    /// Every returned tag is recorded.
    pub fn capture(&self, endpoint: &EndpointDescription) -> Vec<String> {
        let tags: Vec<String> = if endpoint.tags.is_empty() {
            endpoint.controller.iter().cloned().collect()
        } else {
            let mut unique = Vec::with_capacity(endpoint.tags.len());
            for tag in &endpoint.tags {
                if !unique.contains(tag) {
                    unique.push(tag.clone());
                }
            }
            unique
        };

        let mut seen = self.seen.lock();
        for tag in &tags {
            seen.insert(Tag::new(tag.clone()));
        }
        tags
    }

    /// Document-level tags sorted by name, with configured descriptions attached.
    pub fn tags(&self, descriptions: &BTreeMap<String, String>) -> Vec<Tag> {
        self.seen
            .lock()
            .iter()
            .map(|tag| Tag {
                name: tag.name.clone(),
                description: descriptions.get(&tag.name).cloned(),
            })
            .collect()
    }
}
