//! Build-scoped registry of distinct schema shapes.
//!
//! Registration runs concurrently from endpoint tasks; resolution runs afterwards from the
//! single rewrite pass. The store never holds a map guard while calling back into itself.

use std::collections::HashMap;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::document::Document;
use crate::error::DocumentError;
use crate::naming;
use crate::schema::{NodeId, SchemaNode};
use crate::shape::{shape_hash, shapes_equal, ShapeHash};

/// Occurrence count from which a shape becomes a shared component.
pub const REFERENCE_THRESHOLD: usize = 2;

/// Address of one shape: its hash plus the position inside the hash bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeKey {
    pub hash: ShapeHash,
    slot: usize,
}

#[derive(Debug)]
struct ShapeEntry {
    canonical: SchemaNode,
    occurrences: usize,
    hint: Option<String>,
    reference_id: Option<String>,
}

/// Result of [`SchemaStore::register`].
#[derive(Debug, Clone)]
pub struct Registration {
    pub key: ShapeKey,
    pub canonical: SchemaNode,
    pub occurrences: usize,
}

/// What the rewrite pass should put at a schema position.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Keep the schema inline.
    Inline,
    /// Replace with `$ref` to `id`; `canonical` is the body for `components.schemas`.
    Reference { id: String, canonical: SchemaNode },
}

#[derive(Default)]
pub struct SchemaStore {
    shapes: DashMap<ShapeHash, Vec<ShapeEntry>>,
    node_shapes: DashMap<NodeId, ShapeKey>,
    /// Id → owning shape. `None` marks an id reserved by the caller.
    reference_ids: Mutex<HashMap<String, Option<ShapeKey>>>,
}

impl SchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence of `node`'s shape.
    ///
    /// Returns `None` for reference pointers, which are never registered.
    pub fn register(&self, node: &SchemaNode, hint: Option<&str>) -> Option<Registration> {
        if node.is_reference() {
            return None;
        }
        let hash = shape_hash(node);
        let hint = hint.map(naming::sanitize).filter(|h| !h.is_empty());

        let registration = {
            let mut bucket = self.shapes.entry(hash).or_default();
            let slot = match bucket
                .iter()
                .position(|e| e.canonical.id() == node.id() || shapes_equal(&e.canonical, node))
            {
                Some(slot) => slot,
                None => {
                    bucket.push(ShapeEntry {
                        canonical: node.clone(),
                        occurrences: 0,
                        hint: None,
                        reference_id: None,
                    });
                    bucket.len() - 1
                }
            };
            let entry = &mut bucket[slot];
            entry.occurrences += 1;
            if let Some(hint) = hint {
                // Registration order is not deterministic; the smallest explicit hint wins
                if entry.hint.as_ref().map_or(true, |current| hint < *current) {
                    entry.hint = Some(hint);
                }
            }
            Registration {
                key: ShapeKey { hash, slot },
                canonical: entry.canonical.clone(),
                occurrences: entry.occurrences,
            }
        };

        self.node_shapes.insert(node.id(), registration.key);
        tracing::trace!(
            shape = %hash.short(),
            node = %node.id(),
            occurrences = registration.occurrences,
            "registered schema shape"
        );
        Some(registration)
    }

    /// Register `root` and every schema reachable from it.
    pub fn populate(&self, root: &SchemaNode) {
        self.populate_named(root, None);
    }

    /// Like [`populate`](Self::populate), with an explicit hint for `root` only.
    pub fn populate_named(&self, root: &SchemaNode, hint: Option<&str>) {
        let mut walking = Vec::new();
        self.walk(root, hint, &mut walking);
    }

    fn walk(&self, node: &SchemaNode, hint: Option<&str>, walking: &mut Vec<NodeId>) {
        if self.register(node, hint).is_none() {
            return;
        }
        if walking.contains(&node.id()) {
            return;
        }
        walking.push(node.id());
        let children = node.read().children();
        for (_, child) in children {
            self.walk(&child, None, walking);
        }
        walking.pop();
    }

    /// Decide whether `node` stays inline or becomes a `$ref`.
    ///
    /// Ids are assigned lazily on first resolution, so the resolve order fixes the
    /// suffixes handed out on base-name collisions.
    pub fn resolve(&self, node: &SchemaNode) -> Result<Resolution, DocumentError> {
        let Some(key) = self.key_of(node) else {
            return Ok(Resolution::Inline);
        };
        let Some((canonical, occurrences, assigned)) = self.snapshot(key) else {
            return Ok(Resolution::Inline);
        };
        if occurrences < REFERENCE_THRESHOLD {
            return Ok(Resolution::Inline);
        }
        if let Some(id) = assigned {
            return Ok(Resolution::Reference { id, canonical });
        }

        let base = match self.hint_of(key) {
            Some(hint) => hint,
            None => naming::derive_hint(&canonical, &|n| self.known_name(n)),
        };
        let id = self.assign_reference_id(key, &base)?;
        Ok(Resolution::Reference { id, canonical })
    }

    fn assign_reference_id(&self, key: ShapeKey, base: &str) -> Result<String, DocumentError> {
        let mut taken = self.reference_ids.lock();
        if let Some((id, _)) = taken.iter().find(|(_, owner)| **owner == Some(key)) {
            return Ok(id.clone());
        }
        let id = (1..=u32::MAX)
            .map(|n| candidate(base, n))
            .find(|c| !taken.contains_key(c))
            .ok_or_else(|| DocumentError::ReferenceIdExhausted {
                base: base.to_string(),
            })?;
        taken.insert(id.clone(), Some(key));

        if let Some(mut bucket) = self.shapes.get_mut(&key.hash) {
            if let Some(entry) = bucket.get_mut(key.slot) {
                entry.reference_id = Some(id.clone());
            }
        }
        tracing::debug!(shape = %key.hash.short(), id = %id, "assigned schema reference id");
        Ok(id)
    }

    /// Mark `id` as taken so no shape is assigned it. Returns `false` when the id was
    /// already taken.
    pub fn reserve(&self, id: impl Into<String>) -> bool {
        let id = id.into();
        let mut taken = self.reference_ids.lock();
        if taken.contains_key(&id) {
            return false;
        }
        tracing::debug!(id = %id, "reserved schema reference id");
        taken.insert(id, None);
        true
    }

    /// Reserve every id `document` already uses so generated ids never overwrite them.
    pub fn reserve_existing(&self, document: &Document) {
        for id in document.existing_reference_ids() {
            self.reserve(id);
        }
    }

    fn key_of(&self, node: &SchemaNode) -> Option<ShapeKey> {
        if let Some(key) = self.node_shapes.get(&node.id()) {
            return Some(*key);
        }
        let hash = shape_hash(node);
        let bucket = self.shapes.get(&hash)?;
        bucket
            .iter()
            .position(|e| shapes_equal(&e.canonical, node))
            .map(|slot| ShapeKey { hash, slot })
    }

    fn snapshot(&self, key: ShapeKey) -> Option<(SchemaNode, usize, Option<String>)> {
        let bucket = self.shapes.get(&key.hash)?;
        let entry = bucket.get(key.slot)?;
        Some((entry.canonical.clone(), entry.occurrences, entry.reference_id.clone()))
    }

    fn hint_of(&self, key: ShapeKey) -> Option<String> {
        let bucket = self.shapes.get(&key.hash)?;
        bucket.get(key.slot)?.hint.clone()
    }

    /// Name already attached to `node`'s shape: its reference id, else its hint.
    fn known_name(&self, node: &SchemaNode) -> Option<String> {
        let key = self.key_of(node)?;
        let bucket = self.shapes.get(&key.hash)?;
        let entry = bucket.get(key.slot)?;
        entry.reference_id.clone().or_else(|| entry.hint.clone())
    }

    /// Number of distinct shapes.
    pub fn len(&self) -> usize {
        self.shapes.iter().map(|bucket| bucket.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn occurrences(&self, node: &SchemaNode) -> usize {
        self.key_of(node)
            .and_then(|key| self.snapshot(key))
            .map_or(0, |(_, occurrences, _)| occurrences)
    }

    /// Reference id assigned so far to `node`'s shape, if any.
    pub fn reference_id(&self, node: &SchemaNode) -> Option<String> {
        self.key_of(node)
            .and_then(|key| self.snapshot(key))
            .and_then(|(_, _, id)| id)
    }

    pub fn shape_key(&self, node: &SchemaNode) -> Option<ShapeKey> {
        self.key_of(node)
    }
}

fn candidate(base: &str, n: u32) -> String {
    if n == 1 {
        base.to_string()
    } else {
        format!("{base}{n}")
    }
}
