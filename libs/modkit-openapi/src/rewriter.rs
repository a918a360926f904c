//! Rewrites repeated schemas into `$ref` pointers.
//!
//! The walk replaces slots in place. A node's children are rewritten at most once, keyed by
//! node identity, so shared subtrees and cycles are handled by the same bookkeeping. Write
//! locks are only taken after the children were resolved and never across recursion.

use std::collections::{BTreeMap, HashSet};

use crate::document::Document;
use crate::error::DocumentError;
use crate::schema::{NodeId, SchemaNode};
use crate::store::{Resolution, SchemaStore};

pub struct ReferenceRewriter<'s> {
    store: &'s SchemaStore,
    visited: HashSet<NodeId>,
    assigned: BTreeMap<String, SchemaNode>,
}

impl<'s> ReferenceRewriter<'s> {
    pub fn new(store: &'s SchemaStore) -> Self {
        Self {
            store,
            visited: HashSet::new(),
            assigned: BTreeMap::new(),
        }
    }

    /// Rewrite every schema slot of `document` and fill `components.schemas`.
    ///
    /// Returns the number of component schemas added.
    pub fn rewrite_document(mut self, document: &mut Document) -> Result<usize, DocumentError> {
        for item in document.paths.values_mut() {
            for operation in item.operations.values_mut() {
                for slot in operation.schema_slots_mut() {
                    self.rewrite_slot(slot)?;
                }
            }
        }
        let components = self.finish()?;
        let added = components.len();
        document.components.schemas.extend(components);
        tracing::debug!(components = added, "rewrote schema references");
        Ok(added)
    }

    /// Rewrite one slot. Absent schemas are skipped.
    pub fn rewrite_slot(&mut self, slot: &mut Option<SchemaNode>) -> Result<(), DocumentError> {
        if let Some(node) = slot.as_ref() {
            let replacement = self.resolve(node)?;
            if replacement.id() != node.id() {
                *slot = Some(replacement);
            }
        }
        Ok(())
    }

    fn resolve(&mut self, node: &SchemaNode) -> Result<SchemaNode, DocumentError> {
        if node.is_reference() {
            return Ok(node.clone());
        }
        match self.store.resolve(node)? {
            Resolution::Reference { id, canonical } => {
                self.assigned.entry(id.clone()).or_insert(canonical);
                Ok(SchemaNode::reference(id))
            }
            Resolution::Inline => {
                self.rewrite_children(node)?;
                Ok(node.clone())
            }
        }
    }

    fn rewrite_children(&mut self, node: &SchemaNode) -> Result<(), DocumentError> {
        if !self.visited.insert(node.id()) {
            return Ok(());
        }
        let children = node.read().children();
        let mut replaced = Vec::new();
        for (slot, child) in children {
            let resolved = self.resolve(&child)?;
            if resolved.id() != child.id() {
                replaced.push((slot, resolved));
            }
        }
        if !replaced.is_empty() {
            let mut schema = node.write();
            for (slot, resolved) in replaced {
                schema.set_child(&slot, resolved);
            }
        }
        Ok(())
    }

    /// Rewrite the bodies of all referenced shapes until no new ids show up.
    pub fn finish(mut self) -> Result<BTreeMap<String, SchemaNode>, DocumentError> {
        let mut done: HashSet<String> = HashSet::new();
        loop {
            let pending: Vec<(String, SchemaNode)> = self
                .assigned
                .iter()
                .filter(|(id, _)| !done.contains(*id))
                .map(|(id, node)| (id.clone(), node.clone()))
                .collect();
            if pending.is_empty() {
                break;
            }
            for (id, canonical) in pending {
                self.rewrite_children(&canonical)?;
                done.insert(id);
            }
        }
        Ok(self.assigned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    #[test]
    fn single_use_slot_is_left_alone() {
        let store = SchemaStore::new();
        let node = Schema::string().into_node();
        store.populate(&node);

        let mut slot = Some(node.clone());
        let mut rewriter = ReferenceRewriter::new(&store);
        rewriter.rewrite_slot(&mut slot).unwrap();

        assert_eq!(slot.unwrap().id(), node.id());
        assert!(rewriter.finish().unwrap().is_empty());
    }

    #[test]
    fn absent_slot_is_skipped() {
        let store = SchemaStore::new();
        let mut slot = None;
        ReferenceRewriter::new(&store).rewrite_slot(&mut slot).unwrap();
        assert!(slot.is_none());
    }

    #[test]
    fn repeated_children_become_references() {
        let store = SchemaStore::new();
        let address = || {
            Schema::object()
                .with_title("Address")
                .with_property("street", Schema::string().with_description("street line"))
                .into_node()
        };
        let person = Schema::object()
            .with_property("home", address())
            .with_property("work", address())
            .into_node();
        store.populate(&person);

        let mut slot = Some(person.clone());
        let mut rewriter = ReferenceRewriter::new(&store);
        rewriter.rewrite_slot(&mut slot).unwrap();
        let components = rewriter.finish().unwrap();

        let schema = person.read();
        assert_eq!(schema.properties["home"].reference_id().as_deref(), Some("Address"));
        assert_eq!(schema.properties["work"].reference_id().as_deref(), Some("Address"));
        // `street` repeats too, so the component body points at a shared string
        assert_eq!(components.keys().collect::<Vec<_>>(), vec!["Address", "String"]);
        let body = components["Address"].read();
        assert_eq!(body.properties["street"].reference_id().as_deref(), Some("String"));
    }

    #[test]
    fn component_bodies_are_rewritten_until_closure() {
        let store = SchemaStore::new();
        let tag = || Schema::object().with_title("Label").with_property("text", Schema::string()).into_node();
        let todo = || {
            Schema::object()
                .with_title("Todo")
                .with_property("label", tag())
                .with_property("backup", tag())
                .into_node()
        };
        let first = todo();
        let second = todo();
        store.populate(&first);
        store.populate(&second);

        let mut rewriter = ReferenceRewriter::new(&store);
        let mut a = Some(first.clone());
        let mut b = Some(second);
        rewriter.rewrite_slot(&mut a).unwrap();
        rewriter.rewrite_slot(&mut b).unwrap();
        let components = rewriter.finish().unwrap();

        assert_eq!(a.unwrap().reference_id().as_deref(), Some("Todo"));
        assert_eq!(b.unwrap().reference_id().as_deref(), Some("Todo"));
        let body = components["Todo"].read();
        assert_eq!(body.properties["label"].reference_id().as_deref(), Some("Label"));
        assert!(components.contains_key("Label"));
    }
}
