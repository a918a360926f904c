//! Readable reference ids for component schemas.

use std::collections::HashSet;

use crate::schema::{AdditionalProperties, NodeId, SchemaKind, SchemaNode};

/// Fallback base when nothing better can be derived.
pub const FALLBACK_NAME: &str = "Schema";

/// Keep only characters allowed in a component key: `[A-Za-z0-9._-]`.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect()
}

/// `"date-time"` -> `"DateTime"`, `"int32"` -> `"Int32"`.
pub fn pascal_case(raw: &str) -> String {
    raw.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Base name for a shape.
///
/// `known` returns the name already attached to a node's shape (an assigned reference id
/// or a registration hint), if any. The result is never empty.
pub fn derive_hint(node: &SchemaNode, known: &dyn Fn(&SchemaNode) -> Option<String>) -> String {
    let mut seen = HashSet::new();
    let base = derive(node, known, &mut seen, true);
    if base.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        base
    }
}

fn derive(
    node: &SchemaNode,
    known: &dyn Fn(&SchemaNode) -> Option<String>,
    seen: &mut HashSet<NodeId>,
    root: bool,
) -> String {
    if !seen.insert(node.id()) {
        return FALLBACK_NAME.to_string();
    }
    if let Some(reference) = node.reference_id() {
        return sanitize(&reference);
    }
    if !root {
        if let Some(name) = known(node).map(|n| sanitize(&n)).filter(|n| !n.is_empty()) {
            return name;
        }
    }

    let (title, kind, format, items, values, properties_empty, composed) = {
        let schema = node.read();
        let values = match &schema.additional_properties {
            Some(AdditionalProperties::Schema(values)) => Some(values.clone()),
            _ => None,
        };
        let composed = if !schema.all_of.is_empty() {
            Some("AllOf")
        } else if !schema.one_of.is_empty() {
            Some("OneOf")
        } else if !schema.any_of.is_empty() {
            Some("AnyOf")
        } else {
            None
        };
        (
            schema.title.clone(),
            schema.kind,
            schema.format.clone(),
            schema.items.clone(),
            values,
            schema.properties.is_empty(),
            composed,
        )
    };

    if let Some(title) = title.map(|t| sanitize(&t)).filter(|t| !t.is_empty()) {
        return title;
    }

    match kind {
        Some(SchemaKind::Array) => match items {
            Some(items) => format!("{}Array", derive(&items, known, seen, false)),
            None => "Array".to_string(),
        },
        Some(SchemaKind::Object) => match values {
            Some(values) if properties_empty => {
                format!("{}Map", derive(&values, known, seen, false))
            }
            _ => "Object".to_string(),
        },
        Some(kind) => match format {
            Some(format) if !pascal_case(&format).is_empty() => pascal_case(&format),
            _ => pascal_case(kind.as_str()),
        },
        None => match (composed, format) {
            (Some(composed), _) => composed.to_string(),
            (None, Some(format)) if !pascal_case(&format).is_empty() => pascal_case(&format),
            _ => FALLBACK_NAME.to_string(),
        },
    }
}
