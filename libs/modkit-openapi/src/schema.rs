//! Schema node model.
//!
//! A [`SchemaNode`] is a shared, mutable handle to one JSON Schema fragment. The same
//! handle may sit at several positions of a document and may contain itself, so every
//! handle carries a process-unique [`NodeId`] that survives cloning. Cycle detection and
//! rewrite bookkeeping key on that id, never on memory addresses.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// JSON Pointer prefix of every `$ref` emitted into a document.
pub const COMPONENTS_SCHEMAS_PREFIX: &str = "#/components/schemas/";

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a schema node handle. Clones of a handle share the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// JSON Schema primitive type. An absent kind means an untyped or composed schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Null,
}

impl SchemaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaKind::String => "string",
            SchemaKind::Integer => "integer",
            SchemaKind::Number => "number",
            SchemaKind::Boolean => "boolean",
            SchemaKind::Array => "array",
            SchemaKind::Object => "object",
            SchemaKind::Null => "null",
        }
    }
}

/// `additionalProperties`: either a boolean flag or a value schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(SchemaNode),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discriminator {
    pub property_name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mapping: BTreeMap<String, String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// One JSON Schema fragment.
///
/// Unknown keywords found while deserializing land in `extensions`. When `reference`
/// is set the schema is a pointer and serializes as `{"$ref": "#/components/schemas/<id>"}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(
        rename = "$ref",
        default,
        skip_serializing_if = "Option::is_none",
        with = "reference_path"
    )]
    pub reference: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SchemaKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    // Numbers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_minimum: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_maximum: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiple_of: Option<f64>,

    // Strings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    // Arrays
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<SchemaNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_items: Option<bool>,

    // Objects
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, SchemaNode>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub required: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<AdditionalProperties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_properties: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_properties: Option<u64>,

    // Composition
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all_of: Vec<SchemaNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub one_of: Vec<SchemaNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<SchemaNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not: Option<SchemaNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<Discriminator>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub read_only: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub write_only: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deprecated: bool,

    // Literals
    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,

    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

mod reference_path {
    use super::COMPONENTS_SCHEMAS_PREFIX;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)] // serde `with` mandates &Option<T>
    pub fn serialize<S: Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(id) => serializer.serialize_some(&format!("{COMPONENTS_SCHEMAS_PREFIX}{id}")),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|pointer| match pointer.strip_prefix(COMPONENTS_SCHEMAS_PREFIX) {
            Some(id) => id.to_string(),
            None => pointer.clone(),
        }))
    }
}

/// Position of a child schema inside its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildSlot {
    Property(String),
    Items,
    AdditionalProperties,
    AllOf(usize),
    OneOf(usize),
    AnyOf(usize),
    Not,
}

impl Schema {
    pub fn of_kind(kind: SchemaKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn string() -> Self {
        Self::of_kind(SchemaKind::String)
    }

    pub fn integer() -> Self {
        Self::of_kind(SchemaKind::Integer)
    }

    pub fn number() -> Self {
        Self::of_kind(SchemaKind::Number)
    }

    pub fn boolean() -> Self {
        Self::of_kind(SchemaKind::Boolean)
    }

    pub fn object() -> Self {
        Self::of_kind(SchemaKind::Object)
    }

    /// `{"type": "array", "items": ...}`
    pub fn array(items: impl Into<SchemaNode>) -> Self {
        Self {
            items: Some(items.into()),
            ..Self::of_kind(SchemaKind::Array)
        }
    }

    /// String-keyed dictionary: `{"type": "object", "additionalProperties": ...}`
    pub fn map(values: impl Into<SchemaNode>) -> Self {
        Self {
            additional_properties: Some(AdditionalProperties::Schema(values.into())),
            ..Self::of_kind(SchemaKind::Object)
        }
    }

    /// Composition of the given schemas with `allOf`.
    pub fn all_of(parts: impl IntoIterator<Item = SchemaNode>) -> Self {
        Self {
            all_of: parts.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, schema: impl Into<SchemaNode>) -> Self {
        self.properties.insert(name.into(), schema.into());
        self
    }

    pub fn with_required(mut self, name: impl Into<String>) -> Self {
        self.required.insert(name.into());
        self
    }

    pub fn with_enum(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.enum_values = values.into_iter().collect();
        self
    }

    pub fn into_node(self) -> SchemaNode {
        SchemaNode::new(self)
    }

    /// Snapshot of every child position, in a fixed order:
    /// properties (declaration order), items, additionalProperties, allOf, oneOf, anyOf, not.
    pub fn children(&self) -> Vec<(ChildSlot, SchemaNode)> {
        let mut out = Vec::new();
        for (name, child) in &self.properties {
            out.push((ChildSlot::Property(name.clone()), child.clone()));
        }
        if let Some(items) = &self.items {
            out.push((ChildSlot::Items, items.clone()));
        }
        if let Some(AdditionalProperties::Schema(values)) = &self.additional_properties {
            out.push((ChildSlot::AdditionalProperties, values.clone()));
        }
        out.extend(
            self.all_of
                .iter()
                .enumerate()
                .map(|(i, c)| (ChildSlot::AllOf(i), c.clone())),
        );
        out.extend(
            self.one_of
                .iter()
                .enumerate()
                .map(|(i, c)| (ChildSlot::OneOf(i), c.clone())),
        );
        out.extend(
            self.any_of
                .iter()
                .enumerate()
                .map(|(i, c)| (ChildSlot::AnyOf(i), c.clone())),
        );
        if let Some(not) = &self.not {
            out.push((ChildSlot::Not, not.clone()));
        }
        out
    }

    /// Replace the child at `slot`. Slots that no longer exist are ignored.
    pub fn set_child(&mut self, slot: &ChildSlot, node: SchemaNode) {
        let target = match slot {
            ChildSlot::Property(name) => self.properties.get_mut(name),
            ChildSlot::Items => self.items.as_mut(),
            ChildSlot::AdditionalProperties => match &mut self.additional_properties {
                Some(AdditionalProperties::Schema(values)) => Some(values),
                _ => None,
            },
            ChildSlot::AllOf(i) => self.all_of.get_mut(*i),
            ChildSlot::OneOf(i) => self.one_of.get_mut(*i),
            ChildSlot::AnyOf(i) => self.any_of.get_mut(*i),
            ChildSlot::Not => self.not.as_mut(),
        };
        if let Some(target) = target {
            *target = node;
        }
    }
}

/// Shared handle to a [`Schema`].
#[derive(Clone)]
pub struct SchemaNode {
    id: NodeId,
    inner: Arc<RwLock<Schema>>,
}

impl SchemaNode {
    pub fn new(schema: Schema) -> Self {
        Self {
            id: NodeId::next(),
            inner: Arc::new(RwLock::new(schema)),
        }
    }

    /// A pointer node: `{"$ref": "#/components/schemas/<id>"}`.
    pub fn reference(id: impl Into<String>) -> Self {
        Self::new(Schema {
            reference: Some(id.into()),
            ..Default::default()
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Schema> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Schema> {
        self.inner.write()
    }

    pub fn is_reference(&self) -> bool {
        self.inner.read().reference.is_some()
    }

    pub fn reference_id(&self) -> Option<String> {
        self.inner.read().reference.clone()
    }

    /// Structure-preserving deep copy: shared children stay shared and cycles stay
    /// cycles, but every copied node gets a fresh identity.
    pub fn deep_clone(&self) -> SchemaNode {
        let mut copies = HashMap::new();
        self.deep_clone_into(&mut copies)
    }

    fn deep_clone_into(&self, copies: &mut HashMap<NodeId, SchemaNode>) -> SchemaNode {
        if let Some(copy) = copies.get(&self.id) {
            return copy.clone();
        }
        let copy = SchemaNode::new(Schema::default());
        copies.insert(self.id, copy.clone());

        let mut body = self.read().clone();
        for (slot, child) in body.children() {
            let child_copy = child.deep_clone_into(copies);
            body.set_child(&slot, child_copy);
        }
        *copy.write() = body;
        copy
    }
}

impl From<Schema> for SchemaNode {
    fn from(schema: Schema) -> Self {
        SchemaNode::new(schema)
    }
}

impl fmt::Debug for SchemaNode {
    // Shallow; graphs may be cyclic.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("SchemaNode");
        out.field("id", &self.id);
        match self.inner.try_read() {
            Some(schema) => {
                if let Some(reference) = &schema.reference {
                    out.field("reference", reference);
                }
                out.field("kind", &schema.kind);
                if let Some(title) = &schema.title {
                    out.field("title", title);
                }
            }
            None => {
                out.field("schema", &"<locked>");
            }
        }
        out.finish_non_exhaustive()
    }
}

thread_local! {
    static SERIALIZING: RefCell<Vec<NodeId>> = const { RefCell::new(Vec::new()) };
}

struct SerializingGuard;

impl Drop for SerializingGuard {
    fn drop(&mut self) {
        SERIALIZING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

impl Serialize for SchemaNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // A back-edge still present at serialization time is emitted as `{}`.
        let reentered = SERIALIZING.with(|stack| stack.borrow().contains(&self.id));
        if reentered {
            return serializer.serialize_map(Some(0))?.end();
        }
        SERIALIZING.with(|stack| stack.borrow_mut().push(self.id));
        let _guard = SerializingGuard;
        self.inner.read().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SchemaNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Schema::deserialize(deserializer).map(SchemaNode::new)
    }
}
