//! OpenAPI document model.
//!
//! Only the parts the document builder fills in are modelled. Maps are `BTreeMap`s so a
//! serialized document is byte-stable for the same input.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::DocumentError;
use crate::schema::{NodeId, SchemaNode};

pub const OPENAPI_VERSION: &str = "3.0.3";
pub const DEFAULT_DOCUMENT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub openapi: String,
    pub info: Info,
    #[serde(default)]
    pub paths: BTreeMap<String, PathItem>,
    #[serde(default, skip_serializing_if = "Components::is_empty")]
    pub components: Components,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

impl Document {
    pub fn new(info: Info) -> Self {
        Self {
            openapi: OPENAPI_VERSION.to_string(),
            info,
            paths: BTreeMap::new(),
            components: Components::default(),
            tags: Vec::new(),
        }
    }

    /// Every operation in rewrite order: paths lexicographically, then by method.
    pub fn operations(&self) -> impl Iterator<Item = (&str, OperationKind, &Operation)> {
        self.paths.iter().flat_map(|(path, item)| {
            item.operations
                .iter()
                .map(move |(kind, op)| (path.as_str(), *kind, op))
        })
    }

    pub fn operation(&self, path: &str, kind: OperationKind) -> Option<&Operation> {
        self.paths.get(path)?.operations.get(&kind)
    }

    /// Ids already taken in this document: `components.schemas` keys plus every `$ref`
    /// target reachable from operations and components.
    pub fn existing_reference_ids(&self) -> BTreeSet<String> {
        let mut ids: BTreeSet<String> = self.components.schemas.keys().cloned().collect();
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut stack: Vec<SchemaNode> = self
            .operations()
            .flat_map(|(_, _, op)| op.schema_slots().into_iter().flatten().cloned().collect::<Vec<_>>())
            .chain(self.components.schemas.values().cloned())
            .collect();
        while let Some(node) = stack.pop() {
            if !seen.insert(node.id()) {
                continue;
            }
            if let Some(id) = node.reference_id() {
                ids.insert(id);
                continue;
            }
            stack.extend(node.read().children().into_iter().map(|(_, child)| child));
        }
        ids
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Info {
    pub title: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Info {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            version: DEFAULT_DOCUMENT_VERSION.to_string(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathItem {
    pub operations: BTreeMap<OperationKind, Operation>,
}

/// HTTP operation of a path item. Declaration order is the rewrite order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Patch,
    Trace,
}

impl OperationKind {
    pub const ALL: [OperationKind; 8] = [
        OperationKind::Get,
        OperationKind::Put,
        OperationKind::Post,
        OperationKind::Delete,
        OperationKind::Options,
        OperationKind::Head,
        OperationKind::Patch,
        OperationKind::Trace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Get => "get",
            OperationKind::Put => "put",
            OperationKind::Post => "post",
            OperationKind::Delete => "delete",
            OperationKind::Options => "options",
            OperationKind::Head => "head",
            OperationKind::Patch => "patch",
            OperationKind::Trace => "trace",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DocumentError::UnsupportedMethod(s.to_string()))
    }
}

impl<'de> Deserialize<'de> for OperationKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    #[serde(default)]
    pub responses: BTreeMap<String, Response>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
}

impl Operation {
    /// Schema positions in rewrite order: parameters, request body media types,
    /// then responses by status code and media type.
    pub fn schema_slots(&self) -> Vec<&Option<SchemaNode>> {
        let mut slots: Vec<&Option<SchemaNode>> = self.parameters.iter().map(|p| &p.schema).collect();
        if let Some(body) = &self.request_body {
            slots.extend(body.content.values().map(|m| &m.schema));
        }
        for response in self.responses.values() {
            slots.extend(response.content.values().map(|m| &m.schema));
        }
        slots
    }

    pub fn schema_slots_mut(&mut self) -> Vec<&mut Option<SchemaNode>> {
        let mut slots: Vec<&mut Option<SchemaNode>> =
            self.parameters.iter_mut().map(|p| &mut p.schema).collect();
        if let Some(body) = &mut self.request_body {
            slots.extend(body.content.values_mut().map(|m| &mut m.schema));
        }
        for response in self.responses.values_mut() {
            slots.extend(response.content.values_mut().map(|m| &mut m.schema));
        }
        slots
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaNode>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub content: BTreeMap<String, MediaType>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaType {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaNode>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub content: BTreeMap<String, MediaType>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Components {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub schemas: BTreeMap<String, SchemaNode>,
}

impl Components {
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Document-level tag. Two tags are the same tag when their names match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Tag {}

impl Hash for Tag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for Tag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}
