//! Endpoint descriptions: the input contract supplied by the route table.

use std::collections::BTreeMap;

use modkit_openapi::{OperationKind, ParameterLocation, SchemaNode};
use serde::{Deserialize, Serialize};

/// One routed endpoint, as the web framework describes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EndpointDescription {
    /// Relative route template, e.g. `todos/{id:int}`.
    pub route: String,
    pub method: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    /// Document this endpoint is published in. `None` means every document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    /// Owning controller, used as the tag when no tags are declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBodyDescription>,
    /// Status code → response.
    #[serde(default)]
    pub responses: BTreeMap<String, ResponseDescription>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub deprecated: bool,
}

impl EndpointDescription {
    pub fn new(method: OperationKind, route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            method,
            operation_id: None,
            group_name: None,
            controller: None,
            parameters: Vec::new(),
            request_body: None,
            responses: BTreeMap::new(),
            tags: Vec::new(),
            summary: None,
            description: None,
            deprecated: false,
        }
    }

    pub fn with_operation_id(mut self, id: impl Into<String>) -> Self {
        self.operation_id = Some(id.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group_name = Some(group.into());
        self
    }

    pub fn with_controller(mut self, controller: impl Into<String>) -> Self {
        self.controller = Some(controller.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_parameter(
        mut self,
        name: impl Into<String>,
        location: ParameterLocation,
        schema: impl Into<SchemaNode>,
    ) -> Self {
        self.parameters.push(ParameterDescription {
            name: name.into(),
            location,
            required: false,
            description: None,
            schema: Some(schema.into()),
        });
        self
    }

    /// JSON request body.
    pub fn with_json_body(mut self, schema: impl Into<SchemaNode>) -> Self {
        let mut content = BTreeMap::new();
        content.insert(JSON_MEDIA_TYPE.to_string(), Some(schema.into()));
        self.request_body = Some(RequestBodyDescription {
            description: None,
            required: true,
            content,
        });
        self
    }

    /// JSON response for `status`.
    pub fn with_json_response(
        mut self,
        status: impl Into<String>,
        description: impl Into<String>,
        schema: impl Into<SchemaNode>,
    ) -> Self {
        let mut content = BTreeMap::new();
        content.insert(JSON_MEDIA_TYPE.to_string(), Some(schema.into()));
        self.responses.insert(
            status.into(),
            ResponseDescription {
                description: description.into(),
                content,
            },
        );
        self
    }

    /// Response without a body.
    pub fn with_empty_response(mut self, status: impl Into<String>, description: impl Into<String>) -> Self {
        self.responses.insert(
            status.into(),
            ResponseDescription {
                description: description.into(),
                content: BTreeMap::new(),
            },
        );
        self
    }
}

pub const JSON_MEDIA_TYPE: &str = "application/json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDescription {
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
pub struct RequestBodyDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    /// Media type → schema. A `null` schema means the media type carries no schema.
    #[serde(default)]
    pub content: BTreeMap<String, Option<SchemaNode>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseDescription {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: BTreeMap<String, Option<SchemaNode>>,
}
