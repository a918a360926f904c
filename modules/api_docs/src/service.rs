use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use modkit_openapi::naming::pascal_case;
use modkit_openapi::{
    Document, Info, MediaType, Operation, OperationKind, Parameter, ParameterLocation,
    ReferenceRewriter, RequestBody, Response, Schema, SchemaKind, SchemaNode, SchemaStore,
    DEFAULT_DOCUMENT_VERSION,
};
use runtime::AppConfig;
use tokio::task::JoinSet;

use crate::config::{ApiDocsConfig, DocumentConfig};
use crate::endpoint::{EndpointDescription, ResponseDescription};
use crate::error::ApiDocsError;
use crate::filter::DocumentFilter;
use crate::route::{normalize_route_template, path_parameter_names};
use crate::tags::TagAccumulator;

pub const MODULE_NAME: &str = "api_docs";

/// Builds OpenAPI documents from endpoint descriptions.
///
/// Each build owns its schema store and tag accumulator, so documents can be built
/// concurrently from the same endpoint list.
#[derive(Debug, Clone)]
pub struct DocumentService {
    app_name: String,
    config: ApiDocsConfig,
    filters: HashMap<String, DocumentFilter>,
}

struct BuiltOperation {
    index: usize,
    path: String,
    method: OperationKind,
    operation: Operation,
}

impl DocumentService {
    pub fn new(app_name: impl Into<String>, config: ApiDocsConfig) -> Self {
        Self {
            app_name: app_name.into(),
            config,
            filters: HashMap::new(),
        }
    }

    /// Service configured from `app.name` and the `modules.api_docs` section.
    pub fn from_app_config(app: &AppConfig) -> Result<Self, ApiDocsError> {
        let config: ApiDocsConfig = app
            .module_config(MODULE_NAME)
            .map_err(ApiDocsError::Config)?;
        Ok(Self::new(app.app.name.clone(), config))
    }

    /// Replace the configured filter of `document`.
    pub fn with_filter(mut self, document: impl Into<String>, filter: DocumentFilter) -> Self {
        self.filters.insert(document.into(), filter);
        self
    }

    pub fn document_names(&self) -> Vec<String> {
        self.config.document_names()
    }

    pub fn config(&self) -> &ApiDocsConfig {
        &self.config
    }

    /// Build one document.
    ///
    /// Operations are built and their schemas registered in parallel; once every task has
    /// finished, a single pass rewrites repeated shapes into component references.
    pub async fn build_document(
        &self,
        name: &str,
        endpoints: &[EndpointDescription],
    ) -> Result<Document, ApiDocsError> {
        let doc_config = self
            .config
            .document(name)
            .ok_or_else(|| ApiDocsError::UnknownDocument(name.to_string()))?;
        let filter = self
            .filters
            .get(name)
            .cloned()
            .unwrap_or_else(|| DocumentFilter::from_config(&doc_config));

        let selected = select_endpoints(name, endpoints, &filter);
        let store = Arc::new(SchemaStore::new());
        let tags = Arc::new(TagAccumulator::new());

        let mut set = JoinSet::new();
        for (index, path, endpoint) in selected {
            let store = store.clone();
            let tags = tags.clone();
            set.spawn_blocking(move || {
                let operation = build_operation(&endpoint, &path, &tags);
                register_schemas(&store, &endpoint, &operation);
                BuiltOperation {
                    index,
                    path,
                    method: endpoint.method,
                    operation,
                }
            });
        }

        let mut built = Vec::with_capacity(set.len());
        while let Some(joined) = set.join_next().await {
            built.push(joined?);
        }
        built.sort_by_key(|b| b.index);

        let mut document = Document::new(self.info(name, &doc_config));
        let operations = built.len();
        for b in built {
            document
                .paths
                .entry(b.path)
                .or_default()
                .operations
                .insert(b.method, b.operation);
        }

        store.reserve_existing(&document);
        let components = ReferenceRewriter::new(&store).rewrite_document(&mut document)?;
        document.tags = tags.tags(&self.config.tag_descriptions);

        tracing::info!(
            document = %name,
            operations,
            paths = document.paths.len(),
            shapes = store.len(),
            components,
            "Built OpenAPI document"
        );
        Ok(document)
    }

    /// Build every configured document concurrently. A failed build only fails its own entry.
    pub async fn build_all(
        &self,
        endpoints: Arc<[EndpointDescription]>,
    ) -> BTreeMap<String, Result<Document, ApiDocsError>> {
        self.build_selected(endpoints, &self.document_names()).await
    }

    /// Build the named documents concurrently, one entry per distinct name.
    pub async fn build_selected(
        &self,
        endpoints: Arc<[EndpointDescription]>,
        names: &[String],
    ) -> BTreeMap<String, Result<Document, ApiDocsError>> {
        let names: BTreeSet<&String> = names.iter().collect();
        let mut handles = Vec::new();
        for name in names {
            let name = name.clone();
            let service = self.clone();
            let endpoints = endpoints.clone();
            let task_name = name.clone();
            let handle =
                tokio::spawn(async move { service.build_document(&task_name, &endpoints).await });
            handles.push((name, handle));
        }

        let mut results = BTreeMap::new();
        for (name, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(ApiDocsError::Task(e)),
            };
            if let Err(e) = &result {
                tracing::error!(document = %name, error = %e, "OpenAPI document build failed");
            }
            results.insert(name, result);
        }
        results
    }

    fn info(&self, name: &str, doc_config: &DocumentConfig) -> Info {
        let app = self.config.app_name.as_deref().unwrap_or(&self.app_name);
        Info {
            title: doc_config
                .title
                .clone()
                .unwrap_or_else(|| format!("{app} | {name}")),
            version: doc_config
                .version
                .clone()
                .unwrap_or_else(|| DEFAULT_DOCUMENT_VERSION.to_string()),
            description: doc_config.description.clone(),
        }
    }
}

/// Endpoints of `document` in input order, paired with their mapped path.
/// A repeated path + method is dropped ("first wins").
fn select_endpoints(
    document: &str,
    endpoints: &[EndpointDescription],
    filter: &DocumentFilter,
) -> Vec<(usize, String, EndpointDescription)> {
    let mut seen = HashSet::new();
    let mut selected = Vec::new();
    for (index, endpoint) in endpoints.iter().enumerate() {
        if !filter.includes(document, endpoint) {
            continue;
        }
        let path = normalize_route_template(&endpoint.route);
        if !seen.insert((path.clone(), endpoint.method)) {
            tracing::error!(
                document = %document,
                method = %endpoint.method,
                path = %path,
                "Duplicate (method, path) detected; ignoring subsequent endpoint"
            );
            continue;
        }
        selected.push((index, path, endpoint.clone()));
    }
    selected
}

fn build_operation(endpoint: &EndpointDescription, path: &str, tags: &TagAccumulator) -> Operation {
    let mut parameters: Vec<Parameter> = endpoint
        .parameters
        .iter()
        .map(|p| Parameter {
            name: p.name.clone(),
            location: p.location,
            // OpenAPI requires all path params to be required.
            required: p.location == ParameterLocation::Path || p.required,
            description: p.description.clone(),
            schema: own(&p.schema),
        })
        .collect();

    let template_names = path_parameter_names(path);
    for p in &parameters {
        if p.location == ParameterLocation::Path && !template_names.contains(&p.name.as_str()) {
            tracing::warn!(
                method = %endpoint.method,
                path = %path,
                parameter = %p.name,
                "Path parameter is not part of the route template"
            );
        }
    }
    // Undeclared template segments are documented as plain strings.
    for name in template_names {
        let declared = parameters
            .iter()
            .any(|p| p.location == ParameterLocation::Path && p.name == name);
        if !declared {
            parameters.push(Parameter {
                name: name.to_string(),
                location: ParameterLocation::Path,
                required: true,
                description: None,
                schema: Some(Schema::string().into_node()),
            });
        }
    }

    let request_body = endpoint.request_body.as_ref().map(|body| RequestBody {
        description: body.description.clone(),
        content: content(&body.content),
        required: body.required,
    });

    let mut responses: BTreeMap<String, Response> = endpoint
        .responses
        .iter()
        .map(|(status, r)| (status.clone(), response(r)))
        .collect();
    if responses.is_empty() {
        responses.insert(
            "200".to_string(),
            Response {
                description: "OK".to_string(),
                content: BTreeMap::new(),
            },
        );
    }

    tracing::trace!(method = %endpoint.method, path = %path, "Built operation");
    Operation {
        tags: tags.capture(endpoint),
        summary: endpoint.summary.clone(),
        description: endpoint.description.clone(),
        operation_id: endpoint.operation_id.clone(),
        parameters,
        request_body,
        responses,
        deprecated: endpoint.deprecated,
    }
}

/// Register every schema of `operation`. Untitled object roots get a hint from the
/// parameter name or the operation id, so they are not all named `Object`.
fn register_schemas(store: &SchemaStore, endpoint: &EndpointDescription, operation: &Operation) {
    let op_name = endpoint.operation_id.as_deref().map(pascal_case);

    for p in &operation.parameters {
        if let Some(node) = &p.schema {
            let hint = named_object_hint(node, || Some(pascal_case(&p.name)));
            store.populate_named(node, hint.as_deref());
        }
    }
    if let Some(body) = &operation.request_body {
        for node in body.content.values().filter_map(|m| m.schema.as_ref()) {
            let hint =
                named_object_hint(node, || op_name.as_ref().map(|op| format!("{op}Request")));
            store.populate_named(node, hint.as_deref());
        }
    }
    for (status, response) in &operation.responses {
        for node in response.content.values().filter_map(|m| m.schema.as_ref()) {
            let hint = named_object_hint(node, || {
                op_name.as_ref().map(|op| {
                    if status.starts_with('2') {
                        format!("{op}Response")
                    } else {
                        format!("{op}{status}Response")
                    }
                })
            });
            store.populate_named(node, hint.as_deref());
        }
    }
}

fn named_object_hint(node: &SchemaNode, hint: impl FnOnce() -> Option<String>) -> Option<String> {
    let named = {
        let schema = node.read();
        schema.reference.is_none()
            && schema.title.is_none()
            && schema.kind == Some(SchemaKind::Object)
            && !schema.properties.is_empty()
    };
    if named {
        hint().filter(|h| !h.is_empty())
    } else {
        None
    }
}

fn response(r: &ResponseDescription) -> Response {
    Response {
        description: r.description.clone(),
        content: content(&r.content),
    }
}

fn content(raw: &BTreeMap<String, Option<SchemaNode>>) -> BTreeMap<String, MediaType> {
    raw.iter()
        .map(|(media, schema)| (media.clone(), MediaType { schema: own(schema) }))
        .collect()
}

/// The rewrite mutates schemas in place; each build works on its own copy.
fn own(schema: &Option<SchemaNode>) -> Option<SchemaNode> {
    schema.as_ref().map(SchemaNode::deep_clone)
}
