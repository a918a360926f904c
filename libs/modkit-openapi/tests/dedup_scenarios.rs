//! End-to-end deduplication over whole documents.
//!
//! Each scenario builds a small document, runs the store + rewriter over it and checks the
//! `$ref` layout of the serialized result.

use std::collections::BTreeMap;

use anyhow::Result;
use modkit_openapi::{
    deduplicate_schemas, shapes_equal, Document, Info, MediaType, Operation, OperationKind,
    Parameter, ParameterLocation, RequestBody, Response, Schema, SchemaNode, SchemaStore,
};
use serde_json::{json, Value};

fn name_object() -> SchemaNode {
    Schema::object()
        .with_property("name", Schema::string())
        .with_required("name")
        .into_node()
}

fn todo() -> SchemaNode {
    Schema::object()
        .with_title("Todo")
        .with_property("id", Schema::integer().with_format("int64"))
        .with_property("title", Schema::string().with_description("What to do"))
        .with_required("id")
        .into_node()
}

fn json_content(schema: SchemaNode) -> BTreeMap<String, MediaType> {
    let mut content = BTreeMap::new();
    content.insert("application/json".to_string(), MediaType { schema: Some(schema) });
    content
}

fn query(name: &str, schema: SchemaNode) -> Parameter {
    Parameter {
        name: name.to_string(),
        location: ParameterLocation::Query,
        required: false,
        description: None,
        schema: Some(schema),
    }
}

fn returning(schema: SchemaNode) -> Operation {
    let mut op = Operation::default();
    op.responses.insert(
        "200".to_string(),
        Response {
            description: "OK".to_string(),
            content: json_content(schema),
        },
    );
    op
}

fn add(doc: &mut Document, path: &str, kind: OperationKind, op: Operation) {
    doc.paths
        .entry(path.to_string())
        .or_default()
        .operations
        .insert(kind, op);
}

fn response_schema(value: &Value, path: &str, method: &str) -> Value {
    value["paths"][path][method]["responses"]["200"]["content"]["application/json"]["schema"].clone()
}

fn reference(id: &str) -> Value {
    json!({ "$ref": format!("#/components/schemas/{id}") })
}

#[test]
fn shared_parameter_shape_becomes_one_component() -> Result<()> {
    let mut doc = Document::new(Info::new("Shop | v1"));
    let mut a = Operation::default();
    a.parameters.push(query("filter", name_object()));
    let mut b = Operation::default();
    b.parameters.push(query("filter", name_object()));
    add(&mut doc, "/a", OperationKind::Get, a);
    add(&mut doc, "/b", OperationKind::Get, b);

    let added = deduplicate_schemas(&mut doc)?;
    let value = serde_json::to_value(&doc)?;

    let first = &value["paths"]["/a"]["get"]["parameters"][0]["schema"];
    let second = &value["paths"]["/b"]["get"]["parameters"][0]["schema"];
    assert_eq!(first, second);
    assert!(first["$ref"].is_string());
    // `name` repeats once per parameter, so it is shared as well
    assert_eq!(added, 2, "the object and its repeated string property");
    assert_eq!(value["components"]["schemas"]["String"], json!({ "type": "string" }));
    let id = first["$ref"]
        .as_str()
        .and_then(|r| r.strip_prefix("#/components/schemas/"))
        .unwrap_or_default()
        .to_string();
    assert_eq!(
        value["components"]["schemas"][&id],
        json!({
            "type": "object",
            "properties": { "name": reference("String") },
            "required": ["name"]
        })
    );
    let restored = inline(&doc.components.schemas[&id], &doc.components.schemas);
    assert_eq!(
        serde_json::to_value(&restored)?,
        json!({
            "type": "object",
            "properties": { "name": { "type": "string" } },
            "required": ["name"]
        })
    );
    Ok(())
}

#[test]
fn request_and_response_share_a_component() -> Result<()> {
    let mut doc = Document::new(Info::new("Shop | v1"));
    let mut op = returning(todo());
    op.request_body = Some(RequestBody {
        description: None,
        content: json_content(todo()),
        required: true,
    });
    add(&mut doc, "/todos", OperationKind::Post, op);

    deduplicate_schemas(&mut doc)?;
    let value = serde_json::to_value(&doc)?;

    let body = &value["paths"]["/todos"]["post"]["requestBody"]["content"]["application/json"]["schema"];
    assert_eq!(body, &reference("Todo"));
    assert_eq!(response_schema(&value, "/todos", "post"), reference("Todo"));
    assert_eq!(value["components"]["schemas"]["Todo"]["title"], json!("Todo"));
    Ok(())
}

#[test]
fn containers_share_the_element_id_but_keep_their_own_shape() -> Result<()> {
    let mut doc = Document::new(Info::new("Shop | v1"));
    add(&mut doc, "/list", OperationKind::Get, returning(Schema::array(todo()).into_node()));
    add(&mut doc, "/map", OperationKind::Get, returning(Schema::map(todo()).into_node()));

    deduplicate_schemas(&mut doc)?;
    let value = serde_json::to_value(&doc)?;

    assert_eq!(
        response_schema(&value, "/list", "get"),
        json!({ "type": "array", "items": reference("Todo") })
    );
    assert_eq!(
        response_schema(&value, "/map", "get"),
        json!({ "type": "object", "additionalProperties": reference("Todo") })
    );
    Ok(())
}

#[test]
fn same_base_name_different_shapes_get_suffixes() -> Result<()> {
    let other = || {
        Schema::object()
            .with_title("Todo")
            .with_property("done", Schema::boolean())
            .into_node()
    };
    let mut doc = Document::new(Info::new("Shop | v1"));
    add(&mut doc, "/a", OperationKind::Get, returning(todo()));
    add(&mut doc, "/b", OperationKind::Get, returning(other()));
    add(&mut doc, "/c", OperationKind::Get, returning(todo()));
    add(&mut doc, "/d", OperationKind::Get, returning(other()));

    deduplicate_schemas(&mut doc)?;
    let value = serde_json::to_value(&doc)?;

    assert_eq!(response_schema(&value, "/a", "get"), reference("Todo"));
    assert_eq!(response_schema(&value, "/b", "get"), reference("Todo2"));
    assert_eq!(response_schema(&value, "/c", "get"), reference("Todo"));
    assert_eq!(response_schema(&value, "/d", "get"), reference("Todo2"));
    assert!(value["components"]["schemas"]["Todo2"]["properties"]["done"].is_object());
    Ok(())
}

#[test]
fn self_recursive_schema_references_itself() -> Result<()> {
    let tree = Schema::object().with_title("Tree").into_node();
    let children = Schema::array(tree.clone()).into_node();
    tree.write().properties.insert("children".to_string(), children);

    let mut doc = Document::new(Info::new("Shop | v1"));
    add(&mut doc, "/tree", OperationKind::Get, returning(tree));

    let added = deduplicate_schemas(&mut doc)?;
    let value = serde_json::to_value(&doc)?;

    assert_eq!(added, 1);
    assert_eq!(response_schema(&value, "/tree", "get"), reference("Tree"));
    assert_eq!(
        value["components"]["schemas"]["Tree"],
        json!({
            "type": "object",
            "title": "Tree",
            "properties": {
                "children": { "type": "array", "items": reference("Tree") }
            }
        })
    );
    Ok(())
}

#[test]
fn single_use_schemas_stay_inline() -> Result<()> {
    let mut doc = Document::new(Info::new("Shop | v1"));
    add(&mut doc, "/todo", OperationKind::Get, returning(todo()));

    let added = deduplicate_schemas(&mut doc)?;
    let value = serde_json::to_value(&doc)?;

    assert_eq!(added, 0);
    assert!(value.get("components").is_none());
    assert_eq!(response_schema(&value, "/todo", "get")["title"], json!("Todo"));
    Ok(())
}

fn inline(node: &SchemaNode, components: &BTreeMap<String, SchemaNode>) -> SchemaNode {
    if let Some(id) = node.reference_id() {
        if let Some(target) = components.get(&id) {
            return inline(target, components);
        }
    }
    let mut body = node.read().clone();
    for (slot, child) in body.children() {
        body.set_child(&slot, inline(&child, components));
    }
    body.into_node()
}

#[test]
fn inlining_components_restores_the_original_fragments() -> Result<()> {
    let page = || {
        Schema::object()
            .with_property("items", Schema::array(todo()))
            .with_property("next", Schema::string().with_format("uri"))
            .into_node()
    };
    let mut doc = Document::new(Info::new("Shop | v1"));
    add(&mut doc, "/a", OperationKind::Get, returning(page()));
    add(&mut doc, "/b", OperationKind::Get, returning(todo()));
    add(&mut doc, "/c", OperationKind::Post, returning(Schema::map(todo()).into_node()));

    let before: Vec<SchemaNode> = doc
        .operations()
        .flat_map(|(_, _, op)| op.schema_slots().into_iter().flatten().cloned().collect::<Vec<_>>())
        .map(|node| node.deep_clone())
        .collect();

    deduplicate_schemas(&mut doc)?;
    assert!(!doc.components.is_empty());

    let after: Vec<SchemaNode> = doc
        .operations()
        .flat_map(|(_, _, op)| op.schema_slots().into_iter().flatten().cloned().collect::<Vec<_>>())
        .collect();
    assert_eq!(before.len(), after.len());
    for (original, rewritten) in before.iter().zip(&after) {
        let restored = inline(rewritten, &doc.components.schemas);
        assert!(shapes_equal(original, &restored));
    }
    Ok(())
}

#[test]
fn output_is_stable_across_runs() -> Result<()> {
    let build = || -> Result<Value> {
        let mut doc = Document::new(Info::new("Shop | v1"));
        add(&mut doc, "/z", OperationKind::Get, returning(todo()));
        add(&mut doc, "/a", OperationKind::Put, returning(Schema::array(todo()).into_node()));
        add(&mut doc, "/a", OperationKind::Get, returning(todo()));
        deduplicate_schemas(&mut doc)?;
        Ok(serde_json::to_value(&doc)?)
    };
    assert_eq!(build()?, build()?);
    Ok(())
}

#[test]
fn store_counts_match_positions() {
    let store = SchemaStore::new();
    let shared = todo();
    let list = Schema::array(shared.clone()).into_node();
    store.populate(&shared);
    store.populate(&list);

    assert_eq!(store.occurrences(&shared), 2);
    assert_eq!(store.occurrences(&list), 1);
    assert_eq!(store.occurrences(&todo()), 2);
}

#[test]
fn all_of_children_are_resolved_per_position() -> Result<()> {
    let composed = |own: &str, kind: Schema| {
        Schema::all_of([
            Schema::object().with_property(own, kind).into_node(),
            todo(),
        ])
        .into_node()
    };
    let mut doc = Document::new(Info::new("Shop | v1"));
    add(&mut doc, "/a", OperationKind::Get, returning(composed("archived", Schema::boolean())));
    add(&mut doc, "/b", OperationKind::Get, returning(composed("pinned", Schema::number())));

    deduplicate_schemas(&mut doc)?;
    let value = serde_json::to_value(&doc)?;

    let a = response_schema(&value, "/a", "get");
    let b = response_schema(&value, "/b", "get");
    assert_eq!(a["allOf"][1], reference("Todo"));
    assert_eq!(b["allOf"][1], reference("Todo"));
    assert!(a["allOf"][0].get("$ref").is_none());
    assert_eq!(a["allOf"][0]["properties"]["archived"], json!({ "type": "boolean" }));
    assert_eq!(b["allOf"][0]["properties"]["pinned"], json!({ "type": "number" }));
    Ok(())
}

#[test]
fn one_of_any_of_and_not_children_are_resolved() -> Result<()> {
    let error = Schema::object()
        .with_title("Error")
        .with_property("code", Schema::integer().with_format("int32"))
        .into_node();
    let either = Schema {
        one_of: vec![todo(), error],
        ..Default::default()
    }
    .into_node();
    let any = Schema {
        any_of: vec![todo()],
        ..Default::default()
    }
    .into_node();
    let negated = Schema {
        not: Some(todo()),
        ..Default::default()
    }
    .into_node();

    let mut doc = Document::new(Info::new("Shop | v1"));
    add(&mut doc, "/either", OperationKind::Get, returning(either));
    add(&mut doc, "/any", OperationKind::Get, returning(any));
    add(&mut doc, "/not", OperationKind::Get, returning(negated));

    deduplicate_schemas(&mut doc)?;
    let value = serde_json::to_value(&doc)?;

    let either = response_schema(&value, "/either", "get");
    assert_eq!(either["oneOf"][0], reference("Todo"));
    assert_eq!(either["oneOf"][1]["title"], json!("Error"));
    assert_eq!(response_schema(&value, "/any", "get")["anyOf"][0], reference("Todo"));
    assert_eq!(response_schema(&value, "/not", "get")["not"], reference("Todo"));
    assert!(value["components"]["schemas"].get("Error").is_none());
    Ok(())
}

#[test]
fn existing_component_ids_are_never_overwritten() -> Result<()> {
    let legacy = Schema::object()
        .with_title("Todo")
        .with_property("legacy", Schema::boolean())
        .into_node();
    let other = || {
        Schema::object()
            .with_title("Todo")
            .with_property("done", Schema::boolean())
            .into_node()
    };

    let mut doc = Document::new(Info::new("Shop | v1"));
    doc.components.schemas.insert("Todo".to_string(), legacy);
    add(&mut doc, "/legacy", OperationKind::Get, returning(SchemaNode::reference("Todo")));
    add(&mut doc, "/a", OperationKind::Get, returning(todo()));
    add(&mut doc, "/a", OperationKind::Put, returning(todo()));
    add(&mut doc, "/b", OperationKind::Get, returning(other()));
    add(&mut doc, "/b", OperationKind::Put, returning(other()));

    let added = deduplicate_schemas(&mut doc)?;
    let value = serde_json::to_value(&doc)?;

    let schemas = &value["components"]["schemas"];
    assert_eq!(schemas["Todo"]["properties"]["legacy"], json!({ "type": "boolean" }));
    assert_eq!(response_schema(&value, "/legacy", "get"), reference("Todo"));
    assert_eq!(response_schema(&value, "/a", "get"), reference("Todo2"));
    assert_eq!(response_schema(&value, "/b", "get"), reference("Todo3"));
    assert!(schemas["Todo3"]["properties"]["done"].is_object());
    assert!(added >= 2);
    Ok(())
}

#[test]
fn pointer_targets_without_a_component_are_reserved_too() -> Result<()> {
    let mut doc = Document::new(Info::new("Shop | v1"));
    add(&mut doc, "/external", OperationKind::Get, returning(SchemaNode::reference("Todo")));
    add(&mut doc, "/a", OperationKind::Get, returning(todo()));
    add(&mut doc, "/b", OperationKind::Get, returning(todo()));

    deduplicate_schemas(&mut doc)?;
    let value = serde_json::to_value(&doc)?;

    assert_eq!(response_schema(&value, "/a", "get"), reference("Todo2"));
    assert!(value["components"]["schemas"].get("Todo").is_none());
    Ok(())
}
