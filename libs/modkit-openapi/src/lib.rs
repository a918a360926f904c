//! OpenAPI schema deduplication.
//!
//! Schemas collected from many endpoints are registered in a [`SchemaStore`], which groups
//! them by structural shape. The [`ReferenceRewriter`] then replaces every shape seen at
//! least twice with a `$ref` into `components.schemas`.
//!
//! ```
//! use modkit_openapi::{deduplicate_schemas, Document, Info, Schema};
//!
//! let mut doc = Document::new(Info::new("Shop | v1"));
//! let added = deduplicate_schemas(&mut doc).unwrap();
//! assert_eq!(added, 0);
//! # let _ = Schema::string();
//! ```

pub mod document;
pub mod error;
pub mod naming;
pub mod rewriter;
pub mod schema;
pub mod shape;
pub mod store;

pub use document::{
    Components, Document, Info, MediaType, Operation, OperationKind, Parameter, ParameterLocation,
    PathItem, RequestBody, Response, Tag, DEFAULT_DOCUMENT_VERSION, OPENAPI_VERSION,
};
pub use error::DocumentError;
pub use rewriter::ReferenceRewriter;
pub use schema::{
    AdditionalProperties, ChildSlot, Discriminator, NodeId, Schema, SchemaKind, SchemaNode,
    COMPONENTS_SCHEMAS_PREFIX,
};
pub use shape::{shape_hash, shapes_equal, ShapeHash};
pub use store::{Registration, Resolution, SchemaStore, ShapeKey, REFERENCE_THRESHOLD};

/// Register every schema of `document` in a fresh store and rewrite repeated shapes into
/// references. Ids the document already uses (component keys, `$ref` targets) are left
/// to their owners. Returns the number of component schemas added.
pub fn deduplicate_schemas(document: &mut Document) -> Result<usize, DocumentError> {
    let store = SchemaStore::new();
    store.reserve_existing(document);
    for (_, _, operation) in document.operations() {
        for node in operation.schema_slots().into_iter().flatten() {
            store.populate(node);
        }
    }
    ReferenceRewriter::new(&store).rewrite_document(document)
}
