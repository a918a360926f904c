//! Structural equality and hashing of schema shapes.
//!
//! Both relations are driven by one canonical encoding of a node: a tagged byte stream
//! written in a fixed field order. Equality compares the encodings, the hash is the
//! SHA-256 digest of the same stream, so equal shapes always hash identically.
//!
//! Encoding rules:
//! - ordered sequences (`allOf`, `oneOf`, `anyOf`, `enum`) keep their order;
//! - `required`, `properties`, `extensions` and discriminator mappings are key-sorted;
//! - literals carry their JSON type, so `"2"` and `2` differ;
//! - a node carrying `reference` encodes as that reference only;
//! - re-entering a node already on the traversal stack writes a back-edge marker with
//!   the distance to that stack frame instead of recursing.

use std::fmt;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::schema::{AdditionalProperties, NodeId, Schema, SchemaNode};

/// SHA-256 fingerprint of a schema shape.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeHash([u8; 32]);

impl ShapeHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First 8 bytes as hex, enough for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Display for ShapeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ShapeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShapeHash({})", self.short())
    }
}

/// Structural hash of `node`, excluding any reference annotation on inner bodies.
pub fn shape_hash(node: &SchemaNode) -> ShapeHash {
    let mut hasher = Sha256::new();
    ShapeEncoder::new(&mut hasher).node(node);
    let digest = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    ShapeHash(bytes)
}

/// Structural equality. Terminates on cyclic graphs.
pub fn shapes_equal(a: &SchemaNode, b: &SchemaNode) -> bool {
    if a.id() == b.id() {
        return true;
    }
    encode(a) == encode(b)
}

fn encode(node: &SchemaNode) -> Vec<u8> {
    let mut out = Vec::new();
    ShapeEncoder::new(&mut out).node(node);
    out
}

trait ShapeSink {
    fn put(&mut self, bytes: &[u8]);
}

impl ShapeSink for Sha256 {
    fn put(&mut self, bytes: &[u8]) {
        Digest::update(self, bytes);
    }
}

impl ShapeSink for Vec<u8> {
    fn put(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

// Structural markers
const NODE_START: u8 = 0x01;
const NODE_END: u8 = 0x02;
const BACK_EDGE: u8 = 0x03;
const REFERENCE: u8 = 0x04;

// Fields
const F_KIND: u8 = 0x10;
const F_FORMAT: u8 = 0x11;
const F_TITLE: u8 = 0x12;
const F_DESCRIPTION: u8 = 0x13;
const F_MINIMUM: u8 = 0x14;
const F_MAXIMUM: u8 = 0x15;
const F_EXCLUSIVE_MINIMUM: u8 = 0x16;
const F_EXCLUSIVE_MAXIMUM: u8 = 0x17;
const F_MULTIPLE_OF: u8 = 0x18;
const F_MIN_LENGTH: u8 = 0x19;
const F_MAX_LENGTH: u8 = 0x1a;
const F_PATTERN: u8 = 0x1b;
const F_ITEMS: u8 = 0x1c;
const F_MIN_ITEMS: u8 = 0x1d;
const F_MAX_ITEMS: u8 = 0x1e;
const F_UNIQUE_ITEMS: u8 = 0x1f;
const F_PROPERTIES: u8 = 0x20;
const F_REQUIRED: u8 = 0x21;
const F_ADDITIONAL_ALLOWED: u8 = 0x22;
const F_ADDITIONAL_SCHEMA: u8 = 0x23;
const F_MIN_PROPERTIES: u8 = 0x24;
const F_MAX_PROPERTIES: u8 = 0x25;
const F_ALL_OF: u8 = 0x26;
const F_ONE_OF: u8 = 0x27;
const F_ANY_OF: u8 = 0x28;
const F_NOT: u8 = 0x29;
const F_DISCRIMINATOR: u8 = 0x2a;
const F_NULLABLE: u8 = 0x2b;
const F_READ_ONLY: u8 = 0x2c;
const F_WRITE_ONLY: u8 = 0x2d;
const F_DEPRECATED: u8 = 0x2e;
const F_ENUM: u8 = 0x2f;
const F_DEFAULT: u8 = 0x30;
const F_EXAMPLE: u8 = 0x31;
const F_EXTENSIONS: u8 = 0x32;

// Literals
const L_NULL: u8 = 0x40;
const L_BOOL: u8 = 0x41;
const L_UINT: u8 = 0x42;
const L_INT: u8 = 0x43;
const L_FLOAT: u8 = 0x44;
const L_STRING: u8 = 0x45;
const L_ARRAY: u8 = 0x46;
const L_OBJECT: u8 = 0x47;

struct ShapeEncoder<'a, S: ShapeSink> {
    sink: &'a mut S,
    visiting: Vec<NodeId>,
}

impl<'a, S: ShapeSink> ShapeEncoder<'a, S> {
    fn new(sink: &'a mut S) -> Self {
        Self {
            sink,
            visiting: Vec::new(),
        }
    }

    fn node(&mut self, node: &SchemaNode) {
        if let Some(depth) = self.visiting.iter().rev().position(|id| *id == node.id()) {
            self.tag(BACK_EDGE);
            self.len(depth);
            return;
        }

        let schema = node.read();
        if let Some(reference) = &schema.reference {
            self.tag(REFERENCE);
            self.text(reference);
            return;
        }

        self.visiting.push(node.id());
        self.tag(NODE_START);
        self.body(&schema);
        self.tag(NODE_END);
        self.visiting.pop();
    }

    fn body(&mut self, schema: &Schema) {
        if let Some(kind) = schema.kind {
            self.tag(F_KIND);
            self.text(kind.as_str());
        }
        self.opt_text(F_FORMAT, schema.format.as_deref());
        self.opt_text(F_TITLE, schema.title.as_deref());
        self.opt_text(F_DESCRIPTION, schema.description.as_deref());

        self.opt_number(F_MINIMUM, schema.minimum);
        self.opt_number(F_MAXIMUM, schema.maximum);
        self.opt_flag(F_EXCLUSIVE_MINIMUM, schema.exclusive_minimum);
        self.opt_flag(F_EXCLUSIVE_MAXIMUM, schema.exclusive_maximum);
        self.opt_number(F_MULTIPLE_OF, schema.multiple_of);

        self.opt_count(F_MIN_LENGTH, schema.min_length);
        self.opt_count(F_MAX_LENGTH, schema.max_length);
        self.opt_text(F_PATTERN, schema.pattern.as_deref());

        self.opt_child(F_ITEMS, schema.items.as_ref());
        self.opt_count(F_MIN_ITEMS, schema.min_items);
        self.opt_count(F_MAX_ITEMS, schema.max_items);
        self.opt_flag(F_UNIQUE_ITEMS, schema.unique_items);

        if !schema.properties.is_empty() {
            let mut properties: Vec<_> = schema.properties.iter().collect();
            properties.sort_by(|a, b| a.0.cmp(b.0));
            self.tag(F_PROPERTIES);
            self.len(properties.len());
            for (name, child) in properties {
                self.text(name);
                self.node(child);
            }
        }
        if !schema.required.is_empty() {
            self.tag(F_REQUIRED);
            self.len(schema.required.len());
            for name in &schema.required {
                self.text(name);
            }
        }
        match &schema.additional_properties {
            Some(AdditionalProperties::Allowed(allowed)) => {
                self.tag(F_ADDITIONAL_ALLOWED);
                self.flag(*allowed);
            }
            Some(AdditionalProperties::Schema(values)) => {
                self.tag(F_ADDITIONAL_SCHEMA);
                self.node(values);
            }
            None => {}
        }
        self.opt_count(F_MIN_PROPERTIES, schema.min_properties);
        self.opt_count(F_MAX_PROPERTIES, schema.max_properties);

        self.sequence(F_ALL_OF, &schema.all_of);
        self.sequence(F_ONE_OF, &schema.one_of);
        self.sequence(F_ANY_OF, &schema.any_of);
        self.opt_child(F_NOT, schema.not.as_ref());
        if let Some(discriminator) = &schema.discriminator {
            self.tag(F_DISCRIMINATOR);
            self.text(&discriminator.property_name);
            self.len(discriminator.mapping.len());
            for (value, target) in &discriminator.mapping {
                self.text(value);
                self.text(target);
            }
        }

        self.set_flag(F_NULLABLE, schema.nullable);
        self.set_flag(F_READ_ONLY, schema.read_only);
        self.set_flag(F_WRITE_ONLY, schema.write_only);
        self.set_flag(F_DEPRECATED, schema.deprecated);

        if !schema.enum_values.is_empty() {
            self.tag(F_ENUM);
            self.len(schema.enum_values.len());
            for value in &schema.enum_values {
                self.literal(value);
            }
        }
        if let Some(value) = &schema.default {
            self.tag(F_DEFAULT);
            self.literal(value);
        }
        if let Some(value) = &schema.example {
            self.tag(F_EXAMPLE);
            self.literal(value);
        }
        if !schema.extensions.is_empty() {
            self.tag(F_EXTENSIONS);
            self.len(schema.extensions.len());
            for (key, value) in &schema.extensions {
                self.text(key);
                self.literal(value);
            }
        }
    }

    fn literal(&mut self, value: &Value) {
        match value {
            Value::Null => self.tag(L_NULL),
            Value::Bool(b) => {
                self.tag(L_BOOL);
                self.flag(*b);
            }
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    self.tag(L_UINT);
                    self.sink.put(&u.to_le_bytes());
                } else if let Some(i) = n.as_i64() {
                    self.tag(L_INT);
                    self.sink.put(&i.to_le_bytes());
                } else {
                    self.tag(L_FLOAT);
                    self.number(n.as_f64().unwrap_or_default());
                }
            }
            Value::String(s) => {
                self.tag(L_STRING);
                self.text(s);
            }
            Value::Array(values) => {
                self.tag(L_ARRAY);
                self.len(values.len());
                for v in values {
                    self.literal(v);
                }
            }
            Value::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                self.tag(L_OBJECT);
                self.len(entries.len());
                for (key, v) in entries {
                    self.text(key);
                    self.literal(v);
                }
            }
        }
    }

    fn sequence(&mut self, field: u8, nodes: &[SchemaNode]) {
        if nodes.is_empty() {
            return;
        }
        self.tag(field);
        self.len(nodes.len());
        for node in nodes {
            self.node(node);
        }
    }

    fn opt_child(&mut self, field: u8, child: Option<&SchemaNode>) {
        if let Some(child) = child {
            self.tag(field);
            self.node(child);
        }
    }

    fn opt_text(&mut self, field: u8, value: Option<&str>) {
        if let Some(value) = value {
            self.tag(field);
            self.text(value);
        }
    }

    fn opt_number(&mut self, field: u8, value: Option<f64>) {
        if let Some(value) = value {
            self.tag(field);
            self.number(value);
        }
    }

    fn opt_count(&mut self, field: u8, value: Option<u64>) {
        if let Some(value) = value {
            self.tag(field);
            self.sink.put(&value.to_le_bytes());
        }
    }

    fn opt_flag(&mut self, field: u8, value: Option<bool>) {
        if let Some(value) = value {
            self.tag(field);
            self.flag(value);
        }
    }

    fn set_flag(&mut self, field: u8, value: bool) {
        if value {
            self.tag(field);
        }
    }

    fn tag(&mut self, tag: u8) {
        self.sink.put(&[tag]);
    }

    fn flag(&mut self, value: bool) {
        self.sink.put(&[u8::from(value)]);
    }

    fn len(&mut self, n: usize) {
        self.sink.put(&(n as u64).to_le_bytes());
    }

    fn number(&mut self, value: f64) {
        // -0.0 and 0.0 describe the same constraint
        let value = if value == 0.0 { 0.0 } else { value };
        self.sink.put(&value.to_bits().to_le_bytes());
    }

    fn text(&mut self, value: &str) {
        self.len(value.len());
        self.sink.put(value.as_bytes());
    }
}
