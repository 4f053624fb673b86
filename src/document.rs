//! Declarative schema documents
//!
//! JSON documents describing types and migrations by name. Several documents
//! can be loaded into one registry; references between them are resolved
//! once everything has been declared.
//!
//! ```json
//! {
//!   "defaults": { "syncable": false },
//!   "types": [
//!     { "kind": "enum", "name": "State", "values": { "Active": 1 } },
//!     { "kind": "item", "name": "Person", "keyPath": "/people-:id",
//!       "fields": { "id": { "type": "uint", "initialValue": "sequence" },
//!                   "state": { "type": "State" } } }
//!   ],
//!   "migrations": [
//!     { "fromVersion": 1, "name": "Add state",
//!       "operations": [ { "op": "changeType", "type": "Person",
//!                         "actions": [ { "op": "addField", "name": "state" } ] } ] }
//!   ]
//! }
//! ```

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::assemble::ExportedValue;
use crate::deferred::Deferred;
use crate::error::{Result, SchemaError};
use crate::migrate::{migrate, DeferredMigration};
use crate::registry::TypeRegistry;
use crate::stringify::DefaultValue;
use crate::types::{
    AliasOptions, AliasParent, EnumType, EnumValueConfig, Field, FromMetadata, InitialValue,
    InterpretAs, ItemType, KeyPathConfig, ObjectType, ScalarKind, SchemaDefaults, TtlSource,
    TtlValue, TypeId, TypeKind, Validation,
};

// =============================================================================
// Document model
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(v) => vec![v],
            Self::Many(v) => v,
        }
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

/// One schema document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<SchemaDefaults>,
    #[serde(default)]
    pub types: Vec<TypeDocument>,
    /// Names to export; every type in the document when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exports: Option<Vec<String>>,
    /// Non-schema values, carried along and ignored
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub constants: IndexMap<String, Value>,
    #[serde(default)]
    pub migrations: Vec<MigrationDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TypeDocument {
    Item {
        name: String,
        key_path: OneOrMany<KeyPathDocument>,
        #[serde(default)]
        fields: IndexMap<String, FieldDocument>,
        #[serde(default)]
        ttl: Option<TtlDocument>,
        #[serde(default)]
        syncable: Option<bool>,
        #[serde(default)]
        versioned: Option<bool>,
        #[serde(default)]
        indexes: Vec<IndexDocument>,
        #[serde(default)]
        reserved_names: Vec<String>,
        #[serde(default)]
        deprecated: Option<String>,
        #[serde(default)]
        comments: Option<String>,
    },
    Object {
        name: String,
        #[serde(default)]
        fields: IndexMap<String, FieldDocument>,
        #[serde(default)]
        reserved_names: Vec<String>,
        #[serde(default)]
        deprecated: Option<String>,
        #[serde(default)]
        comments: Option<String>,
    },
    Enum {
        name: String,
        values: IndexMap<String, EnumValueDocument>,
        #[serde(default)]
        deprecated: Option<String>,
        #[serde(default)]
        comments: Option<String>,
    },
    Alias {
        name: String,
        /// Another type by name, `Name[]` for a list
        #[serde(default, rename = "type")]
        parent: Option<String>,
        /// A raw scalar, instead of `type`
        #[serde(default)]
        scalar: Option<ScalarKind>,
        #[serde(default)]
        valid: OneOrMany<ValidationDocument>,
        #[serde(default)]
        interpret_as: Option<InterpretAs>,
        #[serde(default)]
        deprecated: Option<String>,
        #[serde(default)]
        comments: Option<String>,
    },
}

impl TypeDocument {
    pub fn name(&self) -> &str {
        match self {
            Self::Item { name, .. }
            | Self::Object { name, .. }
            | Self::Enum { name, .. }
            | Self::Alias { name, .. } => name,
        }
    }

    pub fn kind(&self) -> TypeKind {
        match self {
            Self::Item { .. } => TypeKind::Item,
            Self::Object { .. } => TypeKind::Object,
            Self::Enum { .. } => TypeKind::Enum,
            Self::Alias { .. } => TypeKind::Alias,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPathDocument {
    Path(String),
    Config(KeyPathConfig),
}

impl From<KeyPathDocument> for KeyPathConfig {
    fn from(doc: KeyPathDocument) -> Self {
        match doc {
            KeyPathDocument::Path(path) => path.into(),
            KeyPathDocument::Config(config) => config,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtlDocument {
    pub source: TtlSource,
    #[serde(default)]
    pub duration_seconds: Option<u64>,
    #[serde(default)]
    pub field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDocument {
    pub group_local_index: u32,
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnumValueDocument {
    Ordinal(i32),
    Config(EnumValueConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValidationDocument {
    Expression(String),
    Full(Validation),
}

impl From<ValidationDocument> for Validation {
    fn from(doc: ValidationDocument) -> Self {
        match doc {
            ValidationDocument::Expression(expr) => Validation::new(expr),
            ValidationDocument::Full(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDocument {
    /// Type name, `Name[]` for a list
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub deprecated: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub read_default: Option<Value>,
    #[serde(default)]
    pub valid: OneOrMany<String>,
    #[serde(default)]
    pub from_metadata: Option<FromMetadata>,
    #[serde(default)]
    pub initial_value: Option<InitialValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationDocument {
    pub from_version: u64,
    pub name: String,
    #[serde(default)]
    pub operations: Vec<MigrationOperation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum MigrationOperation {
    ChangeType {
        #[serde(rename = "type")]
        type_name: String,
        actions: Vec<TypeAction>,
    },
    ChangeEnum {
        #[serde(rename = "enum")]
        enum_name: String,
        actions: Vec<EnumAction>,
    },
    AddType {
        name: String,
    },
    RemoveType {
        name: String,
    },
    RenameType {
        from: String,
        to: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum TypeAction {
    AddField {
        name: String,
    },
    RemoveField {
        name: String,
        #[serde(default, rename = "readDefault")]
        read_default: Option<Value>,
    },
    RenameField {
        from: String,
        to: String,
    },
    MarkFieldAsRequired {
        name: String,
    },
    MarkFieldAsNotRequired {
        name: String,
        #[serde(default, rename = "readDefault")]
        read_default: Option<Value>,
    },
    ModifyFieldReadDefault {
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum EnumAction {
    AddValue { name: String },
    RemoveValue { name: String },
    RenameValue { from: String, to: String },
}

// =============================================================================
// Loader
// =============================================================================

/// Everything a build needs, produced from one or more documents
#[derive(Debug)]
pub struct LoadedSchema {
    pub registry: TypeRegistry,
    pub exports: Vec<ExportedValue>,
    pub migrations: Vec<DeferredMigration>,
    /// Defaults from the last document that set them
    pub defaults: Option<SchemaDefaults>,
}

/// Collects documents, then registers their types in one go
#[derive(Debug, Default)]
pub struct SchemaLoader {
    documents: Vec<SchemaDocument>,
}

fn array_element(name: &str) -> Option<&str> {
    name.strip_suffix("[]")
}

impl LoadedSchema {
    /// Handle for a registered name
    pub fn type_id(&self, name: &str) -> Result<TypeId> {
        self.registry.lookup(name)
    }
}

impl SchemaLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_document(&mut self, document: SchemaDocument) -> &mut Self {
        self.documents.push(document);
        self
    }

    pub fn add_str(&mut self, json: &str) -> Result<&mut Self> {
        let document: SchemaDocument = serde_json::from_str(json)?;
        Ok(self.add_document(document))
    }

    pub fn add_path(&mut self, path: &Path) -> Result<&mut Self> {
        debug!(path = %path.display(), "loading schema document");
        let content = std::fs::read_to_string(path)?;
        self.add_str(&content)
    }

    /// Register every document's types into a fresh registry
    pub fn finish(self) -> Result<LoadedSchema> {
        let mut registry = TypeRegistry::with_known_types();
        let mut defaults = None;
        let mut exports = Vec::new();
        let mut migrations = Vec::new();
        let mut types = Vec::new();

        for document in self.documents {
            if document.defaults.is_some() {
                defaults = document.defaults;
            }
            for name in document.constants.keys() {
                exports.push(ExportedValue::Other { name: name.clone() });
            }
            match document.exports {
                Some(names) => exports.extend(
                    names
                        .into_iter()
                        .map(|name| ExportedValue::Type(Deferred::named(name))),
                ),
                None => exports.extend(
                    document
                        .types
                        .iter()
                        .map(|t| ExportedValue::Type(Deferred::named(t.name()))),
                ),
            }
            migrations.extend(document.migrations.into_iter().map(deferred_migration));
            types.extend(document.types);
        }

        // Reserve every identity first so definitions can refer to each other
        for doc in &types {
            registry.declare(doc.name(), doc.kind())?;
        }

        // Aliases first so fields can take lists of them
        let (aliases, others): (Vec<_>, Vec<_>) = types
            .into_iter()
            .partition(|doc| matches!(doc, TypeDocument::Alias { .. }));
        define_aliases(&mut registry, aliases)?;
        for doc in others {
            define_message_or_enum(&mut registry, doc)?;
        }
        debug!(types = registry.len(), "registered schema documents");

        Ok(LoadedSchema {
            registry,
            exports,
            migrations,
            defaults,
        })
    }
}

fn field_from_document(registry: &mut TypeRegistry, doc: FieldDocument) -> Result<Field> {
    let field_type = match array_element(&doc.type_name) {
        Some(inner) => {
            let inner = registry.lookup(inner)?;
            Deferred::from(registry.array_of(inner)?)
        }
        None => Deferred::named(doc.type_name),
    };
    let mut field = Field::new(field_type);
    field.required = doc.required;
    field.deprecated = doc.deprecated;
    field.comments = doc.comments;
    field.read_default = doc.read_default.as_ref().map(DefaultValue::from_json);
    field.valid = doc.valid.into_vec();
    field.from_metadata = doc.from_metadata;
    field.initial_value = doc.initial_value;
    Ok(field)
}

fn define_message_or_enum(registry: &mut TypeRegistry, doc: TypeDocument) -> Result<()> {
    let name = doc.name().to_string();
    let id = registry.lookup(&name)?;
    match doc {
        TypeDocument::Item {
            name,
            key_path,
            fields,
            ttl,
            syncable,
            versioned,
            indexes,
            reserved_names,
            deprecated,
            comments,
        } => {
            let mut item = ItemType::new(name);
            item.key_paths = key_path.into_vec().into_iter().map(Into::into).collect();
            for (field_name, field) in fields {
                let field = field_from_document(registry, field)?;
                item.fields.insert(field_name, field);
            }
            if let Some(ttl) = ttl {
                let value = match (ttl.duration_seconds, ttl.field) {
                    (Some(seconds), None) => TtlValue::DurationSeconds(seconds),
                    (None, Some(field)) => TtlValue::Field(field),
                    _ => {
                        return Err(SchemaError::invalid_option(
                            &item.name,
                            "ttl needs exactly one of durationSeconds and field",
                        ));
                    }
                };
                item = item.ttl(ttl.source, value);
            }
            item.syncable = syncable;
            item.versioned = versioned;
            for index in indexes {
                item = item.index(index.group_local_index, index.field);
            }
            item.reserved_names = reserved_names;
            item.deprecated = deprecated;
            item.comments = comments;
            registry.define(id, item)?;
        }
        TypeDocument::Object {
            name,
            fields,
            reserved_names,
            deprecated,
            comments,
        } => {
            let mut object = ObjectType::new(name);
            for (field_name, field) in fields {
                let field = field_from_document(registry, field)?;
                object.fields.insert(field_name, field);
            }
            object.reserved_names = reserved_names;
            object.deprecated = deprecated;
            object.comments = comments;
            registry.define(id, object)?;
        }
        TypeDocument::Enum {
            name,
            values,
            deprecated,
            comments,
        } => {
            let mut enum_type = EnumType::new(name);
            for (value_name, value) in values {
                let config = match value {
                    EnumValueDocument::Ordinal(v) => EnumValueConfig::from(v),
                    EnumValueDocument::Config(config) => config,
                };
                enum_type = enum_type.value(value_name, config);
            }
            enum_type.deprecated = deprecated;
            enum_type.comments = comments;
            registry.enum_type(enum_type)?;
        }
        TypeDocument::Alias { .. } => {
            return Err(SchemaError::invalid_option(name, "aliases are defined separately"));
        }
    }
    Ok(())
}

/// Parent of an alias, if it can be built yet
fn alias_parent(
    registry: &mut TypeRegistry,
    parent: Option<&str>,
    scalar: Option<ScalarKind>,
    alias_name: &str,
) -> Result<Option<AliasParent>> {
    match (parent, scalar) {
        (None, Some(kind)) => Ok(Some(AliasParent::Scalar(kind))),
        (Some(parent), None) => {
            let (base, list) = match array_element(parent) {
                Some(inner) => (inner, true),
                None => (parent, false),
            };
            let id = registry.lookup(base)?;
            if !list {
                return Ok(Some(AliasParent::Type(id)));
            }
            // wrapping an alias in a list needs the alias to exist
            if registry.kind_of(id) == Some(TypeKind::Alias) && registry.get(id).is_err() {
                return Ok(None);
            }
            Ok(Some(AliasParent::Type(registry.array_of(id)?)))
        }
        _ => Err(SchemaError::invalid_option(
            alias_name,
            "an alias needs exactly one of type and scalar",
        )),
    }
}

fn define_aliases(registry: &mut TypeRegistry, mut pending: Vec<TypeDocument>) -> Result<()> {
    while !pending.is_empty() {
        let before = pending.len();
        let mut waiting = Vec::new();
        for doc in pending {
            let TypeDocument::Alias {
                name,
                parent,
                scalar,
                valid,
                interpret_as,
                deprecated,
                comments,
            } = doc
            else {
                continue;
            };
            let Some(parent_type) = alias_parent(registry, parent.as_deref(), scalar, &name)? else {
                waiting.push(TypeDocument::Alias {
                    name,
                    parent,
                    scalar,
                    valid,
                    interpret_as,
                    deprecated,
                    comments,
                });
                continue;
            };
            let options = AliasOptions {
                validations: valid.into_vec().into_iter().map(Into::into).collect(),
                interpret_as,
                no_alias: false,
                deprecated,
                comments,
            };
            registry.alias(name, parent_type, options)?;
        }
        if waiting.len() == before {
            let names: Vec<_> = waiting.iter().map(|d| d.name().to_string()).collect();
            warn!(aliases = ?names, "aliases wrap lists of each other");
            return Err(SchemaError::UnknownType {
                name: names.join(", "),
                hint: None,
            });
        }
        pending = waiting;
    }
    Ok(())
}

fn deferred_migration(doc: MigrationDocument) -> DeferredMigration {
    let operations = doc.operations;
    migrate(doc.from_version, doc.name, move |m| {
        for op in &operations {
            match op {
                MigrationOperation::ChangeType { type_name, actions } => {
                    m.change_type(type_name, |t| {
                        for action in actions {
                            match action {
                                TypeAction::AddField { name } => {
                                    t.add_field(name);
                                }
                                TypeAction::RemoveField { name, read_default } => {
                                    t.remove_field(name, read_default.as_ref().map(DefaultValue::from_json))?;
                                }
                                TypeAction::RenameField { from, to } => {
                                    t.rename_field(from, to);
                                }
                                TypeAction::MarkFieldAsRequired { name } => {
                                    t.mark_field_as_required(name);
                                }
                                TypeAction::MarkFieldAsNotRequired { name, read_default } => {
                                    t.mark_field_as_not_required(
                                        name,
                                        read_default.as_ref().map(DefaultValue::from_json),
                                    )?;
                                }
                                TypeAction::ModifyFieldReadDefault { name } => {
                                    t.modify_field_read_default(name);
                                }
                            }
                        }
                        Ok(())
                    })?;
                }
                MigrationOperation::ChangeEnum { enum_name, actions } => {
                    m.change_enum(enum_name, |e| {
                        for action in actions {
                            match action {
                                EnumAction::AddValue { name } => {
                                    e.add_value(name);
                                }
                                EnumAction::RemoveValue { name } => {
                                    e.remove_value(name);
                                }
                                EnumAction::RenameValue { from, to } => {
                                    e.rename_value(from, to);
                                }
                            }
                        }
                        Ok(())
                    })?;
                }
                MigrationOperation::AddType { name } => {
                    m.add_type(name);
                }
                MigrationOperation::RemoveType { name } => {
                    m.remove_type(name);
                }
                MigrationOperation::RenameType { from, to } => {
                    m.rename_type(from, to);
                }
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SchemaType;

    const PEOPLE: &str = r#"{
        "defaults": { "syncable": false },
        "types": [
            { "kind": "enum", "name": "State", "values": { "Active": 1, "Archived": { "value": 2, "deprecated": "use Deleted" } } },
            { "kind": "alias", "name": "Email", "type": "string", "valid": "this.contains('@')" },
            { "kind": "alias", "name": "Emails", "type": "Email[]" },
            { "kind": "object", "name": "Node", "fields": { "children": { "type": "Node[]", "required": false } } },
            { "kind": "item", "name": "Person", "keyPath": ["/people-:id", { "path": "/email-:email", "syncable": true }],
              "fields": {
                "id": { "type": "uint", "initialValue": "sequence" },
                "email": { "type": "Email", "readDefault": "nobody@example.com" },
                "state": { "type": "State" },
                "tree": { "type": "Node", "required": false }
              },
              "ttl": { "source": "fromCreated", "durationSeconds": 3600 },
              "indexes": [ { "groupLocalIndex": 1, "field": "email" } ] }
        ],
        "constants": { "VERSION": 3 },
        "migrations": [
            { "fromVersion": 1, "name": "Add state", "operations": [
                { "op": "changeType", "type": "Person", "actions": [ { "op": "addField", "name": "state" } ] },
                { "op": "renameType", "from": "Human", "to": "Person" }
            ] }
        ]
    }"#;

    fn load(json: &str) -> Result<LoadedSchema> {
        let mut loader = SchemaLoader::new();
        loader.add_str(json)?;
        loader.finish()
    }

    #[test]
    fn test_load_document() {
        let schema = load(PEOPLE).unwrap();
        assert_eq!(schema.defaults.as_ref().and_then(|d| d.syncable), Some(false));
        // 5 types + 1 constant
        assert_eq!(schema.exports.len(), 6);
        assert_eq!(schema.migrations.len(), 1);

        let person = schema.type_id("Person").unwrap();
        match schema.registry.get(person).unwrap() {
            SchemaType::Item(item) => {
                assert_eq!(item.key_paths.len(), 2);
                assert_eq!(item.key_paths[1].syncable, Some(true));
                assert_eq!(item.fields.len(), 4);
                assert_eq!(item.ttl.as_ref().unwrap().value, TtlValue::DurationSeconds(3600));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(schema.registry.find("Email[]").is_some());
        assert!(schema.registry.find("Node[]").is_some());
    }

    #[test]
    fn test_migration_operations() {
        let schema = load(PEOPLE).unwrap();
        let migration = schema.migrations[0].build().unwrap();
        assert_eq!(migration.commands.len(), 2);
        assert_eq!(migration.commands[1].type_name, "Human");
    }

    #[test]
    fn test_unknown_field_type_fails_lazily() {
        let schema = load(
            r#"{ "types": [ { "kind": "object", "name": "A", "fields": { "b": { "type": "Missing" } } } ] }"#,
        )
        .unwrap();
        let a = schema.type_id("A").unwrap();
        let SchemaType::Object(object) = schema.registry.get(a).unwrap() else {
            panic!("not an object");
        };
        assert!(object.fields["b"].field_type.force(&schema.registry).is_err());
    }

    #[test]
    fn test_alias_needs_one_parent() {
        let err = load(r#"{ "types": [ { "kind": "alias", "name": "X" } ] }"#).unwrap_err();
        assert_eq!(err.code().as_str(), "SchemaInvalidOption");
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("people.json");
        std::fs::write(&path, PEOPLE).unwrap();

        let mut loader = SchemaLoader::new();
        loader.add_path(&path).unwrap();
        let schema = loader.finish().unwrap();
        assert!(schema.type_id("Person").is_ok());

        let err = SchemaLoader::new()
            .add_path(&dir.path().join("missing.json"))
            .unwrap_err();
        assert_eq!(err.code().as_str(), "SchemaIo");
    }

    #[test]
    fn test_bad_json() {
        let err = load("{ not json").unwrap_err();
        assert_eq!(err.code().as_str(), "SchemaJson");
    }

    #[test]
    fn test_conflicting_definitions_across_documents() {
        let mut loader = SchemaLoader::new();
        loader
            .add_str(r#"{ "types": [ { "kind": "object", "name": "A" } ] }"#)
            .unwrap();
        loader
            .add_str(r#"{ "types": [ { "kind": "enum", "name": "A", "values": { "X": 1 } } ] }"#)
            .unwrap();
        let err = loader.finish().unwrap_err();
        assert_eq!(err.code().as_str(), "SchemaDuplicateTypeDefinition");
    }
}
